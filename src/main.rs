use anyhow::{bail, Context};
use std::{
    io::{Read, Write},
    path::Path,
};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::filter_fn, fmt::layer as fmt_layer, fmt::time::ChronoLocal, prelude::*, EnvFilter,
    Registry,
};

use feed_sanitizer::{config::AppConfig, Policy, ReaderOptions, Sanitizer};

const USAGE: &str = "usage: feed-sanitizer <base-url> [input-file]";

fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let _log_guard = setup_tracing(&config)?;

    let mut args = std::env::args().skip(1);
    let Some(base_url) = args.next() else {
        bail!(USAGE);
    };
    let input = args.next();
    if args.next().is_some() {
        bail!(USAGE);
    }

    let markup = read_input(input.as_deref())?;
    let policy = Policy::from_config(&config.filter).context("invalid filter policy")?;
    let sanitizer = Sanitizer::new(&policy, &base_url).with_options(ReaderOptions {
        fold_case: config.filter.fold_case,
    });

    tracing::info!(bytes = markup.len(), %base_url, "sanitizing");
    let html = sanitizer.sanitize(&markup)?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(html.as_bytes())?;
    stdout.write_all(b"\n")?;
    Ok(())
}

fn read_input(path: Option<&str>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("failed to read input file {path:?}"))
        }
        None => {
            let mut buffer = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

/// The returned guard flushes the log file when dropped.
fn setup_tracing(config: &AppConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config
            .logging
            .level
            .clone()
            .unwrap_or_else(|| "warn".to_string());
        EnvFilter::new(level)
    });

    let crate_filter = filter_fn(|meta| meta.target().starts_with("feed_sanitizer"));
    let other_filter = filter_fn(|meta| !meta.target().starts_with("feed_sanitizer"));

    // Sanitized markup goes to stdout, so logs stay on stderr.
    let stderr_crate = fmt_layer()
        .with_writer(std::io::stderr)
        .with_timer(ChronoLocal::rfc_3339())
        .with_file(true)
        .with_line_number(true)
        .with_filter(crate_filter.clone());

    let stderr_general = fmt_layer()
        .with_writer(std::io::stderr)
        .with_timer(ChronoLocal::rfc_3339())
        .with_filter(other_filter);

    let mut guard = None;
    let file_layer = match config.logging.file.as_deref() {
        Some(file) => {
            let log_path = Path::new(file);
            if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }

            let file_name = log_path
                .file_name()
                .and_then(|s| s.to_str())
                .ok_or_else(|| anyhow::anyhow!("invalid log file path"))?;
            let directory = log_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| Path::new(".").to_path_buf());

            let file_appender = rolling::never(directory, file_name);
            let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(file_guard);

            Some(
                fmt_layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_timer(ChronoLocal::rfc_3339())
                    .with_file(true)
                    .with_line_number(true)
                    .with_filter(crate_filter),
            )
        }
        None => None,
    };

    Registry::default()
        .with(env_filter)
        .with(stderr_crate)
        .with(stderr_general)
        .with(file_layer)
        .try_init()
        .context("failed to init tracing subscriber")?;

    Ok(guard)
}
