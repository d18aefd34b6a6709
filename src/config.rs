use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Image proxy rewriting for `img` sources.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageProxyConfig {
    /// URL template; `%s` is replaced with the form-encoded original URL.
    pub url: String,
    /// Only proxy sources using this scheme (e.g. `http`).
    #[serde(default)]
    pub protocol: Option<String>,
}

/// Filter policy as written in the config file. Every list left unset falls
/// back to the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub whitelisted_tags: Option<BTreeMap<String, Vec<String>>>,
    pub required_attributes: Option<BTreeMap<String, Vec<String>>>,
    pub attribute_overrides: Option<BTreeMap<String, BTreeMap<String, String>>>,
    pub integer_attributes: Option<Vec<String>>,
    pub media_attributes: Option<Vec<String>>,
    pub media_blacklist: Option<Vec<String>>,
    pub scheme_whitelist: Option<Vec<String>>,
    pub iframe_whitelist: Option<Vec<String>>,
    pub image_proxy: Option<ImageProxyConfig>,
    pub block_pixel_trackers: bool,
    pub fold_case: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            whitelisted_tags: None,
            required_attributes: None,
            attribute_overrides: None,
            integer_attributes: None,
            media_attributes: None,
            media_blacklist: None,
            scheme_whitelist: None,
            iframe_whitelist: None,
            image_proxy: None,
            block_pixel_trackers: true,
            fold_case: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: Option<String>,
    pub level: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: Some("warn".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub filter: FilterConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let explicit_path = std::env::var("CONFIG_FILE").ok();
        let config = if let Some(path) = explicit_path {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(anyhow!("config file {:?} not found", path));
            }
            Self::load_from_file(&path)?
        } else {
            let path = locate_default_config();
            if let Some(path) = path {
                Self::load_from_file(&path)?
            } else {
                AppConfig::default()
            }
        };

        Self::apply_env_overrides(config)
    }

    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(contents).context("failed to parse config")
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        Ok(config)
    }

    fn apply_env_overrides(mut config: AppConfig) -> anyhow::Result<AppConfig> {
        if let Ok(log_file) = std::env::var("LOG_FILE_PATH") {
            config.logging.file = Some(log_file).filter(|file| !file.trim().is_empty());
        }

        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            config.logging.level = Some(log_level);
        }

        if let Some(fold_case) = parse_optional_env("FILTER_FOLD_CASE")? {
            config.filter.fold_case = fold_case;
        }

        if let Some(block) = parse_optional_env("FILTER_BLOCK_PIXEL_TRACKERS")? {
            config.filter.block_pixel_trackers = block;
        }

        Ok(config)
    }
}

fn parse_optional_env<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => Ok(Some(
            v.parse::<T>()
                .with_context(|| format!("{key} must be a valid value"))?,
        )),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn locate_default_config() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("config/config.yaml"),
        PathBuf::from("../config/config.yaml"),
    ];

    for path in candidates {
        if path.exists() {
            return Some(path);
        }
    }

    None
}
