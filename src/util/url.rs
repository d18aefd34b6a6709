use url::{ParseError, Url};

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

/// Parse the site URL used to absolutize relative links.
pub fn parse_base_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Url::parse(raw).ok()
}

/// Resolve `value` against `base`.
///
/// Absolute URLs are returned untouched so the scheme check sees exactly what
/// the browser will. Relative and protocol-relative values are joined onto the
/// base. `None` means the value cannot be resolved.
pub fn resolve_url(base: Option<&Url>, value: &str) -> Option<String> {
    match Url::parse(value) {
        Ok(_) => Some(value.to_string()),
        Err(ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(value).ok().map(String::from),
            None => None,
        },
        Err(_) => None,
    }
}

pub fn upgrade_to_https(src: &str) -> Option<String> {
    src.strip_prefix("http://")
        .map(|rest| format!("https://{rest}"))
}

/// Turn `autoplay=1` into `autoplay=0` on YouTube embeds.
pub fn disable_youtube_autoplay(src: &str) -> Option<String> {
    let mut url = Url::parse(src).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    if !YOUTUBE_HOSTS.contains(&host.as_str()) {
        return None;
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if !pairs.iter().any(|(k, v)| is_autoplay(k, v)) {
        return None;
    }

    {
        let mut encoded = url.query_pairs_mut();
        encoded.clear();
        for (k, v) in &pairs {
            if is_autoplay(k, v) {
                encoded.append_pair(k, "0");
            } else {
                encoded.append_pair(k, v);
            }
        }
    }

    Some(url.to_string())
}

fn is_autoplay(key: &str, value: &str) -> bool {
    key.eq_ignore_ascii_case("autoplay") && value == "1"
}
