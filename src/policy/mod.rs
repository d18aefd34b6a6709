//! Whitelist policy: which tags, attributes, schemes and media hosts may
//! appear in sanitized output.
//!
//! A [`Policy`] is immutable once built and holds no interior mutability, so a
//! single instance can be shared across threads behind an `Arc`.

mod defaults;

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;
use url::Url;

use crate::{
    config::{FilterConfig, ImageProxyConfig},
    error::{FilterError, FilterResult},
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct IframeSource {
    /// `None` for protocol-relative entries, which match `http` and `https`.
    scheme: Option<String>,
    host: String,
}

impl IframeSource {
    fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        match entry.strip_prefix("//") {
            Some(rest) => {
                let url = Url::parse(&format!("https://{rest}")).ok()?;
                Some(Self {
                    scheme: None,
                    host: url.host_str()?.to_string(),
                })
            }
            None => {
                let url = Url::parse(entry).ok()?;
                Some(Self {
                    scheme: Some(url.scheme().to_string()),
                    host: url.host_str()?.to_string(),
                })
            }
        }
    }

    fn matches(&self, url: &Url) -> bool {
        let scheme_ok = match &self.scheme {
            Some(scheme) => url.scheme() == scheme,
            None => matches!(url.scheme(), "http" | "https"),
        };
        scheme_ok && url.host_str() == Some(self.host.as_str())
    }
}

/// Rewrites image sources so they are fetched through a proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProxy {
    template: String,
    protocol: Option<String>,
}

impl ImageProxy {
    fn from_config(config: &ImageProxyConfig) -> FilterResult<Self> {
        if !config.url.contains("%s") {
            return Err(FilterError::config(format!(
                "image proxy url {:?} has no %s placeholder",
                config.url
            )));
        }
        let protocol = config
            .protocol
            .as_deref()
            .map(|protocol| protocol.trim().trim_end_matches(['/', ':']).to_ascii_lowercase())
            .filter(|protocol| !protocol.is_empty());
        Ok(Self {
            template: config.url.clone(),
            protocol,
        })
    }

    pub fn applies_to(&self, src: &str) -> bool {
        match &self.protocol {
            Some(protocol) => src
                .split_once(':')
                .is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case(protocol)),
            None => true,
        }
    }

    pub fn rewrite(&self, src: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(src.as_bytes()).collect();
        self.template.replacen("%s", &encoded, 1)
    }
}

#[derive(Debug, Clone)]
pub struct Policy {
    tags: HashMap<String, HashSet<String>>,
    required_attributes: HashMap<String, Vec<String>>,
    attribute_overrides: HashMap<String, Vec<(String, String)>>,
    integer_attributes: HashSet<String>,
    media_attributes: HashSet<String>,
    media_blacklist: Vec<String>,
    scheme_whitelist: Vec<String>,
    iframe_whitelist: Vec<IframeSource>,
    image_proxy: Option<ImageProxy>,
    block_pixel_trackers: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            tags: default_tags(),
            required_attributes: default_required_attributes(),
            attribute_overrides: default_attribute_overrides(),
            integer_attributes: to_set(defaults::INTEGER_ATTRIBUTES),
            media_attributes: to_set(defaults::MEDIA_ATTRIBUTES),
            media_blacklist: normalize_blacklist(defaults::MEDIA_BLACKLIST),
            scheme_whitelist: defaults::SCHEME_WHITELIST
                .iter()
                .map(|entry| normalize_scheme(entry))
                .collect(),
            iframe_whitelist: defaults::IFRAME_WHITELIST
                .iter()
                .filter_map(|entry| IframeSource::parse(entry))
                .collect(),
            image_proxy: None,
            block_pixel_trackers: true,
        }
    }
}

impl Policy {
    /// Build a policy from config, falling back to the defaults for every
    /// list the config leaves unset. Contradictory rules are rejected here
    /// rather than discovered while sanitizing.
    pub fn from_config(config: &FilterConfig) -> FilterResult<Self> {
        let base = Policy::default();

        let tags = match &config.whitelisted_tags {
            Some(tags) => tags
                .iter()
                .map(|(tag, attrs)| (tag.clone(), attrs.iter().cloned().collect()))
                .collect(),
            None => base.tags,
        };

        let required_attributes = match &config.required_attributes {
            Some(required) => required
                .iter()
                .map(|(tag, attrs)| (tag.clone(), attrs.clone()))
                .collect(),
            None if config.whitelisted_tags.is_some() => {
                retain_known_tags(base.required_attributes, &tags)
            }
            None => base.required_attributes,
        };

        let attribute_overrides = match &config.attribute_overrides {
            Some(overrides) => overrides
                .iter()
                .map(|(tag, values)| (tag.clone(), ordered_pairs(values)))
                .collect(),
            None if config.whitelisted_tags.is_some() => {
                retain_known_tags(base.attribute_overrides, &tags)
            }
            None => base.attribute_overrides,
        };

        let scheme_whitelist = match &config.scheme_whitelist {
            Some(schemes) => {
                if schemes.iter().any(|scheme| scheme.trim().is_empty()) {
                    return Err(FilterError::config("scheme whitelist contains an empty entry"));
                }
                schemes.iter().map(|scheme| normalize_scheme(scheme)).collect()
            }
            None => base.scheme_whitelist,
        };

        let iframe_whitelist = match &config.iframe_whitelist {
            Some(entries) => entries
                .iter()
                .map(|entry| {
                    IframeSource::parse(entry).ok_or_else(|| {
                        FilterError::config(format!("invalid iframe whitelist entry {entry:?}"))
                    })
                })
                .collect::<FilterResult<Vec<_>>>()?,
            None => base.iframe_whitelist,
        };

        let image_proxy = config
            .image_proxy
            .as_ref()
            .map(ImageProxy::from_config)
            .transpose()?;

        let policy = Self {
            tags,
            required_attributes,
            attribute_overrides,
            integer_attributes: config
                .integer_attributes
                .as_deref()
                .map(|attrs| attrs.iter().cloned().collect())
                .unwrap_or(base.integer_attributes),
            media_attributes: config
                .media_attributes
                .as_deref()
                .map(|attrs| attrs.iter().cloned().collect())
                .unwrap_or(base.media_attributes),
            media_blacklist: config
                .media_blacklist
                .as_deref()
                .map(normalize_blacklist)
                .unwrap_or(base.media_blacklist),
            scheme_whitelist,
            iframe_whitelist,
            image_proxy,
            block_pixel_trackers: config.block_pixel_trackers,
        };

        policy.validate()?;
        debug!(
            tags = policy.tags.len(),
            schemes = policy.scheme_whitelist.len(),
            "filter policy loaded"
        );
        Ok(policy)
    }

    fn validate(&self) -> FilterResult<()> {
        // Names are rendered verbatim, so anything beyond a plain name could
        // smuggle markup into the output.
        for (tag, attrs) in &self.tags {
            if !is_markup_name(tag) {
                return Err(FilterError::config(format!("invalid tag name {tag:?}")));
            }
            if let Some(attr) = attrs.iter().find(|attr| !is_markup_name(attr)) {
                return Err(FilterError::config(format!(
                    "invalid attribute name {attr:?} on {tag:?}"
                )));
            }
        }

        for (tag, required) in &self.required_attributes {
            let Some(allowed) = self.tags.get(tag) else {
                return Err(FilterError::config(format!(
                    "required attributes configured for tag {tag:?} which is not whitelisted"
                )));
            };
            if let Some(missing) = required.iter().find(|attr| !allowed.contains(*attr)) {
                return Err(FilterError::config(format!(
                    "attribute {missing:?} is required on {tag:?} but not allowed there"
                )));
            }
        }

        for (tag, overrides) in &self.attribute_overrides {
            if !self.tags.contains_key(tag) {
                return Err(FilterError::config(format!(
                    "attribute overrides configured for tag {tag:?} which is not whitelisted"
                )));
            }
            if let Some((attr, _)) = overrides.iter().find(|(attr, _)| !is_markup_name(attr)) {
                return Err(FilterError::config(format!(
                    "invalid override attribute name {attr:?} on {tag:?}"
                )));
            }
        }

        Ok(())
    }

    pub fn is_allowed_tag(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    pub fn is_allowed_attribute(&self, tag: &str, attribute: &str) -> bool {
        self.tags
            .get(tag)
            .is_some_and(|allowed| allowed.contains(attribute))
    }

    pub fn required_attributes(&self, tag: &str) -> &[String] {
        self.required_attributes
            .get(tag)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn attribute_overrides(&self, tag: &str) -> &[(String, String)] {
        self.attribute_overrides
            .get(tag)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_integer_attribute(&self, attribute: &str) -> bool {
        self.integer_attributes.contains(attribute)
    }

    /// Attributes holding a URL to a resource (links, images, posters).
    pub fn is_media_attribute(&self, attribute: &str) -> bool {
        self.media_attributes.contains(attribute)
    }

    pub fn is_blacklisted_media(&self, value: &str) -> bool {
        let value = value.to_ascii_lowercase();
        self.media_blacklist
            .iter()
            .any(|entry| value.contains(entry.as_str()))
    }

    pub fn is_allowed_scheme(&self, value: &str) -> bool {
        let value = value.trim_start().as_bytes();
        self.scheme_whitelist.iter().any(|prefix| {
            value.len() >= prefix.len()
                && value[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
        })
    }

    pub fn is_whitelisted_iframe(&self, src: &str) -> bool {
        let parsed = match src.strip_prefix("//") {
            Some(rest) => Url::parse(&format!("https://{rest}")),
            None => Url::parse(src),
        };
        let Ok(url) = parsed else {
            return false;
        };
        self.iframe_whitelist.iter().any(|source| source.matches(&url))
    }

    pub fn image_proxy(&self) -> Option<&ImageProxy> {
        self.image_proxy.as_ref()
    }

    pub fn blocks_pixel_trackers(&self) -> bool {
        self.block_pixel_trackers
    }
}

fn default_tags() -> HashMap<String, HashSet<String>> {
    defaults::WHITELISTED_TAGS
        .iter()
        .map(|(tag, attrs)| (tag.to_string(), to_set(attrs)))
        .collect()
}

fn default_required_attributes() -> HashMap<String, Vec<String>> {
    defaults::REQUIRED_ATTRIBUTES
        .iter()
        .map(|(tag, attrs)| {
            (
                tag.to_string(),
                attrs.iter().map(|attr| attr.to_string()).collect(),
            )
        })
        .collect()
}

fn default_attribute_overrides() -> HashMap<String, Vec<(String, String)>> {
    defaults::ATTRIBUTE_OVERRIDES
        .iter()
        .map(|(tag, values)| {
            (
                tag.to_string(),
                values
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
            )
        })
        .collect()
}

/// Default rules only make sense for tags that are still whitelisted when the
/// config supplies its own tag list.
fn retain_known_tags<V>(
    mut rules: HashMap<String, V>,
    tags: &HashMap<String, HashSet<String>>,
) -> HashMap<String, V> {
    rules.retain(|tag, _| tags.contains_key(tag));
    rules
}

fn ordered_pairs(values: &BTreeMap<String, String>) -> Vec<(String, String)> {
    values
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn to_set<S: AsRef<str>>(items: &[S]) -> HashSet<String> {
    items.iter().map(|item| item.as_ref().to_string()).collect()
}

fn normalize_blacklist<S: AsRef<str>>(entries: &[S]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| entry.as_ref().trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn is_markup_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ':' | '.'))
}

/// Bare scheme names (`https`) become prefixes (`https:`); anything with a
/// colon or leading slash is already a literal prefix.
fn normalize_scheme(entry: &str) -> String {
    let entry = entry.trim().to_ascii_lowercase();
    if entry.contains(':') || entry.starts_with('/') {
        entry
    } else {
        format!("{entry}:")
    }
}
