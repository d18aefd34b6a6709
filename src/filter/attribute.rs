use quick_xml::escape::escape;
use tracing::trace;
use url::Url;

use crate::{
    model::AttributeSet,
    policy::Policy,
    util::url::{disable_youtube_autoplay, resolve_url, upgrade_to_https},
};

type Rule<'p> = fn(&AttributeFilter<'p>, &str, &str, &mut String) -> bool;

/// Decides which attributes survive on a permitted tag and rewrites the
/// values that do.
pub struct AttributeFilter<'p> {
    policy: &'p Policy,
    base_url: Option<&'p Url>,
}

impl<'p> AttributeFilter<'p> {
    pub fn new(policy: &'p Policy, base_url: Option<&'p Url>) -> Self {
        Self { policy, base_url }
    }

    /// Run every attribute through the rule chain; the first rule that says
    /// no drops it. Rules may rewrite the value for the rules after them.
    pub fn filter(&self, tag: &str, attributes: AttributeSet) -> AttributeSet {
        let rules: [Rule<'p>; 10] = [
            |_, _, _, value| !value.is_empty(),
            |filter, tag, name, _| filter.policy.is_allowed_attribute(tag, name),
            Self::is_valid_integer,
            Self::absolutize_url,
            Self::is_allowed_iframe,
            |filter, _, name, value| {
                !(filter.policy.is_media_attribute(name) && filter.policy.is_blacklisted_media(value))
            },
            |filter, _, name, value| {
                !filter.policy.is_media_attribute(name) || filter.policy.is_allowed_scheme(value)
            },
            Self::proxy_image,
            Self::secure_iframe_src,
            Self::disable_autoplay,
        ];

        let mut kept = AttributeSet::new();
        for (name, mut value) in attributes {
            if rules.iter().all(|rule| rule(self, tag, &name, &mut value)) {
                kept.insert(name, value);
            } else {
                trace!(tag, attribute = %name, "dropping attribute");
            }
        }
        kept
    }

    pub fn has_required_attributes(&self, tag: &str, attributes: &AttributeSet) -> bool {
        self.policy
            .required_attributes(tag)
            .iter()
            .all(|name| attributes.contains(name))
    }

    /// Force the configured values, e.g. `rel` and `target` on links.
    pub fn add_attributes(&self, tag: &str, mut attributes: AttributeSet) -> AttributeSet {
        for (name, value) in self.policy.attribute_overrides(tag) {
            attributes.insert(name.as_str(), value.as_str());
        }
        attributes
    }

    pub fn to_html(&self, attributes: &AttributeSet) -> String {
        attributes
            .iter()
            .map(|(name, value)| format!("{name}=\"{}\"", escape(value)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn is_valid_integer(&self, _tag: &str, name: &str, value: &mut String) -> bool {
        !self.policy.is_integer_attribute(name)
            || (!value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()))
    }

    fn absolutize_url(&self, _tag: &str, name: &str, value: &mut String) -> bool {
        if self.policy.is_media_attribute(name) {
            if let Some(absolute) = resolve_url(self.base_url, value.trim()) {
                *value = absolute;
            }
        }
        true
    }

    fn is_allowed_iframe(&self, tag: &str, name: &str, value: &mut String) -> bool {
        !is_iframe_src(tag, name) || self.policy.is_whitelisted_iframe(value)
    }

    fn proxy_image(&self, tag: &str, name: &str, value: &mut String) -> bool {
        if tag == "img" && name == "src" {
            if let Some(proxy) = self.policy.image_proxy().filter(|proxy| proxy.applies_to(value)) {
                *value = proxy.rewrite(value);
            }
        }
        true
    }

    fn secure_iframe_src(&self, tag: &str, name: &str, value: &mut String) -> bool {
        if is_iframe_src(tag, name) {
            if let Some(secure) = upgrade_to_https(value) {
                *value = secure;
            }
        }
        true
    }

    fn disable_autoplay(&self, tag: &str, name: &str, value: &mut String) -> bool {
        if is_iframe_src(tag, name) {
            if let Some(rewritten) = disable_youtube_autoplay(value) {
                *value = rewritten;
            }
        }
        true
    }
}

fn is_iframe_src(tag: &str, name: &str) -> bool {
    tag == "iframe" && name == "src"
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::{FilterConfig, ImageProxyConfig};
    use crate::util::url::parse_base_url;

    fn attrs(pairs: &[(&str, &str)]) -> AttributeSet {
        pairs.iter().copied().collect()
    }

    fn filtered(policy: &Policy, tag: &str, pairs: &[(&str, &str)]) -> AttributeSet {
        let base = parse_base_url("https://example.com/feed/").unwrap();
        AttributeFilter::new(policy, Some(&base)).filter(tag, attrs(pairs))
    }

    #[test]
    fn drops_attributes_outside_the_whitelist() {
        let policy = Policy::default();
        let kept = filtered(
            &policy,
            "a",
            &[("href", "https://a.test/"), ("onclick", "x()"), ("title", "t"), ("HREF", "y")],
        );
        assert_eq!(kept, attrs(&[("href", "https://a.test/"), ("title", "t")]));
    }

    #[test]
    fn drops_empty_values() {
        let policy = Policy::default();
        let kept = filtered(&policy, "img", &[("src", "https://a.test/x.png"), ("alt", "")]);
        assert_eq!(kept, attrs(&[("src", "https://a.test/x.png")]));
    }

    #[test]
    fn integer_attributes_must_be_digits() {
        let policy = Policy::default();
        let kept = filtered(
            &policy,
            "img",
            &[("src", "https://a.test/x.png"), ("width", "100"), ("height", "50%")],
        );
        assert_eq!(kept.get("width"), Some("100"));
        assert!(!kept.contains("height"));
        let kept = filtered(&policy, "img", &[("width", "-1"), ("height", "1e3")]);
        assert!(kept.is_empty());
    }

    #[test]
    fn resolves_relative_urls() {
        let policy = Policy::default();
        let kept = filtered(&policy, "img", &[("src", "../a.png"), ("title", "../b.png")]);
        assert_eq!(kept.get("src"), Some("https://example.com/a.png"));
        assert_eq!(kept.get("title"), Some("../b.png"));
    }

    #[test]
    fn rejects_unlisted_schemes() {
        let policy = Policy::default();
        for href in ["javascript:alert(1)", " JavaScript:alert(1)", "vbscript:x", "data:text/html,x"] {
            let kept = filtered(&policy, "a", &[("href", href)]);
            assert!(kept.is_empty(), "{href} survived");
        }
        let kept = filtered(&policy, "a", &[("href", "mailto:someone@example.com")]);
        assert_eq!(kept.get("href"), Some("mailto:someone@example.com"));
    }

    #[test]
    fn rejects_blacklisted_media() {
        let policy = Policy::default();
        let kept = filtered(&policy, "img", &[("src", "http://feeds.feedburner.com/~r/x/~4/y")]);
        assert!(kept.is_empty());
    }

    #[test]
    fn iframe_sources_are_whitelisted_and_upgraded() {
        let policy = Policy::default();
        let kept = filtered(&policy, "iframe", &[("src", "https://evil.test/embed")]);
        assert!(kept.is_empty());

        let kept = filtered(
            &policy,
            "iframe",
            &[("src", "http://www.youtube.com/embed/abc?autoplay=1"), ("width", "640")],
        );
        assert_eq!(
            kept.get("src"),
            Some("https://www.youtube.com/embed/abc?autoplay=0")
        );
        assert_eq!(kept.get("width"), Some("640"));

        let kept = filtered(&policy, "iframe", &[("src", "//www.youtube.com/embed/abc")]);
        assert_eq!(kept.get("src"), Some("https://www.youtube.com/embed/abc"));
    }

    #[test]
    fn images_go_through_the_proxy() {
        let config = FilterConfig {
            image_proxy: Some(ImageProxyConfig {
                url: "https://proxy.example/img?u=%s".into(),
                protocol: Some("http".into()),
            }),
            ..FilterConfig::default()
        };
        let policy = Policy::from_config(&config).unwrap();
        let kept = filtered(&policy, "img", &[("src", "http://a.test/x.png")]);
        assert_eq!(
            kept.get("src"),
            Some("https://proxy.example/img?u=http%3A%2F%2Fa.test%2Fx.png")
        );
        let kept = filtered(&policy, "img", &[("src", "https://a.test/x.png")]);
        assert_eq!(kept.get("src"), Some("https://a.test/x.png"));
    }

    #[test]
    fn required_attributes_are_checked_after_filtering() {
        let policy = Policy::default();
        let base = parse_base_url("https://example.com").unwrap();
        let filter = AttributeFilter::new(&policy, Some(&base));

        let kept = filter.filter("a", attrs(&[("href", "javascript:x"), ("title", "t")]));
        assert!(!filter.has_required_attributes("a", &kept));

        let kept = filter.filter("a", attrs(&[("href", "/x")]));
        assert!(filter.has_required_attributes("a", &kept));
        assert!(filter.has_required_attributes("p", &AttributeSet::new()));
    }

    #[test]
    fn overrides_replace_in_place_and_append() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "a".to_string(),
            BTreeMap::from([
                ("rel".to_string(), "noopener".to_string()),
                ("title".to_string(), "forced".to_string()),
            ]),
        );
        let config = FilterConfig {
            attribute_overrides: Some(overrides),
            ..FilterConfig::default()
        };
        let policy = Policy::from_config(&config).unwrap();
        let filter = AttributeFilter::new(&policy, None);
        let added = filter.add_attributes("a", attrs(&[("title", "t"), ("href", "https://a.test/")]));
        assert_eq!(
            filter.to_html(&added),
            r#"title="forced" href="https://a.test/" rel="noopener""#
        );
    }

    #[test]
    fn renders_escaped_values() {
        let policy = Policy::default();
        let filter = AttributeFilter::new(&policy, None);
        let html = filter.to_html(&attrs(&[("title", r#"a "b" <c> & 'd'"#), ("alt", "x")]));
        assert_eq!(
            html,
            r#"title="a &quot;b&quot; &lt;c&gt; &amp; &apos;d&apos;" alt="x""#
        );
        assert_eq!(filter.to_html(&AttributeSet::new()), "");
    }
}
