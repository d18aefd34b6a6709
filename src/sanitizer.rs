//! The sanitizer engine: one forward pass over parse events.
//!
//! Every open element gets a [`Frame`] on a stack, decided once when the tag
//! opens. A suppressed frame emits no markup and swallows the text directly
//! inside it; descendants are judged on their own, so an allowed `<p>` inside a
//! rejected `<div>` still renders. Once the events run out, tag pairs left
//! empty are removed and the result is trimmed.

use quick_xml::escape::escape;
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    error::{FilterError, FilterResult},
    filter::{remove_empty_tags, AttributeFilter, TagFilter},
    model::AttributeSet,
    parser::{EventReader, ParseEvent, ReaderOptions},
    policy::Policy,
    util::{encoding::decode_markup, url::parse_base_url},
};

/// One open element. The name is kept so closes can be checked against it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    Rendered(String),
    Suppressed(String),
}

impl Frame {
    fn name(&self) -> &str {
        match self {
            Frame::Rendered(name) | Frame::Suppressed(name) => name,
        }
    }
}

pub struct Sanitizer<'p> {
    policy: &'p Policy,
    base_url: Option<Url>,
    options: ReaderOptions,
}

impl<'p> Sanitizer<'p> {
    /// `base_url` is the site the markup came from; relative links are
    /// resolved against it. An unusable base leaves relative links
    /// unresolved, which the scheme whitelist then drops.
    pub fn new(policy: &'p Policy, base_url: &str) -> Self {
        let parsed = parse_base_url(base_url);
        if parsed.is_none() && !base_url.trim().is_empty() {
            warn!(base_url, "invalid base url, relative links will not be resolved");
        }
        Self {
            policy,
            base_url: parsed,
            options: ReaderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn sanitize(&self, markup: &[u8]) -> FilterResult<String> {
        let markup = decode_markup(markup);
        self.run(EventReader::new(&markup, self.options))
    }

    /// Sanitize an already-produced event stream. The first error aborts the
    /// run and nothing is returned.
    pub fn run<I>(&self, events: I) -> FilterResult<String>
    where
        I: IntoIterator<Item = FilterResult<ParseEvent>>,
    {
        let mut pass = Pass {
            tags: TagFilter::new(self.policy),
            attributes: AttributeFilter::new(self.policy, self.base_url.as_ref()),
            frames: Vec::new(),
            output: String::new(),
        };

        let mut count = 0;
        for (index, event) in events.into_iter().enumerate() {
            match event? {
                ParseEvent::Open { name, attributes } => pass.open(name, attributes),
                ParseEvent::Close { name } => pass.close(&name, index)?,
                ParseEvent::Text(content) => pass.text(&content),
            }
            count = index + 1;
        }

        pass.finish(count)
    }
}

struct Pass<'a> {
    tags: TagFilter<'a>,
    attributes: AttributeFilter<'a>,
    frames: Vec<Frame>,
    output: String,
}

impl Pass<'_> {
    fn open(&mut self, name: String, attributes: AttributeSet) {
        let frame = match self.render_open(&name, attributes) {
            Some(markup) => {
                self.output.push_str(&markup);
                Frame::Rendered(name)
            }
            None => Frame::Suppressed(name),
        };
        self.frames.push(frame);
    }

    /// Permission, attribute filtering, required attributes, overrides, in
    /// that order. `None` means the element is suppressed.
    fn render_open(&self, name: &str, attributes: AttributeSet) -> Option<String> {
        if !self.tags.is_allowed(name, &attributes) {
            debug!(tag = name, "suppressing tag");
            return None;
        }

        let attributes = self.attributes.filter(name, attributes);
        if !self.attributes.has_required_attributes(name, &attributes) {
            debug!(tag = name, "suppressing tag without its required attributes");
            return None;
        }

        let attributes = self.attributes.add_attributes(name, attributes);
        Some(
            self.tags
                .open_html_tag(name, &self.attributes.to_html(&attributes)),
        )
    }

    fn close(&mut self, name: &str, index: usize) -> FilterResult<()> {
        let Some(frame) = self.frames.pop() else {
            return Err(FilterError::unbalanced(index, format!("</{name}> closes nothing")));
        };
        if frame.name() != name {
            return Err(FilterError::unbalanced(
                index,
                format!("expected </{}>, found </{name}>", frame.name()),
            ));
        }
        if let Frame::Rendered(name) = frame {
            let markup = self.tags.close_html_tag(&name);
            self.output.push_str(&markup);
        }
        Ok(())
    }

    fn text(&mut self, content: &str) {
        if matches!(self.frames.last(), Some(Frame::Suppressed(_))) {
            trace!(len = content.len(), "dropping text of suppressed element");
            return;
        }
        let content = content.replace('\u{a0}', " ");
        self.output.push_str(&escape(&content));
    }

    fn finish(self, events: usize) -> FilterResult<String> {
        if let Some(frame) = self.frames.last() {
            return Err(FilterError::unbalanced(
                events,
                format!("<{}> left open", frame.name()),
            ));
        }
        let cleaned = remove_empty_tags(&self.output);
        let html = cleaned.trim().to_string();
        debug!(
            rendered = self.output.len(),
            returned = html.len(),
            "sanitized fragment"
        );
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(name: &str, attributes: &[(&str, &str)]) -> FilterResult<ParseEvent> {
        Ok(ParseEvent::Open {
            name: name.to_string(),
            attributes: attributes.iter().copied().collect(),
        })
    }

    fn close(name: &str) -> FilterResult<ParseEvent> {
        Ok(ParseEvent::Close {
            name: name.to_string(),
        })
    }

    fn text(content: &str) -> FilterResult<ParseEvent> {
        Ok(ParseEvent::Text(content.to_string()))
    }

    fn run(events: Vec<FilterResult<ParseEvent>>) -> FilterResult<String> {
        let policy = Policy::default();
        Sanitizer::new(&policy, "https://example.com/").run(events)
    }

    #[test]
    fn drops_text_inside_suppressed_elements() {
        let html = run(vec![
            open("p", &[]),
            text("Hello "),
            open("script", &[]),
            text("alert(1)"),
            close("script"),
            text("World"),
            close("p"),
        ])
        .unwrap();
        assert_eq!(html, "<p>Hello World</p>");
    }

    #[test]
    fn allowed_descendants_of_suppressed_elements_render() {
        let html = run(vec![
            open("div", &[]),
            text("lost"),
            open("p", &[]),
            text("kept"),
            close("p"),
            text("lost too"),
            close("div"),
        ])
        .unwrap();
        assert_eq!(html, "<p>kept</p>");
    }

    #[test]
    fn missing_required_attribute_suppresses_the_element() {
        let html = run(vec![
            open("p", &[]),
            open("a", &[("href", "javascript:alert(1)"), ("title", "t")]),
            text("click"),
            close("a"),
            text(" after"),
            close("p"),
        ])
        .unwrap();
        assert_eq!(html, "<p> after</p>");
    }

    #[test]
    fn applies_overrides_after_filtering() {
        let html = run(vec![
            open("a", &[("href", "/post"), ("target", "_self"), ("onclick", "x()")]),
            text("read"),
            close("a"),
        ])
        .unwrap();
        assert_eq!(
            html,
            r#"<a href="https://example.com/post" rel="noopener noreferrer" target="_blank">read</a>"#
        );
    }

    #[test]
    fn void_elements_have_no_close_markup() {
        let html = run(vec![
            open("p", &[]),
            open("img", &[("src", "/a.png"), ("alt", "a")]),
            close("img"),
            open("br", &[]),
            close("br"),
            close("p"),
        ])
        .unwrap();
        assert_eq!(html, r#"<p><img src="https://example.com/a.png" alt="a"/><br/></p>"#);
    }

    #[test]
    fn escapes_text_and_replaces_nbsp() {
        let html = run(vec![
            open("p", &[]),
            text("a\u{a0}<b> & \"c\""),
            close("p"),
        ])
        .unwrap();
        assert_eq!(html, "<p>a &lt;b&gt; &amp; &quot;c&quot;</p>");
    }

    #[test]
    fn text_outside_any_element_is_kept() {
        let html = run(vec![text("  plain "), open("b", &[]), text("bold"), close("b"), text("\n")])
            .unwrap();
        assert_eq!(html, "plain <b>bold</b>");
    }

    #[test]
    fn empty_elements_are_cleaned_up() {
        let html = run(vec![
            open("p", &[]),
            open("script", &[]),
            text("x"),
            close("script"),
            close("p"),
            open("p", &[]),
            text("y"),
            close("p"),
        ])
        .unwrap();
        assert_eq!(html, "<p>y</p>");
    }

    #[test]
    fn close_without_open_is_rejected() {
        let err = run(vec![open("p", &[]), close("p"), close("p")]).unwrap_err();
        assert!(matches!(err, FilterError::UnbalancedEvents { event: 2, .. }));
    }

    #[test]
    fn close_must_match_the_open_element() {
        let err = run(vec![open("p", &[]), text("x"), close("b")]).unwrap_err();
        assert!(matches!(err, FilterError::UnbalancedEvents { event: 2, .. }));
        assert!(err.to_string().contains("expected </p>, found </b>"), "{err}");

        let err = run(vec![open("script", &[]), close("p")]).unwrap_err();
        assert!(matches!(err, FilterError::UnbalancedEvents { event: 1, .. }));
    }

    #[test]
    fn unclosed_elements_are_rejected() {
        let err = run(vec![open("p", &[]), text("x")]).unwrap_err();
        assert!(matches!(err, FilterError::UnbalancedEvents { event: 2, .. }));
        assert!(err.to_string().contains("<p> left open"), "{err}");
    }

    #[test]
    fn parser_errors_abort_the_run() {
        let err = run(vec![
            open("p", &[]),
            text("x"),
            Err(FilterError::malformed(7, "boom")),
            close("p"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn sanitizes_raw_markup() {
        let policy = Policy::default();
        let sanitizer = Sanitizer::new(&policy, "https://example.com/");
        let html = sanitizer
            .sanitize(br#"<p class="x">Hi <em>there</em><br/></p>"#)
            .unwrap();
        assert_eq!(html, "<p>Hi <em>there</em><br/></p>");
    }

    #[test]
    fn folding_case_is_opt_in() {
        let policy = Policy::default();
        let markup = b"<P>Hi</P>";
        let strict = Sanitizer::new(&policy, "").sanitize(markup).unwrap();
        assert_eq!(strict, "");
        let folded = Sanitizer::new(&policy, "")
            .with_options(ReaderOptions { fold_case: true })
            .sanitize(markup)
            .unwrap();
        assert_eq!(folded, "<p>Hi</p>");
    }
}
