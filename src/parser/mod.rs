//! Pull-based event source over well-formed markup.
//!
//! [`EventReader`] wraps a `quick-xml` reader and yields [`ParseEvent`]s in
//! document order. It only accepts well-formed input: loosely-formed HTML must
//! be normalized before it gets here. The one HTML allowance is void elements,
//! which may appear without a self-closing slash.

mod entities;

use std::collections::VecDeque;

use quick_xml::{escape::unescape_with, events::BytesStart, events::Event, Reader};
use tracing::trace;

use crate::{
    error::{FilterError, FilterResult},
    filter::tag::is_void_element,
    model::AttributeSet,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    Open {
        name: String,
        attributes: AttributeSet,
    },
    Close {
        name: String,
    },
    /// Character data with entities already decoded.
    Text(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Lowercase tag and attribute names. Off by default: names are matched
    /// against the policy exactly as written.
    pub fold_case: bool,
}

pub struct EventReader<'a> {
    reader: Reader<&'a [u8]>,
    options: ReaderOptions,
    open: Vec<String>,
    pending: VecDeque<ParseEvent>,
    finished: bool,
}

impl<'a> EventReader<'a> {
    pub fn new(markup: &'a str, options: ReaderOptions) -> Self {
        let mut reader = Reader::from_str(markup);
        reader.config_mut().trim_text(false);
        // End names are checked here so void elements can be tolerated;
        // `open` is the only record of nesting.
        reader.config_mut().check_end_names = false;
        reader.config_mut().allow_unmatched_ends = true;
        Self {
            reader,
            options,
            open: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn byte_position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn read_next(&mut self) -> FilterResult<()> {
        let event = self.reader.read_event().map_err(|err| {
            FilterError::malformed(self.reader.error_position() as u64, err.to_string())
        })?;

        match event {
            Event::Start(start) => {
                let (name, attributes) = self.element(&start)?;
                if is_void_element(&name) {
                    self.push_empty(name, attributes);
                } else {
                    self.open.push(name.clone());
                    self.pending.push_back(ParseEvent::Open { name, attributes });
                }
            }
            Event::Empty(start) => {
                let (name, attributes) = self.element(&start)?;
                self.push_empty(name, attributes);
            }
            Event::End(end) => {
                let name = self.decode_name(end.name().as_ref())?;
                match self.open.last().cloned() {
                    Some(top) if top == name => {
                        self.open.pop();
                        self.pending.push_back(ParseEvent::Close { name });
                    }
                    // Already closed when it was opened.
                    _ if is_void_element(&name) => {
                        trace!(tag = %name, "ignoring end tag of void element");
                    }
                    Some(top) => {
                        return Err(FilterError::malformed(
                            self.byte_position(),
                            format!("expected </{top}>, found </{name}>"),
                        ));
                    }
                    None => {
                        return Err(FilterError::malformed(
                            self.byte_position(),
                            format!("unexpected </{name}>"),
                        ));
                    }
                }
            }
            Event::Text(text) => {
                let raw = self.utf8(&text)?;
                let value = unescape_with(raw, entities::resolve)
                    .map_err(|err| FilterError::malformed(self.byte_position(), err.to_string()))?;
                self.push_text(value.into_owned());
            }
            Event::CData(cdata) => {
                let value = self.utf8(&cdata)?.to_string();
                self.push_text(value);
            }
            Event::GeneralRef(reference) => {
                let name = self.utf8(&reference)?;
                let value = if name.starts_with('#') {
                    entities::resolve_char_reference(name).map(String::from)
                } else {
                    entities::resolve(name).map(str::to_string)
                };
                let value = value.ok_or_else(|| {
                    FilterError::malformed(self.byte_position(), format!("unknown entity &{name};"))
                })?;
                self.push_text(value);
            }
            Event::Eof => {
                if let Some(top) = self.open.last() {
                    return Err(FilterError::malformed(
                        self.byte_position(),
                        format!("unclosed <{top}>"),
                    ));
                }
                self.finished = true;
            }
            // Comments, declarations, processing instructions and doctypes
            // carry nothing worth keeping.
            _ => {}
        }

        Ok(())
    }

    fn element(&self, start: &BytesStart<'_>) -> FilterResult<(String, AttributeSet)> {
        let name = self.decode_name(start.name().as_ref())?;
        let mut attributes = AttributeSet::new();
        for attr in start.attributes() {
            let attr =
                attr.map_err(|err| FilterError::malformed(self.byte_position(), err.to_string()))?;
            let key = self.decode_name(attr.key.as_ref())?;
            let raw = self.utf8(&attr.value)?;
            let value = unescape_with(raw, entities::resolve)
                .map_err(|err| FilterError::malformed(self.byte_position(), err.to_string()))?;
            attributes.insert(key, value.into_owned());
        }
        Ok((name, attributes))
    }

    fn decode_name(&self, raw: &[u8]) -> FilterResult<String> {
        let name = self.utf8(raw)?;
        if self.options.fold_case {
            Ok(name.to_lowercase())
        } else {
            Ok(name.to_string())
        }
    }

    fn utf8<'b>(&self, raw: &'b [u8]) -> FilterResult<&'b str> {
        std::str::from_utf8(raw).map_err(|err| FilterError::malformed(self.byte_position(), err.to_string()))
    }

    fn push_empty(&mut self, name: String, attributes: AttributeSet) {
        self.pending.push_back(ParseEvent::Open {
            name: name.clone(),
            attributes,
        });
        self.pending.push_back(ParseEvent::Close { name });
    }

    fn push_text(&mut self, value: String) {
        if !value.is_empty() {
            self.pending.push_back(ParseEvent::Text(value));
        }
    }
}

impl Iterator for EventReader<'_> {
    type Item = FilterResult<ParseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }
            if let Err(err) = self.read_next() {
                self.finished = true;
                self.pending.clear();
                return Some(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(markup: &str) -> FilterResult<Vec<ParseEvent>> {
        EventReader::new(markup, ReaderOptions::default()).collect()
    }

    /// Tags as `<name>` / `</name>` and text runs merged, which hides how the
    /// reader happens to split character data.
    fn outline(events: &[ParseEvent]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for event in events {
            match event {
                ParseEvent::Open { name, .. } => out.push(format!("<{name}>")),
                ParseEvent::Close { name } => out.push(format!("</{name}>")),
                ParseEvent::Text(text) => match out.last_mut() {
                    Some(last) if !last.starts_with('<') => last.push_str(text),
                    _ => out.push(text.clone()),
                },
            }
        }
        out
    }

    #[test]
    fn yields_events_in_document_order() {
        let events = events(r#"<p class="lead">a &amp; <b>b</b></p>"#).unwrap();
        assert_eq!(
            outline(&events),
            ["<p>", "a & ", "<b>", "b", "</b>", "</p>"]
        );
        match &events[0] {
            ParseEvent::Open { attributes, .. } => {
                assert_eq!(attributes.get("class"), Some("lead"));
            }
            other => panic!("unexpected first event {other:?}"),
        }
    }

    #[test]
    fn void_elements_close_immediately() {
        let events = events(r#"<p><img src="a.png"><br/><img src="b.png"></img></p>"#).unwrap();
        assert_eq!(
            outline(&events),
            ["<p>", "<img>", "</img>", "<br>", "</br>", "<img>", "</img>", "</p>"]
        );
    }

    #[test]
    fn stray_void_end_tag_keeps_the_enclosing_element_open() {
        let events = events("<p>a</img>b</p>").unwrap();
        assert_eq!(outline(&events), ["<p>", "ab", "</p>"]);
    }

    #[test]
    fn decodes_entities_in_text_and_attributes() {
        let events = events(r#"<a title="x&quot;y&#33;">1&nbsp;2&#160;3&#x41;&hellip;</a>"#).unwrap();
        assert_eq!(
            outline(&events),
            ["<a>", "1\u{a0}2\u{a0}3A…", "</a>"]
        );
        match &events[0] {
            ParseEvent::Open { attributes, .. } => {
                assert_eq!(attributes.get("title"), Some("x\"y!"));
            }
            other => panic!("unexpected first event {other:?}"),
        }
    }

    #[test]
    fn preserves_case_unless_folding() {
        let preserved = events(r#"<P CLASS="x">t</P>"#).unwrap();
        assert_eq!(outline(&preserved), ["<P>", "t", "</P>"]);

        let folded: Vec<_> = EventReader::new(r#"<P CLASS="x">t</P>"#, ReaderOptions { fold_case: true })
            .collect::<FilterResult<_>>()
            .unwrap();
        assert_eq!(outline(&folded), ["<p>", "t", "</p>"]);
        match &folded[0] {
            ParseEvent::Open { attributes, .. } => assert_eq!(attributes.get("class"), Some("x")),
            other => panic!("unexpected first event {other:?}"),
        }
    }

    #[test]
    fn skips_comments_and_keeps_cdata() {
        let events = events("<p><!-- note -->a<![CDATA[<b>]]></p>").unwrap();
        assert_eq!(outline(&events), ["<p>", "a<b>", "</p>"]);
    }

    #[test]
    fn fragments_may_have_several_roots() {
        let events = events("hello <p>a</p> <p>b</p>").unwrap();
        assert_eq!(
            outline(&events),
            ["hello ", "<p>", "a", "</p>", " ", "<p>", "b", "</p>"]
        );
    }

    #[test]
    fn mismatched_end_tag_is_malformed() {
        let err = events("<p><b>x</p></b>").unwrap_err();
        assert!(matches!(err, FilterError::MalformedInput { .. }));
        assert!(err.to_string().contains("expected </b>"), "{err}");
    }

    #[test]
    fn unclosed_and_stray_tags_are_malformed() {
        assert!(matches!(
            events("<p>x"),
            Err(FilterError::MalformedInput { .. })
        ));
        assert!(matches!(
            events("x</p>"),
            Err(FilterError::MalformedInput { .. })
        ));
    }

    #[test]
    fn unknown_entity_is_malformed() {
        assert!(events("<p>&bogus;</p>").is_err());
    }

    #[test]
    fn iteration_stops_after_an_error() {
        let mut reader = EventReader::new("<p>a</b>", ReaderOptions::default());
        assert!(matches!(reader.next(), Some(Ok(ParseEvent::Open { .. }))));
        assert!(matches!(reader.next(), Some(Ok(ParseEvent::Text(_)))));
        assert!(matches!(reader.next(), Some(Err(_))));
        assert!(reader.next().is_none());
    }
}
