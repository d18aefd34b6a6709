use tracing::trace;

use crate::{model::AttributeSet, policy::Policy};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements with no closing form.
pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS
        .iter()
        .any(|void| void.eq_ignore_ascii_case(name))
}

pub struct TagFilter<'p> {
    policy: &'p Policy,
}

impl<'p> TagFilter<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self { policy }
    }

    /// Whitelisted and not a tracking pixel.
    pub fn is_allowed(&self, tag: &str, attributes: &AttributeSet) -> bool {
        if !self.is_allowed_tag(tag) {
            return false;
        }
        if self.policy.blocks_pixel_trackers() && is_pixel_tracker(tag, attributes) {
            trace!(tag, "dropping tracking pixel");
            return false;
        }
        true
    }

    pub fn is_allowed_tag(&self, tag: &str) -> bool {
        self.policy.is_allowed_tag(tag)
    }

    pub fn open_html_tag(&self, tag: &str, attributes: &str) -> String {
        let mut html = String::with_capacity(tag.len() + attributes.len() + 4);
        html.push('<');
        html.push_str(tag);
        if !attributes.is_empty() {
            html.push(' ');
            html.push_str(attributes);
        }
        if is_void_element(tag) {
            html.push('/');
        }
        html.push('>');
        html
    }

    pub fn close_html_tag(&self, tag: &str) -> String {
        if is_void_element(tag) {
            String::new()
        } else {
            format!("</{tag}>")
        }
    }
}

fn is_pixel_tracker(tag: &str, attributes: &AttributeSet) -> bool {
    let is_one = |name: &str| attributes.get(name).is_some_and(|value| value.trim() == "1");
    tag == "img" && is_one("width") && is_one("height")
}

enum Token<'a> {
    Text(&'a str),
    Open { name: &'a str, bare: bool },
    Close { name: &'a str },
    /// Comments, self-closing tags and anything else that counts as content.
    Other,
}

struct PendingElement {
    name: String,
    start: usize,
    bare: bool,
    has_content: bool,
}

/// Remove tag pairs that wrap nothing but whitespace or other removed pairs.
///
/// Only attribute-less, non-void elements are candidates: an `<iframe src>` or
/// `<img>` is meaningful on its own. Nested chains collapse in a single pass,
/// so running this twice gives the same result as running it once.
pub fn remove_empty_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut stack: Vec<PendingElement> = Vec::new();
    let mut rest = html;

    while !rest.is_empty() {
        let (markup, tail) = split_token(rest);
        rest = tail;

        match classify(markup) {
            Token::Text(text) => {
                out.push_str(text);
                if !text.chars().all(char::is_whitespace) {
                    mark_content(&mut stack);
                }
            }
            Token::Open { name, bare } if !is_void_element(name) => {
                stack.push(PendingElement {
                    name: name.to_string(),
                    start: out.len(),
                    bare,
                    has_content: false,
                });
                out.push_str(markup);
            }
            Token::Close { name } if stack.last().is_some_and(|top| top.name == name) => {
                let Some(element) = stack.pop() else {
                    continue;
                };
                if element.bare && !element.has_content {
                    out.truncate(element.start);
                } else {
                    out.push_str(markup);
                    mark_content(&mut stack);
                }
            }
            Token::Open { .. } | Token::Close { .. } | Token::Other => {
                out.push_str(markup);
                mark_content(&mut stack);
            }
        }
    }

    out
}

fn mark_content(stack: &mut [PendingElement]) {
    if let Some(top) = stack.last_mut() {
        top.has_content = true;
    }
}

/// Split off the next markup (`<...>`) or text run.
fn split_token(input: &str) -> (&str, &str) {
    if input.starts_with('<') {
        return match input.find('>') {
            Some(end) => input.split_at(end + 1),
            None => (input, ""),
        };
    }
    let end = input.find('<').unwrap_or(input.len());
    input.split_at(end)
}

fn classify(token: &str) -> Token<'_> {
    let Some(inner) = token
        .strip_prefix('<')
        .and_then(|token| token.strip_suffix('>'))
    else {
        return Token::Text(token);
    };

    if let Some(closing) = inner.strip_prefix('/') {
        let name = closing.trim_end();
        return if is_tag_name(name) {
            Token::Close { name }
        } else {
            Token::Other
        };
    }

    if inner.ends_with('/') {
        return Token::Other;
    }

    let (name, attributes) = inner
        .split_once(char::is_whitespace)
        .unwrap_or((inner, ""));
    if is_tag_name(name) {
        Token::Open {
            name,
            bare: attributes.trim().is_empty(),
        }
    } else {
        Token::Other
    }
}

fn is_tag_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ':' | '.'))
}
