//! Whitelist-based HTML sanitizer for feed content.
//!
//! Markup is parsed into a stream of events, each element is checked against
//! a [`Policy`], and only permitted tags and attributes are written back out.

pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod parser;
pub mod policy;
pub mod sanitizer;
pub mod util;

pub use error::{FilterError, FilterResult};
pub use model::AttributeSet;
pub use parser::{EventReader, ParseEvent, ReaderOptions};
pub use policy::Policy;
pub use sanitizer::Sanitizer;

/// Sanitize `markup` in one call. Relative links are resolved against
/// `base_url`.
pub fn sanitize(markup: &[u8], policy: &Policy, base_url: &str) -> FilterResult<String> {
    Sanitizer::new(policy, base_url).sanitize(markup)
}
