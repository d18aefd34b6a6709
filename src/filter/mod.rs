//! Per-element decisions: which tags render and which attributes survive.

pub mod attribute;
pub mod tag;

pub use attribute::AttributeFilter;
pub use tag::{is_void_element, remove_empty_tags, TagFilter};
