//! Request document templating: layout binding and markup serialization.
//!
//! Layouts are ordered `serde_json` values. Objects are named slots, arrays hold
//! repeated sibling elements, and the reserved [`ATTRIBUTES_KEY`] entry of an
//! object carries the attributes of the element it describes.
//!
//! # Examples
//! ```rust
//! use nfse_core::document::{bind, serialize};
//! use serde_json::json;
//!
//! let mut layout = json!({"A": {"@attributes": {"Id": null}, "B": null}});
//! let vars = json!({"Id": "x", "B": 1});
//! bind(&mut layout, vars.as_object().unwrap());
//! assert_eq!(serialize(&layout), r#"<A Id="x"><B>1</B></A>"#);
//! ```
mod bind;
mod markup;

pub use bind::{bind, bound};
pub use markup::{ATTRIBUTES_KEY, clean_markup, clean_markup_bytes, serialize, serialize_with};

/// Nested default-value template of a request document.
pub type Layout = serde_json::Value;

/// Caller-supplied values, keyed by slot name.
pub type VariableSet = serde_json::Map<String, serde_json::Value>;
