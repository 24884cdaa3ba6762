//! The profile document and its typed view.
//!
//! The store keeps whatever JSON object the caller wrote. [`Profile`] is the
//! read-only projection of the five known fields that the instruction
//! composer consumes; unknown keys are carried in the document but never
//! surface here.

use serde_json::{Map, Value};

use crate::error::StoreError;

/// A stored profile: an arbitrary JSON object, persisted verbatim.
pub type ProfileDocument = Map<String, Value>;

/// Known personalization fields, in the order the composer emits them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    /// The child's name.
    pub name: Option<String>,
    /// Age, written by the UI as either a string or a number.
    pub age: Option<String>,
    pub gender: Option<String>,
    /// Free-text likes and dislikes.
    pub likes: Option<String>,
    /// Free-text description of what the child is currently learning.
    pub learning: Option<String>,
}

impl Profile {
    /// Projects a stored document onto the known fields.
    ///
    /// A field is present only when its value is "truthy": a non-empty
    /// string, a non-zero number, `true`, or a non-empty array or object.
    pub fn from_document(document: &ProfileDocument) -> Self {
        Self {
            name: field_text(document.get("name")),
            age: field_text(document.get("age")),
            gender: field_text(document.get("gender")),
            likes: field_text(document.get("likes")),
            learning: field_text(document.get("learning")),
        }
    }

    /// Returns `true` when none of the known fields are present.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.likes.is_none()
            && self.learning.is_none()
    }
}

fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(false) => None,
        Value::Bool(true) => Some("true".to_string()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(fields) if fields.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// Decodes a request payload into a profile document.
///
/// # Errors
///
/// Returns `StoreError::Json` for malformed JSON (including an empty body)
/// and `StoreError::NotAnObject` for valid JSON that is not an object.
pub fn decode_document(bytes: &[u8]) -> Result<ProfileDocument, StoreError> {
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(document) => Ok(document),
        _ => Err(StoreError::NotAnObject),
    }
}

/// Produces the canonical on-disk and on-wire encoding of a document:
/// pretty-printed with two-space indentation, non-ASCII kept as-is.
///
/// # Errors
///
/// Returns `StoreError::Json` if serialization fails.
pub fn encode_document(document: &ProfileDocument) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(document)?)
}
