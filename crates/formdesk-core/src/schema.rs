//! Field structure parsing and title resolution.
//!
//! Every inbound entry carries a `FieldStructure` parameter: a JSON document
//! describing the form's field groups, their titles, and their sub-fields.
//! This module turns that payload into a typed [`FieldStructure`] tree and
//! resolves human-readable titles for raw field identifiers.
//!
//! # Accepted Shapes
//!
//! ```text
//! {"Fields": [ {group}, ... ]}     collection under "Fields" (or "Field")
//! [ {group}, ... ]                 bare collection
//! {group}                          single group
//! ```
//!
//! A group is an object with optional `ID`, `Title`, `Label`, and a child
//! collection under `SubFields` (or `SubField`). Any collection may be given
//! as a single object instead of an array, in which case it is treated as one
//! unwrapped node. All other keys are ignored.

use serde_json::{Map, Value};

const FIELD_COLLECTION_KEYS: [&str; 2] = ["Fields", "Field"];
const SUB_FIELD_COLLECTION_KEYS: [&str; 2] = ["SubFields", "SubField"];

/// Errors raised while reading a field structure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructureError {
    /// The request did not carry a field structure at all.
    #[error("Field structure parameter '{parameter}' is missing from request")]
    Missing { parameter: String },

    /// The payload is not valid JSON.
    #[error("Error in parsing field structure JSON: {message}")]
    InvalidJson { message: String },

    /// The payload is JSON but cannot be read as a field tree.
    #[error("Error in converting field structure at '{path}': {message}")]
    InvalidShape { path: String, message: String },
}

/// One node of the field tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldNode {
    pub id: Option<String>,
    pub title: Option<String>,
    pub label: Option<String>,
    pub children: Vec<FieldNode>,
}

impl FieldNode {
    /// Create a leaf node with an identifier and nothing else.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    fn from_object(map: &Map<String, Value>, path: &str) -> Result<Self, StructureError> {
        let id = read_text(map, "ID", path)?;
        let title = read_text(map, "Title", path)?;
        let label = read_text(map, "Label", path)?;

        let mut children = Vec::new();
        for key in SUB_FIELD_COLLECTION_KEYS {
            if let Some(value) = map.get(key) {
                children.extend(parse_collection(value, &format!("{path}.{key}"))?);
            }
        }

        Ok(Self {
            id,
            title,
            label,
            children,
        })
    }

    /// Resolve the title for `field_id` within this subtree.
    ///
    /// A node whose id matches yields its label when it has one, or its title
    /// when it has no sub-fields. Matching nodes that satisfy neither rule are
    /// passed over and the search continues with their children.
    fn title_for(&self, field_id: &str) -> Option<&str> {
        if self.id.as_deref() == Some(field_id) {
            match (&self.label, &self.title) {
                (Some(label), _) => return Some(label),
                (None, Some(title)) if self.children.is_empty() => return Some(title),
                _ => {}
            }
        }
        self.children
            .iter()
            .find_map(|child| child.title_for(field_id))
    }
}

/// Parsed field structure of one submission.
///
/// Built fresh for every request and discarded once the entry is assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldStructure {
    fields: Vec<FieldNode>,
}

impl FieldStructure {
    /// Build a structure from already-typed nodes.
    pub fn new(fields: Vec<FieldNode>) -> Self {
        Self { fields }
    }

    /// Parse the raw JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::InvalidJson`] for malformed JSON and
    /// [`StructureError::InvalidShape`] when the JSON cannot be read as a
    /// field tree (for example a `Title` that is an object).
    pub fn parse(raw: &str) -> Result<Self, StructureError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| StructureError::InvalidJson {
                message: e.to_string(),
            })?;
        Self::from_value(&value)
    }

    /// Convert a JSON value into a field structure.
    pub fn from_value(value: &Value) -> Result<Self, StructureError> {
        let fields = match value {
            Value::Object(map) => {
                let collections: Vec<(&str, &Value)> = FIELD_COLLECTION_KEYS
                    .iter()
                    .filter_map(|key| map.get(*key).map(|v| (*key, v)))
                    .collect();

                if collections.is_empty() {
                    vec![FieldNode::from_object(map, "$")?]
                } else {
                    let mut fields = Vec::new();
                    for (key, collection) in collections {
                        fields.extend(parse_collection(collection, key)?);
                    }
                    fields
                }
            }
            Value::Array(_) => parse_collection(value, "$")?,
            other => {
                return Err(StructureError::InvalidShape {
                    path: "$".to_string(),
                    message: format!("expected an object or array, found {}", kind_of(other)),
                })
            }
        };

        Ok(Self { fields })
    }

    /// Look up the human-readable title of a field.
    ///
    /// Returns `None` when no node resolves a title; an untitled field is a
    /// normal outcome, not an error.
    pub fn title_of(&self, field_id: &str) -> Option<&str> {
        self.fields.iter().find_map(|node| node.title_for(field_id))
    }

    /// Top-level field groups
    pub fn fields(&self) -> &[FieldNode] {
        &self.fields
    }
}

// ============================================================================
// Private helpers
// ============================================================================

fn parse_collection(value: &Value, path: &str) -> Result<Vec<FieldNode>, StructureError> {
    match value {
        Value::Null => Ok(Vec::new()),
        // A lone group in place of a collection.
        Value::Object(map) => Ok(vec![FieldNode::from_object(map, path)?]),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let item_path = format!("{path}[{index}]");
                match item {
                    Value::Object(map) => FieldNode::from_object(map, &item_path),
                    other => Err(StructureError::InvalidShape {
                        path: item_path,
                        message: format!("expected a field object, found {}", kind_of(other)),
                    }),
                }
            })
            .collect(),
        other => Err(StructureError::InvalidShape {
            path: path.to_string(),
            message: format!("expected a field collection, found {}", kind_of(other)),
        }),
    }
}

/// Read a scalar text property. Empty strings count as absent.
fn read_text(
    map: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<String>, StructureError> {
    let text = match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => {
            return Err(StructureError::InvalidShape {
                path: format!("{path}.{key}"),
                message: format!("expected text, found {}", kind_of(other)),
            })
        }
    };
    Ok(text.filter(|s| !s.is_empty()))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
