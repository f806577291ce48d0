//! Canonical entry assembly.
//!
//! The [`EntryAssembler`] extracts submitted field values from the request
//! parameters, resolves each field's title against the submission's
//! [`FieldStructure`], and produces an immutable [`Entry`].

use crate::params::Parameters;
use crate::request::{RenderError, XmlElement};
use crate::schema::{FieldStructure, StructureError};
use crate::{EntryId, FormHash};
use tracing::debug;

/// Parameter carrying the JSON field structure.
pub const FIELD_STRUCTURE_PARAMETER: &str = "FieldStructure";

/// Parameter carrying the provider-assigned entry identifier.
pub const ENTRY_ID_PARAMETER: &str = "EntryId";

/// Parameters whose name contains this marker are submitted field values.
const FIELD_MARKER: &str = "Field";

// ============================================================================
// Entry
// ============================================================================

/// One submitted field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryField {
    id: String,
    value: String,
    title: Option<String>,
}

impl EntryField {
    /// Create a field from its identifier, submitted value and optional title
    pub fn new(id: impl Into<String>, value: impl Into<String>, title: Option<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            title,
        }
    }

    /// Parameter name the field was submitted under
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Submitted value, unmodified
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Human-readable title, when the field structure resolved one
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
}

/// Canonical representation of one form submission.
///
/// Fields appear in the order their parameters arrived. The entry cannot be
/// modified once assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    hash: FormHash,
    entry_id: EntryId,
    fields: Vec<EntryField>,
}

impl Entry {
    /// Build an entry from already-ordered fields
    pub fn new(hash: FormHash, entry_id: EntryId, fields: Vec<EntryField>) -> Self {
        Self {
            hash,
            entry_id,
            fields,
        }
    }

    /// Form the entry was submitted to
    pub fn hash(&self) -> &FormHash {
        &self.hash
    }

    /// Provider-assigned entry number
    pub fn entry_id(&self) -> &EntryId {
        &self.entry_id
    }

    /// Fields in arrival order
    pub fn fields(&self) -> &[EntryField] {
        &self.fields
    }

    /// Look up a field by identifier
    pub fn field(&self, id: &str) -> Option<&EntryField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Render the entry as its intermediate XML document.
    ///
    /// ```text
    /// <entry hash=".." entryId="..">
    ///   <field id=".." title="..">value</field>
    /// </entry>
    /// ```
    pub fn to_xml(&self) -> Result<String, RenderError> {
        let root = XmlElement::new("entry")
            .with_attribute("hash", self.hash.as_str())
            .with_attribute("entryId", self.entry_id.as_str());

        let root = self.fields.iter().fold(root, |root, field| {
            let mut element = XmlElement::new("field").with_attribute("id", field.id.as_str());
            if let Some(title) = &field.title {
                element = element.with_attribute("title", title.as_str());
            }
            root.with_child(element.with_text(field.value.as_str()))
        });

        root.to_pretty_xml()
    }
}

// ============================================================================
// Assembler
// ============================================================================

/// Builds an [`Entry`] from the parameters of one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryAssembler;

impl EntryAssembler {
    /// Create an assembler
    pub fn new() -> Self {
        Self
    }

    /// Assemble the canonical entry.
    ///
    /// Field parameters are those whose name contains `Field`, except the
    /// reserved `FieldStructure` parameter. Fields the structure cannot title
    /// are kept without a title.
    ///
    /// # Errors
    ///
    /// Returns [`StructureError::Missing`] when the request has no field
    /// structure, and propagates parse failures of the structure itself.
    pub fn assemble(
        &self,
        hash: FormHash,
        entry_id: EntryId,
        params: &Parameters,
    ) -> Result<Entry, StructureError> {
        let raw_structure =
            params
                .get(FIELD_STRUCTURE_PARAMETER)
                .ok_or_else(|| StructureError::Missing {
                    parameter: FIELD_STRUCTURE_PARAMETER.to_string(),
                })?;
        let structure = FieldStructure::parse(raw_structure)?;

        let fields = params
            .iter()
            .filter(|(name, _)| is_field_parameter(name))
            .map(|(name, value)| {
                let title = structure.title_of(name).map(str::to_string);
                if title.is_none() {
                    debug!(field_id = %name, "Field has no resolvable title");
                }
                EntryField::new(name, value, title)
            })
            .collect();

        Ok(Entry::new(hash, entry_id, fields))
    }
}

fn is_field_parameter(name: &str) -> bool {
    name.contains(FIELD_MARKER) && name != FIELD_STRUCTURE_PARAMETER
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
