//! Placeholder text used in template paths, attributes, and values.
//!
//! Text may embed `{{ expr }}` references that resolve against the entry
//! being transformed. A trailing `?` marks the reference optional: a missing
//! field then renders as empty text instead of failing the transform.
//!
//! | Expression          | Resolves to                                    |
//! |---------------------|------------------------------------------------|
//! | `entry.hash`        | form hash                                      |
//! | `entry.id`          | entry id                                       |
//! | `<FieldId>`         | value of the field                             |
//! | `<FieldId>.title`   | title of the field, or its id when untitled    |
//! | `field.id`          | id of the current field (`for_each` only)      |
//! | `field.value`       | value of the current field (`for_each` only)   |
//! | `field.title`       | title of the current field (`for_each` only)   |

use super::TransformError;
use crate::entry::{Entry, EntryField};
use crate::request::check_text;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A resolvable reference inside `{{ }}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reference {
    EntryHash,
    EntryId,
    FieldValue(String),
    FieldTitle(String),
    CurrentId,
    CurrentValue,
    CurrentTitle,
}

impl Reference {
    fn parse(expression: &str, in_for_each: bool) -> Result<Self, String> {
        if expression.is_empty() {
            return Err("empty placeholder".to_string());
        }
        if expression.chars().any(char::is_whitespace) {
            return Err(format!("placeholder '{expression}' contains whitespace"));
        }

        let reference = match expression.split_once('.') {
            Some(("entry", "hash")) => Self::EntryHash,
            Some(("entry", "id")) => Self::EntryId,
            Some(("entry", other)) => {
                return Err(format!("unknown entry property '{other}'"));
            }
            Some(("field", property)) => {
                if !in_for_each {
                    return Err(format!(
                        "'field.{property}' is only available inside for_each"
                    ));
                }
                match property {
                    "id" => Self::CurrentId,
                    "value" => Self::CurrentValue,
                    "title" => Self::CurrentTitle,
                    other => return Err(format!("unknown field property '{other}'")),
                }
            }
            Some((id, "title")) if !id.is_empty() => Self::FieldTitle(id.to_string()),
            Some((_, other)) => {
                return Err(format!(
                    "unsupported expression '{expression}' (unknown property '{other}')"
                ));
            }
            None => Self::FieldValue(expression.to_string()),
        };
        Ok(reference)
    }

    /// Resolve the reference. `None` means the referenced field is absent.
    fn resolve<'a>(&'a self, ctx: &RenderContext<'a>) -> Option<&'a str> {
        match self {
            Self::EntryHash => Some(ctx.entry.hash().as_str()),
            Self::EntryId => Some(ctx.entry.entry_id().as_str()),
            Self::FieldValue(id) => ctx.entry.field(id).map(EntryField::value),
            Self::FieldTitle(id) => ctx.entry.field(id).map(title_or_id),
            Self::CurrentId => ctx.current.map(EntryField::id),
            Self::CurrentValue => ctx.current.map(EntryField::value),
            Self::CurrentTitle => ctx.current.map(title_or_id),
        }
    }

    fn field_name(&self) -> String {
        match self {
            Self::FieldValue(id) | Self::FieldTitle(id) => id.clone(),
            Self::EntryHash => "entry.hash".to_string(),
            Self::EntryId => "entry.id".to_string(),
            Self::CurrentId => "field.id".to_string(),
            Self::CurrentValue => "field.value".to_string(),
            Self::CurrentTitle => "field.title".to_string(),
        }
    }
}

fn title_or_id(field: &EntryField) -> &str {
    field.title().unwrap_or_else(|| field.id())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder { reference: Reference, optional: bool },
}

/// What a placeholder is resolved against.
pub(crate) struct RenderContext<'a> {
    pub entry: &'a Entry,
    /// Field selected by `for_each`, if any
    pub current: Option<&'a EntryField>,
    /// Name of the request being rendered, for error reporting
    pub request: &'a str,
}

/// Parsed text with embedded placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextTemplate {
    segments: Vec<Segment>,
}

impl TextTemplate {
    /// Parse template text.
    ///
    /// `field.*` references are accepted only when `in_for_each` is set.
    pub fn parse(source: &str, in_for_each: bool) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + OPEN.len()..];
            let end = after_open
                .find(CLOSE)
                .ok_or_else(|| format!("unterminated placeholder in '{source}'"))?;

            let inner = after_open[..end].trim();
            let (expression, optional) = match inner.strip_suffix('?') {
                Some(stripped) => (stripped.trim_end(), true),
                None => (inner, false),
            };
            segments.push(Segment::Placeholder {
                reference: Reference::parse(expression, in_for_each)?,
                optional,
            });

            rest = &after_open[end + CLOSE.len()..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Render with every placeholder replaced by `stand_in`.
    pub fn sample(&self, stand_in: &str) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Placeholder { .. } => stand_in,
            })
            .collect()
    }

    /// Resolve all placeholders against the context.
    ///
    /// With `percent_encode` set, substituted values (not literals) are
    /// percent-encoded for use in a URL path.
    pub fn render(
        &self,
        ctx: &RenderContext<'_>,
        percent_encode: bool,
    ) -> Result<String, TransformError> {
        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Placeholder {
                    reference,
                    optional,
                } => {
                    let value = match reference.resolve(ctx) {
                        Some(value) => value,
                        None if *optional => "",
                        None => {
                            return Err(TransformError::MissingField {
                                request: ctx.request.to_string(),
                                field: reference.field_name(),
                            })
                        }
                    };

                    check_text(value).map_err(|c| TransformError::InvalidOutput {
                        request: ctx.request.to_string(),
                        message: format!(
                            "value of '{}' contains character U+{:04X} which XML cannot represent",
                            reference.field_name(),
                            c as u32
                        ),
                    })?;

                    if percent_encode {
                        output.push_str(&urlencoding::encode(value));
                    } else {
                        output.push_str(value);
                    }
                }
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
#[path = "placeholder_tests.rs"]
mod tests;
