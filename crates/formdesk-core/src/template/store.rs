//! Template store implementations.

use super::{TemplateError, TemplateStore};
use crate::FormHash;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// File extension of templates in a template directory.
pub const TEMPLATE_EXTENSION: &str = "yaml";

/// Filesystem-backed template store.
///
/// The template for form `abc` lives at `<directory>/abc.yaml`. Hashes that
/// could escape the directory or are not plain file names are rejected.
///
/// # Examples
///
/// ```no_run
/// use formdesk_core::template::{FilesystemTemplateStore, TemplateStore};
/// use formdesk_core::FormHash;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = FilesystemTemplateStore::new("./templates");
/// let source = store.fetch(&FormHash::new("z7x4a9")?).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemTemplateStore {
    directory: PathBuf,
}

impl FilesystemTemplateStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Resolve the file that holds the template for `hash`.
    pub fn template_path(&self, hash: &FormHash) -> Result<PathBuf, TemplateError> {
        let name = hash.as_str();
        let invalid = |message: &str| TemplateError::InvalidLocation {
            hash: name.to_string(),
            message: message.to_string(),
        };

        if name.starts_with('.') {
            return Err(invalid("hash must not start with '.'"));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(TemplateError::InvalidLocation {
                hash: name.to_string(),
                message: format!("hash contains unsupported character {c:?}"),
            });
        }

        Ok(self
            .directory
            .join(format!("{name}.{TEMPLATE_EXTENSION}")))
    }
}

#[async_trait]
impl TemplateStore for FilesystemTemplateStore {
    async fn fetch(&self, hash: &FormHash) -> Result<String, TemplateError> {
        let path = self.template_path(hash)?;

        match fs::read_to_string(&path).await {
            Ok(source) => {
                debug!(path = %path.display(), "Template read");
                Ok(source)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(TemplateError::NotFound {
                hash: hash.to_string(),
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Template could not be read");
                Err(TemplateError::Unreadable {
                    hash: hash.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// In-memory template store, for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplateStore {
    templates: HashMap<String, String>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any previous one for the hash.
    pub fn insert(&mut self, hash: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(hash.into(), source.into());
    }

    pub fn with_template(mut self, hash: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(hash, source);
        self
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn fetch(&self, hash: &FormHash) -> Result<String, TemplateError> {
        self.templates
            .get(hash.as_str())
            .cloned()
            .ok_or_else(|| TemplateError::NotFound {
                hash: hash.to_string(),
            })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
