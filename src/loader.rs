//! Template loaders.
//!
//! The core only needs a way to resolve a template name to source
//! text; everything else about storage is a loader concern.
use std::collections::HashMap;

use crate::{Error, Result};

/// Trait for types that resolve template names to source text.
pub trait Loader {
    /// Load the source for a template name.
    fn load(&self, name: &str) -> Result<String>;

    /// Enumerate the template names this loader can resolve.
    fn list(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Loader backed by an in-memory map of name to source.
#[derive(Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a template source under the given name.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) {
        self.templates.insert(name.into(), source.into());
    }
}

impl From<HashMap<String, String>> for MemoryLoader {
    fn from(templates: HashMap<String, String>) -> Self {
        Self { templates }
    }
}

impl Loader for MemoryLoader {
    fn load(&self, name: &str) -> Result<String> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TemplateNotFound(name.to_string()))
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.templates.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Loader that reads templates from a directory.
#[cfg(feature = "fs")]
pub struct FileLoader {
    root: std::path::PathBuf,
}

#[cfg(feature = "fs")]
impl FileLoader {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[cfg(feature = "fs")]
impl Loader for FileLoader {
    fn load(&self, name: &str) -> Result<String> {
        let path = self.root.join(name);
        match std::fs::read_to_string(&path) {
            Ok(source) => Ok(source),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::TemplateNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                if entry.path().is_file() {
                    if let Some(name) = entry.file_name().to_str() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        names
    }
}
