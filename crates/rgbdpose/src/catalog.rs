//! Object class catalog: class id ↔ object name.
//!
//! Class ids follow the segmentation output: id 0 is background and object
//! `k` (1-based) is line `k` of a `classes.txt` file.

use std::path::Path;

use crate::{PipelineError, Result};

const BACKGROUND: &str = "background";

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectCatalog {
    /// Index 0 is background.
    names: Vec<String>,
}

impl ObjectCatalog {
    /// Build from object names in class-id order (background excluded).
    pub fn new<I, S>(objects: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = vec![BACKGROUND.to_string()];
        names.extend(objects.into_iter().map(Into::into));
        if names.len() < 2 {
            return Err(PipelineError::Config(
                "object catalog must list at least one object".to_string(),
            ));
        }
        if names[1..].iter().any(|n| n.trim().is_empty()) {
            return Err(PipelineError::Config("object names must not be empty".to_string()));
        }
        Ok(Self { names })
    }

    /// Load a `classes.txt` file: one object name per line, blank lines ignored.
    pub fn from_classes_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::new(
            data.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        )
    }

    /// Number of classes including background.
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    /// Number of objects (background excluded).
    pub fn num_objects(&self) -> usize {
        self.names.len() - 1
    }

    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    /// First object whose name contains `query` (e.g. `"mug"` → `"025_mug"`).
    pub fn find(&self, query: &str) -> Option<usize> {
        self.names
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, name)| name.contains(query))
            .map(|(id, _)| id)
    }

    /// Object classes `(id, name)`, background excluded.
    pub fn objects(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .skip(1)
            .map(|(id, n)| (id, n.as_str()))
    }
}
