//! Resource locators: the roots declaration resources are searched in.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a locator's resources come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOrigin {
    /// Compiled into the binary.
    Bundled,
    /// Provided by the deployment, e.g. on disk.
    Application,
}

/// A declaration resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Identifies the resource; used to parse each resource once.
    pub location: String,
    pub content: String,
}

/// A root to search declaration resources in.
pub trait ResourceLocator: Send + Sync + fmt::Debug {
    fn origin(&self) -> ResourceOrigin;

    /// Resources found at `path`, relative to this root.
    fn find(&self, path: &str) -> io::Result<Vec<Resource>>;
}

/// Resources read from a filesystem directory.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    root: PathBuf,
}

impl DirectoryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceLocator for DirectoryLocator {
    fn origin(&self) -> ResourceOrigin {
        ResourceOrigin::Application
    }

    fn find(&self, path: &str) -> io::Result<Vec<Resource>> {
        let file = self.root.join(path);
        if !file.is_file() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&file)?;
        Ok(vec![Resource {
            location: file.display().to_string(),
            content,
        }])
    }
}

/// In-memory resources, typically built from `include_str!`.
#[derive(Debug, Clone, Default)]
pub struct BundledLocator {
    name: String,
    resources: HashMap<String, String>,
}

impl BundledLocator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: HashMap::new(),
        }
    }

    pub fn with_resource(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add a resource; content for an existing path is appended.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let content = content.into();
        self.resources
            .entry(path.into())
            .and_modify(|existing| {
                existing.push('\n');
                existing.push_str(&content);
            })
            .or_insert(content);
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceLocator for BundledLocator {
    fn origin(&self) -> ResourceOrigin {
        ResourceOrigin::Bundled
    }

    fn find(&self, path: &str) -> io::Result<Vec<Resource>> {
        Ok(self
            .resources
            .get(path)
            .map(|content| Resource {
                location: format!("bundled:{}/{}", self.name, path),
                content: content.clone(),
            })
            .into_iter()
            .collect())
    }
}

/// Locators in search order: bundled ones first when preferred, otherwise
/// as supplied.
pub fn search_order(
    locators: &[Arc<dyn ResourceLocator>],
    prefer_bundled: bool,
) -> Vec<&Arc<dyn ResourceLocator>> {
    let mut ordered: Vec<_> = locators.iter().collect();
    if prefer_bundled {
        ordered.sort_by_key(|l| l.origin() != ResourceOrigin::Bundled);
    }
    ordered
}
