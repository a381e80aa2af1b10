//! Normalized request file sets.
//!
//! Requests carry files either as a `{ path: content }` map or as a list of
//! `{ path, content }` entries. Both shapes are folded into one [`FileSet`]
//! at the boundary and validated there, before a workspace exists.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};

/// File suffixes Terraform loads as configuration.
pub const CONFIG_SUFFIXES: &[&str] = &[".tf", ".tf.json"];

/// One file of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
        }
    }
}

/// Wire representation of the `files` field.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FilesPayload {
    List(Vec<FileEntry>),
    Map(BTreeMap<String, Option<String>>),
}

impl Default for FilesPayload {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl FilesPayload {
    fn into_entries(self) -> Vec<(String, String)> {
        match self {
            Self::List(entries) => entries
                .into_iter()
                .map(|e| (e.path, e.content.unwrap_or_default()))
                .collect(),
            Self::Map(map) => map
                .into_iter()
                .map(|(path, content)| (path, content.unwrap_or_default()))
                .collect(),
        }
    }
}

/// A validated, ordered set of relative paths and their contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    entries: Vec<(String, String)>,
}

impl FileSet {
    /// Build a file set from `(path, content)` pairs, validating every path.
    pub fn new<I, P, C>(entries: I) -> OrchestratorResult<Self>
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(p, c)| (p.into(), c.into()))
            .collect();

        if entries.is_empty() {
            return Err(OrchestratorError::EmptyFileSet);
        }

        let mut seen = HashSet::new();
        for (path, _) in &entries {
            validate_path(path)?;
            if !seen.insert(normalize(path)) {
                return Err(OrchestratorError::DuplicatePath(path.clone()));
            }
        }

        for (path, _) in &entries {
            let mut parent = normalize(path);
            while let Some(idx) = parent.rfind('/') {
                parent.truncate(idx);
                if seen.contains(&parent) {
                    return Err(OrchestratorError::InvalidPath {
                        path: path.clone(),
                        reason: "file and directory share a path",
                    });
                }
            }
        }

        if !entries.iter().any(|(path, _)| is_config_file(path)) {
            return Err(OrchestratorError::NoConfigurationFiles);
        }

        Ok(Self { entries })
    }

    /// Build a file set from either request shape.
    pub fn from_payload(payload: FilesPayload) -> OrchestratorResult<Self> {
        Self::new(payload.into_entries())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total content size in bytes.
    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|(_, c)| c.len()).sum()
    }
}

/// Whether Terraform would load `path` as configuration.
pub fn is_config_file(path: &str) -> bool {
    CONFIG_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

fn normalize(path: &str) -> String {
    Path::new(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn validate_path(path: &str) -> OrchestratorResult<()> {
    let invalid = |reason| OrchestratorError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if path.trim().is_empty() {
        return Err(invalid("empty path"));
    }
    if path.contains('\0') {
        return Err(invalid("NUL byte"));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(invalid("absolute path"));
    }

    let mut normal_parts = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => normal_parts += 1,
            Component::CurDir => {}
            Component::ParentDir => return Err(invalid("parent directory segment")),
            Component::RootDir | Component::Prefix(_) => return Err(invalid("absolute path")),
        }
    }
    // `a/..\b` style tricks on hosts that do not treat `\` as a separator
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(invalid("parent directory segment"));
    }
    if normal_parts == 0 {
        return Err(invalid("no file name"));
    }
    if path.ends_with('/') || path.ends_with('\\') {
        return Err(invalid("no file name"));
    }
    Ok(())
}
