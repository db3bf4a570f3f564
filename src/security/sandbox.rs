//! Containment of user-supplied paths inside a per-user root.
//!
//! A path is accepted only if, after lexical normalization and symlink
//! resolution, it is the root itself or lies below it. Containment is checked
//! with [`Path::starts_with`], which compares whole components, so
//! `/data/u1x` is never inside `/data/u1`.

use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::gatekeeper::GateError;

/// A canonical root that relative paths are resolved against.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    /// Canonicalize `root`, creating it first if it does not exist yet.
    pub fn open(root: &Path) -> Result<Self, GateError> {
        let root = match fs::canonicalize(root) {
            Ok(root) => root,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(root)
                    .map_err(|e| GateError::storage(&format!("create root {}", root.display()), e))?;
                tracing::info!(root = %root.display(), "Created user root");
                fs::canonicalize(root)
                    .map_err(|e| GateError::storage(&format!("canonicalize root {}", root.display()), e))?
            }
            Err(e) => {
                return Err(GateError::storage(&format!("canonicalize root {}", root.display()), e));
            }
        };

        if !root.is_dir() {
            return Err(GateError::StorageFailure(format!(
                "user root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` to an absolute path inside the root.
    ///
    /// The target does not need to exist; its deepest existing ancestor is
    /// canonicalized and the rest appended. Symlinks are followed all the way,
    /// the last component included.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, GateError> {
        let candidate = self.normalize(relative.as_ref())?;
        self.contained(canonicalize_existing_prefix(&candidate)?)
    }

    /// Resolve `relative` to the directory entry it names, without following a
    /// symlink in the last component.
    ///
    /// Used for delete and rename, which act on the link rather than on what it
    /// points to. The parent is resolved like [`PathSandbox::resolve`].
    pub fn resolve_entry(&self, relative: impl AsRef<Path>) -> Result<PathBuf, GateError> {
        let candidate = self.normalize(relative.as_ref())?;
        match (candidate.parent(), candidate.file_name()) {
            (Some(parent), Some(name)) if candidate != self.root => {
                let parent = self.contained(canonicalize_existing_prefix(parent)?)?;
                Ok(parent.join(name))
            }
            _ => Ok(self.root.clone()),
        }
    }

    /// Join `rel` onto the root lexically. `.` is dropped and `..` pops.
    fn normalize(&self, rel: &Path) -> Result<PathBuf, GateError> {
        let mut candidate = self.root.clone();
        for component in rel.components() {
            match component {
                Component::Normal(part) => candidate.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !candidate.pop() {
                        return Err(GateError::PathEscape);
                    }
                }
                // Absolute paths and drive prefixes never resolve under the root.
                Component::RootDir | Component::Prefix(_) => return Err(GateError::PathEscape),
            }
        }
        self.contained(candidate)
    }

    fn contained(&self, path: PathBuf) -> Result<PathBuf, GateError> {
        if path.starts_with(&self.root) {
            Ok(path)
        } else {
            Err(GateError::PathEscape)
        }
    }
}

/// Canonicalize the longest existing ancestor of a normalized absolute path and
/// re-attach the missing tail.
fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf, GateError> {
    let mut existing = path;
    let mut tail: Vec<&OsStr> = Vec::new();

    loop {
        match fs::canonicalize(existing) {
            Ok(mut resolved) => {
                resolved.extend(tail.iter().rev());
                return Ok(resolved);
            }
            Err(e) if e.kind() == ErrorKind::NotFound || e.kind() == ErrorKind::NotADirectory => {
                // A dangling symlink has no canonical destination to check.
                if e.kind() == ErrorKind::NotFound && fs::symlink_metadata(existing).is_ok() {
                    return Err(GateError::PathEscape);
                }
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        tail.push(name);
                        existing = parent;
                    }
                    _ => return Err(GateError::storage(&format!("resolve {}", path.display()), e)),
                }
            }
            Err(e) => {
                return Err(GateError::storage(&format!("canonicalize {}", existing.display()), e));
            }
        }
    }
}
