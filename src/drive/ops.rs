//! File operations on sandboxed paths.
//!
//! [`Operation`] is what a caller asked for, with raw relative paths.
//! [`AuthorizedOp`] is what the pipeline produces once every path has passed
//! the sandbox; it can only be built inside this crate, so an implementation of
//! [`FileOperations`] never sees an unchecked path.

use std::fs;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use serde::{Deserialize, Serialize};

use crate::drive::content;
use crate::gatekeeper::GateError;

/// A requested operation, paths still relative and unchecked.
#[derive(Debug, Clone)]
pub enum Operation {
    CreateFolder { save_path: String, folder_name: String },
    Delete { path: String },
    Rename { old_path: String, new_path: String },
    Read { path: String },
    Write { save_path: String, file_name: String, data: Bytes },
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub save_path: String,
    #[serde(default)]
    pub folder_name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub old_path: String,
    #[serde(default)]
    pub new_path: String,
}

impl TryFrom<CreateFolderRequest> for Operation {
    type Error = GateError;

    fn try_from(req: CreateFolderRequest) -> Result<Self, Self::Error> {
        if req.folder_name.trim().is_empty() {
            return Err(GateError::BadRequest("Missing save_path or folder_name".into()));
        }
        Ok(Operation::CreateFolder {
            save_path: req.save_path,
            folder_name: req.folder_name,
        })
    }
}

impl TryFrom<DeleteRequest> for Operation {
    type Error = GateError;

    fn try_from(req: DeleteRequest) -> Result<Self, Self::Error> {
        if req.path.trim().is_empty() {
            return Err(GateError::BadRequest("Invalid input".into()));
        }
        Ok(Operation::Delete { path: req.path })
    }
}

impl TryFrom<RenameRequest> for Operation {
    type Error = GateError;

    fn try_from(req: RenameRequest) -> Result<Self, Self::Error> {
        if req.old_path.trim().is_empty() || req.new_path.trim().is_empty() {
            return Err(GateError::BadRequest("Invalid input".into()));
        }
        Ok(Operation::Rename {
            old_path: req.old_path,
            new_path: req.new_path,
        })
    }
}

/// Sandboxed action, ready for I/O.
#[derive(Debug, Clone)]
pub enum Action {
    CreateFolder { path: PathBuf },
    Delete { path: PathBuf },
    Rename { from: PathBuf, to: PathBuf },
    Read { path: PathBuf },
    Write { path: PathBuf, data: Bytes },
}

/// An operation whose every path is contained in the caller's root.
#[derive(Debug, Clone)]
pub struct AuthorizedOp {
    user_id: u64,
    root: PathBuf,
    action: Action,
}

impl AuthorizedOp {
    pub(crate) fn new(user_id: u64, root: PathBuf, action: Action) -> Self {
        Self { user_id, root, action }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Canonical root of the caller.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

/// One entry in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryListing {
    pub current_path: String,
    pub parent_path: String,
    pub show_back: bool,
    pub entries: Vec<ListingEntry>,
}

/// Result of a successful operation.
#[derive(Debug)]
pub enum OpOutcome {
    Done(&'static str),
    Listing(DirectoryListing),
    File { content_type: &'static str, data: Vec<u8> },
}

/// The layer that performs I/O once a request is authorized.
///
/// Failures are surfaced as-is; the gatekeeper never retries.
pub trait FileOperations: Send + Sync {
    fn execute(&self, op: AuthorizedOp) -> Result<OpOutcome, GateError>;
}

/// Local filesystem implementation.
#[derive(Debug, Clone)]
pub struct LocalDrive {
    max_upload_bytes: usize,
}

impl LocalDrive {
    pub fn new(max_upload_bytes: usize) -> Self {
        Self { max_upload_bytes }
    }

    fn create_folder(&self, op: &AuthorizedOp, path: &Path) -> Result<OpOutcome, GateError> {
        fs::create_dir_all(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => {
                GateError::BadRequest("A file with that name already exists".into())
            }
            _ => GateError::from_io(&format!("create folder {}", path.display()), e),
        })?;
        audit(op, "folder created", path);
        Ok(OpOutcome::Done("Folder created"))
    }

    fn delete(&self, op: &AuthorizedOp, path: &Path) -> Result<OpOutcome, GateError> {
        if path == op.root() {
            return Err(GateError::BadRequest("Cannot delete the drive root".into()));
        }
        let meta = fs::symlink_metadata(path)
            .map_err(|e| GateError::from_io(&format!("stat {}", path.display()), e))?;

        let result = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| GateError::from_io(&format!("delete {}", path.display()), e))?;

        audit(op, "deleted", path);
        Ok(OpOutcome::Done("Deleted"))
    }

    fn rename(&self, op: &AuthorizedOp, from: &Path, to: &Path) -> Result<OpOutcome, GateError> {
        if from == op.root() || to == op.root() {
            return Err(GateError::BadRequest("Cannot rename the drive root".into()));
        }
        if to.starts_with(from) {
            return Err(GateError::BadRequest("Cannot move a folder into itself".into()));
        }
        fs::symlink_metadata(from)
            .map_err(|e| GateError::from_io(&format!("stat {}", from.display()), e))?;

        fs::rename(from, to).map_err(|e| {
            GateError::from_io(&format!("rename {} -> {}", from.display(), to.display()), e)
        })?;

        tracing::info!(
            target: "audit",
            user_id = op.user_id(),
            from = %op.display(from),
            to = %op.display(to),
            "renamed"
        );
        Ok(OpOutcome::Done("Renamed"))
    }

    fn read(&self, op: &AuthorizedOp, path: &Path) -> Result<OpOutcome, GateError> {
        let meta = fs::metadata(path)
            .map_err(|e| GateError::from_io(&format!("stat {}", path.display()), e))?;

        if !meta.is_dir() {
            let data = fs::read(path)
                .map_err(|e| GateError::from_io(&format!("read {}", path.display()), e))?;
            return Ok(OpOutcome::File {
                content_type: content::for_file(path, &data),
                data,
            });
        }

        let current = op.display(path);
        let mut entries = Vec::new();
        let dir = fs::read_dir(path)
            .map_err(|e| GateError::from_io(&format!("read dir {}", path.display()), e))?;
        for entry in dir {
            let entry = entry.map_err(|e| GateError::storage("read dir entry", e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let kind = match entry.file_type() {
                Ok(ft) if ft.is_dir() => EntryKind::Dir,
                _ => EntryKind::File,
            };
            entries.push(ListingEntry {
                path: Path::new(&current).join(&name).to_string_lossy().into_owned(),
                name,
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let parent_path = Path::new(&current)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(OpOutcome::Listing(DirectoryListing {
            show_back: !current.is_empty(),
            current_path: current,
            parent_path,
            entries,
        }))
    }

    fn write(&self, op: &AuthorizedOp, path: &Path, data: &Bytes) -> Result<OpOutcome, GateError> {
        if data.len() > self.max_upload_bytes {
            return Err(GateError::BadRequest(format!(
                "File size exceeds {} limit",
                display_size(self.max_upload_bytes)
            )));
        }
        let content_type = content::sniff(data);
        if !content::ALLOWED_UPLOAD_TYPES.contains(&content_type) {
            return Err(GateError::BadRequest(format!("Invalid file type: {}", content_type)));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    GateError::BadRequest("A file with that name already exists".into())
                }
                _ => GateError::from_io(&format!("create {}", parent.display()), e),
            })?;
        }
        fs::write(path, data)
            .map_err(|e| GateError::storage(&format!("write {}", path.display()), e))?;

        audit(op, "file uploaded", path);
        Ok(OpOutcome::Done("File uploaded successfully"))
    }
}

impl FileOperations for LocalDrive {
    fn execute(&self, op: AuthorizedOp) -> Result<OpOutcome, GateError> {
        match op.action() {
            Action::CreateFolder { path } => self.create_folder(&op, path),
            Action::Delete { path } => self.delete(&op, path),
            Action::Rename { from, to } => self.rename(&op, from, to),
            Action::Read { path } => self.read(&op, path),
            Action::Write { path, data } => self.write(&op, path, data),
        }
    }
}

/// `2MB`, `512KB`, or a plain byte count when neither divides evenly.
fn display_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    match bytes {
        0 => "0 bytes".to_string(),
        b if b % MB == 0 => format!("{}MB", b / MB),
        b if b % KB == 0 => format!("{}KB", b / KB),
        b => format!("{} bytes", b),
    }
}

fn audit(op: &AuthorizedOp, event: &'static str, path: &Path) {
    tracing::info!(target: "audit", user_id = op.user_id(), path = %op.display(path), "{}", event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PDF: &[u8] = b"%PDF-1.4\n%test\n";

    fn setup() -> (TempDir, PathBuf, LocalDrive) {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap().join("42");
        fs::create_dir_all(&root).unwrap();
        (dir, root, LocalDrive::new(2 * 1024 * 1024))
    }

    fn op(root: &Path, action: Action) -> AuthorizedOp {
        AuthorizedOp::new(42, root.to_path_buf(), action)
    }

    #[test]
    fn test_request_validation() {
        let missing = CreateFolderRequest { save_path: "docs".into(), folder_name: "".into() };
        assert!(matches!(Operation::try_from(missing), Err(GateError::BadRequest(_))));

        let missing = DeleteRequest { path: " ".into() };
        assert!(matches!(Operation::try_from(missing), Err(GateError::BadRequest(_))));

        let missing = RenameRequest { old_path: "".into(), new_path: "x".into() };
        assert!(matches!(Operation::try_from(missing), Err(GateError::BadRequest(_))));

        let ok = RenameRequest { old_path: "a".into(), new_path: "b".into() };
        assert!(matches!(Operation::try_from(ok), Ok(Operation::Rename { .. })));
    }

    #[test]
    fn test_create_folder_recursive() {
        let (_dir, root, drive) = setup();
        let path = root.join("docs/notes");

        let outcome = drive.execute(op(&root, Action::CreateFolder { path: path.clone() })).unwrap();
        assert!(matches!(outcome, OpOutcome::Done("Folder created")));
        assert!(path.is_dir());
    }

    #[test]
    fn test_delete_file_and_tree() {
        let (_dir, root, drive) = setup();
        fs::create_dir_all(root.join("tree/deep")).unwrap();
        fs::write(root.join("tree/deep/f.txt"), b"x").unwrap();
        fs::write(root.join("single.txt"), b"x").unwrap();

        drive.execute(op(&root, Action::Delete { path: root.join("tree") })).unwrap();
        drive.execute(op(&root, Action::Delete { path: root.join("single.txt") })).unwrap();
        assert!(!root.join("tree").exists());
        assert!(!root.join("single.txt").exists());
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let (_dir, root, drive) = setup();
        let err = drive.execute(op(&root, Action::Delete { path: root.join("nope") })).unwrap_err();
        assert!(matches!(err, GateError::NotFound));
    }

    #[test]
    fn test_root_cannot_be_deleted_or_renamed() {
        let (_dir, root, drive) = setup();
        let err = drive.execute(op(&root, Action::Delete { path: root.clone() })).unwrap_err();
        assert!(matches!(err, GateError::BadRequest(_)));

        let err = drive
            .execute(op(&root, Action::Rename { from: root.clone(), to: root.join("x") }))
            .unwrap_err();
        assert!(matches!(err, GateError::BadRequest(_)));
        assert!(root.is_dir());
    }

    #[test]
    fn test_rename() {
        let (_dir, root, drive) = setup();
        fs::create_dir_all(root.join("old")).unwrap();

        drive
            .execute(op(&root, Action::Rename { from: root.join("old"), to: root.join("new") }))
            .unwrap();
        assert!(!root.join("old").exists());
        assert!(root.join("new").is_dir());

        let err = drive
            .execute(op(&root, Action::Rename { from: root.join("new"), to: root.join("new/inner") }))
            .unwrap_err();
        assert!(matches!(err, GateError::BadRequest(_)));

        let err = drive
            .execute(op(&root, Action::Rename { from: root.join("ghost"), to: root.join("x") }))
            .unwrap_err();
        assert!(matches!(err, GateError::NotFound));
    }

    #[test]
    fn test_read_listing_and_file() {
        let (_dir, root, drive) = setup();
        fs::create_dir_all(root.join("docs/sub")).unwrap();
        fs::write(root.join("docs/a.txt"), b"hello").unwrap();

        match drive.execute(op(&root, Action::Read { path: root.join("docs") })).unwrap() {
            OpOutcome::Listing(listing) => {
                assert_eq!(listing.current_path, "docs");
                assert_eq!(listing.parent_path, "");
                assert!(listing.show_back);
                assert_eq!(
                    listing.entries,
                    vec![
                        ListingEntry { name: "a.txt".into(), path: "docs/a.txt".into(), kind: EntryKind::File },
                        ListingEntry { name: "sub".into(), path: "docs/sub".into(), kind: EntryKind::Dir },
                    ]
                );
            }
            other => panic!("expected listing, got {:?}", other),
        }

        match drive.execute(op(&root, Action::Read { path: root.join("docs/a.txt") })).unwrap() {
            OpOutcome::File { content_type, data } => {
                assert_eq!(content_type, "text/plain; charset=utf-8");
                assert_eq!(data, b"hello");
            }
            other => panic!("expected file, got {:?}", other),
        }

        match drive.execute(op(&root, Action::Read { path: root.clone() })).unwrap() {
            OpOutcome::Listing(listing) => {
                assert_eq!(listing.current_path, "");
                assert!(!listing.show_back);
            }
            other => panic!("expected listing, got {:?}", other),
        }
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (_dir, root, drive) = setup();
        let err = drive.execute(op(&root, Action::Read { path: root.join("missing") })).unwrap_err();
        assert!(matches!(err, GateError::NotFound));
    }

    #[test]
    fn test_write_validates_type_and_size() {
        let (_dir, root, drive) = setup();
        let path = root.join("uploads/report.pdf");

        drive
            .execute(op(&root, Action::Write { path: path.clone(), data: Bytes::from_static(PDF) }))
            .unwrap();
        assert_eq!(fs::read(&path).unwrap(), PDF);

        let err = drive
            .execute(op(&root, Action::Write {
                path: root.join("evil.sh"),
                data: Bytes::from_static(b"#!/bin/sh\nrm -rf /\n"),
            }))
            .unwrap_err();
        assert!(matches!(err, GateError::BadRequest(ref m) if m.starts_with("Invalid file type")));
        assert!(!root.join("evil.sh").exists());

        let small = LocalDrive::new(8);
        let err = small
            .execute(op(&root, Action::Write { path: root.join("big.pdf"), data: Bytes::from_static(PDF) }))
            .unwrap_err();
        assert!(matches!(err, GateError::BadRequest(ref m) if m == "File size exceeds 8 bytes limit"));
    }

    #[test]
    fn test_size_limit_message() {
        assert_eq!(display_size(2 * 1024 * 1024), "2MB");
        assert_eq!(display_size(512 * 1024), "512KB");
        assert_eq!(display_size(1000), "1000 bytes");
    }

    #[test]
    fn test_folder_under_file_is_not_found() {
        let (_dir, root, drive) = setup();
        fs::write(root.join("a.txt"), b"x").unwrap();

        let err = drive
            .execute(op(&root, Action::CreateFolder { path: root.join("a.txt/x") }))
            .unwrap_err();
        assert!(matches!(err, GateError::NotFound));

        let err = drive
            .execute(op(&root, Action::Write { path: root.join("a.txt/sub/up.pdf"), data: Bytes::from_static(PDF) }))
            .unwrap_err();
        assert!(matches!(err, GateError::NotFound));

        let err = drive
            .execute(op(&root, Action::Write { path: root.join("a.txt/up.pdf"), data: Bytes::from_static(PDF) }))
            .unwrap_err();
        assert!(matches!(err, GateError::BadRequest(_)));
    }
}
