//! The drive collaborators: identity-to-root binding and file operations.

pub mod content;
pub mod identity;
pub mod ops;

pub use identity::{DirectoryResolver, IdentityResolver, RootBinding};
pub use ops::{AuthorizedOp, FileOperations, LocalDrive, OpOutcome, Operation};
