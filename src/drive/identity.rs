//! Identity resolution: verified claims to a private storage root.

use std::fs;
use std::path::PathBuf;

use crate::gatekeeper::GateError;
use crate::security::session::SessionClaims;

/// The private root directory bound to one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBinding {
    pub user_id: u64,
    pub root: PathBuf,
}

/// Maps an authenticated identity to its root, creating the root if absent.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, claims: &SessionClaims) -> Result<RootBinding, GateError>;
}

/// One directory per user id under a shared base directory.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    base_dir: PathBuf,
}

impl DirectoryResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl IdentityResolver for DirectoryResolver {
    fn resolve(&self, claims: &SessionClaims) -> Result<RootBinding, GateError> {
        let root = self.base_dir.join(claims.user_id.to_string());
        if !root.is_dir() {
            fs::create_dir_all(&root)
                .map_err(|e| GateError::storage(&format!("create root {}", root.display()), e))?;
            tracing::info!(user_id = claims.user_id, "Provisioned drive root");
        }
        Ok(RootBinding {
            user_id: claims.user_id,
            root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(user_id: u64) -> SessionClaims {
        SessionClaims {
            user_id,
            email: format!("{}@example.com", user_id),
            exp: u64::MAX,
        }
    }

    #[test]
    fn test_root_per_user_created_on_first_access() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = DirectoryResolver::new(dir.path());

        let binding = resolver.resolve(&claims(42)).unwrap();
        assert_eq!(binding.user_id, 42);
        assert_eq!(binding.root, dir.path().join("42"));
        assert!(binding.root.is_dir());

        // Stable on repeat access.
        assert_eq!(resolver.resolve(&claims(42)).unwrap(), binding);
        assert_ne!(resolver.resolve(&claims(43)).unwrap().root, binding.root);
    }

    #[test]
    fn test_unwritable_base_is_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();

        let resolver = DirectoryResolver::new(&blocker);
        assert!(matches!(
            resolver.resolve(&claims(1)),
            Err(GateError::StorageFailure(_))
        ));
    }
}
