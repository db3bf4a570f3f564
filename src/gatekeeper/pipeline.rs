//! The gatekeeper pipeline.
//!
//! ```text
//! START → AUTHENTICATE → RATE_LIMIT → BIND_ROOT → SANDBOX (per path) → AUTHORIZED
//! ```
//!
//! [`Pipeline::admit`] covers the first two stages and touches no disk;
//! [`Pipeline::authorize`] covers the rest and must run on the blocking pool.
//! The first failing stage ends the request and later stages never run, so an
//! unauthenticated caller never consumes a token or creates a limiter record.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::drive::identity::IdentityResolver;
use crate::drive::ops::{Action, AuthorizedOp, Operation};
use crate::gatekeeper::GateError;
use crate::observability::metrics;
use crate::security::rate_limit::{ClientKey, RateLimiter};
use crate::security::sandbox::PathSandbox;
use crate::security::session::{SessionAuthenticator, SessionClaims};

/// A request as seen by the gatekeeper, independent of transport.
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub credential: Option<String>,
    pub client: Option<String>,
    pub operation: Operation,
}

/// Outcome of AUTHENTICATE and RATE_LIMIT.
#[derive(Debug, Clone)]
pub struct Admission {
    claims: SessionClaims,
    client: ClientKey,
}

#[derive(Clone)]
pub struct Pipeline {
    authenticator: SessionAuthenticator,
    limiter: Arc<RateLimiter>,
    resolver: Arc<dyn IdentityResolver>,
}

impl Pipeline {
    pub fn new(
        authenticator: SessionAuthenticator,
        limiter: Arc<RateLimiter>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            authenticator,
            limiter,
            resolver,
        }
    }

    pub fn authenticator(&self) -> &SessionAuthenticator {
        &self.authenticator
    }

    /// AUTHENTICATE, then RATE_LIMIT.
    pub fn admit(&self, credential: Option<&str>, client: Option<&str>) -> Result<Admission, GateError> {
        let claims = self.authenticator.authenticate(credential)?;

        let raw = client.ok_or_else(|| GateError::BadClientIdentity(String::new()))?;
        let client = ClientKey::parse(raw)?;

        if !self.limiter.allow(&client) {
            tracing::warn!(client = %client, user_id = claims.user_id, "Rate limit exceeded");
            return Err(GateError::RateLimitExceeded);
        }

        Ok(Admission { claims, client })
    }

    /// BIND_ROOT, then SANDBOX on every path the operation carries.
    pub fn authorize(&self, admission: &Admission, operation: Operation) -> Result<AuthorizedOp, GateError> {
        let user_id = admission.claims.user_id;
        let binding = self.resolver.resolve(&admission.claims)?;
        let sandbox = PathSandbox::open(&binding.root)?;

        let audit_escape = |relative: &Path, e: &GateError| {
            if matches!(e, GateError::PathEscape) {
                metrics::record_path_escape();
                tracing::warn!(
                    target: "audit",
                    user_id,
                    client = %admission.client,
                    path = %relative.display(),
                    "Path escape attempt blocked"
                );
            }
        };
        // Reads and writes go through links; delete and rename act on the entry itself.
        let contain = |relative: &Path| {
            sandbox.resolve(relative).inspect_err(|e| audit_escape(relative, e))
        };
        let contain_entry = |relative: &Path| {
            sandbox.resolve_entry(relative).inspect_err(|e| audit_escape(relative, e))
        };

        let action = match operation {
            Operation::CreateFolder { save_path, folder_name } => Action::CreateFolder {
                path: contain(Path::new(&save_path).join(&folder_name).as_path())?,
            },
            Operation::Delete { path } => Action::Delete {
                path: contain_entry(Path::new(&path))?,
            },
            Operation::Rename { old_path, new_path } => Action::Rename {
                from: contain_entry(Path::new(&old_path))?,
                to: contain_entry(Path::new(&new_path))?,
            },
            Operation::Read { path } => Action::Read {
                path: contain(Path::new(&path))?,
            },
            Operation::Write { save_path, file_name, data } => {
                let file_name = plain_file_name(&file_name)?;
                Action::Write {
                    path: contain(Path::new(&save_path).join(file_name).as_path())?,
                    data,
                }
            }
        };

        Ok(AuthorizedOp::new(binding.user_id, sandbox.root().to_path_buf(), action))
    }

    /// Full pipeline, for callers that already hold the whole request.
    pub fn run(&self, request: GateRequest) -> Result<AuthorizedOp, GateError> {
        let admission = self.admit(request.credential.as_deref(), request.client.as_deref())?;
        self.authorize(&admission, request.operation)
    }
}

/// An upload name must be one ordinary path component.
fn plain_file_name(raw: &str) -> Result<PathBuf, GateError> {
    let mut components = Path::new(raw).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Ok(PathBuf::from(name)),
        _ => Err(GateError::BadRequest("Invalid file name".into())),
    }
}
