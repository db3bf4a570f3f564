//! Session credential verification and issuance.
//!
//! Tokens are HMAC-signed JWTs carrying [`SessionClaims`]. The verifier pins
//! the configured algorithm: whatever the token header declares, only that
//! algorithm and the server secret are accepted.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::gatekeeper::GateError;

/// Identity asserted by a verified session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: u64,
    pub email: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

/// Verifies and issues session tokens for one configuration snapshot.
#[derive(Clone)]
pub struct SessionAuthenticator {
    secret: Vec<u8>,
    algorithm: Algorithm,
    cookie_name: String,
    ttl_secs: u64,
    secure_cookie: bool,
}

impl SessionAuthenticator {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            secret: config.signing_key.as_bytes().to_vec(),
            algorithm: config.algorithm.into(),
            cookie_name: config.cookie_name.clone(),
            ttl_secs: config.ttl_secs,
            secure_cookie: config.secure_cookie,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Verify `credential` and return its claims.
    ///
    /// Every token-level failure collapses into [`GateError::InvalidToken`].
    pub fn authenticate(&self, credential: Option<&str>) -> Result<SessionClaims, GateError> {
        let token = match credential.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => {
                tracing::warn!("Missing or empty session cookie");
                return Err(GateError::AccessDenied);
            }
        };

        if self.secret.is_empty() {
            return Err(GateError::ConfigMissing("session signing key is not set".into()));
        }

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<SessionClaims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!(error = %e, "Token validation failed");
                GateError::InvalidToken
            })
    }

    /// Pull this authenticator's cookie out of a request's headers.
    pub fn credential_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let prefix = format!("{}=", self.cookie_name);
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .map(str::trim)
            .find_map(|pair| pair.strip_prefix(&prefix))
            .map(str::to_string)
    }

    /// Sign claims as given, expiry included.
    pub fn sign(&self, claims: &SessionClaims) -> Result<String, GateError> {
        if self.secret.is_empty() {
            return Err(GateError::ConfigMissing("session signing key is not set".into()));
        }
        encode(&Header::new(self.algorithm), claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|e| GateError::ConfigMissing(format!("failed to sign session token: {}", e)))
    }

    /// Issue a token for a freshly logged-in user, valid for the session ttl.
    pub fn issue(&self, user_id: u64, email: &str) -> Result<String, GateError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.sign(&SessionClaims {
            user_id,
            email: email.to_string(),
            exp: now + self.ttl_secs,
        })
    }

    /// `Set-Cookie` value carrying `token`.
    pub fn session_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
            self.cookie_name, token, self.ttl_secs
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }
}
