use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::config::AdminConfig;
use crate::http::server::AppState;

/// Whether `headers` carry the admin bearer key.
///
/// Never true while the admin API is disabled or has no key.
pub fn is_admin(headers: &HeaderMap, admin: &AdminConfig) -> bool {
    if !admin.enabled || admin.api_key.is_empty() {
        return false;
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|key| key == admin.api_key)
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let snapshot = state.snapshot();

    if is_admin(request.headers(), &snapshot.config.admin) {
        return Ok(next.run(request).await);
    }

    tracing::warn!(target: "audit", path = %request.uri().path(), "Rejected admin request");
    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn admin(enabled: bool, key: &str) -> AdminConfig {
        AdminConfig {
            enabled,
            api_key: key.to_string(),
            ..AdminConfig::default()
        }
    }

    fn bearer(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_matching_key() {
        assert!(is_admin(&bearer("Bearer s3cret"), &admin(true, "s3cret")));
        assert!(!is_admin(&bearer("Bearer wrong"), &admin(true, "s3cret")));
        assert!(!is_admin(&bearer("s3cret"), &admin(true, "s3cret")));
        assert!(!is_admin(&HeaderMap::new(), &admin(true, "s3cret")));
    }

    #[test]
    fn test_disabled_or_empty_key_never_matches() {
        assert!(!is_admin(&bearer("Bearer s3cret"), &admin(false, "s3cret")));
        assert!(!is_admin(&bearer("Bearer "), &admin(true, "")));
    }
}
