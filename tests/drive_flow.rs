//! End-to-end tests against a served gatekeeper.

use std::sync::Arc;
use std::time::Duration;

use drive_gatekeeper::drive::{DirectoryResolver, IdentityResolver, LocalDrive, RootBinding};
use drive_gatekeeper::http::AppState;
use drive_gatekeeper::security::session::SessionClaims;
use drive_gatekeeper::GateError;
use reqwest::header::{CONTENT_TYPE, COOKIE, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

const PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\n";

fn relaxed_limits(config: &mut drive_gatekeeper::DriveConfig) {
    config.rate_limit.requests_per_second = 1000.0;
    config.rate_limit.burst_size = 100;
}

async fn message(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["message"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_create_folder_under_user_root() {
    let server = common::start_server(|_| {}).await;

    let res = server
        .client()
        .post(server.url("/drive/create"))
        .header(COOKIE, server.cookie(42))
        .json(&json!({ "save_path": "docs", "folder_name": "notes" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(message(res).await, "Folder created");
    assert!(server.user_root(42).join("docs/notes").is_dir());
}

#[tokio::test]
async fn test_fourth_rapid_request_is_limited() {
    let server = common::start_server(|_| {}).await;
    let cookie = server.cookie(1);

    for _ in 0..3 {
        let res = server
            .client()
            .get(server.url("/drive/"))
            .header(COOKIE, &cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = server
        .client()
        .get(server.url("/drive/"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().contains_key(RETRY_AFTER));
    assert_eq!(message(res).await, "Too many requests. Rate limit exceeded");
}

#[tokio::test]
async fn test_rename_escape_is_forbidden() {
    let server = common::start_server(|_| {}).await;
    std::fs::create_dir_all(server.user_root(42).join("docs")).unwrap();

    let res = server
        .client()
        .put(server.url("/drive/rename"))
        .header(COOKIE, server.cookie(42))
        .json(&json!({ "old_path": "docs", "new_path": "../../etc" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(message(res).await, "Access denied");
    assert!(server.user_root(42).join("docs").is_dir());
}

#[tokio::test]
async fn test_credentials_checked_before_anything_else() {
    let server = common::start_server(|_| {}).await;

    let res = server
        .client()
        .delete(server.url("/drive/delete"))
        .json(&json!({ "path": "docs" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(message(res).await, "Access Denied");

    let res = server
        .client()
        .delete(server.url("/drive/delete"))
        .header(COOKIE, "drive_session=invalid.jwt.token")
        .json(&json!({ "path": "docs" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(message(res).await, "Invalid Token");

    // Rejected callers never spent tokens.
    let cookie = server.cookie(2);
    for _ in 0..3 {
        let res = server
            .client()
            .get(server.url("/drive/"))
            .header(COOKIE, &cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_missing_signing_key_is_internal_error() {
    let server = common::start_server(|config| config.session.signing_key.clear()).await;

    let res = server
        .client()
        .get(server.url("/drive/"))
        .header(COOKIE, "drive_session=a.b.c")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(message(res).await, "Internal Server Error");
}

#[tokio::test]
async fn test_maintenance_mode() {
    let server = common::start_server(|config| {
        config.maintenance.enabled = true;
        config.admin.enabled = true;
        config.admin.api_key = "ops-key".into();
        config.admin.bind_address = "127.0.0.1:0".into();
    })
    .await;

    let res = server
        .client()
        .get(server.url("/drive/"))
        .header(COOKIE, server.cookie(1))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let res = server
        .client()
        .get(server.url("/drive/"))
        .header(COOKIE, server.cookie(1))
        .bearer_auth("ops-key")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.client().get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_then_download() {
    let server = common::start_server(relaxed_limits).await;
    let cookie = server.cookie(9);

    let form = reqwest::multipart::Form::new()
        .text("save_path", "uploads")
        .part(
            "file",
            reqwest::multipart::Part::bytes(PDF.to_vec()).file_name("report.pdf"),
        );
    let res = server
        .client()
        .post(server.url("/drive/upload"))
        .header(COOKIE, &cookie)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server
        .client()
        .get(server.url("/drive/uploads/report.pdf"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_TYPE], "application/pdf");
    assert_eq!(res.bytes().await.unwrap().as_ref(), PDF);

    let res = server
        .client()
        .get(server.url("/drive/uploads"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    let listing: Value = res.json().await.unwrap();
    assert_eq!(listing["current_path"], "uploads");
    assert_eq!(listing["entries"][0]["name"], "report.pdf");
    assert_eq!(listing["entries"][0]["kind"], "file");
}

#[tokio::test]
async fn test_upload_rejects_disallowed_content() {
    let server = common::start_server(relaxed_limits).await;
    let cookie = server.cookie(9);

    let form = reqwest::multipart::Form::new().text("save_path", "").part(
        "file",
        reqwest::multipart::Part::bytes(b"#!/bin/sh\necho hi\n".to_vec()).file_name("run.pdf"),
    );
    let res = server
        .client()
        .post(server.url("/drive/upload"))
        .header(COOKIE, &cookie)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(message(res).await.starts_with("Invalid file type"));

    let form = reqwest::multipart::Form::new().text("save_path", "../..").part(
        "file",
        reqwest::multipart::Part::bytes(PDF.to_vec()).file_name("escape.pdf"),
    );
    let res = server
        .client()
        .post(server.url("/drive/upload"))
        .header(COOKIE, &cookie)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(!server.storage.path().join("escape.pdf").exists());
}

#[tokio::test]
async fn test_missing_path_is_not_found() {
    let server = common::start_server(|_| {}).await;

    let res = server
        .client()
        .delete(server.url("/drive/delete"))
        .header(COOKIE, server.cookie(3))
        .json(&json!({ "path": "ghost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(message(res).await, "Path not found");
}

#[tokio::test]
async fn test_request_id_propagated() {
    let server = common::start_server(|_| {}).await;

    let res = server
        .client()
        .get(server.url("/health"))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "trace-me-123");

    let res = server.client().get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.headers()["x-request-id"].len(), 36);
}

/// Resolver that stalls before handing out the root.
struct SlowResolver {
    inner: DirectoryResolver,
    delay: Duration,
}

impl IdentityResolver for SlowResolver {
    fn resolve(&self, claims: &SessionClaims) -> Result<RootBinding, GateError> {
        std::thread::sleep(self.delay);
        self.inner.resolve(claims)
    }
}

#[tokio::test]
async fn test_deadline_cancels_before_any_mutation() {
    let server = common::start_server_with(
        |config| config.timeouts.request_secs = 1,
        |config| {
            let resolver = Arc::new(SlowResolver {
                inner: DirectoryResolver::new(&config.storage.base_dir),
                delay: Duration::from_millis(1500),
            });
            let drive = Arc::new(LocalDrive::new(config.security.max_upload_bytes));
            AppState::with_collaborators(config, resolver, drive)
        },
    )
    .await;

    let res = server
        .client()
        .post(server.url("/drive/create"))
        .header(COOKIE, server.cookie(5))
        .json(&json!({ "save_path": "", "folder_name": "late" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(message(res).await, "request timeout");

    // Let the stalled blocking task finish; it must not have created anything.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(!server.user_root(5).join("late").exists());
}
