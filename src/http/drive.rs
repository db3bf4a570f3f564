//! Drive route handlers.
//!
//! Every handler runs the same sequence under one request deadline: admit the
//! caller (session, then rate limit), parse the body, then hand the operation
//! to the blocking pool where root binding, sandboxing and the file operation
//! happen behind the cancellation gate.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, FromRequest, Multipart, Path, State},
    http::{HeaderMap, Request},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use crate::drive::ops::{CreateFolderRequest, DeleteRequest, RenameRequest};
use crate::drive::Operation;
use crate::gatekeeper::GateError;
use crate::http::request::{client_address, request_id};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::resilience::RequestDeadline;

pub async fn create_folder(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    gated(state, peer, headers, "create_folder", || async move {
        Operation::try_from(parse_json::<CreateFolderRequest>(&body)?)
    })
    .await
}

pub async fn delete(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    gated(state, peer, headers, "delete", || async move {
        Operation::try_from(parse_json::<DeleteRequest>(&body)?)
    })
    .await
}

pub async fn rename(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    gated(state, peer, headers, "rename", || async move {
        Operation::try_from(parse_json::<RenameRequest>(&body)?)
    })
    .await
}

pub async fn upload(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let headers = request.headers().clone();
    gated(state, peer, headers, "upload", || async move {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| GateError::BadRequest(e.body_text()))?;
        read_upload(multipart).await
    })
    .await
}

pub async fn read_root(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    gated(state, peer, headers, "read", || async move {
        Ok(Operation::Read { path: String::new() })
    })
    .await
}

pub async fn read(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    gated(state, peer, headers, "read", || async move { Ok(Operation::Read { path }) }).await
}

/// Run one drive request through the gatekeeper and the file layer.
///
/// `parse` is only polled after the caller has been admitted.
async fn gated<F, Fut>(
    state: AppState,
    peer: SocketAddr,
    headers: HeaderMap,
    operation: &'static str,
    parse: F,
) -> Response
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Operation, GateError>>,
{
    let start = Instant::now();
    let snapshot = state.snapshot();
    let deadline = RequestDeadline::start(snapshot.config.timeouts.request());

    let result = deadline
        .run(async {
            let pipeline = state.pipeline(&snapshot);
            let credential = pipeline.authenticator().credential_from_headers(&headers);
            let client = client_address(&headers, peer, snapshot.config.rate_limit.trust_forwarded_for);

            let admission = pipeline.admit(credential.as_deref(), Some(&client))?;
            let op = parse().await?;

            let gate = deadline.gate();
            let drive = Arc::clone(&state.drive);
            tokio::task::spawn_blocking(move || {
                if gate.is_cancelled() {
                    return Err(GateError::Timeout);
                }
                let authorized = pipeline.authorize(&admission, op)?;
                gate.authorize()?;
                drive.execute(authorized)
            })
            .await
            .map_err(|e| GateError::StorageFailure(format!("file operation task failed: {}", e)))?
        })
        .await;

    let response = match result {
        Ok(outcome) => outcome.into_response(),
        Err(e) => {
            tracing::debug!(
                request_id = %request_id(&headers),
                operation,
                reason = e.reason(),
                "Drive request refused"
            );
            e.into_response()
        }
    };
    metrics::record_request(operation, response.status().as_u16(), start);
    response
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, GateError> {
    serde_json::from_slice(body).map_err(|_| GateError::BadRequest("Invalid input".into()))
}

async fn read_upload(mut multipart: Multipart) -> Result<Operation, GateError> {
    let mut save_path = String::new();
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_upload)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "save_path" => save_path = field.text().await.map_err(invalid_upload)?,
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(invalid_upload)?;
                file = Some((file_name, data));
            }
            _ => {}
        }
    }

    let (file_name, data) = file.ok_or_else(|| GateError::BadRequest("No file uploaded".into()))?;
    Ok(Operation::Write {
        save_path,
        file_name,
        data,
    })
}

fn invalid_upload(e: axum::extract::multipart::MultipartError) -> GateError {
    GateError::BadRequest(format!("Invalid upload: {}", e.body_text()))
}
