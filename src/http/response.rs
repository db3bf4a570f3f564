//! Rendering of successful drive outcomes.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::drive::OpOutcome;
use crate::gatekeeper::error::MessageBody;

impl IntoResponse for OpOutcome {
    fn into_response(self) -> Response {
        match self {
            OpOutcome::Done(message) => (
                StatusCode::OK,
                Json(MessageBody {
                    message: message.to_string(),
                }),
            )
                .into_response(),
            OpOutcome::Listing(listing) => (StatusCode::OK, Json(listing)).into_response(),
            OpOutcome::File { content_type, data } => {
                (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], data).into_response()
            }
        }
    }
}
