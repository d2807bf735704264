mod forward;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::any::Any;
use tracing::error;

pub use forward::*;

#[derive(serde::Serialize)]
pub struct ErrorResponse {
    error: String,
}

/// Render a handler panic as the same JSON error body used for upstream faults.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic message".to_owned()
    };
    error!("Handler panicked: {details}");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("Internal server error: {details}"),
        }),
    )
        .into_response()
}
