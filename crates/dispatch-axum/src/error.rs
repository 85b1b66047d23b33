//! Error envelope conventions.
//!
//! HTTP mutation endpoints never use the status code to signal failure —
//! they always answer `200 OK` with `{}` on success or `{"err": "..."}` on
//! failure. WebSocket handlers send a `WireEvent::Err` frame and close.

use axum::response::{IntoResponse, Response};
use axum::Json;
use dispatch_common::Error;
use serde_json::json;

/// Turn any collection-layer error into the `{"err": "..."}` / 200 envelope.
pub(crate) fn err_response(err: Error) -> Response {
    Json(json!({ "err": err.to_string() })).into_response()
}
