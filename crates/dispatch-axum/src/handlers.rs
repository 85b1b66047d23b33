//! `POST /api/{tid}/waypoint/*` and `/api/{tid}/truck/*` mutation
//! endpoints, using axum's `State`/`Json` extractor pattern with the error
//! envelope in `crate::error`.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::err_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct AddPoint {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MovePoint {
    seq: u64,
    #[serde(rename = "_id")]
    id: Uuid,
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StopPoint {
    seq: u64,
    #[serde(rename = "_id")]
    id: Uuid,
    moving: bool,
}

pub(crate) async fn add_waypoint(
    State(state): State<AppState>,
    Path(tid): Path<String>,
    Json(body): Json<AddPoint>,
) -> Response {
    match state.ctx.add_waypoint(&tid, body.x, body.y).await {
        Ok(_) => Json(json!({})).into_response(),
        Err(err) => err_response(err),
    }
}

pub(crate) async fn move_waypoint(
    State(state): State<AppState>,
    Path(tid): Path<String>,
    Json(body): Json<MovePoint>,
) -> Response {
    match state
        .ctx
        .move_waypoint(&tid, body.seq, body.id, body.x, body.y)
        .await
    {
        Ok(_) => Json(json!({})).into_response(),
        Err(err) => err_response(err),
    }
}

pub(crate) async fn add_truck(
    State(state): State<AppState>,
    Path(tid): Path<String>,
    Json(body): Json<AddPoint>,
) -> Response {
    match state.ctx.add_truck(&tid, body.x, body.y).await {
        Ok(_) => Json(json!({})).into_response(),
        Err(err) => err_response(err),
    }
}

pub(crate) async fn move_truck(
    State(state): State<AppState>,
    Path(tid): Path<String>,
    Json(body): Json<MovePoint>,
) -> Response {
    match state
        .ctx
        .move_truck(&tid, body.seq, body.id, body.x, body.y)
        .await
    {
        Ok(_) => Json(json!({})).into_response(),
        Err(err) => err_response(err),
    }
}

pub(crate) async fn stop_truck(
    State(state): State<AppState>,
    Path(tid): Path<String>,
    Json(body): Json<StopPoint>,
) -> Response {
    match state
        .ctx
        .stop_truck(&tid, body.seq, body.id, body.moving)
        .await
    {
        Ok(_) => Json(json!({})).into_response(),
        Err(err) => err_response(err),
    }
}
