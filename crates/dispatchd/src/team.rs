//! `--team <addr>` mode: a browser-facing router with no local registry,
//! proxying every operation through a `ConsumerApi` dialing the drivers
//! service at `addr`. Mirrors `dispatch-axum`'s handlers/ws shape one seam
//! over, with `ServiceContext` replaced by `ConsumerApi` and
//! `Collection::ensure_loaded_for`'s tenant-stickiness reimplemented by hand
//! since `ConsumerApi` is constructed already bound to one tenant.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dispatch_common::{chg_distance, Error, Subscriber};
use dispatch_core::{
    Truck, TruckConsumerApi, WaypointConsumerApi, Waypoint, WireConn, WireEvent, WireRequest,
    WsTruckTransport, WsWaypointTransport,
};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use url::Url;
use uuid::Uuid;

const RELAY_QUEUE: usize = 64;

/// Sticks to the first tenant it sees, mirroring
/// `dispatch_core::collection::Collection`'s tenant-stickiness so a single
/// process still only ever serves one tenant at a time.
struct Slot<T> {
    bound: Option<(String, Arc<T>)>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self { bound: None }
    }
}

/// Shared state for team mode: the drivers-service address and one sticky
/// slot per collection kind.
#[derive(Clone)]
pub struct TeamState {
    addr: Arc<String>,
    waypoints: Arc<Mutex<Slot<WaypointConsumerApi<WsWaypointTransport>>>>,
    trucks: Arc<Mutex<Slot<TruckConsumerApi<WsTruckTransport>>>>,
}

impl TeamState {
    /// A fresh state dialing `addr` (e.g. `127.0.0.1:8420`) on demand.
    pub fn new(addr: String) -> Self {
        Self {
            addr: Arc::new(addr),
            waypoints: Arc::new(Mutex::new(Slot::new())),
            trucks: Arc::new(Mutex::new(Slot::new())),
        }
    }

    fn waypoint_url(&self, tid: &str) -> Result<Url, Error> {
        Url::parse(&format!("ws://{}/api/{}/waypoint", self.addr, tid))
            .map_err(|e| Error::Store(Box::new(e)))
    }

    fn truck_url(&self, tid: &str) -> Result<Url, Error> {
        Url::parse(&format!("ws://{}/api/{}/truck", self.addr, tid))
            .map_err(|e| Error::Store(Box::new(e)))
    }

    fn waypoint_api(&self, tid: &str) -> Result<Arc<WaypointConsumerApi<WsWaypointTransport>>, Error> {
        let mut slot = self.waypoints.lock();
        if let Some((stuck, api)) = &slot.bound {
            return if stuck == tid {
                Ok(api.clone())
            } else {
                Err(Error::TenantMismatch {
                    stuck: stuck.clone(),
                    requested: tid.to_string(),
                })
            };
        }
        let url = self.waypoint_url(tid)?;
        let transport = Arc::new(WsWaypointTransport(WireConn::new(url)));
        let api = Arc::new(WaypointConsumerApi::new(tid, transport));
        slot.bound = Some((tid.to_string(), api.clone()));
        Ok(api)
    }

    fn truck_api(&self, tid: &str) -> Result<Arc<TruckConsumerApi<WsTruckTransport>>, Error> {
        let mut slot = self.trucks.lock();
        if let Some((stuck, api)) = &slot.bound {
            return if stuck == tid {
                Ok(api.clone())
            } else {
                Err(Error::TenantMismatch {
                    stuck: stuck.clone(),
                    requested: tid.to_string(),
                })
            };
        }
        let url = self.truck_url(tid)?;
        let transport = Arc::new(WsTruckTransport(WireConn::new(url)));
        let api = Arc::new(TruckConsumerApi::new(tid, transport));
        slot.bound = Some((tid.to_string(), api.clone()));
        Ok(api)
    }
}

/// Router equivalent to `dispatch_axum::router`, backed by `TeamState`
/// instead of a local `ServiceContext`.
pub fn router(state: TeamState) -> Router {
    Router::new()
        .route("/api/{tid}/waypoint", get(waypoint_ws))
        .route("/api/{tid}/waypoint/add", post(add_waypoint))
        .route("/api/{tid}/waypoint/move", post(move_waypoint))
        .route("/api/{tid}/truck", get(truck_ws))
        .route("/api/{tid}/truck/add", post(add_truck))
        .route("/api/{tid}/truck/move", post(move_truck))
        .route("/api/{tid}/truck/stop", post(stop_truck))
        .with_state(state)
}

fn err_response(err: Error) -> Response {
    Json(json!({ "err": err.to_string() })).into_response()
}

#[derive(Debug, Deserialize)]
struct AddPoint {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct MovePoint {
    seq: u64,
    #[serde(rename = "_id")]
    id: Uuid,
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct StopPoint {
    seq: u64,
    #[serde(rename = "_id")]
    id: Uuid,
    moving: bool,
}

async fn add_waypoint(
    State(state): State<TeamState>,
    Path(tid): Path<String>,
    Json(body): Json<AddPoint>,
) -> Response {
    let api = match state.waypoint_api(&tid) {
        Ok(api) => api,
        Err(err) => return err_response(err),
    };
    match api.add_waypoint(body.x, body.y).await {
        Ok(_) => Json(json!({})).into_response(),
        Err(err) => err_response(err),
    }
}

async fn move_waypoint(
    State(state): State<TeamState>,
    Path(tid): Path<String>,
    Json(body): Json<MovePoint>,
) -> Response {
    let api = match state.waypoint_api(&tid) {
        Ok(api) => api,
        Err(err) => return err_response(err),
    };
    match api.move_waypoint(body.seq, body.id, body.x, body.y).await {
        Ok(_) => Json(json!({})).into_response(),
        Err(err) => err_response(err),
    }
}

async fn add_truck(
    State(state): State<TeamState>,
    Path(tid): Path<String>,
    Json(body): Json<AddPoint>,
) -> Response {
    let api = match state.truck_api(&tid) {
        Ok(api) => api,
        Err(err) => return err_response(err),
    };
    match api.add_truck(body.x, body.y).await {
        Ok(_) => Json(json!({})).into_response(),
        Err(err) => err_response(err),
    }
}

async fn move_truck(
    State(state): State<TeamState>,
    Path(tid): Path<String>,
    Json(body): Json<MovePoint>,
) -> Response {
    let api = match state.truck_api(&tid) {
        Ok(api) => api,
        Err(err) => return err_response(err),
    };
    match api.move_truck(body.seq, body.id, body.x, body.y).await {
        Ok(_) => Json(json!({})).into_response(),
        Err(err) => err_response(err),
    }
}

async fn stop_truck(
    State(state): State<TeamState>,
    Path(tid): Path<String>,
    Json(body): Json<StopPoint>,
) -> Response {
    let api = match state.truck_api(&tid) {
        Ok(api) => api,
        Err(err) => return err_response(err),
    };
    match api.stop_truck(body.seq, body.id, body.moving).await {
        Ok(_) => Json(json!({})).into_response(),
        Err(err) => err_response(err),
    }
}

async fn waypoint_ws(
    State(state): State<TeamState>,
    Path(tid): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| waypoint_socket(socket, state, tid))
}

async fn truck_ws(
    State(state): State<TeamState>,
    Path(tid): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| truck_socket(socket, state, tid))
}

/// Same cursor/`ChgDistance` bookkeeping as `dispatch_axum::ws::WaypointRelay`,
/// reloading via a spawned task since `ConsumerApi::fetch` is async while
/// `Subscriber`'s callbacks are not.
struct WaypointRelay {
    api: Arc<WaypointConsumerApi<WsWaypointTransport>>,
    cursor: i64,
    publisher: tokio::sync::mpsc::Sender<WireEvent>,
}

impl WaypointRelay {
    fn reload(&self) {
        let api = self.api.clone();
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            match api.fetch().await {
                Ok((ccn, waypoints)) => {
                    let _ = publisher.try_send(WireEvent::WaypointSnapshot { ccn, waypoints });
                }
                Err(err) => {
                    let _ = publisher.try_send(WireEvent::Err {
                        msg: err.to_string(),
                    });
                }
            }
        });
    }
}

impl Subscriber<Waypoint> for WaypointRelay {
    fn epoch(&mut self, _ccn: i64) -> bool {
        self.reload();
        false
    }
    fn member_created(&mut self, ccn: i64, member: &Waypoint) -> bool {
        match chg_distance(ccn, self.cursor) {
            Some(1) => {
                self.cursor = ccn;
                let _ = self.publisher.try_send(WireEvent::WaypointCreated {
                    ccn,
                    waypoint: member.clone(),
                });
            }
            Some(d) if d <= 0 => {}
            _ => self.reload(),
        }
        false
    }
    fn member_updated(&mut self, ccn: i64, member: &Waypoint) -> bool {
        match chg_distance(ccn, self.cursor) {
            Some(1) => {
                self.cursor = ccn;
                let _ = self.publisher.try_send(WireEvent::WaypointUpdated {
                    ccn,
                    waypoint: member.clone(),
                });
            }
            Some(d) if d <= 0 => {}
            _ => self.reload(),
        }
        false
    }
    fn member_deleted(&mut self, ccn: i64, id: &Uuid) -> bool {
        match chg_distance(ccn, self.cursor) {
            Some(1) => {
                self.cursor = ccn;
                let _ = self
                    .publisher
                    .try_send(WireEvent::WaypointDeleted { ccn, id: *id });
            }
            Some(d) if d <= 0 => {}
            _ => self.reload(),
        }
        false
    }
}

async fn waypoint_socket(socket: WebSocket, state: TeamState, tid: String) {
    let (publisher, mut relayed) = tokio::sync::mpsc::channel(RELAY_QUEUE);

    let api = match state.waypoint_api(&tid) {
        Ok(api) => api,
        Err(err) => {
            let _ = publisher.try_send(WireEvent::Err {
                msg: err.to_string(),
            });
            return;
        }
    };
    api.subscribe(WaypointRelay {
        api: api.clone(),
        cursor: 0,
        publisher: publisher.clone(),
    });

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            Some(evt) = relayed.recv() => {
                let is_err = matches!(evt, WireEvent::Err { .. });
                if !send_event(&mut sink, &evt).await || is_err {
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_waypoint_request(&text, &api, &publisher).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        dispatch_log::log_warn!("team waypoint socket for tid={tid} errored: {err}");
                        break;
                    }
                    None => break,
                }
            }
            else => break,
        }
    }
}

async fn handle_waypoint_request(
    text: &str,
    api: &Arc<WaypointConsumerApi<WsWaypointTransport>>,
    publisher: &tokio::sync::mpsc::Sender<WireEvent>,
) {
    let req: WireRequest = match serde_json::from_str(text) {
        Ok(req) => req,
        Err(err) => {
            let _ = publisher.try_send(WireEvent::Err {
                msg: format!("could not parse request: {err}"),
            });
            return;
        }
    };

    let result = match req {
        WireRequest::FetchWaypoints => api
            .fetch()
            .await
            .map(|(ccn, waypoints)| WireEvent::WaypointSnapshot { ccn, waypoints }),
        WireRequest::AddWaypoint { x, y } => api
            .add_waypoint(x, y)
            .await
            .map(|waypoint| WireEvent::WaypointCreated { ccn: 0, waypoint }),
        WireRequest::MoveWaypoint { seq, id, x, y } => api
            .move_waypoint(seq, id, x, y)
            .await
            .map(|waypoint| WireEvent::WaypointUpdated { ccn: 0, waypoint }),
        WireRequest::SubscribeWaypoints | WireRequest::Ping => return,
        other => Err(Error::Store(
            format!("{other:?} is not a waypoint-socket request").into(),
        )),
    };

    match result {
        Ok(evt) => {
            let _ = publisher.try_send(evt);
        }
        Err(err) => {
            let _ = publisher.try_send(WireEvent::Err {
                msg: err.to_string(),
            });
        }
    }
}

struct TruckRelay {
    api: Arc<TruckConsumerApi<WsTruckTransport>>,
    cursor: i64,
    publisher: tokio::sync::mpsc::Sender<WireEvent>,
}

impl TruckRelay {
    fn reload(&self) {
        let api = self.api.clone();
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            match api.fetch().await {
                Ok((ccn, trucks)) => {
                    let _ = publisher.try_send(WireEvent::TruckSnapshot { ccn, trucks });
                }
                Err(err) => {
                    let _ = publisher.try_send(WireEvent::Err {
                        msg: err.to_string(),
                    });
                }
            }
        });
    }
}

impl Subscriber<Truck> for TruckRelay {
    fn epoch(&mut self, _ccn: i64) -> bool {
        self.reload();
        false
    }
    fn member_created(&mut self, ccn: i64, member: &Truck) -> bool {
        match chg_distance(ccn, self.cursor) {
            Some(1) => {
                self.cursor = ccn;
                let _ = self.publisher.try_send(WireEvent::TruckCreated {
                    ccn,
                    truck: member.clone(),
                });
            }
            Some(d) if d <= 0 => {}
            _ => self.reload(),
        }
        false
    }
    fn member_updated(&mut self, ccn: i64, member: &Truck) -> bool {
        match chg_distance(ccn, self.cursor) {
            Some(1) => {
                self.cursor = ccn;
                let _ = self.publisher.try_send(WireEvent::TruckUpdated {
                    ccn,
                    truck: member.clone(),
                });
            }
            Some(d) if d <= 0 => {}
            _ => self.reload(),
        }
        false
    }
    fn member_deleted(&mut self, ccn: i64, id: &Uuid) -> bool {
        match chg_distance(ccn, self.cursor) {
            Some(1) => {
                self.cursor = ccn;
                let _ = self
                    .publisher
                    .try_send(WireEvent::TruckDeleted { ccn, id: *id });
            }
            Some(d) if d <= 0 => {}
            _ => self.reload(),
        }
        false
    }
}

async fn truck_socket(socket: WebSocket, state: TeamState, tid: String) {
    let (publisher, mut relayed) = tokio::sync::mpsc::channel(RELAY_QUEUE);

    let api = match state.truck_api(&tid) {
        Ok(api) => api,
        Err(err) => {
            let _ = publisher.try_send(WireEvent::Err {
                msg: err.to_string(),
            });
            return;
        }
    };
    api.subscribe(TruckRelay {
        api: api.clone(),
        cursor: 0,
        publisher: publisher.clone(),
    });

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            Some(evt) = relayed.recv() => {
                let is_err = matches!(evt, WireEvent::Err { .. });
                if !send_event(&mut sink, &evt).await || is_err {
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_truck_request(&text, &api, &publisher).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        dispatch_log::log_warn!("team truck socket for tid={tid} errored: {err}");
                        break;
                    }
                    None => break,
                }
            }
            else => break,
        }
    }
}

async fn handle_truck_request(
    text: &str,
    api: &Arc<TruckConsumerApi<WsTruckTransport>>,
    publisher: &tokio::sync::mpsc::Sender<WireEvent>,
) {
    let req: WireRequest = match serde_json::from_str(text) {
        Ok(req) => req,
        Err(err) => {
            let _ = publisher.try_send(WireEvent::Err {
                msg: format!("could not parse request: {err}"),
            });
            return;
        }
    };

    let result = match req {
        WireRequest::FetchTrucks => api
            .fetch()
            .await
            .map(|(ccn, trucks)| WireEvent::TruckSnapshot { ccn, trucks }),
        WireRequest::AddTruck { x, y } => api
            .add_truck(x, y)
            .await
            .map(|truck| WireEvent::TruckCreated { ccn: 0, truck }),
        WireRequest::MoveTruck { seq, id, x, y } => api
            .move_truck(seq, id, x, y)
            .await
            .map(|truck| WireEvent::TruckUpdated { ccn: 0, truck }),
        WireRequest::StopTruck { seq, id, moving } => api
            .stop_truck(seq, id, moving)
            .await
            .map(|truck| WireEvent::TruckUpdated { ccn: 0, truck }),
        WireRequest::SubscribeTrucks | WireRequest::Ping => return,
        other => Err(Error::Store(
            format!("{other:?} is not a truck-socket request").into(),
        )),
    };

    match result {
        Ok(evt) => {
            let _ = publisher.try_send(evt);
        }
        Err(err) => {
            let _ = publisher.try_send(WireEvent::Err {
                msg: err.to_string(),
            });
        }
    }
}

async fn send_event(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    evt: &WireEvent,
) -> bool {
    let text = match serde_json::to_string(evt) {
        Ok(text) => text,
        Err(err) => {
            dispatch_log::log_error!("could not serialize wire event: {err}");
            return false;
        }
    };
    if let Err(err) = sink.send(Message::Text(text.into())).await {
        dispatch_log::log_warn!("could not send wire event: {err}");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waypoint_api_sticks_to_first_tenant() {
        let state = TeamState::new("127.0.0.1:8420".to_string());
        let first = state.waypoint_api("tenant-a").unwrap();
        let again = state.waypoint_api("tenant-a").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn waypoint_api_rejects_second_tenant() {
        let state = TeamState::new("127.0.0.1:8420".to_string());
        state.waypoint_api("tenant-a").unwrap();
        match state.waypoint_api("tenant-b") {
            Err(Error::TenantMismatch { stuck, requested }) => {
                assert_eq!(stuck, "tenant-a");
                assert_eq!(requested, "tenant-b");
            }
            other => panic!("expected TenantMismatch, got {other:?}"),
        }
    }

    #[test]
    fn truck_api_sticks_independently_of_waypoint_api() {
        let state = TeamState::new("127.0.0.1:8420".to_string());
        state.waypoint_api("tenant-a").unwrap();
        // Trucks have their own slot; the first truck request is free to
        // bind to a different tenant than waypoints already bound to.
        assert!(state.truck_api("tenant-b").is_ok());
    }

    #[test]
    fn waypoint_url_embeds_tenant_and_addr() {
        let state = TeamState::new("127.0.0.1:8420".to_string());
        let url = state.waypoint_url("tenant-a").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8420/api/tenant-a/waypoint");
    }
}
