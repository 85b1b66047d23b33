//! `GET /api/{tid}/waypoint` and `GET /api/{tid}/truck`: the WebSocket
//! session tunnel and change-relay rolled into one connection, via
//! `tokio::select!` over an internal mpsc channel and the socket's inbound
//! stream, with a CCN-distance check deciding whether an incoming change
//! can be relayed directly or requires a full reload.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use dispatch_common::{chg_distance, Subscriber};
use dispatch_core::{ServiceContext, Truck, Waypoint, WireEvent, WireRequest};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;

const RELAY_QUEUE: usize = 64;

pub(crate) async fn waypoint_ws(
    State(state): State<AppState>,
    Path(tid): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| waypoint_socket(socket, state.ctx, tid))
}

pub(crate) async fn truck_ws(
    State(state): State<AppState>,
    Path(tid): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| truck_socket(socket, state.ctx, tid))
}

/// Tracks one browser connection's last-applied `ccn` and turns
/// `DispatchEvent`s into `WireEvent` frames, dropping stale ones and
/// reloading whenever the incoming `ccn` isn't exactly one past the cursor.
struct WaypointRelay {
    ctx: Arc<ServiceContext>,
    tid: String,
    cursor: i64,
    publisher: mpsc::Sender<WireEvent>,
}

impl WaypointRelay {
    fn reload(&mut self) {
        match self.ctx.registry().waypoints().fetch_all() {
            Ok((ccn, waypoints)) => {
                self.cursor = ccn;
                let _ = self
                    .publisher
                    .try_send(WireEvent::WaypointSnapshot { ccn, waypoints });
            }
            Err(err) => {
                let _ = self.publisher.try_send(WireEvent::Err {
                    msg: err.to_string(),
                });
            }
        }
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

async fn waypoint_socket(socket: WebSocket, ctx: Arc<ServiceContext>, tid: String) {
    let (publisher, mut relayed) = mpsc::channel(RELAY_QUEUE);

    if let Err(err) = ctx
        .subscribe_waypoints(
            &tid,
            WaypointRelay {
                ctx: ctx.clone(),
                tid: tid.clone(),
                cursor: 0,
                publisher: publisher.clone(),
            },
        )
        .await
    {
        let _ = publisher.try_send(WireEvent::Err {
            msg: err.to_string(),
        });
    }

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
                        handle_waypoint_request(&text, &ctx, &tid, &publisher).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        dispatch_log::log_warn!("waypoint socket for tid={tid} errored: {err}");
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
    ctx: &Arc<ServiceContext>,
    tid: &str,
    publisher: &mpsc::Sender<WireEvent>,
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
        WireRequest::FetchWaypoints => ctx
            .fetch_waypoints(tid)
            .await
            .map(|(ccn, waypoints)| WireEvent::WaypointSnapshot { ccn, waypoints }),
        WireRequest::AddWaypoint { x, y } => ctx.add_waypoint(tid, x, y).await.map(|waypoint| {
            WireEvent::WaypointCreated {
                ccn: ctx.registry().waypoints().ccn(),
                waypoint,
            }
        }),
        WireRequest::MoveWaypoint { seq, id, x, y } => {
            ctx.move_waypoint(tid, seq, id, x, y).await.map(|waypoint| {
                WireEvent::WaypointUpdated {
                    ccn: ctx.registry().waypoints().ccn(),
                    waypoint,
                }
            })
        }
        // Already subscribed at connection open; a resubscribe request
        // (sent by `WireConn::resubscribe` after a reconnect on the
        // consumer's *other* socket) has nothing to do on this one.
        WireRequest::SubscribeWaypoints | WireRequest::Ping => return,
        other => Err(dispatch_common::Error::Store(
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
    ctx: Arc<ServiceContext>,
    tid: String,
    cursor: i64,
    publisher: mpsc::Sender<WireEvent>,
}

impl TruckRelay {
    fn reload(&mut self) {
        match self.ctx.registry().trucks().fetch_all() {
            Ok((ccn, trucks)) => {
                self.cursor = ccn;
                let _ = self
                    .publisher
                    .try_send(WireEvent::TruckSnapshot { ccn, trucks });
            }
            Err(err) => {
                let _ = self.publisher.try_send(WireEvent::Err {
                    msg: err.to_string(),
                });
            }
        }
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

async fn truck_socket(socket: WebSocket, ctx: Arc<ServiceContext>, tid: String) {
    let (publisher, mut relayed) = mpsc::channel(RELAY_QUEUE);

    if let Err(err) = ctx
        .subscribe_trucks(
            &tid,
            TruckRelay {
                ctx: ctx.clone(),
                tid: tid.clone(),
                cursor: 0,
                publisher: publisher.clone(),
            },
        )
        .await
    {
        let _ = publisher.try_send(WireEvent::Err {
            msg: err.to_string(),
        });
    }

    // kickoff drivers team TODO find a better place to do this
    if let Err(err) = ctx.drivers_kickoff(&tid).await {
        dispatch_log::log_warn!("drivers_kickoff for tid={tid} failed: {err}");
    }

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
                        handle_truck_request(&text, &ctx, &tid, &publisher).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        dispatch_log::log_warn!("truck socket for tid={tid} errored: {err}");
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
    ctx: &Arc<ServiceContext>,
    tid: &str,
    publisher: &mpsc::Sender<WireEvent>,
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
        WireRequest::FetchTrucks => ctx
            .fetch_trucks(tid)
            .await
            .map(|(ccn, trucks)| WireEvent::TruckSnapshot { ccn, trucks }),
        WireRequest::AddTruck { x, y } => ctx.add_truck(tid, x, y).await.map(|truck| {
            WireEvent::TruckCreated {
                ccn: ctx.registry().trucks().ccn(),
                truck,
            }
        }),
        WireRequest::MoveTruck { seq, id, x, y } => {
            ctx.move_truck(tid, seq, id, x, y).await.map(|truck| {
                WireEvent::TruckUpdated {
                    ccn: ctx.registry().trucks().ccn(),
                    truck,
                }
            })
        }
        WireRequest::StopTruck { seq, id, moving } => {
            ctx.stop_truck(tid, seq, id, moving).await.map(|truck| {
                WireEvent::TruckUpdated {
                    ccn: ctx.registry().trucks().ccn(),
                    truck,
                }
            })
        }
        WireRequest::SubscribeTrucks | WireRequest::Ping => return,
        other => Err(dispatch_common::Error::Store(
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
