//! Network-mode `CollectionTransport`/`TruckTransport` over a WebSocket,
//! used when `dispatchd` runs in `--team` mode talking to a separate
//! drivers service. Reconnects with backoff and resubscribes from scratch
//! on every reconnect, one request in flight at a time since each tenant
//! gets its own connection rather than a shared multiplexed stream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dispatch_common::{Error, HouseKeeper, Result};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;
use uuid::Uuid;

use crate::consumer_api::{CollectionTransport, TruckTransport};
use crate::truck::Truck;
use crate::waypoint::Waypoint;
use crate::wire::{WireEvent, WireRequest};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(3);
const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(30);

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns one lazily-(re)established WebSocket connection to the drivers
/// service for a single tenant, and the request/response exchange over it.
///
/// A `WireConn` assumes requests are issued one at a time: it sends a
/// `WireRequest` and reads frames until it gets the matching response
/// shape, forwarding any relay events it sees along the way into whichever
/// bus a prior `SubscribeWaypoints`/`SubscribeTrucks` call registered.
pub struct WireConn {
    url: Url,
    state: SyncMutex<ConnState>,
    socket: AsyncMutex<Option<WsStream>>,
    waypoint_bus: SyncMutex<Option<Arc<HouseKeeper<Waypoint>>>>,
    truck_bus: SyncMutex<Option<Arc<HouseKeeper<Truck>>>>,
}

impl WireConn {
    /// A connection that dials `url` lazily, on first use.
    pub fn new(url: Url) -> Arc<Self> {
        Arc::new(Self {
            url,
            state: SyncMutex::new(ConnState::Disconnected),
            socket: AsyncMutex::new(None),
            waypoint_bus: SyncMutex::new(None),
            truck_bus: SyncMutex::new(None),
        })
    }

    /// Connect if not already connected, retrying with capped exponential
    /// backoff. Returns once a socket is established.
    async fn ensure_conn(&self) -> Result<()> {
        if *self.state.lock() == ConnState::Connected && self.socket.lock().await.is_some() {
            return Ok(());
        }

        *self.state.lock() = ConnState::Connecting;
        let mut backoff = RECONNECT_BACKOFF;
        loop {
            match tokio_tungstenite::connect_async(self.url.as_str()).await {
                Ok((stream, _response)) => {
                    *self.socket.lock().await = Some(stream);
                    *self.state.lock() = ConnState::Connected;
                    self.resubscribe().await;
                    return Ok(());
                }
                Err(err) => {
                    dispatch_log::log_warn!(
                        "drivers service connection failed, retrying in {backoff:?}: {err}"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff + RECONNECT_BACKOFF).min(RECONNECT_MAX_BACKOFF);
                }
            }
        }
    }

    /// After a (re)connect, re-issue any subscriptions that were active
    /// before — a fresh connection has no memory of them.
    async fn resubscribe(&self) {
        if self.waypoint_bus.lock().is_some() {
            let _ = self.send_only(&WireRequest::SubscribeWaypoints).await;
        }
        if self.truck_bus.lock().is_some() {
            let _ = self.send_only(&WireRequest::SubscribeTrucks).await;
        }
    }

    async fn send_only(&self, req: &WireRequest) -> Result<()> {
        let mut guard = self.socket.lock().await;
        let socket = guard.as_mut().ok_or(Error::ChannelClosed)?;
        let text = serde_json::to_string(req)?;
        socket
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Send `req` and wait for the first event that is either an `Err` or
    /// matches `want`. Any relay event (`*Created`/`*Updated`/`*Deleted`)
    /// seen in between is forwarded to the registered bus instead of being
    /// treated as the response.
    async fn request(&self, req: WireRequest, want: impl Fn(&WireEvent) -> bool) -> Result<WireEvent> {
        self.ensure_conn().await?;
        self.send_only(&req).await?;

        loop {
            let frame = {
                let mut guard = self.socket.lock().await;
                let socket = guard.as_mut().ok_or(Error::ChannelClosed)?;
                socket.next().await
            };

            let text = match frame {
                Some(Ok(WsMessage::Text(text))) => text,
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => {
                    *self.state.lock() = ConnState::Disconnected;
                    *self.socket.lock().await = None;
                    self.ensure_conn().await?;
                    self.send_only(&req).await?;
                    continue;
                }
            };

            let event: WireEvent = serde_json::from_str(&text)?;
            if let WireEvent::Err { msg } = &event {
                return Err(Error::Store(msg.clone().into()));
            }
            if want(&event) {
                return Ok(event);
            }
            self.relay_into_bus(event);
        }
    }

    fn relay_into_bus(&self, event: WireEvent) {
        match event {
            WireEvent::WaypointCreated { waypoint, .. } => {
                if let Some(bus) = self.waypoint_bus.lock().as_ref() {
                    bus.created(waypoint);
                }
            }
            WireEvent::WaypointUpdated { waypoint, .. } => {
                if let Some(bus) = self.waypoint_bus.lock().as_ref() {
                    bus.updated(waypoint);
                }
            }
            WireEvent::WaypointDeleted { id, .. } => {
                if let Some(bus) = self.waypoint_bus.lock().as_ref() {
                    bus.deleted(id);
                }
            }
            WireEvent::TruckCreated { truck, .. } => {
                if let Some(bus) = self.truck_bus.lock().as_ref() {
                    bus.created(truck);
                }
            }
            WireEvent::TruckUpdated { truck, .. } => {
                if let Some(bus) = self.truck_bus.lock().as_ref() {
                    bus.updated(truck);
                }
            }
            WireEvent::TruckDeleted { id, .. } => {
                if let Some(bus) = self.truck_bus.lock().as_ref() {
                    bus.deleted(id);
                }
            }
            _ => {}
        }
    }
}

/// `CollectionTransport<Waypoint>` implementation driving `WireConn`.
pub struct WsWaypointTransport(pub Arc<WireConn>);

#[async_trait]
impl CollectionTransport<Waypoint> for WsWaypointTransport {
    async fn fetch(&self, _tid: &str) -> Result<(i64, Vec<Waypoint>)> {
        let evt = self
            .0
            .request(WireRequest::FetchWaypoints, |e| {
                matches!(e, WireEvent::WaypointSnapshot { .. })
            })
            .await?;
        match evt {
            WireEvent::WaypointSnapshot { ccn, waypoints } => Ok((ccn, waypoints)),
            _ => unreachable!(),
        }
    }
    async fn add(&self, _tid: &str, x: f64, y: f64) -> Result<Waypoint> {
        let evt = self
            .0
            .request(WireRequest::AddWaypoint { x, y }, |e| {
                matches!(e, WireEvent::WaypointCreated { .. })
            })
            .await?;
        match evt {
            WireEvent::WaypointCreated { waypoint, .. } => Ok(waypoint),
            _ => unreachable!(),
        }
    }
    async fn move_to(&self, _tid: &str, seq: u64, id: Uuid, x: f64, y: f64) -> Result<Waypoint> {
        let evt = self
            .0
            .request(WireRequest::MoveWaypoint { seq, id, x, y }, |e| {
                matches!(e, WireEvent::WaypointUpdated { .. })
            })
            .await?;
        match evt {
            WireEvent::WaypointUpdated { waypoint, .. } => Ok(waypoint),
            _ => unreachable!(),
        }
    }
    fn subscribe_wire(&self, _tid: &str, bus: Arc<HouseKeeper<Waypoint>>) {
        *self.0.waypoint_bus.lock() = Some(bus);
        let conn = self.0.clone();
        tokio::spawn(async move {
            let _ = conn.send_only(&WireRequest::SubscribeWaypoints).await;
        });
    }
}

/// `CollectionTransport<Truck>`/`TruckTransport` implementation driving
/// `WireConn`.
pub struct WsTruckTransport(pub Arc<WireConn>);

#[async_trait]
impl CollectionTransport<Truck> for WsTruckTransport {
    async fn fetch(&self, _tid: &str) -> Result<(i64, Vec<Truck>)> {
        let evt = self
            .0
            .request(WireRequest::FetchTrucks, |e| {
                matches!(e, WireEvent::TruckSnapshot { .. })
            })
            .await?;
        match evt {
            WireEvent::TruckSnapshot { ccn, trucks } => Ok((ccn, trucks)),
            _ => unreachable!(),
        }
    }
    async fn add(&self, _tid: &str, x: f64, y: f64) -> Result<Truck> {
        let evt = self
            .0
            .request(WireRequest::AddTruck { x, y }, |e| {
                matches!(e, WireEvent::TruckCreated { .. })
            })
            .await?;
        match evt {
            WireEvent::TruckCreated { truck, .. } => Ok(truck),
            _ => unreachable!(),
        }
    }
    async fn move_to(&self, _tid: &str, seq: u64, id: Uuid, x: f64, y: f64) -> Result<Truck> {
        let evt = self
            .0
            .request(WireRequest::MoveTruck { seq, id, x, y }, |e| {
                matches!(e, WireEvent::TruckUpdated { .. })
            })
            .await?;
        match evt {
            WireEvent::TruckUpdated { truck, .. } => Ok(truck),
            _ => unreachable!(),
        }
    }
    fn subscribe_wire(&self, _tid: &str, bus: Arc<HouseKeeper<Truck>>) {
        *self.0.truck_bus.lock() = Some(bus);
        let conn = self.0.clone();
        tokio::spawn(async move {
            let _ = conn.send_only(&WireRequest::SubscribeTrucks).await;
        });
    }
}

#[async_trait]
impl TruckTransport for WsTruckTransport {
    async fn stop(&self, _tid: &str, seq: u64, id: Uuid, moving: bool) -> Result<Truck> {
        let evt = self
            .0
            .request(WireRequest::StopTruck { seq, id, moving }, |e| {
                matches!(e, WireEvent::TruckUpdated { .. })
            })
            .await?;
        match evt {
            WireEvent::TruckUpdated { truck, .. } => Ok(truck),
            _ => unreachable!(),
        }
    }
}
