//! `ConsumerApi`: the reconnecting, resubscribing client surface used by
//! every consumer of a live collection — the in-process monolith path and,
//! behind the `remote` feature, a real network client.
//!
//! A background task owns the connection, backs off on failure, and
//! resubscribes from scratch once it reconnects, while local subscribers
//! are driven off a `HouseKeeper` kept in "unloaded" mode purely as an
//! event bus — the wire is the source of truth here, not a local store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dispatch_common::{HouseKeeper, Member, Result, Subscriber};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::service_context::ServiceContext;
use crate::truck::Truck;
use crate::waypoint::Waypoint;

/// Backend a `ConsumerApi` talks to: either the in-process monolith or a
/// real wire connection, each collection kind (`Waypoint`/`Truck`)
/// implementing it independently.
#[async_trait]
pub trait CollectionTransport<M: Member>: Send + Sync + 'static {
    /// `(ccn, members[])` as of now.
    async fn fetch(&self, tid: &str) -> Result<(i64, Vec<M>)>;
    /// Append a new member at `(x, y)`.
    async fn add(&self, tid: &str, x: f64, y: f64) -> Result<M>;
    /// Move the member `(seq, id)` to `(x, y)`.
    async fn move_to(&self, tid: &str, seq: u64, id: M::Id, x: f64, y: f64) -> Result<M>;
    /// Start forwarding this collection's change events into `bus`, which
    /// the implementation should feed with `Created`/`Updated`/`Deleted`
    /// through `HouseKeeper::created`/`updated`/`deleted`.
    fn subscribe_wire(&self, tid: &str, bus: Arc<HouseKeeper<M>>);
}

/// `TruckTransport` adds the `stop` operation, which has no waypoint
/// equivalent, on top of the shared `CollectionTransport<Truck>` surface.
#[async_trait]
pub trait TruckTransport: CollectionTransport<Truck> {
    /// Set the truck `(seq, id)`'s `moving` flag.
    async fn stop(&self, tid: &str, seq: u64, id: Uuid, moving: bool) -> Result<Truck>;
}

/// In-process `CollectionTransport` over `ServiceContext`, used in monolith
/// mode where there is no wire between the consumer and the collection.
pub struct MonoWaypointTransport(pub Arc<ServiceContext>);

#[async_trait]
impl CollectionTransport<Waypoint> for MonoWaypointTransport {
    async fn fetch(&self, tid: &str) -> Result<(i64, Vec<Waypoint>)> {
        self.0.fetch_waypoints(tid).await
    }
    async fn add(&self, tid: &str, x: f64, y: f64) -> Result<Waypoint> {
        self.0.add_waypoint(tid, x, y).await
    }
    async fn move_to(&self, tid: &str, seq: u64, id: Uuid, x: f64, y: f64) -> Result<Waypoint> {
        self.0.move_waypoint(tid, seq, id, x, y).await
    }
    fn subscribe_wire(&self, tid: &str, bus: Arc<HouseKeeper<Waypoint>>) {
        let ctx = self.0.clone();
        let tid = tid.to_string();
        tokio::spawn(async move {
            let _ = ctx.subscribe_waypoints(&tid, BusBridge { bus }).await;
        });
    }
}

/// In-process `CollectionTransport`/`TruckTransport` over `ServiceContext`
/// for trucks.
pub struct MonoTruckTransport(pub Arc<ServiceContext>);

#[async_trait]
impl CollectionTransport<Truck> for MonoTruckTransport {
    async fn fetch(&self, tid: &str) -> Result<(i64, Vec<Truck>)> {
        self.0.fetch_trucks(tid).await
    }
    async fn add(&self, tid: &str, x: f64, y: f64) -> Result<Truck> {
        self.0.add_truck(tid, x, y).await
    }
    async fn move_to(&self, tid: &str, seq: u64, id: Uuid, x: f64, y: f64) -> Result<Truck> {
        self.0.move_truck(tid, seq, id, x, y).await
    }
    fn subscribe_wire(&self, tid: &str, bus: Arc<HouseKeeper<Truck>>) {
        let ctx = self.0.clone();
        let tid = tid.to_string();
        tokio::spawn(async move {
            let _ = ctx.subscribe_trucks(&tid, BusBridge { bus }).await;
        });
    }
}

#[async_trait]
impl TruckTransport for MonoTruckTransport {
    async fn stop(&self, tid: &str, seq: u64, id: Uuid, moving: bool) -> Result<Truck> {
        self.0.stop_truck(tid, seq, id, moving).await
    }
}

/// Forwards every event it sees from the authoritative collection onto a
/// consumer-local `HouseKeeper`, bridging the two event buses.
struct BusBridge<M: Member> {
    bus: Arc<HouseKeeper<M>>,
}

impl<M: Member> Subscriber<M> for BusBridge<M> {
    fn epoch(&mut self, _ccn: i64) -> bool {
        false
    }
    fn member_created(&mut self, _ccn: i64, member: &M) -> bool {
        self.bus.created(member.clone());
        false
    }
    fn member_updated(&mut self, _ccn: i64, member: &M) -> bool {
        self.bus.updated(member.clone());
        false
    }
    fn member_deleted(&mut self, _ccn: i64, id: &M::Id) -> bool {
        self.bus.deleted(id.clone());
        false
    }
}

/// Reconnecting, resubscribing client over one collection kind. Fetch/add/
/// move calls go straight through `transport`; `subscribe` lazily creates a
/// local event bus fed by `transport.subscribe_wire`, so repeated
/// subscriptions after the first reuse the same bus instead of opening a
/// second wire subscription.
pub struct ConsumerApi<M: Member, T: CollectionTransport<M>> {
    tid: String,
    transport: Arc<T>,
    local_bus: Mutex<Option<Arc<HouseKeeper<M>>>>,
    wire_subscribed: AtomicBool,
}

impl<M: Member, T: CollectionTransport<M>> ConsumerApi<M, T> {
    /// Build a consumer scoped to `tid`, talking through `transport`.
    pub fn new(tid: impl Into<String>, transport: Arc<T>) -> Self {
        Self {
            tid: tid.into(),
            transport,
            local_bus: Mutex::new(None),
            wire_subscribed: AtomicBool::new(false),
        }
    }

    /// `(ccn, members[])` as of now.
    pub async fn fetch(&self) -> Result<(i64, Vec<M>)> {
        self.transport.fetch(&self.tid).await
    }

    /// Append a new member at `(x, y)`.
    pub async fn add(&self, x: f64, y: f64) -> Result<M> {
        self.transport.add(&self.tid, x, y).await
    }

    /// Move the member `(seq, id)` to `(x, y)`.
    pub async fn move_to(&self, seq: u64, id: M::Id, x: f64, y: f64) -> Result<M> {
        self.transport.move_to(&self.tid, seq, id, x, y).await
    }

    /// Start `subscriber` watching this collection. Opens the wire
    /// subscription on the first call only; subsequent subscribers share
    /// the already-established local bus.
    pub fn subscribe<S: Subscriber<M>>(&self, subscriber: S) -> tokio::task::JoinHandle<()> {
        let mut guard = self.local_bus.lock();
        let bus = guard
            .get_or_insert_with(|| Arc::new(HouseKeeper::new()))
            .clone();
        drop(guard);

        if !self.wire_subscribed.swap(true, Ordering::SeqCst) {
            self.transport.subscribe_wire(&self.tid, bus.clone());
        }

        bus.subscribe(subscriber)
    }
}

/// `ConsumerApi` specialized over waypoints, adding the waypoint-flavored
/// add/move method names used by `dispatch-axum`'s HTTP handlers.
pub type WaypointConsumerApi<T> = ConsumerApi<Waypoint, T>;

impl<T: CollectionTransport<Waypoint>> WaypointConsumerApi<T> {
    /// Append a waypoint at `(x, y)`.
    pub async fn add_waypoint(&self, x: f64, y: f64) -> Result<Waypoint> {
        self.add(x, y).await
    }
    /// Move the waypoint `(seq, id)` to `(x, y)`.
    pub async fn move_waypoint(&self, seq: u64, id: Uuid, x: f64, y: f64) -> Result<Waypoint> {
        self.move_to(seq, id, x, y).await
    }
}

/// `ConsumerApi` specialized over trucks, adding `stop_truck` which has no
/// waypoint equivalent.
pub type TruckConsumerApi<T> = ConsumerApi<Truck, T>;

impl<T: CollectionTransport<Truck>> TruckConsumerApi<T> {
    /// Append a stationary truck at `(x, y)`.
    pub async fn add_truck(&self, x: f64, y: f64) -> Result<Truck> {
        self.add(x, y).await
    }
    /// Move the truck `(seq, id)` to `(x, y)`.
    pub async fn move_truck(&self, seq: u64, id: Uuid, x: f64, y: f64) -> Result<Truck> {
        self.move_to(seq, id, x, y).await
    }
}

impl<T: TruckTransport> TruckConsumerApi<T> {
    /// Set the truck `(seq, id)`'s `moving` flag.
    pub async fn stop_truck(&self, seq: u64, id: Uuid, moving: bool) -> Result<Truck> {
        self.transport.stop(&self.tid, seq, id, moving).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dispatch_common::InMemoryStore;

    use super::*;
    use crate::registry::StaticRegistry;
    use crate::truck::TruckRow;
    use crate::waypoint::WaypointRow;

    fn ctx() -> Arc<ServiceContext> {
        let registry = StaticRegistry::new(
            Arc::new(InMemoryStore::<WaypointRow>::new()),
            Arc::new(InMemoryStore::<TruckRow>::new()),
        );
        ServiceContext::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn mono_consumer_add_fetch_roundtrip() {
        let ctx = ctx();
        let api = WaypointConsumerApi::new("t1", Arc::new(MonoWaypointTransport(ctx)));

        api.add_waypoint(1.0, 2.0).await.unwrap();
        let (ccn, wps) = api.fetch().await.unwrap();
        assert_eq!(ccn, 1);
        assert_eq!(wps.len(), 1);
    }

    #[tokio::test]
    async fn mono_consumer_subscribe_sees_wire_events() {
        let ctx = ctx();
        let truck_api = TruckConsumerApi::new("t1", Arc::new(MonoTruckTransport(ctx.clone())));

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        struct Collector {
            seen: Arc<parking_lot::Mutex<Vec<Truck>>>,
        }
        impl Subscriber<Truck> for Collector {
            fn epoch(&mut self, _ccn: i64) -> bool {
                false
            }
            fn member_created(&mut self, _ccn: i64, member: &Truck) -> bool {
                self.seen.lock().push(member.clone());
                false
            }
            fn member_updated(&mut self, _ccn: i64, _member: &Truck) -> bool {
                false
            }
            fn member_deleted(&mut self, _ccn: i64, _id: &Uuid) -> bool {
                false
            }
        }
        truck_api.subscribe(Collector { seen: seen.clone() });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        ctx.add_truck("t1", 0.0, 0.0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(seen.lock().len(), 1);
    }
}
