//! `ServiceContext`: the tenant-facing operation surface — fetch, add,
//! move, stop, subscribe, and `drivers_kickoff` — sitting on top of a
//! `Registry`, generalized to work against either collection kind.

use std::sync::Arc;

use dispatch_common::{Result, Subscriber};
use uuid::Uuid;

use crate::driving;
use crate::registry::Registry;
use crate::truck::Truck;
use crate::waypoint::Waypoint;

/// Owns a `Registry` and exposes the full set of tenant-scoped operations
/// used by both the in-process `ConsumerApi` (monolith mode) and the
/// WebSocket/HTTP handlers in `dispatch-axum`.
pub struct ServiceContext {
    registry: Arc<dyn Registry>,
}

impl ServiceContext {
    /// Build a context over `registry`.
    pub fn new(registry: Arc<dyn Registry>) -> Arc<Self> {
        Arc::new(Self { registry })
    }

    /// The underlying registry, for callers (e.g. `dispatch-axum`'s relay
    /// handlers) that need a collection handle directly rather than going
    /// through the tenant-scoped operations below.
    pub fn registry(&self) -> Arc<dyn Registry> {
        self.registry.clone()
    }

    /// `(ccn, waypoints[])` for `tid`, loading it on first use.
    pub async fn fetch_waypoints(&self, tid: &str) -> Result<(i64, Vec<Waypoint>)> {
        let coll = self.registry.waypoints();
        coll.ensure_loaded_for(tid).await?;
        coll.fetch_all()
    }

    /// Append a waypoint at `(x, y)` for `tid`.
    pub async fn add_waypoint(&self, tid: &str, x: f64, y: f64) -> Result<Waypoint> {
        self.registry.waypoints().add_waypoint(tid, x, y).await
    }

    /// Move the waypoint `(seq, id)` for `tid` to `(x, y)`.
    pub async fn move_waypoint(
        &self,
        tid: &str,
        seq: u64,
        id: Uuid,
        x: f64,
        y: f64,
    ) -> Result<Waypoint> {
        self.registry.waypoints().move_waypoint(tid, seq, id, x, y).await
    }

    /// Subscribe to the waypoint collection for `tid`, loading it first.
    pub async fn subscribe_waypoints<S: Subscriber<Waypoint>>(
        &self,
        tid: &str,
        subscriber: S,
    ) -> Result<tokio::task::JoinHandle<()>> {
        let coll = self.registry.waypoints();
        coll.ensure_loaded_for(tid).await?;
        Ok(coll.subscribe(subscriber))
    }

    /// `(ccn, trucks[])` for `tid`, loading it on first use.
    pub async fn fetch_trucks(&self, tid: &str) -> Result<(i64, Vec<Truck>)> {
        let coll = self.registry.trucks();
        coll.ensure_loaded_for(tid).await?;
        coll.fetch_all()
    }

    /// Append a stationary truck at `(x, y)` for `tid`.
    pub async fn add_truck(&self, tid: &str, x: f64, y: f64) -> Result<Truck> {
        self.registry.trucks().add_truck(tid, x, y).await
    }

    /// Move the truck `(seq, id)` for `tid` to `(x, y)`.
    pub async fn move_truck(&self, tid: &str, seq: u64, id: Uuid, x: f64, y: f64) -> Result<Truck> {
        self.registry.trucks().move_truck(tid, seq, id, x, y).await
    }

    /// Set the `moving` flag of truck `(seq, id)` for `tid`.
    pub async fn stop_truck(&self, tid: &str, seq: u64, id: Uuid, moving: bool) -> Result<Truck> {
        self.registry.trucks().stop_truck(tid, seq, id, moving).await
    }

    /// Subscribe to the truck collection for `tid`, loading it first.
    pub async fn subscribe_trucks<S: Subscriber<Truck>>(
        &self,
        tid: &str,
        subscriber: S,
    ) -> Result<tokio::task::JoinHandle<()>> {
        let coll = self.registry.trucks();
        coll.ensure_loaded_for(tid).await?;
        Ok(coll.subscribe(subscriber))
    }

    /// Idempotently start the driving loop (C7) for `tid`: loads both
    /// collections, spawns one driving task per truck already present, and
    /// keeps spawning/retargeting as trucks are created/updated.
    pub async fn drivers_kickoff(&self, tid: &str) -> Result<()> {
        let waypoints = self.registry.waypoints();
        let trucks = self.registry.trucks();
        waypoints.ensure_loaded_for(tid).await?;
        trucks.ensure_loaded_for(tid).await?;
        driving::kickoff(tid.to_string(), waypoints, trucks);
        Ok(())
    }
}
