//! `Registry`: the seam between `ServiceContext` and the two live
//! collections, replacing package-level singletons with an explicit
//! `Arc<dyn Registry>`.

use std::sync::Arc;

use dispatch_common::DocumentStore;

use crate::truck::{TruckCollection, TruckRow};
use crate::waypoint::{WaypointCollection, WaypointRow};

/// Exposes the waypoint and truck collections a `ServiceContext` operates
/// on. Solo-process deployments use `StaticRegistry`; a future sharded
/// deployment would implement this by routing `tid` to a per-shard pair of
/// collections.
pub trait Registry: Send + Sync {
    /// The waypoint collection to use.
    fn waypoints(&self) -> Arc<WaypointCollection>;
    /// The truck collection to use.
    fn trucks(&self) -> Arc<TruckCollection>;
}

/// A degenerate registry that always returns the same pair of collections,
/// regardless of tenant — a pool with exactly one member.
pub struct StaticRegistry {
    waypoints: Arc<WaypointCollection>,
    trucks: Arc<TruckCollection>,
}

impl StaticRegistry {
    /// Build a registry backed by the given stores.
    pub fn new(
        waypoint_store: Arc<dyn DocumentStore<WaypointRow>>,
        truck_store: Arc<dyn DocumentStore<TruckRow>>,
    ) -> Self {
        Self {
            waypoints: WaypointCollection::new(waypoint_store),
            trucks: TruckCollection::new(truck_store),
        }
    }
}

impl Registry for StaticRegistry {
    fn waypoints(&self) -> Arc<WaypointCollection> {
        self.waypoints.clone()
    }
    fn trucks(&self) -> Arc<TruckCollection> {
        self.trucks.clone()
    }
}
