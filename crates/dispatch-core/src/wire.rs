//! The JSON-over-WebSocket envelope shared by `dispatch-axum`'s relay
//! handlers and `ConsumerApi`'s network-mode transport. Carries the
//! `Xx{Epoch,Created,Updated,Deleted}` change notifications and the
//! request/response RPCs of the session tunnel as one `serde`-tagged enum
//! pair.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::truck::Truck;
use crate::waypoint::Waypoint;

/// A request sent from a consumer to the service over the session tunnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WireRequest {
    /// `/api/{tid}/waypoint` fetch.
    FetchWaypoints,
    /// `/api/{tid}/waypoint/add`.
    AddWaypoint {
        /// X coordinate.
        x: f64,
        /// Y coordinate.
        y: f64,
    },
    /// `/api/{tid}/waypoint/move`.
    MoveWaypoint {
        /// The waypoint's sequence number.
        seq: u64,
        /// The waypoint's id.
        id: Uuid,
        /// New X coordinate.
        x: f64,
        /// New Y coordinate.
        y: f64,
    },
    /// Begin relaying waypoint change events.
    SubscribeWaypoints,
    /// `/api/{tid}/truck` fetch.
    FetchTrucks,
    /// `/api/{tid}/truck/add`.
    AddTruck {
        /// X coordinate.
        x: f64,
        /// Y coordinate.
        y: f64,
    },
    /// `/api/{tid}/truck/move`.
    MoveTruck {
        /// The truck's sequence number.
        seq: u64,
        /// The truck's id.
        id: Uuid,
        /// New X coordinate.
        x: f64,
        /// New Y coordinate.
        y: f64,
    },
    /// `/api/{tid}/truck/stop`.
    StopTruck {
        /// The truck's sequence number.
        seq: u64,
        /// The truck's id.
        id: Uuid,
        /// The new `moving` value.
        moving: bool,
    },
    /// Begin relaying truck change events.
    SubscribeTrucks,
    /// A zero-length keep-alive; receiving it is itself the meaningful act.
    Ping,
}

/// A response or relayed event sent from the service to a consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// Snapshot returned from `FetchWaypoints`.
    WaypointSnapshot {
        /// The collection's `ccn` as of this snapshot.
        ccn: i64,
        /// Every waypoint currently known.
        waypoints: Vec<Waypoint>,
    },
    /// A waypoint subscription's opening or resubscribe baseline.
    WaypointEpoch {
        /// The baseline `ccn`.
        ccn: i64,
    },
    /// A waypoint was created.
    WaypointCreated {
        /// The mutation's `ccn`.
        ccn: i64,
        /// The created waypoint.
        waypoint: Waypoint,
    },
    /// A waypoint was updated.
    WaypointUpdated {
        /// The mutation's `ccn`.
        ccn: i64,
        /// The waypoint's new value.
        waypoint: Waypoint,
    },
    /// A waypoint was deleted.
    WaypointDeleted {
        /// The mutation's `ccn`.
        ccn: i64,
        /// The deleted waypoint's id.
        id: Uuid,
    },
    /// Snapshot returned from `FetchTrucks`.
    TruckSnapshot {
        /// The collection's `ccn` as of this snapshot.
        ccn: i64,
        /// Every truck currently known.
        trucks: Vec<Truck>,
    },
    /// A truck subscription's opening or resubscribe baseline.
    TruckEpoch {
        /// The baseline `ccn`.
        ccn: i64,
    },
    /// A truck was created.
    TruckCreated {
        /// The mutation's `ccn`.
        ccn: i64,
        /// The created truck.
        truck: Truck,
    },
    /// A truck was updated.
    TruckUpdated {
        /// The mutation's `ccn`.
        ccn: i64,
        /// The truck's new value.
        truck: Truck,
    },
    /// A truck was deleted.
    TruckDeleted {
        /// The mutation's `ccn`.
        ccn: i64,
        /// The deleted truck's id.
        id: Uuid,
    },
    /// An operation failed; sent in place of the expected response, then
    /// the connection is closed.
    Err {
        /// A human-readable message.
        msg: String,
    },
}
