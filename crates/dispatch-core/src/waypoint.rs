//! The `Waypoint` member and its document-store row.

use dispatch_common::{DocumentRow, Member};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::{Collection, Seqed};

/// A stop trucks can be routed toward. Ungrouped by tenant in memory — the
/// owning `Collection` is already stuck to one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Stable identity, assigned once at creation.
    pub id: Uuid,
    /// Tenant-wide sequence number, assigned in creation order.
    pub seq: u64,
    /// Display label, `#{seq}#` at creation time.
    pub label: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Member for Waypoint {
    type Id = Uuid;
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Seqed for Waypoint {
    fn seq(&self) -> u64 {
        self.seq
    }
}

/// The `waypoint` collection's on-disk row: the tenant id alongside the
/// inlined `Waypoint` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaypointRow {
    /// The tenant this row belongs to.
    pub tid: String,
    /// The waypoint itself, flattened into the row's document.
    #[serde(flatten)]
    pub waypoint: Waypoint,
}

impl DocumentRow for WaypointRow {
    type Id = Uuid;
    type Member = Waypoint;

    fn tid(&self) -> &str {
        &self.tid
    }

    fn row_id(&self) -> Uuid {
        self.waypoint.id
    }

    fn from_member(tid: &str, member: &Waypoint) -> Self {
        WaypointRow {
            tid: tid.to_string(),
            waypoint: member.clone(),
        }
    }

    fn into_member(self) -> Waypoint {
        self.waypoint
    }
}

/// A live, tenant-stuck collection of waypoints.
pub type WaypointCollection = Collection<WaypointRow>;

impl WaypointCollection {
    /// Append a new waypoint at `(x, y)`.
    pub async fn add_waypoint(&self, tid: &str, x: f64, y: f64) -> dispatch_common::Result<Waypoint> {
        self.add(tid, |seq| Waypoint {
            id: Uuid::new_v4(),
            seq,
            label: format!("#{seq}#"),
            x,
            y,
        })
        .await
    }

    /// Move the waypoint identified by `(seq, id)` to `(x, y)`.
    pub async fn move_waypoint(
        &self,
        tid: &str,
        seq: u64,
        id: Uuid,
        x: f64,
        y: f64,
    ) -> dispatch_common::Result<Waypoint> {
        self.mutate(tid, seq, &id, |existing| Waypoint {
            x,
            y,
            ..existing.clone()
        })
        .await
    }
}
