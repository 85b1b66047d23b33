//! The `Truck` member and its document-store row.

use dispatch_common::{DocumentRow, Member};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::{Collection, Seqed};

/// A vehicle that drives between waypoints when `moving` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Truck {
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
    /// Whether the driving loop should advance this truck.
    pub moving: bool,
}

impl Member for Truck {
    type Id = Uuid;
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Seqed for Truck {
    fn seq(&self) -> u64 {
        self.seq
    }
}

/// The `truck` collection's on-disk row: the tenant id alongside the
/// inlined `Truck` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruckRow {
    /// The tenant this row belongs to.
    pub tid: String,
    /// The truck itself, flattened into the row's document.
    #[serde(flatten)]
    pub truck: Truck,
}

impl DocumentRow for TruckRow {
    type Id = Uuid;
    type Member = Truck;

    fn tid(&self) -> &str {
        &self.tid
    }

    fn row_id(&self) -> Uuid {
        self.truck.id
    }

    fn from_member(tid: &str, member: &Truck) -> Self {
        TruckRow {
            tid: tid.to_string(),
            truck: member.clone(),
        }
    }

    fn into_member(self) -> Truck {
        self.truck
    }
}

/// A live, tenant-stuck collection of trucks.
pub type TruckCollection = Collection<TruckRow>;

impl TruckCollection {
    /// Append a new, stationary truck at `(x, y)`.
    pub async fn add_truck(&self, tid: &str, x: f64, y: f64) -> dispatch_common::Result<Truck> {
        self.add(tid, |seq| Truck {
            id: Uuid::new_v4(),
            seq,
            label: format!("#{seq}#"),
            x,
            y,
            moving: false,
        })
        .await
    }

    /// Move the truck identified by `(seq, id)` to `(x, y)`.
    pub async fn move_truck(
        &self,
        tid: &str,
        seq: u64,
        id: Uuid,
        x: f64,
        y: f64,
    ) -> dispatch_common::Result<Truck> {
        self.mutate(tid, seq, &id, |existing| Truck {
            x,
            y,
            ..existing.clone()
        })
        .await
    }

    /// Set the truck identified by `(seq, id)`'s `moving` flag.
    pub async fn stop_truck(
        &self,
        tid: &str,
        seq: u64,
        id: Uuid,
        moving: bool,
    ) -> dispatch_common::Result<Truck> {
        self.mutate(tid, seq, &id, |existing| Truck {
            moving,
            ..existing.clone()
        })
        .await
    }
}
