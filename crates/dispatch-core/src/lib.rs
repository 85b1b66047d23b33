//! Core domain library for the fleet dispatch backbone: live waypoint and
//! truck collections (C3), the tenant operation surface (C4), the
//! reconnecting consumer client (C5), the wire envelope shared with the
//! relay (C6), and the truck driving loop (C7).

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod collection;
pub mod consumer_api;
pub mod driving;
pub mod registry;
#[cfg(feature = "remote")]
pub mod remote_transport;
pub mod service_context;
pub mod truck;
pub mod waypoint;
pub mod wire;

pub use collection::{Collection, Seqed};
pub use consumer_api::{
    CollectionTransport, ConsumerApi, MonoTruckTransport, MonoWaypointTransport, TruckConsumerApi,
    TruckTransport, WaypointConsumerApi,
};
#[cfg(feature = "remote")]
pub use remote_transport::{WireConn, WsTruckTransport, WsWaypointTransport};
pub use registry::{Registry, StaticRegistry};
pub use service_context::ServiceContext;
pub use truck::{Truck, TruckCollection, TruckRow};
pub use waypoint::{Waypoint, WaypointCollection, WaypointRow};
pub use wire::{WireEvent, WireRequest};
