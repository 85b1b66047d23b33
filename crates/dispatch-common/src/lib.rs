//! Shared types and primitives for the fleet dispatch backbone: the
//! lock-free-tail `EventStream` (C1), the `HouseKeeper` live collection
//! (C2), the `Subscriber`/`DispatchEvent` contract that drives both, and
//! the `DocumentStore` persistence seam.

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod document_store;
pub mod error;
pub mod event_stream;
pub mod housekeeper;
pub mod member;
pub mod subscriber;

pub use document_store::{DocumentRow, DocumentStore, InMemoryStore};
pub use error::{Error, Result};
pub use event_stream::{EventStream, StreamWatcher};
pub use housekeeper::HouseKeeper;
pub use member::Member;
pub use subscriber::{chg_distance, DispatchEvent, Subscriber};
