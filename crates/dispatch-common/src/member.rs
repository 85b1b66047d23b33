//! The `Member` contract every live-collection element satisfies.

use std::fmt::Debug;
use std::hash::Hash;

/// Any collection element exposing a globally unique, immutable, unordered id.
pub trait Member: Clone + Send + Sync + 'static {
    /// Opaque id type. Equality and hashing are the only operations the
    /// collection machinery relies on.
    type Id: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// The member's id.
    fn id(&self) -> Self::Id;
}
