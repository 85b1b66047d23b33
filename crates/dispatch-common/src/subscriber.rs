//! The `Subscriber` contract for a `HouseKeeper`'s event stream, and the
//! `DispatchEvent` sum type it is driven by.
//!
//! `epoch`/`member_created`/`member_updated`/`member_deleted` each return
//! `stop`, realized here as a Rust enum dispatched with an exhaustive match
//! rather than a dynamic type switch.

use std::sync::Arc;

use crate::event_stream::{EventStream, StreamWatcher};
use crate::member::Member;

/// One event posted by a `HouseKeeper<M>`.
#[derive(Debug, Clone)]
pub enum DispatchEvent<M: Member> {
    /// Synthetic event carrying the current `ccn`, used to establish or
    /// reset a subscriber's baseline.
    Epoch {
        /// The collection's change number at the time this epoch was issued.
        ccn: i64,
    },
    /// A member was created.
    Created {
        /// The `ccn` of this mutation.
        ccn: i64,
        /// The created member.
        member: M,
    },
    /// A member was updated.
    Updated {
        /// The `ccn` of this mutation.
        ccn: i64,
        /// The member's new value.
        member: M,
    },
    /// A member was deleted. Only its id is carried.
    Deleted {
        /// The `ccn` of this mutation.
        ccn: i64,
        /// The deleted member's id.
        id: M::Id,
    },
}

impl<M: Member> DispatchEvent<M> {
    /// The `ccn` every variant carries.
    pub fn ccn(&self) -> i64 {
        match self {
            DispatchEvent::Epoch { ccn }
            | DispatchEvent::Created { ccn, .. }
            | DispatchEvent::Updated { ccn, .. }
            | DispatchEvent::Deleted { ccn, .. } => *ccn,
        }
    }
}

/// An object with one callback per `DispatchEvent` variant, each returning
/// `stop`. Implementations keep whatever state they need (a wire handle, a
/// local cache pointer, a WebSocket cursor) across calls.
pub trait Subscriber<M: Member>: Send + 'static {
    /// Called once, right after this subscriber is dispatched. Returning
    /// `true` ends the subscription before any other callback runs.
    fn subscribed(&mut self) -> bool {
        false
    }

    /// An `Epoch` event was delivered.
    fn epoch(&mut self, ccn: i64) -> bool;

    /// A `Created` event was delivered.
    fn member_created(&mut self, ccn: i64, member: &M) -> bool;

    /// An `Updated` event was delivered.
    fn member_updated(&mut self, ccn: i64, member: &M) -> bool;

    /// A `Deleted` event was delivered.
    fn member_deleted(&mut self, ccn: i64, id: &M::Id) -> bool;
}

/// Adapts a `Subscriber<M>` to the raw `EventStream<DispatchEvent<M>>`
/// watcher contract, so `HouseKeeper::subscribe` can drive it with one
/// `EventStream::watch` call.
pub(crate) struct SubscriberWatcher<M: Member, S: Subscriber<M>> {
    pub(crate) subscriber: S,
    /// `ccn` to synthesize as this subscriber's opening `Epoch`, so a newly
    /// started subscriber always begins with a known baseline regardless of
    /// how far the collection has progressed.
    pub(crate) start_ccn: i64,
    _marker: std::marker::PhantomData<M>,
}

impl<M: Member, S: Subscriber<M>> SubscriberWatcher<M, S> {
    pub(crate) fn new(subscriber: S, start_ccn: i64) -> Self {
        Self {
            subscriber,
            start_ccn,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<M: Member, S: Subscriber<M>> StreamWatcher<DispatchEvent<M>> for SubscriberWatcher<M, S> {
    fn on_start(&mut self) -> bool {
        if self.subscriber.subscribed() {
            return true;
        }
        self.subscriber.epoch(self.start_ccn)
    }

    fn on_event(&mut self, evt: &DispatchEvent<M>) -> bool {
        match evt {
            DispatchEvent::Epoch { ccn } => self.subscriber.epoch(*ccn),
            DispatchEvent::Created { ccn, member } => self.subscriber.member_created(*ccn, member),
            DispatchEvent::Updated { ccn, member } => self.subscriber.member_updated(*ccn, member),
            DispatchEvent::Deleted { ccn, id } => self.subscriber.member_deleted(*ccn, id),
        }
    }
}

/// Start `subscriber` watching `stream`, synthesizing an opening `Epoch`
/// event at `start_ccn`. Returns the background task handle.
pub(crate) fn dispatch<M, S>(
    stream: &Arc<EventStream<DispatchEvent<M>>>,
    start_ccn: i64,
    subscriber: S,
) -> tokio::task::JoinHandle<()>
where
    M: Member,
    S: Subscriber<M>,
{
    stream.watch(SubscriberWatcher::new(subscriber, start_ccn))
}

/// Distance between two `ccn`s, used by the browser change-relay (C6) to
/// decide whether an event is stale, directly applicable, or a gap that
/// requires a reload.
///
/// Returns `None` on a sign mismatch between `to` and `from` or on
/// arithmetic overflow, which the caller must treat as a forced-reload
/// condition rather than a panic.
pub fn chg_distance(to: i64, from: i64) -> Option<i64> {
    if (to >= 0) != (from >= 0) {
        return None;
    }
    to.checked_sub(from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_same_sign() {
        assert_eq!(chg_distance(5, 4), Some(1));
        assert_eq!(chg_distance(4, 5), Some(-1));
        assert_eq!(chg_distance(5, 5), Some(0));
    }

    #[test]
    fn distance_sign_mismatch_is_none() {
        assert_eq!(chg_distance(i64::MIN, 1), None);
    }
}
