//! `HouseKeeper` (C2): an authoritative, in-memory live collection with a
//! monotonic change-number (`ccn`) and a single `EventStream` on which every
//! mutation is posted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::event_stream::EventStream;
use crate::member::Member;
use crate::subscriber::{dispatch, DispatchEvent, Subscriber};

struct Inner<M: Member> {
    /// `None` when the collection has never been `load`ed — "unloaded
    /// mode", used on the consumer side where the wire is the source of
    /// truth and only the `ccn`/event machinery is needed.
    members: Option<HashMap<M::Id, M>>,
    /// Monotonic 64-bit signed change number. Incremented by exactly 1 on
    /// every `Created`/`Updated`/`Deleted`; reset to 0 on `load`.
    ccn: i64,
}

/// Authoritative storage of one live collection, keyed by member id.
///
/// `members` and `ccn` share a single read/write lock: readers take shared
/// mode, mutators take exclusive mode and post their event while still
/// holding it, so no interleaving reader can observe a `ccn` without the
/// state it refers to already being in place.
pub struct HouseKeeper<M: Member> {
    inner: RwLock<Inner<M>>,
    ev_stream: Arc<EventStream<DispatchEvent<M>>>,
}

impl<M: Member> std::fmt::Debug for HouseKeeper<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("HouseKeeper")
            .field("loaded", &inner.members.is_some())
            .field("ccn", &inner.ccn)
            .finish()
    }
}

impl<M: Member> Default for HouseKeeper<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Member> HouseKeeper<M> {
    /// Create an unloaded housekeeper: a pure event bus with `ccn` starting
    /// at 0 and no backing map.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                members: None,
                ccn: 0,
            }),
            ev_stream: Arc::new(EventStream::new()),
        }
    }

    /// Populate `members` from `list`, reset `ccn` to 0, and post `Epoch(0)`.
    pub fn load(&self, list: impl IntoIterator<Item = M>) {
        let mut inner = self.inner.write();
        inner.members = Some(list.into_iter().map(|m| (m.id(), m)).collect());
        inner.ccn = 0;
        self.ev_stream.post(DispatchEvent::Epoch { ccn: 0 });
    }

    /// Read one member by id. Fails with `Error::NotLoaded` on an unloaded
    /// collection.
    pub fn read(&self, id: &M::Id) -> Result<Option<M>> {
        let inner = self.inner.read();
        let members = inner.members.as_ref().ok_or(Error::NotLoaded)?;
        Ok(members.get(id).cloned())
    }

    /// Snapshot the whole collection along with the `ccn` it was taken at.
    /// Fails with `Error::NotLoaded` on an unloaded collection.
    pub fn fetch_all(&self) -> Result<(i64, Vec<M>)> {
        let inner = self.inner.read();
        let members = inner.members.as_ref().ok_or(Error::NotLoaded)?;
        Ok((inner.ccn, members.values().cloned().collect()))
    }

    /// The current `ccn`, without requiring the collection to be loaded.
    pub fn ccn(&self) -> i64 {
        self.inner.read().ccn
    }

    /// Record a newly created member: bump `ccn`, insert into `members` (if
    /// loaded), and post `Created`.
    pub fn created(&self, member: M) {
        let mut inner = self.inner.write();
        inner.ccn += 1;
        let ccn = inner.ccn;
        if let Some(members) = inner.members.as_mut() {
            members.insert(member.id(), member.clone());
        }
        self.ev_stream.post(DispatchEvent::Created { ccn, member });
    }

    /// Record an updated member: bump `ccn`, overwrite `members` (if
    /// loaded), and post `Updated`.
    pub fn updated(&self, member: M) {
        let mut inner = self.inner.write();
        inner.ccn += 1;
        let ccn = inner.ccn;
        if let Some(members) = inner.members.as_mut() {
            members.insert(member.id(), member.clone());
        }
        self.ev_stream.post(DispatchEvent::Updated { ccn, member });
    }

    /// Record a deletion: bump `ccn`, remove from `members` (if loaded),
    /// and post `Deleted`.
    pub fn deleted(&self, id: M::Id) {
        let mut inner = self.inner.write();
        inner.ccn += 1;
        let ccn = inner.ccn;
        if let Some(members) = inner.members.as_mut() {
            members.remove(&id);
        }
        self.ev_stream.post(DispatchEvent::Deleted { ccn, id });
    }

    /// Start `subscriber` watching this collection's event stream. The
    /// subscriber's opening `Epoch` is synthesized at the `ccn` current at
    /// the moment of subscription, so it always has a well-defined
    /// baseline.
    pub fn subscribe<S: Subscriber<M>>(&self, subscriber: S) -> tokio::task::JoinHandle<()> {
        let ccn = self.ccn();
        dispatch(&self.ev_stream, ccn, subscriber)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget {
        id: u64,
        label: String,
    }

    impl Member for Widget {
        type Id = u64;
        fn id(&self) -> u64 {
            self.id
        }
    }

    struct RecordingSubscriber {
        epochs: Arc<Mutex<Vec<i64>>>,
        created: Arc<Mutex<Vec<(i64, Widget)>>>,
        updated: Arc<Mutex<Vec<(i64, Widget)>>>,
    }

    use parking_lot::Mutex;

    impl Subscriber<Widget> for RecordingSubscriber {
        fn epoch(&mut self, ccn: i64) -> bool {
            self.epochs.lock().push(ccn);
            false
        }
        fn member_created(&mut self, ccn: i64, member: &Widget) -> bool {
            self.created.lock().push((ccn, member.clone()));
            false
        }
        fn member_updated(&mut self, ccn: i64, member: &Widget) -> bool {
            self.updated.lock().push((ccn, member.clone()));
            false
        }
        fn member_deleted(&mut self, _ccn: i64, _id: &u64) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn single_add_then_move() {
        let hk = HouseKeeper::<Widget>::new();
        hk.load(Vec::<Widget>::new());

        hk.created(Widget {
            id: 1,
            label: "#1#".into(),
        });
        hk.updated(Widget {
            id: 1,
            label: "#1-moved#".into(),
        });

        let (ccn, members) = hk.fetch_all().unwrap();
        assert_eq!(ccn, 2);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].label, "#1-moved#");
    }

    #[tokio::test]
    async fn two_subscribers_fan_out() {
        let hk = Arc::new(HouseKeeper::<Widget>::new());
        hk.load(Vec::<Widget>::new());

        let a_epochs = Arc::new(Mutex::new(Vec::new()));
        let a_created = Arc::new(Mutex::new(Vec::new()));
        let a_updated = Arc::new(Mutex::new(Vec::new()));
        hk.subscribe(RecordingSubscriber {
            epochs: a_epochs.clone(),
            created: a_created.clone(),
            updated: a_updated.clone(),
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        hk.created(Widget {
            id: 1,
            label: "a".into(),
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let b_epochs = Arc::new(Mutex::new(Vec::new()));
        let b_created = Arc::new(Mutex::new(Vec::new()));
        let b_updated = Arc::new(Mutex::new(Vec::new()));
        hk.subscribe(RecordingSubscriber {
            epochs: b_epochs.clone(),
            created: b_created.clone(),
            updated: b_updated.clone(),
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        hk.updated(Widget {
            id: 1,
            label: "b".into(),
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(*a_epochs.lock(), vec![0]);
        assert_eq!(a_created.lock().len(), 1);
        assert_eq!(a_updated.lock().len(), 1);

        assert_eq!(*b_epochs.lock(), vec![1]);
        assert_eq!(b_created.lock().len(), 0);
        assert_eq!(b_updated.lock().len(), 1);
    }

    #[tokio::test]
    async fn unloaded_housekeeper_rejects_reads() {
        let hk = HouseKeeper::<Widget>::new();
        assert!(matches!(hk.fetch_all(), Err(Error::NotLoaded)));
        assert!(matches!(hk.read(&1), Err(Error::NotLoaded)));

        // Mutators still emit events with a monotonic ccn even though
        // there is no backing map to update.
        hk.created(Widget {
            id: 1,
            label: "x".into(),
        });
        assert_eq!(hk.ccn(), 1);
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_producer() {
        let hk = Arc::new(HouseKeeper::<Widget>::new());
        hk.load(Vec::<Widget>::new());

        let seen = Arc::new(AtomicI64::new(0));
        let seen_task = seen.clone();
        struct Slow {
            seen: Arc<AtomicI64>,
        }
        impl Subscriber<Widget> for Slow {
            fn epoch(&mut self, _ccn: i64) -> bool {
                false
            }
            fn member_created(&mut self, ccn: i64, _member: &Widget) -> bool {
                self.seen.store(ccn, Ordering::SeqCst);
                false
            }
            fn member_updated(&mut self, ccn: i64, _member: &Widget) -> bool {
                self.seen.store(ccn, Ordering::SeqCst);
                false
            }
            fn member_deleted(&mut self, ccn: i64, _id: &u64) -> bool {
                self.seen.store(ccn, Ordering::SeqCst);
                false
            }
        }
        hk.subscribe(Slow { seen: seen_task });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let start = std::time::Instant::now();
        for i in 0..100u64 {
            hk.updated(Widget {
                id: 1,
                label: format!("{i}"),
            });
        }
        assert!(start.elapsed() < std::time::Duration::from_millis(50));

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 100);
    }
}
