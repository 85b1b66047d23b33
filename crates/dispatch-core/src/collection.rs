//! Generic live-collection wrapper (C3): tenant-stickiness, a secondary
//! `by_seq` index, and the validate→write-store→mutate-memory→post-event
//! persistence protocol shared by `WaypointCollection` and `TruckCollection`.

use std::collections::HashMap;
use std::sync::Arc;

use dispatch_common::{DocumentRow, DocumentStore, Error, HouseKeeper, Member, Result, Subscriber};
use parking_lot::RwLock;

/// A member that carries a tenant-scoped, monotonically assigned sequence
/// number.
pub trait Seqed: Member {
    /// This member's sequence number.
    fn seq(&self) -> u64;
}

/// Domain wrapper around a `HouseKeeper`: loads from a `DocumentStore` for
/// one tenant, enforces tenant-stickiness, indexes members by `seq`, and
/// persists mutations before posting their events.
pub struct Collection<Row: DocumentRow>
where
    Row::Member: Seqed,
{
    tid: RwLock<Option<String>>,
    hk: HouseKeeper<Row::Member>,
    by_seq: RwLock<HashMap<u64, <Row::Member as Member>::Id>>,
    store: Arc<dyn DocumentStore<Row>>,
}

impl<Row: DocumentRow> Collection<Row>
where
    Row::Member: Seqed,
{
    /// An unloaded collection backed by `store`.
    pub fn new(store: Arc<dyn DocumentStore<Row>>) -> Arc<Self> {
        Arc::new(Self {
            tid: RwLock::new(None),
            hk: HouseKeeper::new(),
            by_seq: RwLock::new(HashMap::new()),
            store,
        })
    }

    /// Idempotent for the tenant the collection is already stuck to; loads
    /// from the store and stamps the tenant on first use; fails with
    /// `Error::TenantMismatch` for any other tenant.
    pub async fn ensure_loaded_for(&self, tid: &str) -> Result<()> {
        if let Some(stuck) = self.tid.read().as_ref() {
            return Self::check_stuck(stuck, tid);
        }

        let rows = self.store.find_by_tid(tid).await?;

        // Re-check under the write lock: another caller may have loaded
        // concurrently while we were awaiting the store.
        let mut guard = self.tid.write();
        if let Some(stuck) = guard.as_ref() {
            return Self::check_stuck(stuck, tid);
        }

        let members: Vec<Row::Member> = rows.into_iter().map(Row::into_member).collect();
        {
            let mut by_seq = self.by_seq.write();
            for m in &members {
                by_seq.insert(m.seq(), m.id());
            }
        }
        self.hk.load(members);
        *guard = Some(tid.to_string());
        Ok(())
    }

    fn check_stuck(stuck: &str, tid: &str) -> Result<()> {
        if stuck == tid {
            Ok(())
        } else {
            Err(Error::TenantMismatch {
                stuck: stuck.to_string(),
                requested: tid.to_string(),
            })
        }
    }

    /// `(ccn, members[])` as of now. Fails with `Error::NotLoaded` if
    /// `ensure_loaded_for` has never run.
    pub fn fetch_all(&self) -> Result<(i64, Vec<Row::Member>)> {
        self.hk.fetch_all()
    }

    /// The current `ccn`, without requiring the collection to be loaded.
    /// Used by wire-facing layers to stamp a response alongside the member
    /// an `add`/`mutate` call just returned.
    pub fn ccn(&self) -> i64 {
        self.hk.ccn()
    }

    /// Start `subscriber` watching this collection.
    pub fn subscribe<S: Subscriber<Row::Member>>(&self, subscriber: S) -> tokio::task::JoinHandle<()> {
        self.hk.subscribe(subscriber)
    }

    /// Assign the next tenant-wide sequence number, build the new member via
    /// `build`, write it to the store, then mutate memory and post
    /// `Created`. The store write happens before any in-memory mutation.
    pub async fn add(
        &self,
        tid: &str,
        build: impl FnOnce(u64) -> Row::Member,
    ) -> Result<Row::Member> {
        self.ensure_loaded_for(tid).await?;

        let new_seq = 1 + self.by_seq.read().len() as u64;
        let member = build(new_seq);
        let row = Row::from_member(tid, &member);

        self.store.insert(&row).await?;

        self.by_seq.write().insert(new_seq, member.id());
        self.hk.created(member.clone());
        Ok(member)
    }

    /// Validate `(seq, id)` against the index, build the updated value via
    /// `update`, write it to the store, then mutate memory and post
    /// `Updated`.
    pub async fn mutate(
        &self,
        tid: &str,
        seq: u64,
        id: &<Row::Member as Member>::Id,
        update: impl FnOnce(&Row::Member) -> Row::Member,
    ) -> Result<Row::Member> {
        self.ensure_loaded_for(tid).await?;

        match self.by_seq.read().get(&seq) {
            Some(existing_id) if existing_id == id => {}
            Some(_) => return Err(Error::IdMismatch(seq)),
            None => return Err(Error::NoSuchSeq(seq)),
        }

        let existing = self.hk.read(id)?.ok_or(Error::NoSuchSeq(seq))?;
        let updated = update(&existing);
        let row = Row::from_member(tid, &updated);

        self.store.update(tid, id, &row).await?;

        self.hk.updated(updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use dispatch_common::InMemoryStore;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: u64,
        seq: u64,
        x: f64,
    }

    impl Member for Widget {
        type Id = u64;
        fn id(&self) -> u64 {
            self.id
        }
    }

    impl Seqed for Widget {
        fn seq(&self) -> u64 {
            self.seq
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct WidgetRow {
        tid: String,
        id: u64,
        seq: u64,
        x: f64,
    }

    impl DocumentRow for WidgetRow {
        type Id = u64;
        type Member = Widget;
        fn tid(&self) -> &str {
            &self.tid
        }
        fn row_id(&self) -> u64 {
            self.id
        }
        fn from_member(tid: &str, member: &Widget) -> Self {
            WidgetRow {
                tid: tid.to_string(),
                id: member.id,
                seq: member.seq,
                x: member.x,
            }
        }
        fn into_member(self) -> Widget {
            Widget {
                id: self.id,
                seq: self.seq,
                x: self.x,
            }
        }
    }

    fn new_collection() -> Arc<Collection<WidgetRow>> {
        Collection::new(Arc::new(InMemoryStore::<WidgetRow>::new()))
    }

    #[tokio::test]
    async fn add_then_move_assigns_seq_and_persists() {
        let coll = new_collection();
        let w1 = coll
            .add("t1", |seq| Widget { id: 1, seq, x: 0.0 })
            .await
            .unwrap();
        assert_eq!(w1.seq, 1);

        let w2 = coll
            .add("t1", |seq| Widget { id: 2, seq, x: 0.0 })
            .await
            .unwrap();
        assert_eq!(w2.seq, 2);

        let moved = coll.mutate("t1", 1, &1, |w| Widget { x: 9.0, ..w.clone() }).await.unwrap();
        assert_eq!(moved.x, 9.0);

        let (ccn, members) = coll.fetch_all().unwrap();
        assert_eq!(ccn, 3);
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn second_tenant_is_rejected_once_stuck() {
        let coll = new_collection();
        coll.ensure_loaded_for("t1").await.unwrap();
        let err = coll.ensure_loaded_for("t2").await.unwrap_err();
        assert!(matches!(err, Error::TenantMismatch { .. }));
    }

    #[tokio::test]
    async fn mutate_rejects_seq_id_mismatch() {
        let coll = new_collection();
        coll.add("t1", |seq| Widget { id: 1, seq, x: 0.0 })
            .await
            .unwrap();

        let err = coll
            .mutate("t1", 1, &999, |w| w.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IdMismatch(1)));

        let err = coll
            .mutate("t1", 42, &1, |w| w.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchSeq(42)));
    }

    #[tokio::test]
    async fn reload_after_restart_recovers_index() {
        let store = Arc::new(InMemoryStore::<WidgetRow>::new());
        let coll = Collection::new(store.clone());
        coll.add("t1", |seq| Widget { id: 1, seq, x: 0.0 })
            .await
            .unwrap();

        // A fresh Collection over the same store (simulating a restart)
        // recovers `by_seq` from the persisted rows, so a subsequent add
        // still assigns seq 2 rather than clashing with seq 1.
        let reloaded = Collection::new(store);
        let w2 = reloaded
            .add("t1", |seq| Widget { id: 2, seq, x: 0.0 })
            .await
            .unwrap();
        assert_eq!(w2.seq, 2);
    }
}
