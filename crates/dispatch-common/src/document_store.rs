//! `DocumentStore`: the persistence primitive a `Collection` writes through
//! before mutating memory and posting an event.
//!
//! A trait-object split lets the same `Collection<T>` code in
//! `dispatch-core` work unchanged against either the in-memory store here
//! (used by tests) or `dispatch-mongodb`'s MongoDB-backed implementation.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::member::Member;

/// A row persisted in the document store: the domain struct plus the
/// tenant it belongs to.
///
/// Ties a wire/in-memory `Member` type to its on-disk shape so a generic
/// `Collection<Row>` can convert both ways without the caller threading a
/// conversion closure through every call.
pub trait DocumentRow: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Opaque row id, shared with the in-memory member's id.
    type Id: Clone + Eq + Send + Sync + 'static;

    /// The in-memory member type this row round-trips to.
    type Member: Member<Id = Self::Id>;

    /// The tenant this row belongs to.
    fn tid(&self) -> &str;

    /// This row's id.
    fn row_id(&self) -> Self::Id;

    /// Build the row persisted for `member` under `tid`.
    fn from_member(tid: &str, member: &Self::Member) -> Self;

    /// Recover the in-memory member from this row.
    fn into_member(self) -> Self::Member;
}

/// Insert/find/update primitives over one document collection (`waypoint`
/// or `truck`). Implementations are free to map `T` onto whatever physical
/// schema they like as long as round-tripping through `insert`/`find_by_tid`
/// preserves field values.
#[async_trait]
pub trait DocumentStore<T: DocumentRow>: Send + Sync {
    /// Insert a new row.
    async fn insert(&self, row: &T) -> Result<()>;

    /// Fetch every row belonging to `tid`.
    async fn find_by_tid(&self, tid: &str) -> Result<Vec<T>>;

    /// Overwrite the row identified by `(tid, id)` with `row`.
    async fn update(&self, tid: &str, id: &T::Id, row: &T) -> Result<()>;
}

/// A reference `DocumentStore` backed by an in-process map, used by unit
/// and integration tests so they do not need a MongoDB instance.
#[derive(Debug, Default)]
pub struct InMemoryStore<T> {
    rows: parking_lot::Mutex<Vec<T>>,
}

impl<T> InMemoryStore<T> {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            rows: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl<T: DocumentRow> DocumentStore<T> for InMemoryStore<T> {
    async fn insert(&self, row: &T) -> Result<()> {
        self.rows.lock().push(row.clone());
        Ok(())
    }

    async fn find_by_tid(&self, tid: &str) -> Result<Vec<T>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|r| r.tid() == tid)
            .cloned()
            .collect())
    }

    async fn update(&self, tid: &str, id: &T::Id, row: &T) -> Result<()> {
        let mut rows = self.rows.lock();
        if let Some(existing) = rows
            .iter_mut()
            .find(|r| r.tid() == tid && &r.row_id() == id)
        {
            *existing = row.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
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

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Row {
        tid: String,
        id: u64,
        label: String,
    }

    impl DocumentRow for Row {
        type Id = u64;
        type Member = Widget;
        fn tid(&self) -> &str {
            &self.tid
        }
        fn row_id(&self) -> u64 {
            self.id
        }
        fn from_member(tid: &str, member: &Widget) -> Self {
            Row {
                tid: tid.to_string(),
                id: member.id,
                label: member.label.clone(),
            }
        }
        fn into_member(self) -> Widget {
            Widget {
                id: self.id,
                label: self.label,
            }
        }
    }

    #[tokio::test]
    async fn insert_find_update_roundtrip() {
        let store = InMemoryStore::<Row>::new();
        store
            .insert(&Row {
                tid: "t1".into(),
                id: 1,
                label: "a".into(),
            })
            .await
            .unwrap();
        store
            .insert(&Row {
                tid: "t2".into(),
                id: 2,
                label: "b".into(),
            })
            .await
            .unwrap();

        let t1_rows = store.find_by_tid("t1").await.unwrap();
        assert_eq!(t1_rows, vec![Row {
            tid: "t1".into(),
            id: 1,
            label: "a".into(),
        }]);

        store
            .update(
                "t1",
                &1,
                &Row {
                    tid: "t1".into(),
                    id: 1,
                    label: "a-moved".into(),
                },
            )
            .await
            .unwrap();
        let t1_rows = store.find_by_tid("t1").await.unwrap();
        assert_eq!(t1_rows[0].label, "a-moved");
    }
}
