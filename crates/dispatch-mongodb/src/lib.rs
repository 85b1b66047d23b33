//! MongoDB-backed `DocumentStore` for the `waypoint` and `truck`
//! collections. Auth/session-token issuance is out of scope for this
//! workspace, so only these two collections are implemented.

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use dispatch_common::{DocumentRow, DocumentStore, Error, Result};
use dispatch_core::{TruckRow, WaypointRow};
use mongodb::bson::doc;
use mongodb::options::ReplaceOptions;
use mongodb::{Client, Collection};

/// A `DocumentStore<T>` backed by one MongoDB collection.
///
/// `T` round-trips through `bson::to_document`/`from_document` the same way
/// it would through `serde_json` — no schema beyond `T`'s own `Serialize`/
/// `Deserialize` impl plus the `tid`/row-id fields `DocumentRow` already
/// requires.
pub struct MongoDocumentStore<T> {
    collection: Collection<T>,
}

impl<T: DocumentRow> MongoDocumentStore<T> {
    /// A store backed by `db_name.collection_name` on `client`.
    pub fn new(client: &Client, db_name: &str, collection_name: &str) -> Self {
        Self {
            collection: client.database(db_name).collection(collection_name),
        }
    }
}

fn store_err(err: mongodb::error::Error) -> Error {
    Error::Store(Box::new(err))
}

#[async_trait::async_trait]
impl<T: DocumentRow> DocumentStore<T> for MongoDocumentStore<T>
where
    T::Id: serde::Serialize,
{
    async fn insert(&self, row: &T) -> Result<()> {
        self.collection.insert_one(row).await.map_err(store_err)?;
        Ok(())
    }

    async fn find_by_tid(&self, tid: &str) -> Result<Vec<T>> {
        use futures::TryStreamExt;

        let mut cursor = self
            .collection
            .find(doc! { "tid": tid })
            .await
            .map_err(store_err)?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.try_next().await.map_err(store_err)? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn update(&self, tid: &str, id: &T::Id, row: &T) -> Result<()> {
        let id_doc = mongodb::bson::to_bson(id).map_err(|e| Error::Store(Box::new(e)))?;
        self.collection
            .replace_one(doc! { "tid": tid, "id": id_doc }, row)
            .with_options(ReplaceOptions::builder().upsert(false).build())
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

/// Build the `waypoint` collection's store off one client, the way
/// `dispatchd`'s startup wiring expects it.
pub fn waypoint_store(client: &Client, db_name: &str) -> MongoDocumentStore<WaypointRow> {
    MongoDocumentStore::new(client, db_name, "waypoint")
}

/// See [`waypoint_store`].
pub fn truck_store(client: &Client, db_name: &str) -> MongoDocumentStore<TruckRow> {
    MongoDocumentStore::new(client, db_name, "truck")
}
