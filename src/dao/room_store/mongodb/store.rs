use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    config::MongoConfig,
    connection::connect_room_database,
    error::{MongoDaoError, MongoResult},
    models::{MongoRoomDocument, room_filter, versioned_filter},
};
use crate::dao::{
    models::{Precondition, RoomDocument, RoomPatch},
    room_store::{
        MAX_CAS_ATTEMPTS, RoomStore, RoomSubscription, plan_update, polling_subscription,
    },
    storage::{StorageError, StorageResult},
};

const ROOM_COLLECTION_NAME: &str = "rooms";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            connect_room_database(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            connect_room_database(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        Ok(Self { inner })
    }

    async fn collection(&self) -> Collection<MongoRoomDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoRoomDocument>(ROOM_COLLECTION_NAME)
    }

    async fn find_room(&self, room_id: &str) -> MongoResult<Option<RoomDocument>> {
        let collection = self.collection().await;
        let document = collection
            .find_one(room_filter(room_id))
            .await
            .map_err(|source| MongoDaoError::LoadRoom {
                room_id: room_id.to_owned(),
                source,
            })?;
        Ok(document.map(|doc| doc.room))
    }

    async fn insert_room(&self, room: RoomDocument) -> StorageResult<()> {
        let room_id = room.room_id.clone();
        let collection = self.collection().await;
        match collection.insert_one(MongoRoomDocument::from(room)).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(StorageError::AlreadyExists { room_id }),
            Err(source) => Err(MongoDaoError::SaveRoom { room_id, source }.into()),
        }
    }

    async fn update_room(
        &self,
        room_id: &str,
        patch: RoomPatch,
        precondition: Precondition,
    ) -> StorageResult<RoomDocument> {
        let collection = self.collection().await;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.find_room(room_id).await?;
            let expected_version = current.as_ref().map(|room| room.version);
            let next = plan_update(room_id, current.as_ref(), patch.clone(), &precondition)?;
            let Some(expected_version) = expected_version else {
                return Err(StorageError::not_found(room_id));
            };

            let result = collection
                .replace_one(
                    versioned_filter(room_id, expected_version),
                    MongoRoomDocument::from(next.clone()),
                )
                .await
                .map_err(|source| MongoDaoError::SaveRoom {
                    room_id: room_id.to_owned(),
                    source,
                })?;

            if result.matched_count > 0 {
                return Ok(next);
            }
            debug!(room_id, attempt, "room version moved; re-checking precondition");
        }

        Err(MongoDaoError::Contended {
            room_id: room_id.to_owned(),
            attempts: MAX_CAS_ATTEMPTS,
        }
        .into())
    }

    async fn delete_room(&self, room_id: &str) -> MongoResult<bool> {
        let collection = self.collection().await;
        let result = collection
            .delete_one(room_filter(room_id))
            .await
            .map_err(|source| MongoDaoError::DeleteRoom {
                room_id: room_id.to_owned(),
                source,
            })?;
        Ok(result.deleted_count > 0)
    }
}

impl RoomStore for MongoRoomStore {
    fn read(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Option<RoomDocument>>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        Box::pin(async move { store.find_room(&room_id).await.map_err(Into::into) })
    }

    fn create(&self, room: RoomDocument) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_room(room).await })
    }

    fn update(
        &self,
        room_id: &str,
        patch: RoomPatch,
        precondition: Precondition,
    ) -> BoxFuture<'static, StorageResult<RoomDocument>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        Box::pin(async move { store.update_room(&room_id, patch, precondition).await })
    }

    fn delete(&self, room_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        Box::pin(async move { store.delete_room(&room_id).await.map_err(Into::into) })
    }

    fn subscribe(&self, room_id: &str) -> BoxFuture<'static, StorageResult<RoomSubscription>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        let every = self.inner.config.poll_interval;
        Box::pin(async move {
            let target = room_id.clone();
            let fetch = move || {
                let store = store.clone();
                let room_id = target.clone();
                Box::pin(async move { store.find_room(&room_id).await.map_err(Into::into) })
                    as BoxFuture<'static, StorageResult<Option<RoomDocument>>>
            };
            Ok(polling_subscription(room_id, every, fetch))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
