use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use tracing::debug;

use crate::dao::{
    models::{Precondition, RoomDocument, RoomPatch},
    room_store::{
        MAX_CAS_ATTEMPTS, RoomStore, RoomSubscription, plan_update, polling_subscription,
    },
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchRoomDocument, room_doc_id},
};

/// Result of a revision-checked PUT.
enum PutOutcome {
    Saved,
    Conflict,
}

#[derive(Clone)]
pub struct CouchRoomStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    config: Arc<CouchConfig>,
}

impl CouchRoomStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::HttpClient { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database.as_str());
        let auth = config
            .credentials
            .as_ref()
            .map(|(user, pass)| (Arc::<str>::from(user.as_str()), Arc::<str>::from(pass.as_str())));

        let store = Self {
            client,
            base_url,
            database,
            auth,
            config: Arc::new(config),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::Database {
                database: database.clone(),
                action: "checked",
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::Database {
                        database: database.clone(),
                        action: "created",
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document(&self, doc_id: &str) -> CouchResult<Option<CouchRoomDocument>> {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                doc_id: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<CouchRoomDocument>()
                .await
                .map(Some)
                .map_err(|source| CouchDaoError::Decode {
                    doc_id: doc_id.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::UnexpectedStatus {
                doc_id: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT the document; CouchDB answers 409 when `_rev` is no longer the latest revision.
    async fn put_document(&self, document: &CouchRoomDocument) -> CouchResult<PutOutcome> {
        let response = self
            .request(Method::PUT, &document.id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                doc_id: document.id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(PutOutcome::Conflict),
            status if status.is_success() => Ok(PutOutcome::Saved),
            other => Err(CouchDaoError::UnexpectedStatus {
                doc_id: document.id.clone(),
                status: other,
            }),
        }
    }

    async fn read_room(&self, room_id: &str) -> StorageResult<Option<RoomDocument>> {
        let doc = self.get_document(&room_doc_id(room_id)).await?;
        Ok(doc.map(|doc| doc.room))
    }

    async fn create_room(&self, room: RoomDocument) -> StorageResult<()> {
        let room_id = room.room_id.clone();
        match self.put_document(&CouchRoomDocument::new(room, None)).await? {
            PutOutcome::Saved => Ok(()),
            PutOutcome::Conflict => Err(StorageError::AlreadyExists { room_id }),
        }
    }

    async fn update_room(
        &self,
        room_id: &str,
        patch: RoomPatch,
        precondition: Precondition,
    ) -> StorageResult<RoomDocument> {
        let doc_id = room_doc_id(room_id);

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.get_document(&doc_id).await?;
            let rev = current.as_ref().and_then(|doc| doc.rev.clone());
            let next = plan_update(
                room_id,
                current.as_ref().map(|doc| &doc.room),
                patch.clone(),
                &precondition,
            )?;

            match self
                .put_document(&CouchRoomDocument::new(next.clone(), rev))
                .await?
            {
                PutOutcome::Saved => return Ok(next),
                PutOutcome::Conflict => {
                    debug!(room_id, attempt, "room revision moved; re-checking precondition");
                }
            }
        }

        Err(CouchDaoError::Contended {
            doc_id,
            attempts: MAX_CAS_ATTEMPTS,
        }
        .into())
    }

    async fn delete_room(&self, room_id: &str) -> StorageResult<bool> {
        let doc_id = room_doc_id(room_id);
        let Some(current) = self.get_document(&doc_id).await? else {
            return Ok(false);
        };
        let rev = current.rev.unwrap_or_default();

        let response = self
            .request(Method::DELETE, &doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                doc_id: doc_id.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::CONFLICT => Ok(false),
            status if status.is_success() => Ok(true),
            other => Err(CouchDaoError::UnexpectedStatus {
                doc_id,
                status: other,
            }
            .into()),
        }
    }
}

impl RoomStore for CouchRoomStore {
    fn read(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Option<RoomDocument>>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        Box::pin(async move { store.read_room(&room_id).await })
    }

    fn create(&self, room: RoomDocument) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create_room(room).await })
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
        Box::pin(async move { store.delete_room(&room_id).await })
    }

    fn subscribe(&self, room_id: &str) -> BoxFuture<'static, StorageResult<RoomSubscription>> {
        let store = self.clone();
        let room_id = room_id.to_owned();
        let every = self.config.poll_interval;
        Box::pin(async move {
            let target = room_id.clone();
            let fetch = move || {
                let store = store.clone();
                let room_id = target.clone();
                Box::pin(async move { store.read_room(&room_id).await })
                    as BoxFuture<'static, StorageResult<Option<RoomDocument>>>
            };
            Ok(polling_subscription(room_id, every, fetch))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = format!("{}/{}", store.base_url, store.database);
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::Transport {
                    doc_id: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::UnexpectedStatus {
                    doc_id: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
