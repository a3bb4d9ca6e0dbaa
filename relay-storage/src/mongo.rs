//! MongoDB-backed storage.
//!
//! The remote counterpart of the SQLite backend: the same [`Storage`]
//! contract over a document store. Each bulk operation maps to a single
//! `bulkWrite` round-trip. Multi-statement writes are serialized through a
//! per-instance async lock; readers do not take it.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{Binary, Bson, Document, doc};
use mongodb::options::{DeleteManyModel, IndexOptions, UpdateOneModel, WriteModel};
use mongodb::{Client, Database, IndexModel, Namespace};
use tokio::sync::Mutex;

use crate::peer::input_peer;
use crate::storage::{DcAddress, Storage, USERNAMES_TTL, UpdateState, normalize_media};
use crate::{InputPeer, PeerType, PeerUpdate, StorageError};

/// Mirrors the embedded backend's schema version; documents are schemaless,
/// so migrating is a version bump.
const SCHEMA_VERSION: u32 = 4;

const SESSION: &str = "session";
const PEERS: &str = "peers";
const USERNAMES: &str = "usernames";
const UPDATE_STATE: &str = "update_state";
const DC_OPTIONS: &str = "dc_options";
const VERSION: &str = "version";

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// MongoDB-backed [`Storage`].
pub struct MongoStorage {
    client: Client,
    db: Database,
    /// Whether `delete()` also wipes the peer and username caches.
    remove_peers: bool,
    /// Serializes multi-document writes from this instance. Callers must
    /// still route all writes through a single owner; this lock only keeps
    /// one instance's own bulk writes from interleaving.
    write_lock: Mutex<()>,
}

impl MongoStorage {
    /// Connect to `uri` and use the database named `name`.
    pub async fn connect(uri: &str, name: &str, remove_peers: bool) -> Result<Self, StorageError> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self::with_client(client, name, remove_peers))
    }

    /// Reuse an existing client, e.g. one shared with application data.
    pub fn with_client(client: Client, name: &str, remove_peers: bool) -> Self {
        let db = client.database(name);
        Self { client, db, remove_peers, write_lock: Mutex::new(()) }
    }

    fn namespace(&self, collection: &str) -> Namespace {
        self.db.collection::<Document>(collection).namespace()
    }

    async fn session_doc(&self) -> Result<Document, StorageError> {
        self.db
            .collection::<Document>(SESSION)
            .find_one(doc! { "_id": 0 })
            .await?
            .ok_or_else(|| StorageError::NotFound("session".into()))
    }

    async fn set_session_field(&self, field: &str, value: Bson) -> Result<(), StorageError> {
        let mut set = Document::new();
        set.insert(field, value);
        self.db
            .collection::<Document>(SESSION)
            .update_one(doc! { "_id": 0 }, doc! { "$set": set })
            .upsert(true)
            .await?;
        Ok(())
    }

    /// Resolve a peer document into a wire-ready reference.
    fn input_peer_from(doc: &Document, id: i64) -> Result<InputPeer, StorageError> {
        let access_hash = doc_i64(doc, "access_hash").unwrap_or(0);
        let type_str = doc
            .get_str("type")
            .map_err(|_| StorageError::NotFound(format!("peer {id} type")))?;
        Ok(input_peer(id, access_hash, type_str.parse::<PeerType>()?))
    }
}

fn doc_i64(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key) {
        Some(Bson::Int32(v)) => Some(*v as i64),
        Some(Bson::Int64(v)) => Some(*v),
        _ => None,
    }
}

fn doc_bool(doc: &Document, key: &str) -> Option<bool> {
    match doc.get(key) {
        Some(Bson::Boolean(v)) => Some(*v),
        _ => None,
    }
}

fn binary(bytes: &[u8]) -> Bson {
    Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes: bytes.to_vec() })
}

#[async_trait]
impl Storage for MongoStorage {
    async fn open(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let session = self.db.collection::<Document>(SESSION);
        if session.find_one(doc! { "_id": 0 }).await?.is_none() {
            session
                .insert_one(doc! {
                    "_id": 0,
                    "dc_id": 2_i32,
                    "api_id": Bson::Null,
                    "test_mode": Bson::Null,
                    "auth_key": Bson::Null,
                    "date": 0_i64,
                    "user_id": Bson::Null,
                    "is_bot": Bson::Null,
                })
                .await?;
        }

        let version = self.db.collection::<Document>(VERSION);
        match version.find_one(doc! { "_id": 0 }).await? {
            None => {
                version
                    .insert_one(doc! { "_id": 0, "number": SCHEMA_VERSION as i32 })
                    .await?;
            }
            Some(found) => {
                let stored = doc_i64(&found, "number").unwrap_or(0) as u32;
                if stored < SCHEMA_VERSION {
                    // Documents carry no fixed columns; catching up is a bump.
                    version
                        .update_one(
                            doc! { "_id": 0 },
                            doc! { "$set": { "number": SCHEMA_VERSION as i32 } },
                        )
                        .await?;
                    log::info!("[mongo] migrated schema v{stored} → v{SCHEMA_VERSION}");
                }
            }
        }

        self.db
            .collection::<Document>(DC_OPTIONS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "dc_id": 1, "is_ipv6": 1, "is_media": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        Ok(())
    }

    async fn save(&self) -> Result<(), StorageError> {
        self.set_session_field("date", Bson::Int64(now_unix())).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        // The driver's connection pool unwinds when the last clone drops.
        log::debug!("[mongo] close requested; pool is managed by the driver");
        Ok(())
    }

    async fn delete(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.db
            .collection::<Document>(SESSION)
            .delete_one(doc! { "_id": 0 })
            .await?;
        if self.remove_peers {
            self.db.collection::<Document>(PEERS).drop().await?;
            self.db.collection::<Document>(USERNAMES).drop().await?;
        }
        Ok(())
    }

    async fn dc_id(&self) -> Result<u32, StorageError> {
        let doc = self.session_doc().await?;
        doc_i64(&doc, "dc_id")
            .map(|v| v as u32)
            .ok_or_else(|| StorageError::NotFound("session dc_id".into()))
    }

    async fn set_dc_id(&self, value: u32) -> Result<(), StorageError> {
        self.set_session_field("dc_id", Bson::Int32(value as i32)).await
    }

    async fn api_id(&self) -> Result<Option<i32>, StorageError> {
        let doc = self.session_doc().await?;
        Ok(doc_i64(&doc, "api_id").map(|v| v as i32))
    }

    async fn set_api_id(&self, value: i32) -> Result<(), StorageError> {
        self.set_session_field("api_id", Bson::Int32(value)).await
    }

    async fn test_mode(&self) -> Result<bool, StorageError> {
        let doc = self.session_doc().await?;
        Ok(doc_bool(&doc, "test_mode").unwrap_or(false))
    }

    async fn set_test_mode(&self, value: bool) -> Result<(), StorageError> {
        self.set_session_field("test_mode", Bson::Boolean(value)).await
    }

    async fn auth_key(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let doc = self.session_doc().await?;
        match doc.get("auth_key") {
            Some(Bson::Binary(bin)) => Ok(Some(bin.bytes.clone())),
            _ => Ok(None),
        }
    }

    async fn set_auth_key(&self, value: Option<&[u8]>) -> Result<(), StorageError> {
        let value = match value {
            Some(bytes) => binary(bytes),
            None => Bson::Null,
        };
        self.set_session_field("auth_key", value).await
    }

    async fn date(&self) -> Result<i64, StorageError> {
        let doc = self.session_doc().await?;
        Ok(doc_i64(&doc, "date").unwrap_or(0))
    }

    async fn set_date(&self, value: i64) -> Result<(), StorageError> {
        self.set_session_field("date", Bson::Int64(value)).await
    }

    async fn user_id(&self) -> Result<Option<i64>, StorageError> {
        let doc = self.session_doc().await?;
        Ok(doc_i64(&doc, "user_id"))
    }

    async fn set_user_id(&self, value: i64) -> Result<(), StorageError> {
        self.set_session_field("user_id", Bson::Int64(value)).await
    }

    async fn is_bot(&self) -> Result<bool, StorageError> {
        let doc = self.session_doc().await?;
        Ok(doc_bool(&doc, "is_bot").unwrap_or(false))
    }

    async fn set_is_bot(&self, value: bool) -> Result<(), StorageError> {
        self.set_session_field("is_bot", Bson::Boolean(value)).await
    }

    async fn update_peers(&self, peers: &[PeerUpdate]) -> Result<(), StorageError> {
        if peers.is_empty() {
            return Ok(());
        }
        let ns = self.namespace(PEERS);
        let now = now_unix();
        let models: Vec<WriteModel> = peers
            .iter()
            .map(|peer| {
                WriteModel::UpdateOne(
                    UpdateOneModel::builder()
                        .namespace(ns.clone())
                        .filter(doc! { "_id": peer.id })
                        .update(doc! { "$set": {
                            "access_hash": peer.access_hash,
                            "type": peer.peer_type.as_str(),
                            "username": peer.username.as_ref()
                                .map(|u| Bson::String(u.to_lowercase()))
                                .unwrap_or(Bson::Null),
                            "phone_number": peer.phone_number.as_ref()
                                .map(|p| Bson::String(p.clone()))
                                .unwrap_or(Bson::Null),
                            "last_update_on": now,
                        } })
                        .upsert(true)
                        .build(),
                )
            })
            .collect();

        let _guard = self.write_lock.lock().await;
        self.client.bulk_write(models).await?;
        log::debug!("[mongo] upserted {} peer(s)", peers.len());
        Ok(())
    }

    async fn update_usernames(&self, usernames: &[(i64, Vec<String>)]) -> Result<(), StorageError> {
        if usernames.is_empty() {
            return Ok(());
        }
        let ns = self.namespace(USERNAMES);
        let now = now_unix();
        let mut models: Vec<WriteModel> = Vec::new();
        for (peer_id, names) in usernames {
            // Ordered bulk: the wipe lands before the fresh rows.
            models.push(WriteModel::DeleteMany(
                DeleteManyModel::builder()
                    .namespace(ns.clone())
                    .filter(doc! { "peer_id": *peer_id })
                    .build(),
            ));
            for name in names {
                models.push(WriteModel::UpdateOne(
                    UpdateOneModel::builder()
                        .namespace(ns.clone())
                        .filter(doc! { "_id": name.to_lowercase() })
                        .update(doc! { "$set": {
                            "peer_id": *peer_id,
                            "last_update_on": now,
                        } })
                        .upsert(true)
                        .build(),
                ));
            }
        }

        let _guard = self.write_lock.lock().await;
        self.client.bulk_write(models).await?;
        Ok(())
    }

    async fn get_peer_by_id(&self, id: i64) -> Result<InputPeer, StorageError> {
        let doc = self
            .db
            .collection::<Document>(PEERS)
            .find_one(doc! { "_id": id })
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("peer id {id}")))?;
        Self::input_peer_from(&doc, id)
    }

    async fn get_peer_by_username(&self, username: &str) -> Result<InputPeer, StorageError> {
        let username = username.to_lowercase();
        let peers = self.db.collection::<Document>(PEERS);

        let (peer, last_update_on) = match peers
            .find_one(doc! { "username": username.as_str() })
            .sort(doc! { "last_update_on": -1 })
            .await?
        {
            Some(doc) => {
                let stamp = doc_i64(&doc, "last_update_on").unwrap_or(0);
                (doc, stamp)
            }
            None => {
                // Fragment usernames are a level of indirection away.
                let entry = self
                    .db
                    .collection::<Document>(USERNAMES)
                    .find_one(doc! { "_id": username.as_str() })
                    .await?
                    .ok_or_else(|| StorageError::NotFound(format!("username {username}")))?;
                let stamp = doc_i64(&entry, "last_update_on").unwrap_or(0);
                let peer_id = doc_i64(&entry, "peer_id")
                    .ok_or_else(|| StorageError::NotFound(format!("username {username}")))?;
                let peer = peers
                    .find_one(doc! { "_id": peer_id })
                    .await?
                    .ok_or_else(|| StorageError::NotFound(format!("peer id {peer_id}")))?;
                (peer, stamp)
            }
        };

        if now_unix() - last_update_on > USERNAMES_TTL {
            return Err(StorageError::Expired(format!("username {username}")));
        }
        let id = doc_i64(&peer, "_id")
            .ok_or_else(|| StorageError::NotFound(format!("username {username}")))?;
        Self::input_peer_from(&peer, id)
    }

    async fn get_peer_by_phone_number(&self, phone_number: &str) -> Result<InputPeer, StorageError> {
        let doc = self
            .db
            .collection::<Document>(PEERS)
            .find_one(doc! { "phone_number": phone_number })
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("phone number {phone_number}")))?;
        let id = doc_i64(&doc, "_id")
            .ok_or_else(|| StorageError::NotFound(format!("phone number {phone_number}")))?;
        Self::input_peer_from(&doc, id)
    }

    async fn states(&self) -> Result<Vec<UpdateState>, StorageError> {
        let mut cursor = self
            .db
            .collection::<Document>(UPDATE_STATE)
            .find(doc! {})
            .await?;
        let mut states = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            states.push(UpdateState {
                id: doc_i64(&doc, "_id").unwrap_or(0),
                pts: doc_i64(&doc, "pts").unwrap_or(0) as i32,
                qts: doc_i64(&doc, "qts").unwrap_or(0) as i32,
                date: doc_i64(&doc, "date").unwrap_or(0) as i32,
                seq: doc_i64(&doc, "seq").unwrap_or(0) as i32,
            });
        }
        Ok(states)
    }

    async fn update_state(&self, state: UpdateState) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.db
            .collection::<Document>(UPDATE_STATE)
            .update_one(
                doc! { "_id": state.id },
                doc! { "$set": {
                    "pts": state.pts,
                    "qts": state.qts,
                    "date": state.date,
                    "seq": state.seq,
                } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn remove_state(&self, id: i64) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.db
            .collection::<Document>(UPDATE_STATE)
            .delete_one(doc! { "_id": id })
            .await?;
        Ok(())
    }

    async fn update_dc_address(&self, dc: DcAddress) -> Result<(), StorageError> {
        let is_media = normalize_media(dc.dc_id, dc.is_media);
        let _guard = self.write_lock.lock().await;
        self.db
            .collection::<Document>(DC_OPTIONS)
            .update_one(
                doc! {
                    "dc_id": dc.dc_id as i32,
                    "is_ipv6": dc.is_ipv6,
                    "is_media": is_media,
                },
                doc! { "$set": {
                    "address": dc.address,
                    "port": dc.port as i32,
                    "is_default_ip": dc.is_default_ip,
                } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn get_dc_address(
        &self,
        dc_id: u32,
        is_ipv6: bool,
        is_media: bool,
    ) -> Result<Option<DcAddress>, StorageError> {
        let is_media = normalize_media(dc_id, is_media);
        let found = self
            .db
            .collection::<Document>(DC_OPTIONS)
            .find_one(doc! {
                "dc_id": dc_id as i32,
                "is_ipv6": is_ipv6,
                "is_media": is_media,
            })
            .await?;
        Ok(found.map(|doc| DcAddress {
            dc_id,
            address: doc.get_str("address").unwrap_or_default().to_string(),
            port: doc_i64(&doc, "port").unwrap_or(443) as u16,
            is_ipv6,
            is_media,
            is_default_ip: doc_bool(&doc, "is_default_ip").unwrap_or(false),
        }))
    }

    async fn version(&self) -> Result<u32, StorageError> {
        let doc = self
            .db
            .collection::<Document>(VERSION)
            .find_one(doc! { "_id": 0 })
            .await?
            .ok_or_else(|| StorageError::NotFound("schema version".into()))?;
        Ok(doc_i64(&doc, "number").unwrap_or(0) as u32)
    }

    async fn set_version(&self, value: u32) -> Result<(), StorageError> {
        self.db
            .collection::<Document>(VERSION)
            .update_one(
                doc! { "_id": 0 },
                doc! { "$set": { "number": value as i32 } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }
}
