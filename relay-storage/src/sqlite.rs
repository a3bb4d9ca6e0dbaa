//! SQLite-backed storage.
//!
//! One connection is opened at [`Storage::open`] and reused for the life of
//! the process. The schema carries a monotonic version; migrations are
//! additive, straight-line, and applied exactly once at open, followed by a
//! `VACUUM` pass. Peer freshness (`last_update_on`) is maintained by
//! database triggers, so it holds no matter which code path writes.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use crate::peer::input_peer;
use crate::storage::{DcAddress, Storage, USERNAMES_TTL, UpdateState, normalize_media};
use crate::{InputPeer, PeerType, PeerUpdate, StorageError};

/// Latest schema version. Bump together with a new migration step below.
const SCHEMA_VERSION: u32 = 4;

/// Sessions start out pointed at DC 2 until the server says otherwise.
const DEFAULT_DC_ID: u32 = 2;

const BASE_SCHEMA: &str = "
CREATE TABLE sessions (
    dc_id     INTEGER PRIMARY KEY,
    api_id    INTEGER,
    test_mode INTEGER,
    auth_key  BLOB,
    date      INTEGER NOT NULL,
    user_id   INTEGER,
    is_bot    INTEGER
);

CREATE TABLE peers (
    id             INTEGER PRIMARY KEY,
    access_hash    INTEGER,
    type           TEXT NOT NULL,
    username       TEXT,
    phone_number   TEXT,
    last_update_on INTEGER NOT NULL DEFAULT (CAST(STRFTIME('%s', 'now') AS INTEGER))
);

CREATE INDEX idx_peers_id ON peers (id);
CREATE INDEX idx_peers_username ON peers (username);
CREATE INDEX idx_peers_phone_number ON peers (phone_number);

CREATE TRIGGER trg_peers_last_update_on
    AFTER UPDATE ON peers
BEGIN
    UPDATE peers
    SET last_update_on = CAST(STRFTIME('%s', 'now') AS INTEGER)
    WHERE id = NEW.id;
END;

CREATE TABLE version (
    number INTEGER PRIMARY KEY
);
";

/// v2: secondary cache for non-primary (fragment) usernames.
const USERNAMES_SCHEMA: &str = "
CREATE TABLE usernames (
    id             TEXT PRIMARY KEY,
    peer_id        INTEGER NOT NULL,
    last_update_on INTEGER NOT NULL DEFAULT (CAST(STRFTIME('%s', 'now') AS INTEGER))
);

CREATE INDEX idx_usernames_peer_id ON usernames (peer_id);

CREATE TRIGGER trg_usernames_last_update_on
    AFTER UPDATE ON usernames
BEGIN
    UPDATE usernames
    SET last_update_on = CAST(STRFTIME('%s', 'now') AS INTEGER)
    WHERE id = NEW.id;
END;
";

/// v3: per-entity update-stream positions.
const UPDATE_STATE_SCHEMA: &str = "
CREATE TABLE update_state (
    id   INTEGER PRIMARY KEY,
    pts  INTEGER,
    qts  INTEGER,
    date INTEGER,
    seq  INTEGER
);
";

/// v4: learned DC addresses.
const DC_OPTIONS_SCHEMA: &str = "
CREATE TABLE dc_options (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    dc_id         INTEGER NOT NULL,
    address       TEXT NOT NULL,
    port          INTEGER NOT NULL,
    is_ipv6       INTEGER NOT NULL DEFAULT 0,
    is_media      INTEGER NOT NULL DEFAULT 0,
    is_default_ip INTEGER NOT NULL DEFAULT 0,
    UNIQUE (dc_id, is_ipv6, is_media)
);
";

enum Location {
    File(PathBuf),
    Memory,
}

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp()
}

/// SQLite-backed [`Storage`].
pub struct SqliteStorage {
    location: Location,
    conn: Mutex<Option<Connection>>,
    /// Clock used for TTL checks on reads. Swapped out in tests.
    now: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl SqliteStorage {
    /// A storage persisted at `path`. Nothing touches the disk until
    /// [`Storage::open`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            conn: Mutex::new(None),
            now: Box::new(system_clock),
        }
    }

    /// An ephemeral in-memory storage. Useful for one-shot sessions imported
    /// from a session string, and for tests.
    pub fn memory() -> Self {
        Self {
            location: Location::Memory,
            conn: Mutex::new(None),
            now: Box::new(system_clock),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let guard = self.conn.lock().unwrap();
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StorageError::NotOpen),
        }
    }

    fn resolve_username(&self, username: &str) -> Result<InputPeer, StorageError> {
        let username = username.to_lowercase();
        self.with_conn(|conn| {
            let primary = conn
                .query_row(
                    "SELECT id, access_hash, type, last_update_on FROM peers
                     WHERE username = ?1
                     ORDER BY last_update_on DESC",
                    [&username],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?;

            // Fragment usernames live in the secondary table only.
            let (id, access_hash, type_str, last_update_on) = match primary {
                Some(row) => row,
                None => conn
                    .query_row(
                        "SELECT p.id, p.access_hash, p.type, u.last_update_on
                         FROM usernames u JOIN peers p ON p.id = u.peer_id
                         WHERE u.id = ?1
                         ORDER BY u.last_update_on DESC",
                        [&username],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, i64>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, i64>(3)?,
                            ))
                        },
                    )
                    .optional()?
                    .ok_or_else(|| StorageError::NotFound(format!("username {username}")))?,
            };

            if (self.now)() - last_update_on > USERNAMES_TTL {
                return Err(StorageError::Expired(format!("username {username}")));
            }
            Ok(input_peer(id, access_hash, type_str.parse::<PeerType>()?))
        })
    }
}

fn create(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(BASE_SCHEMA)?;
    conn.execute_batch(USERNAMES_SCHEMA)?;
    conn.execute_batch(UPDATE_STATE_SCHEMA)?;
    conn.execute_batch(DC_OPTIONS_SCHEMA)?;
    conn.execute("INSERT INTO version VALUES (?1)", [SCHEMA_VERSION])?;
    conn.execute(
        "INSERT INTO sessions VALUES (?1, NULL, NULL, NULL, 0, NULL, NULL)",
        [DEFAULT_DC_ID],
    )?;
    log::info!("[sqlite] created schema v{SCHEMA_VERSION}");
    Ok(())
}

/// Apply pending migrations, oldest first. Never downgrades.
fn migrate(conn: &Connection) -> Result<(), StorageError> {
    let from: u32 = conn.query_row("SELECT number FROM version", [], |row| row.get(0))?;
    let mut version = from;

    if version == 1 {
        conn.execute_batch(USERNAMES_SCHEMA)?;
        version = 2;
    }
    if version == 2 {
        conn.execute_batch(UPDATE_STATE_SCHEMA)?;
        version = 3;
    }
    if version == 3 {
        conn.execute_batch(DC_OPTIONS_SCHEMA)?;
        version = 4;
    }

    if version != from {
        conn.execute("UPDATE version SET number = ?1", [version])?;
        log::info!("[sqlite] migrated schema v{from} → v{version}");
    }
    Ok(())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn open(&self) -> Result<(), StorageError> {
        let conn = match &self.location {
            Location::File(path) => Connection::open(path)?,
            Location::Memory => Connection::open_in_memory()?,
        };

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sessions'",
            [],
            |row| row.get(0),
        )?;
        if exists == 0 {
            create(&conn)?;
        } else {
            migrate(&conn)?;
        }
        conn.execute_batch("VACUUM;")?;

        *self.conn.lock().unwrap() = Some(conn);
        Ok(())
    }

    async fn save(&self) -> Result<(), StorageError> {
        let now = (self.now)();
        self.with_conn(|conn| {
            conn.execute("UPDATE sessions SET date = ?1", [now])?;
            Ok(())
        })
    }

    async fn close(&self) -> Result<(), StorageError> {
        // Dropping the connection flushes and closes; a second close is a no-op.
        self.conn.lock().unwrap().take();
        Ok(())
    }

    async fn delete(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions", [])?;
            Ok(())
        })
    }

    async fn dc_id(&self) -> Result<u32, StorageError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT dc_id FROM sessions", [], |row| row.get(0))
                .optional()?
                .ok_or_else(|| StorageError::NotFound("session".into()))
        })
    }

    async fn set_dc_id(&self, value: u32) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE sessions SET dc_id = ?1", [value])?;
            Ok(())
        })
    }

    async fn api_id(&self) -> Result<Option<i32>, StorageError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT api_id FROM sessions", [], |row| row.get(0))
                .optional()?
                .flatten())
        })
    }

    async fn set_api_id(&self, value: i32) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE sessions SET api_id = ?1", [value])?;
            Ok(())
        })
    }

    async fn test_mode(&self) -> Result<bool, StorageError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT test_mode FROM sessions", [], |row| row.get(0))
                .optional()?
                .flatten()
                .unwrap_or(false))
        })
    }

    async fn set_test_mode(&self, value: bool) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE sessions SET test_mode = ?1", [value])?;
            Ok(())
        })
    }

    async fn auth_key(&self) -> Result<Option<Vec<u8>>, StorageError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT auth_key FROM sessions", [], |row| row.get(0))
                .optional()?
                .flatten())
        })
    }

    async fn set_auth_key(&self, value: Option<&[u8]>) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE sessions SET auth_key = ?1", [value])?;
            Ok(())
        })
    }

    async fn date(&self) -> Result<i64, StorageError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT date FROM sessions", [], |row| row.get(0))
                .optional()?
                .ok_or_else(|| StorageError::NotFound("session".into()))
        })
    }

    async fn set_date(&self, value: i64) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE sessions SET date = ?1", [value])?;
            Ok(())
        })
    }

    async fn user_id(&self) -> Result<Option<i64>, StorageError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT user_id FROM sessions", [], |row| row.get(0))
                .optional()?
                .flatten())
        })
    }

    async fn set_user_id(&self, value: i64) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE sessions SET user_id = ?1", [value])?;
            Ok(())
        })
    }

    async fn is_bot(&self) -> Result<bool, StorageError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT is_bot FROM sessions", [], |row| row.get(0))
                .optional()?
                .flatten()
                .unwrap_or(false))
        })
    }

    async fn set_is_bot(&self, value: bool) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE sessions SET is_bot = ?1", [value])?;
            Ok(())
        })
    }

    async fn update_peers(&self, peers: &[PeerUpdate]) -> Result<(), StorageError> {
        if peers.is_empty() {
            return Ok(());
        }
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            {
                // The conflict arm is a real UPDATE, so the freshness trigger
                // fires; a fresh insert picks up the column default instead.
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO peers (id, access_hash, type, username, phone_number)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (id) DO UPDATE SET
                         access_hash  = excluded.access_hash,
                         type         = excluded.type,
                         username     = excluded.username,
                         phone_number = excluded.phone_number",
                )?;
                for peer in peers {
                    stmt.execute(params![
                        peer.id,
                        peer.access_hash,
                        peer.peer_type.as_str(),
                        peer.username.as_ref().map(|u| u.to_lowercase()),
                        peer.phone_number,
                    ])?;
                }
            }
            tx.commit()?;
            log::debug!("[sqlite] upserted {} peer(s)", peers.len());
            Ok(())
        })
    }

    async fn update_usernames(&self, usernames: &[(i64, Vec<String>)]) -> Result<(), StorageError> {
        if usernames.is_empty() {
            return Ok(());
        }
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut clear = tx.prepare_cached("DELETE FROM usernames WHERE peer_id = ?1")?;
                let mut insert = tx.prepare_cached(
                    "INSERT OR REPLACE INTO usernames (id, peer_id) VALUES (?1, ?2)",
                )?;
                for (peer_id, names) in usernames {
                    clear.execute([peer_id])?;
                    for name in names {
                        insert.execute(params![name.to_lowercase(), peer_id])?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    async fn get_peer_by_id(&self, id: i64) -> Result<InputPeer, StorageError> {
        self.with_conn(|conn| {
            let (access_hash, type_str) = conn
                .query_row(
                    "SELECT access_hash, type FROM peers WHERE id = ?1",
                    [id],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?
                .ok_or_else(|| StorageError::NotFound(format!("peer id {id}")))?;
            Ok(input_peer(id, access_hash, type_str.parse::<PeerType>()?))
        })
    }

    async fn get_peer_by_username(&self, username: &str) -> Result<InputPeer, StorageError> {
        self.resolve_username(username)
    }

    async fn get_peer_by_phone_number(&self, phone_number: &str) -> Result<InputPeer, StorageError> {
        self.with_conn(|conn| {
            let (id, access_hash, type_str) = conn
                .query_row(
                    "SELECT id, access_hash, type FROM peers WHERE phone_number = ?1",
                    [phone_number],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?
                .ok_or_else(|| StorageError::NotFound(format!("phone number {phone_number}")))?;
            Ok(input_peer(id, access_hash, type_str.parse::<PeerType>()?))
        })
    }

    async fn states(&self) -> Result<Vec<UpdateState>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, pts, qts, date, seq FROM update_state")?;
            let rows = stmt.query_map([], |row| {
                Ok(UpdateState {
                    id: row.get(0)?,
                    pts: row.get(1)?,
                    qts: row.get(2)?,
                    date: row.get(3)?,
                    seq: row.get(4)?,
                })
            })?;
            let mut states = Vec::new();
            for state in rows {
                states.push(state?);
            }
            Ok(states)
        })
    }

    async fn update_state(&self, state: UpdateState) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO update_state VALUES (?1, ?2, ?3, ?4, ?5)",
                params![state.id, state.pts, state.qts, state.date, state.seq],
            )?;
            Ok(())
        })
    }

    async fn remove_state(&self, id: i64) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM update_state WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    async fn update_dc_address(&self, dc: DcAddress) -> Result<(), StorageError> {
        let is_media = normalize_media(dc.dc_id, dc.is_media);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO dc_options (dc_id, address, port, is_ipv6, is_media, is_default_ip)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (dc_id, is_ipv6, is_media) DO UPDATE SET
                     address       = excluded.address,
                     port          = excluded.port,
                     is_default_ip = excluded.is_default_ip",
                params![dc.dc_id, dc.address, dc.port, dc.is_ipv6, is_media, dc.is_default_ip],
            )?;
            Ok(())
        })
    }

    async fn get_dc_address(
        &self,
        dc_id: u32,
        is_ipv6: bool,
        is_media: bool,
    ) -> Result<Option<DcAddress>, StorageError> {
        let is_media = normalize_media(dc_id, is_media);
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT address, port, is_default_ip FROM dc_options
                     WHERE dc_id = ?1 AND is_ipv6 = ?2 AND is_media = ?3",
                    params![dc_id, is_ipv6, is_media],
                    |row| {
                        Ok(DcAddress {
                            dc_id,
                            address: row.get(0)?,
                            port: row.get(1)?,
                            is_ipv6,
                            is_media,
                            is_default_ip: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    async fn version(&self) -> Result<u32, StorageError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT number FROM version", [], |row| row.get(0))
                .optional()?
                .ok_or_else(|| StorageError::NotFound("schema version".into()))
        })
    }

    async fn set_version(&self, value: u32) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("UPDATE version SET number = ?1", [value])?;
            Ok(())
        })
    }
}
