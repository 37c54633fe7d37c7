use crate::api::events::{SnapshotEvent, SnapshotSink, SubscriptionHandle};
use crate::api::models::{Message, NewMessage, UserProfile};
use crate::error::{SendError, StoreError};
use crate::identity::{ConversationId, ParticipantId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// The shared document store. Threads are pushed to subscribers as complete
/// snapshots; writes are single documents.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, conversation: &ConversationId, message: NewMessage) -> Result<Message, SendError>;

    /// Registers `sink` for pushes on `conversation`. The store delivers the
    /// current snapshot, then a fresh snapshot after every change, until the
    /// returned handle is released. A read failure is delivered as a terminal
    /// `SnapshotEvent::Failed`.
    fn subscribe(&self, conversation: &ConversationId, sink: SnapshotSink) -> SubscriptionHandle;

    async fn touch_user(&self, profile: &UserProfile) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_conversation: HashMap<String, Vec<(u64, SnapshotSink)>>,
}

struct Db {
    conn: Connection,
    last_timestamp: Option<DateTime<Utc>>,
    /// Last seen `PRAGMA data_version`; it moves only when another
    /// connection commits.
    data_version: i64,
}

struct Shared {
    app_id: String,
    db: Mutex<Db>,
    listeners: Mutex<Listeners>,
}

/// SQLite-backed store, namespaced by application id.
///
/// Writes made through this handle are pushed immediately. Writes made by
/// other connections to the same file (the other participant's client) are
/// picked up by [`SqliteStore::spawn_watcher`].
pub struct SqliteStore {
    shared: Arc<Shared>,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS messages (
        app_id TEXT NOT NULL,
        conversation_id TEXT NOT NULL,
        id TEXT NOT NULL,
        sender_id TEXT NOT NULL,
        text TEXT NOT NULL,
        ts_micros INTEGER NOT NULL,
        PRIMARY KEY (app_id, conversation_id, id)
    );
    CREATE INDEX IF NOT EXISTS messages_by_time ON messages (app_id, conversation_id, ts_micros, id);
    CREATE TABLE IF NOT EXISTS users (
        app_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        display_name TEXT NOT NULL,
        last_active INTEGER NOT NULL,
        PRIMARY KEY (app_id, user_id)
    );
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    m.lock().map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
}

fn data_version(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

fn latest_timestamp(conn: &Connection, app_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let micros: Option<i64> = conn.query_row(
        "SELECT MAX(ts_micros) FROM messages WHERE app_id = ?1",
        params![app_id],
        |row| row.get(0),
    )?;
    Ok(micros.and_then(DateTime::from_timestamp_micros))
}

/// Timestamps are strictly increasing across the whole store, including rows
/// written by other connections.
fn next_timestamp(last: Option<DateTime<Utc>>, stored: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last.max(stored) {
        Some(floor) if now <= floor => floor + chrono::Duration::microseconds(1),
        _ => now,
    }
}

impl Shared {
    fn snapshot(&self, conn: &Connection, conversation: &str) -> Result<Vec<Message>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, sender_id, text, ts_micros FROM messages
             WHERE app_id = ?1 AND conversation_id = ?2
             ORDER BY ts_micros ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![self.app_id, conversation], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (id, sender, text, micros) = r?;
            let sender_id = ParticipantId::parse(&sender)
                .ok_or_else(|| StoreError::Unavailable(format!("bad sender id in row {}", id)))?;
            let timestamp = DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| StoreError::Unavailable(format!("bad timestamp in row {}", id)))?;
            out.push(Message { id, sender_id, text, timestamp });
        }
        Ok(out)
    }

    fn snapshot_event(&self, conn: &Connection, conversation: &str) -> SnapshotEvent {
        match self.snapshot(conn, conversation) {
            Ok(messages) => SnapshotEvent::Snapshot(messages),
            Err(e) => {
                log::error!("re-reading {} failed: {}", conversation, e);
                SnapshotEvent::Failed(e.into())
            }
        }
    }

    fn broadcast(&self, conversation: &str, event: SnapshotEvent) {
        let Ok(mut listeners) = self.listeners.lock() else { return };
        if let Some(sinks) = listeners.by_conversation.get_mut(conversation) {
            sinks.retain(|(_, sink)| sink.deliver(event.clone()));
        }
    }

    /// Pushes fresh snapshots of every watched conversation if another
    /// connection has committed since the last check.
    fn push_external_changes(&self) {
        let watched: Vec<String> = match self.listeners.lock() {
            Ok(listeners) => listeners.by_conversation.keys().cloned().collect(),
            Err(_) => return,
        };
        let events: Vec<(String, SnapshotEvent)> = {
            let Ok(mut db) = self.db.lock() else { return };
            let version = match data_version(&db.conn) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("polling store failed: {}", e);
                    return;
                }
            };
            if version == db.data_version {
                return;
            }
            db.data_version = version;
            log::debug!("store changed externally, refreshing {} conversation(s)", watched.len());
            watched
                .into_iter()
                .map(|conversation| {
                    let event = self.snapshot_event(&db.conn, &conversation);
                    (conversation, event)
                })
                .collect()
        };
        for (conversation, event) in events {
            self.broadcast(&conversation, event);
        }
    }
}

impl SqliteStore {
    pub fn open(path: &Path, app_id: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::with_connection(conn, app_id)
    }

    pub fn open_in_memory(app_id: &str) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, app_id)
    }

    fn with_connection(conn: Connection, app_id: &str) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        let last_timestamp = latest_timestamp(&conn, app_id)?;
        let data_version = data_version(&conn)?;
        Ok(Self {
            shared: Arc::new(Shared {
                app_id: app_id.to_string(),
                db: Mutex::new(Db { conn, last_timestamp, data_version }),
                listeners: Mutex::new(Listeners::default()),
            }),
        })
    }

    /// Polls the file every `period` for commits made by other connections
    /// and pushes the affected threads. The task ends once the store is
    /// dropped.
    pub fn spawn_watcher(&self, period: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let Some(shared) = store.upgrade() else { break };
                shared.push_external_changes();
            }
            log::debug!("store watcher stopped");
        })
    }
}

fn release_listener(store: &Weak<Shared>, key: &str, listener_id: u64) {
    let Some(shared) = store.upgrade() else { return };
    let Ok(mut listeners) = shared.listeners.lock() else { return };
    if let Some(sinks) = listeners.by_conversation.get_mut(key) {
        sinks.retain(|(id, _)| *id != listener_id);
        if sinks.is_empty() {
            listeners.by_conversation.remove(key);
        }
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(&self, conversation: &ConversationId, message: NewMessage) -> Result<Message, SendError> {
        let shared = &*self.shared;
        let (created, event) = {
            let mut guard = lock(&shared.db)?;
            let db = &mut *guard;
            let tx = db
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StoreError::from)?;
            let timestamp = next_timestamp(db.last_timestamp, latest_timestamp(&tx, &shared.app_id)?);
            let id = uuid::Uuid::new_v4().simple().to_string();
            tx.execute(
                "INSERT INTO messages (app_id, conversation_id, id, sender_id, text, ts_micros)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    shared.app_id,
                    conversation.as_str(),
                    id,
                    message.sender_id.as_str(),
                    message.text,
                    timestamp.timestamp_micros()
                ],
            )
            .map_err(StoreError::from)?;
            tx.commit().map_err(StoreError::from)?;
            db.last_timestamp = Some(timestamp);

            let created = Message { id, sender_id: message.sender_id, text: message.text, timestamp };
            (created, shared.snapshot_event(&db.conn, conversation.as_str()))
        };

        shared.broadcast(conversation.as_str(), event);
        Ok(created)
    }

    fn subscribe(&self, conversation: &ConversationId, sink: SnapshotSink) -> SubscriptionHandle {
        let shared = &*self.shared;
        let initial = lock(&shared.db).and_then(|db| shared.snapshot(&db.conn, conversation.as_str()));
        let messages = match initial {
            Ok(messages) => messages,
            Err(e) => {
                log::warn!("subscribe {} failed: {}", conversation, e);
                sink.deliver(SnapshotEvent::Failed(e.into()));
                return SubscriptionHandle::inert();
            }
        };
        if !sink.deliver(SnapshotEvent::Snapshot(messages)) {
            return SubscriptionHandle::inert();
        }

        let Ok(mut listeners) = shared.listeners.lock() else {
            sink.deliver(SnapshotEvent::Failed(StoreError::Unavailable("store lock poisoned".into()).into()));
            return SubscriptionHandle::inert();
        };
        let listener_id = listeners.next_id;
        listeners.next_id += 1;
        listeners
            .by_conversation
            .entry(conversation.as_str().to_string())
            .or_default()
            .push((listener_id, sink));
        drop(listeners);

        let store = Arc::downgrade(&self.shared);
        let key = conversation.as_str().to_string();
        SubscriptionHandle::new(move || release_listener(&store, &key, listener_id))
    }

    async fn touch_user(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let db = lock(&self.shared.db)?;
        db.conn.execute(
            r#"
            INSERT INTO users (app_id, user_id, display_name, last_active)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(app_id, user_id) DO UPDATE SET
                display_name=excluded.display_name,
                last_active=excluded.last_active
            "#,
            params![
                self.shared.app_id,
                profile.user_id.as_str(),
                profile.display_name,
                profile.last_active.timestamp_micros()
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
impl SqliteStore {
    fn listener_count(&self, conversation: &ConversationId) -> usize {
        self.shared
            .listeners
            .lock()
            .unwrap()
            .by_conversation
            .get(conversation.as_str())
            .map_or(0, Vec::len)
    }
}
