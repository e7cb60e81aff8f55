use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::error::StoreError;
use crate::models::{DailyStats, DurationSettings, FocusSession, Reminder, Streak};

/// 持久化使用的键
pub mod keys {
    pub const REMINDERS: &str = "reminders";
    pub const COMPLETED_REMINDERS: &str = "completed_reminders";
    pub const FOCUS_SESSIONS: &str = "focus_sessions";
    pub const DURATION_SETTINGS: &str = "duration_settings";
    pub const DAILY_STATS: &str = "daily_stats";
    pub const STREAK: &str = "streak";
    pub const PENDING_NOTIFICATIONS: &str = "notifications.pending";
    pub const DELIVERED_NOTIFICATIONS: &str = "notifications.delivered";
}

/// 不透明的键值存储
pub trait KeyValueStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// SQLite 上的键值表
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// 打开或创建数据库
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// 初始化数据库schema
    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, bytes, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// 内存存储，测试用
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// 类型化的读写。读失败一律回退为默认值。
pub struct Gateway<S> {
    store: S,
}

impl<S: KeyValueStore> Gateway<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn try_load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.load(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Codec {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.try_load(key) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!(key, error = %e, "unreadable stored value, using default");
                T::default()
            }
        }
    }

    pub fn save<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Codec {
            key: key.to_string(),
            source,
        })?;
        self.store.save(key, &bytes)
    }

    // ==================== Reminders ====================

    pub fn reminders(&self) -> Vec<Reminder> {
        self.load_or_default(keys::REMINDERS)
    }

    pub fn completed_reminders(&self) -> Vec<Reminder> {
        self.load_or_default(keys::COMPLETED_REMINDERS)
    }

    // ==================== Focus ====================

    pub fn focus_sessions(&self) -> Vec<FocusSession> {
        self.load_or_default(keys::FOCUS_SESSIONS)
    }

    /// 追加一条专注记录
    pub fn append_focus_session(&mut self, session: &FocusSession) -> Result<(), StoreError> {
        let mut sessions = self.focus_sessions();
        sessions.push(session.clone());
        self.save(keys::FOCUS_SESSIONS, &sessions)
    }

    pub fn clear_focus_sessions(&mut self) -> Result<(), StoreError> {
        self.save(keys::FOCUS_SESSIONS, &Vec::<FocusSession>::new())
    }

    /// 无效的设置视为缺失
    pub fn duration_settings(&self) -> DurationSettings {
        let settings: DurationSettings = self.load_or_default(keys::DURATION_SETTINGS);
        match settings.validate() {
            Ok(()) => settings,
            Err(e) => {
                warn!(error = %e, "stored duration settings rejected, using defaults");
                DurationSettings::default()
            }
        }
    }

    pub fn daily_stats(&self) -> DailyStats {
        self.load_or_default(keys::DAILY_STATS)
    }

    pub fn streak(&self) -> Streak {
        self.load_or_default(keys::STREAK)
    }
}
