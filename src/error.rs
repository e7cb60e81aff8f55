use std::path::PathBuf;
use thiserror::Error;

use crate::models::TimerState;

/// 状态机拒绝的命令
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {command} while the timer is {state:?}")]
    InvalidTransition {
        command: &'static str,
        state: TimerState,
    },
}

/// 键值存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode or decode `{key}`: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 通知服务错误
#[derive(Debug, Error)]
pub enum NotifyError {
    /// 系统拒绝（例如权限被撤销）
    #[error("notification `{id}` was declined: {reason}")]
    Declined { id: String, reason: String },

    #[error("desktop notification failed: {0}")]
    Desktop(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 提醒集合的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReminderError {
    #[error("reminder title must not be empty")]
    EmptyTitle,

    #[error("identifier `{0}` is already in use")]
    DuplicateIdentifier(String),

    #[error("no reminder matches `{0}`")]
    NotFound(String),

    #[error("`{0}` matches more than one reminder")]
    Ambiguous(String),
}

/// 时长设置校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// 配置文件错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no home directory available for project paths")]
    NoProjectDirs,
}
