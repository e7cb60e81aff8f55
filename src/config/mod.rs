//! `config.toml` 配置。
//!
//! 文件不存在时使用默认值；解析失败时记录警告并使用默认值。时长设置属于
//! 用户数据，保存在数据库里，不在这里。

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::notify::SchedulePolicy;
use crate::pomodoro::BackgroundPolicy;

const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "xprocrastinate.db";
const LOG_FILE: &str = "xpro.log";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// 守护进程轮询间隔（秒）
    pub poll_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// 关闭后所有排期请求都按"未授权"处理
    pub enabled: bool,
    /// 专注界面在阶段结束时弹桌面通知
    pub phase_complete: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            phase_complete: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub background: BackgroundPolicy,
    pub reminders: SchedulePolicy,
    pub daemon: DaemonConfig,
    pub notifications: NotificationsConfig,
    /// 覆盖默认数据目录
    pub data_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn project_dirs() -> Result<ProjectDirs, ConfigError> {
        ProjectDirs::from("com", "xprocrastinate", "xpro").ok_or(ConfigError::NoProjectDirs)
    }

    /// 默认配置文件位置
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::project_dirs()?.config_dir().join(CONFIG_FILE))
    }

    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 读取配置；文件不存在视为默认
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// 读取配置，任何错误都回退为默认值
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Ok(path) => path,
                Err(e) => {
                    warn!(error = %e, "config location unavailable, using defaults");
                    return Self::default();
                }
            },
        };
        Self::load_from(&path).unwrap_or_else(|e| {
            warn!(error = %e, "config ignored, using defaults");
            Self::default()
        })
    }

    /// 数据目录，不存在时创建
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        let dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => Self::project_dirs()?.data_dir().to_path_buf(),
        };
        std::fs::create_dir_all(&dir).map_err(|source| ConfigError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join(DATABASE_FILE))
    }

    pub fn log_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join(LOG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.background.pause_notice_after_secs, 120);
        assert_eq!(config.reminders.motivational_every_secs, 300);
        assert_eq!(config.daemon.poll_interval_secs, 15);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let text = r#"
            data_dir = "/tmp/xpro-test"

            [reminders]
            overdue_after_secs = 120

            [notifications]
            enabled = false
        "#;
        let config = AppConfig::from_toml(text, Path::new("config.toml")).unwrap();
        assert_eq!(config.reminders.overdue_after_secs, 120);
        assert_eq!(config.reminders.motivational_every_secs, 300);
        assert!(!config.notifications.enabled);
        assert!(config.notifications.phase_complete);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/xpro-test")));
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "background = 3").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert_eq!(AppConfig::load_or_default(Some(&path)), AppConfig::default());
    }

    #[test]
    fn data_dir_override_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            data_dir: Some(dir.path().join("nested")),
            ..AppConfig::default()
        };
        let db = config.database_path().unwrap();
        assert!(db.parent().unwrap().is_dir());
        assert!(db.ends_with(DATABASE_FILE));
    }
}
