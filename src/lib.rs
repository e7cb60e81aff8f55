//! 作业提醒与专注计时。
//!
//! 库部分是同步的核心；`xpro`（命令行和专注界面）与 `xprod`（通知守护进程）
//! 两个二进制只是适配层。

pub mod analytics;
pub mod app;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod pomodoro;
pub mod reminders;
pub mod ui;

pub use app::{AppSnapshot, Core, SqliteCore};
pub use config::AppConfig;
