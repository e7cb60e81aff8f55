use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::time::{interval, Duration, MissedTickBehavior};

use xprocrastinate::notify::DesktopNotifier;
use xprocrastinate::{app, AppConfig, SqliteCore};

// 守护进程结构
pub struct Daemon {
    core: SqliteCore,
    notifier: DesktopNotifier,
    poll_every: Duration,
}

impl Daemon {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            core: app::open(config)?,
            notifier: DesktopNotifier::new(),
            poll_every: Duration::from_secs(config.daemon.poll_interval_secs.max(1)),
        })
    }

    /// 运行守护进程，Ctrl-C 退出
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(every = ?self.poll_every, "reminder daemon started");

        let mut ticker = interval(self.poll_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_reminders(),
                res = tokio::signal::ctrl_c() => {
                    res?;
                    tracing::info!("shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// 对账并送达到点的通知
    fn check_reminders(&mut self) {
        let report = self.core.refresh();
        for failure in &report.failures {
            tracing::warn!("scheduling failed: {}", failure);
        }

        match self.core.notifications_mut().deliver_due(&mut self.notifier) {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "notifications delivered"),
            Err(e) => tracing::error!("Error delivering notifications: {}", e),
        }
    }
}

#[derive(Parser)]
#[command(name = "xprod")]
#[command(about = "Reminder notification daemon", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 设置日志
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .init();

    let mut config = AppConfig::load_or_default(cli.config.as_deref());
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }
    tracing::info!("Using data directory: {:?}", config.data_dir()?);

    // 创建并运行守护进程
    let mut daemon = Daemon::new(&config)?;
    daemon.run().await?;

    Ok(())
}
