use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use xprocrastinate::analytics::format_duration;
use xprocrastinate::models::DurationSettings;
use xprocrastinate::notify::NotificationService;
use xprocrastinate::{app, ui, AppConfig};

#[derive(Parser)]
#[command(name = "xpro")]
#[command(about = "Assignment reminders and a focus timer", long_about = None)]
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

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the focus screen
    Focus,

    /// Add an assignment reminder
    Add {
        /// Assignment title
        title: String,

        /// Due time: "YYYY-MM-DD HH:MM", "HH:MM" (today), or "+30m" / "+2h" / "+1d"
        #[arg(short = 'd', long)]
        due: String,
    },

    /// List active reminders
    List,

    /// Mark a reminder as completed
    Complete {
        /// Reminder ID (or unique prefix)
        id: String,
    },

    /// Delete a reminder without completing it
    Delete {
        /// Reminder ID (or unique prefix)
        id: String,
    },

    /// List completed reminders
    Completed,

    /// Clear the completed list
    ClearCompleted,

    /// Show focus history
    History,

    /// Clear focus history
    ClearHistory,

    /// Show statistics
    Stats,

    /// Show or change timer durations (minutes)
    Settings {
        #[arg(long)]
        focus: Option<u32>,
        #[arg(long)]
        short_break: Option<u32>,
        #[arg(long)]
        long_break: Option<u32>,
        /// Long break after every N focus sessions
        #[arg(long)]
        every: Option<u32>,
        /// Restore defaults
        #[arg(long, conflicts_with_all = ["focus", "short_break", "long_break", "every"])]
        reset: bool,
    },

    /// Reconcile scheduled notifications with the reminder list
    Refresh,

    /// List pending notifications
    Pending,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(cli.config.as_deref());
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }
    init_logging(&config, cli.debug)?;

    let mut core = app::open(&config)?;

    match cli.command {
        Some(Commands::Focus) | None => {
            ui::run_app(core, config.notifications.phase_complete)?;
        }
        Some(Commands::Add { title, due }) => {
            let due_at = parse_due(&due, Local::now())?;
            let reminder = core.add_reminder(&title, due_at)?;
            println!(
                "✅ Reminder created: [{}] due {}",
                short_id(&reminder.identifier),
                local_time(reminder.due_at)
            );
            warn_notifications(core.last_notification_error());
        }
        Some(Commands::List) => {
            let now = core.now();
            if core.reminders().is_empty() {
                println!("No reminders. 🎉");
            } else {
                for reminder in core.reminders() {
                    let icon = if reminder.is_overdue(now) { "⚠️ " } else { "📅" };
                    println!(
                        "[{}] {} {}  {}",
                        short_id(&reminder.identifier),
                        icon,
                        local_time(reminder.due_at),
                        reminder.title
                    );
                }
            }
        }
        Some(Commands::Complete { id }) => {
            let reminder = core.complete_reminder(&id)?;
            println!("✅ {} marked as completed", reminder.title);
            warn_notifications(core.last_notification_error());
        }
        Some(Commands::Delete { id }) => {
            let reminder = core.delete_reminder(&id)?;
            println!("🗑  {} deleted", reminder.title);
            warn_notifications(core.last_notification_error());
        }
        Some(Commands::Completed) => {
            if core.completed_reminders().is_empty() {
                println!("Nothing completed yet.");
            }
            for reminder in core.completed_reminders() {
                println!(
                    "[{}] ✅ {}  {}",
                    short_id(&reminder.identifier),
                    local_time(reminder.due_at),
                    reminder.title
                );
            }
        }
        Some(Commands::ClearCompleted) => {
            let count = core.clear_completed_history();
            println!("Cleared {} completed reminders", count);
        }
        Some(Commands::History) => {
            let sessions = core.focus_sessions();
            if sessions.is_empty() {
                println!("No focus sessions recorded.");
            }
            for session in sessions.iter().rev() {
                println!(
                    "🎯 {}  {}  {}",
                    local_time(session.started_at),
                    format_duration(u64::from(session.duration_seconds)),
                    session.label.as_deref().unwrap_or_default()
                );
            }
        }
        Some(Commands::ClearHistory) => {
            core.clear_focus_history()?;
            println!("Focus history cleared");
        }
        Some(Commands::Stats) => {
            let stats = core.analytics();
            let timer = core.timer().snapshot();
            println!("📈 Tasks");
            println!(
                "   completed {} ({}% completion rate), overdue {}, on track {}",
                stats.tasks.completed,
                stats.tasks.completion_rate,
                stats.tasks.overdue,
                stats.tasks.on_track
            );
            println!("📅 Last 7 days (by due date)");
            for day in &stats.week.days {
                println!("   {}  {}", day.date.format("%a %m-%d"), day.completed);
            }
            println!(
                "   this week {} · daily average {:.1}",
                stats.week.total, stats.week.daily_average
            );
            println!("🎯 Focus");
            println!(
                "   total {} over {} sessions (avg {})",
                format_duration(stats.focus.total_seconds),
                stats.focus.sessions,
                format_duration(stats.focus.average_seconds)
            );
            println!(
                "   this week {} · {}% of the 5h goal",
                format_duration(stats.focus.last_seven_days_seconds),
                stats.focus.weekly_goal_percent
            );
            println!(
                "   today {} sessions · {} · streak {} days",
                timer.completed_focus_sessions_today,
                format_duration(timer.total_focus_seconds_today),
                timer.streak_days
            );
        }
        Some(Commands::Settings {
            focus,
            short_break,
            long_break,
            every,
            reset,
        }) => {
            if reset {
                core.reset_duration_settings();
            } else if focus.is_some() || short_break.is_some() || long_break.is_some() || every.is_some() {
                let current = *core.duration_settings();
                let settings = DurationSettings::from_minutes(
                    focus.unwrap_or(current.focus_seconds / 60),
                    short_break.unwrap_or(current.short_break_seconds / 60),
                    long_break.unwrap_or(current.long_break_seconds / 60),
                    every.unwrap_or(current.long_break_every_n_sessions),
                )?;
                core.update_duration_settings(settings)?;
            }
            let settings = core.duration_settings();
            println!("⏱  focus       {} min", settings.focus_seconds / 60);
            println!("☕ short break {} min", settings.short_break_seconds / 60);
            println!("🌴 long break  {} min", settings.long_break_seconds / 60);
            println!(
                "   long break every {} sessions",
                settings.long_break_every_n_sessions
            );
        }
        Some(Commands::Refresh) => {
            let report = core.refresh();
            println!(
                "🔔 scheduled {}, cancelled {}, unchanged {}",
                report.scheduled, report.cancelled, report.unchanged
            );
            for failure in &report.failures {
                println!("⚠️  {}", failure);
            }
        }
        Some(Commands::Pending) => {
            let mut pending = core.notifications().list_pending()?;
            pending.sort_by_key(|p| p.next_fire_at);
            if pending.is_empty() {
                println!("No pending notifications.");
            }
            for p in pending {
                let repeat = if p.intent.trigger.repeats() { " 🔁" } else { "" };
                println!(
                    "{}  {}{}  {}",
                    local_time(p.next_fire_at),
                    p.intent.id,
                    repeat,
                    p.intent.title
                );
            }
        }
    }

    Ok(())
}

/// 日志写入数据目录，不干扰界面
fn init_logging(config: &AppConfig, debug: bool) -> Result<()> {
    let path = config.log_path()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn warn_notifications(error: Option<&str>) {
    if let Some(error) = error {
        eprintln!("⚠️  notifications: {}", error);
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// 解析截止时间
fn parse_due<Tz: TimeZone>(input: &str, now: DateTime<Tz>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Some(offset) = input.strip_prefix('+') {
        let Some((split, _)) = offset.char_indices().last() else {
            bail!("missing offset after `+`");
        };
        let (amount, unit) = offset.split_at(split);
        let amount: i64 = amount
            .parse()
            .with_context(|| format!("invalid offset `{}`", input))?;
        let delta = match unit {
            "m" => Duration::try_minutes(amount),
            "h" => Duration::try_hours(amount),
            "d" => Duration::try_days(amount),
            _ => bail!("offset unit must be m, h or d: `{}`", input),
        };
        return delta
            .and_then(|delta| now.checked_add_signed(delta))
            .map(|at| at.with_timezone(&Utc))
            .with_context(|| format!("offset out of range `{}`", input));
    }

    let tz = now.timezone();
    let naive = if let Ok(at) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        at
    } else if let Ok(time) = NaiveTime::parse_from_str(input, "%H:%M") {
        now.date_naive().and_time(time)
    } else if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)
            .with_context(|| format!("invalid date `{}`", input))?
    } else {
        bail!("unrecognised due time `{}`", input);
    };
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .with_context(|| format!("`{}` does not exist in the local time zone", input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn parses_relative_offsets() {
        assert_eq!(parse_due("+30m", now()).unwrap(), now() + Duration::minutes(30));
        assert_eq!(parse_due("+2h", now()).unwrap(), now() + Duration::hours(2));
        assert_eq!(parse_due("+1d", now()).unwrap(), now() + Duration::days(1));
        assert!(parse_due("+5w", now()).is_err());
        assert!(parse_due("+m", now()).is_err());
    }

    #[test]
    fn rejects_offsets_beyond_the_calendar() {
        assert!(parse_due("+99999999999999d", now()).is_err());
        assert!(parse_due("+9999999999999h", now()).is_err());
        assert!(parse_due("+99999999999d", now()).is_err());
    }

    #[test]
    fn parses_absolute_times() {
        assert_eq!(
            parse_due("2025-03-12 17:30", now()).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 12, 17, 30, 0).unwrap()
        );
        assert_eq!(
            parse_due("18:00", now()).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap()
        );
        assert_eq!(
            parse_due("2025-03-11", now()).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap()
        );
        assert!(parse_due("tomorrow", now()).is_err());
    }

    #[test]
    fn short_id_handles_short_input() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("0123456789"), "01234567");
    }
}
