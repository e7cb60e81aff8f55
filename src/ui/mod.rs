use anyhow::Result;
use chrono::Local;
use crossterm::{
    event::{self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::{Duration as StdDuration, Instant};
use tracing::{debug, warn};

use crate::analytics::format_duration;
use crate::app::{Core, SqliteCore};
use crate::clock::TickDriver;
use crate::db::KeyValueStore;
use crate::models::{Phase, TimerState};
use crate::notify::{DesktopNotifier, NotificationService};
use crate::pomodoro::{ResumeOutcome, SessionEvent, WelcomeChoice};

const TAB_COUNT: usize = 3;

/// 对话框类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogType {
    None,
    DeleteConfirm,
    Help,
}

/// 应用状态
pub struct App<S, N> {
    pub core: Core<S, N>,
    pub current_tab: usize,
    pub reminder_list_state: ListState,
    pub show_dialog: DialogType,
    pub status_message: Option<String>,
    pub should_quit: bool,
    ticks: TickDriver,
    notifier: DesktopNotifier,
    phase_alerts: bool,
}

impl<S: KeyValueStore, N: NotificationService> App<S, N> {
    pub fn new(core: Core<S, N>, phase_alerts: bool) -> Self {
        let mut reminder_list_state = ListState::default();
        reminder_list_state.select(Some(0));
        Self {
            core,
            current_tab: 0,
            reminder_list_state,
            show_dialog: DialogType::None,
            status_message: None,
            should_quit: false,
            ticks: TickDriver::every_second(),
            notifier: DesktopNotifier::new(),
            phase_alerts,
        }
    }

    /// 切换标签页
    pub fn next_tab(&mut self) {
        self.current_tab = (self.current_tab + 1) % TAB_COUNT;
    }

    pub fn previous_tab(&mut self) {
        self.current_tab = (self.current_tab + TAB_COUNT - 1) % TAB_COUNT;
    }

    pub fn goto_tab(&mut self, tab: usize) {
        if tab < TAB_COUNT {
            self.current_tab = tab;
        }
    }

    /// 提醒列表导航
    pub fn next_reminder(&mut self) {
        let len = self.core.reminders().len();
        if len == 0 {
            return;
        }
        let i = match self.reminder_list_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.reminder_list_state.select(Some(i));
    }

    pub fn previous_reminder(&mut self) {
        let len = self.core.reminders().len();
        if len == 0 {
            return;
        }
        let i = match self.reminder_list_state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.reminder_list_state.select(Some(i));
    }

    fn selected_identifier(&self) -> Option<String> {
        self.reminder_list_state
            .selected()
            .and_then(|i| self.core.reminders().get(i))
            .map(|r| r.identifier.clone())
    }

    fn clamp_selection(&mut self) {
        let len = self.core.reminders().len();
        match self.reminder_list_state.selected() {
            Some(i) if i >= len && len > 0 => self.reminder_list_state.select(Some(len - 1)),
            None if len > 0 => self.reminder_list_state.select(Some(0)),
            _ => {}
        }
    }

    /// 完成选中的提醒
    pub fn complete_selected(&mut self) {
        let Some(id) = self.selected_identifier() else {
            return;
        };
        self.status_message = Some(match self.core.complete_reminder(&id) {
            Ok(reminder) => format!("✅ {} 已完成", reminder.title),
            Err(e) => e.to_string(),
        });
        self.clamp_selection();
    }

    /// 删除选中的提醒
    pub fn delete_selected(&mut self) {
        if let Some(id) = self.selected_identifier() {
            self.status_message = Some(match self.core.delete_reminder(&id) {
                Ok(reminder) => format!("{} 已删除", reminder.title),
                Err(e) => e.to_string(),
            });
        }
        self.show_dialog = DialogType::None;
        self.clamp_selection();
    }

    /// 开始 / 暂停 / 继续
    pub fn toggle_timer(&mut self) {
        let result = match self.core.timer().state() {
            TimerState::Stopped => self.core.start_focus(),
            TimerState::Running => self.core.pause_focus(),
            TimerState::Paused => self.core.resume_focus(),
        };
        self.after_command(result);
    }

    pub fn end_session(&mut self) {
        let result = self.core.end_focus_early();
        self.after_command(result);
    }

    pub fn skip_phase(&mut self) {
        let result = self.core.skip_phase();
        self.after_command(result);
    }

    pub fn answer_prompt(&mut self, choice: WelcomeChoice) {
        let result = self.core.answer_welcome_back(choice);
        self.after_command(result);
    }

    /// 终端失去焦点视为进入后台
    pub fn on_focus_lost(&mut self) {
        let events = self.core.on_background_enter();
        self.handle_events(&events);
    }

    pub fn on_focus_gained(&mut self) {
        let outcome = self.core.on_background_exit();
        self.clamp_selection();
        match outcome {
            ResumeOutcome::AskUser(prompt) => {
                self.status_message = Some(format!(
                    "离开了 {}，按 r 继续或 e 结束",
                    format_duration(prompt.away_seconds)
                ));
            }
            ResumeOutcome::Continue { away_seconds } if away_seconds > 0 => {
                debug!(away_seconds, "focus regained");
            }
            ResumeOutcome::Continue { .. } => {}
        }
    }

    /// 离开专注界面：专注阶段按提前结束处理
    pub fn quit(&mut self) {
        if self.core.timer().state() != TimerState::Stopped
            && self.core.timer().phase() == Phase::Focus
        {
            let result = self.core.end_focus_early();
            self.after_command(result);
        }
        self.should_quit = true;
    }

    /// 每帧调用：补齐节拍，检查后台提醒和询问超时
    pub fn on_frame(&mut self, now: Instant) -> bool {
        match self.core.timer().state() {
            TimerState::Running => self.ticks.start(now),
            _ => self.ticks.stop(),
        }
        for _ in 0..self.ticks.due(now) {
            match self.core.tick() {
                Ok(events) => self.handle_events(&events),
                Err(_) => {
                    self.ticks.stop();
                    break;
                }
            }
        }
        let outcome = self.core.poll();
        if outcome.auto_resumed {
            self.status_message = Some("▶ 已自动继续专注".to_string());
        }
        outcome.notice_scheduled
    }

    fn after_command(&mut self, result: crate::pomodoro::Transition) {
        match result {
            Ok(events) => self.handle_events(&events),
            Err(e) => self.status_message = Some(e.to_string()),
        }
    }

    fn handle_events(&mut self, events: &[SessionEvent]) {
        for event in events {
            match event {
                SessionEvent::PhaseCompleted { finished, next, .. } => {
                    self.status_message = Some(match next {
                        Phase::Focus => "🔥 休息结束，开始专注".to_string(),
                        _ => format!("☕ {} 开始", next.label()),
                    });
                    if self.phase_alerts {
                        if let Err(e) = self.notifier.send_phase_complete(*finished, *next) {
                            warn!(error = %e, "phase notification failed");
                        }
                    }
                }
                SessionEvent::FocusRecorded { session } => {
                    debug!(seconds = session.duration_seconds, "focus recorded");
                }
                SessionEvent::Stopped { .. } => {
                    self.ticks.stop();
                }
                _ => {}
            }
        }
    }
}

/// 运行专注界面
pub fn run_app(core: SqliteCore, phase_alerts: bool) -> Result<()> {
    // 设置终端
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(core, phase_alerts);
    app.core.refresh();

    let res = run_ui_loop(&mut terminal, &mut app);

    // 恢复终端
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableFocusChange)?;
    terminal.show_cursor()?;

    res
}

/// UI主循环
fn run_ui_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App<crate::db::SqliteStore, crate::notify::LocalNotificationCenter<crate::db::SqliteStore>>,
) -> Result<()> {
    let mut notifier = DesktopNotifier::new();
    loop {
        terminal.draw(|f| ui(f, app))?;

        if event::poll(StdDuration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    handle_key_event(app, key.code);
                }
                Event::FocusLost => app.on_focus_lost(),
                Event::FocusGained => app.on_focus_gained(),
                _ => {}
            }
        }

        // 后台提醒直接在本进程送达，不等守护进程
        if app.on_frame(Instant::now()) {
            if let Err(e) = app.core.notifications_mut().deliver_due(&mut notifier) {
                warn!(error = %e, "delivery failed");
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// 处理键盘事件
pub fn handle_key_event<S: KeyValueStore, N: NotificationService>(
    app: &mut App<S, N>,
    key: KeyCode,
) {
    // 欢迎回来询问优先
    if app.core.snapshot().welcome_back.is_some() {
        match key {
            KeyCode::Char('r') | KeyCode::Enter => app.answer_prompt(WelcomeChoice::Resume),
            KeyCode::Char('e') => app.answer_prompt(WelcomeChoice::End),
            _ => {}
        }
        return;
    }

    match app.show_dialog {
        DialogType::DeleteConfirm => {
            match key {
                KeyCode::Char('y') | KeyCode::Char('Y') => app.delete_selected(),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    app.show_dialog = DialogType::None;
                }
                _ => {}
            }
            return;
        }
        DialogType::Help => {
            app.show_dialog = DialogType::None;
            return;
        }
        DialogType::None => {}
    }

    app.status_message = None;
    match key {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => app.quit(),
        KeyCode::Char('?') => app.show_dialog = DialogType::Help,

        // 标签页切换
        KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => app.next_tab(),
        KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => app.previous_tab(),
        KeyCode::Char('1') => app.goto_tab(0),
        KeyCode::Char('2') => app.goto_tab(1),
        KeyCode::Char('3') => app.goto_tab(2),

        // 计时器
        KeyCode::Char(' ') | KeyCode::Char('s') if app.current_tab == 0 => app.toggle_timer(),
        KeyCode::Char('e') if app.current_tab == 0 => app.end_session(),
        KeyCode::Char('n') if app.current_tab == 0 => app.skip_phase(),

        // 提醒
        KeyCode::Down | KeyCode::Char('j') if app.current_tab == 1 => app.next_reminder(),
        KeyCode::Up | KeyCode::Char('k') if app.current_tab == 1 => app.previous_reminder(),
        KeyCode::Char(' ') | KeyCode::Char('x') if app.current_tab == 1 => app.complete_selected(),
        KeyCode::Char('d') if app.current_tab == 1 && app.selected_identifier().is_some() => {
            app.show_dialog = DialogType::DeleteConfirm;
        }
        KeyCode::Char('r') => {
            let report = app.core.refresh();
            app.clamp_selection();
            app.status_message = Some(format!(
                "已刷新：新排期 {}，取消 {}",
                report.scheduled, report.cancelled
            ));
        }
        _ => {}
    }
}

fn ui<S: KeyValueStore, N: NotificationService>(f: &mut Frame, app: &mut App<S, N>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // 标签页
            Constraint::Min(0),    // 内容
            Constraint::Length(2), // 状态栏
        ])
        .split(f.area());

    let titles = vec!["🎯 Focus (1)", "📅 Reminders (2)", "📊 Stats (3)"];
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title("XProcrastinate"))
        .select(app.current_tab)
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, chunks[0]);

    match app.current_tab {
        0 => render_focus(f, app, chunks[1]),
        1 => render_reminders(f, app, chunks[1]),
        2 => render_stats(f, app, chunks[1]),
        _ => {}
    }

    render_status_bar(f, app, chunks[2]);

    if app.core.snapshot().welcome_back.is_some() {
        render_welcome_back(f, app);
    } else if app.show_dialog != DialogType::None {
        render_dialog(f, app);
    }
}

/// 渲染计时器
fn render_focus<S: KeyValueStore, N: NotificationService>(
    f: &mut Frame,
    app: &App<S, N>,
    area: Rect,
) {
    let snapshot = app.core.timer().snapshot();
    let state_text = match (snapshot.state, snapshot.phase) {
        (TimerState::Stopped, _) => "⏹  Ready",
        (TimerState::Paused, _) => "⏸  Paused",
        (TimerState::Running, Phase::Focus) => "🔥 Focus",
        (TimerState::Running, Phase::ShortBreak) => "☕ Break",
        (TimerState::Running, Phase::LongBreak) => "🌴 Long Break",
    };
    let color = if snapshot.phase.is_break() {
        Color::Green
    } else {
        Color::Red
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(3)])
        .split(area);

    let content = vec![
        Line::from(""),
        Line::from(Span::styled(
            state_text,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            app.core.timer().format_remaining(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!(
            "Today: {} sessions · {} · 🔥 {} day streak",
            snapshot.completed_focus_sessions_today,
            format_duration(snapshot.total_focus_seconds_today),
            snapshot.streak_days
        )),
        Line::from(""),
        Line::from("s/Space:开始/暂停 | e:结束 | n:跳过 | q:退出"),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    f.render_widget(paragraph, rows[0]);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(color))
        .percent(snapshot.progress.clamp(0.0, 100.0) as u16);
    f.render_widget(gauge, rows[1]);
}

/// 渲染提醒列表
fn render_reminders<S: KeyValueStore, N: NotificationService>(
    f: &mut Frame,
    app: &mut App<S, N>,
    area: Rect,
) {
    let now = app.core.now();
    let items: Vec<ListItem> = app
        .core
        .reminders()
        .iter()
        .map(|reminder| {
            let due = reminder.due_at.with_timezone(&Local).format("%m-%d %H:%M");
            if reminder.is_overdue(now) {
                ListItem::new(format!("⚠️  {}  {}", due, reminder.title))
                    .style(Style::default().fg(Color::Red))
            } else {
                ListItem::new(format!("📅 {}  {}", due, reminder.title))
            }
        })
        .collect();

    let help_text = if items.is_empty() {
        "用 `xpro add` 添加提醒"
    } else {
        "j/k:导航 | x:完成 | d:删除 | r:刷新"
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("提醒 ({} 个)", app.core.reminders().len()))
                .title_bottom(help_text),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    f.render_stateful_widget(list, area, &mut app.reminder_list_state);
}

/// 渲染统计
fn render_stats<S: KeyValueStore, N: NotificationService>(
    f: &mut Frame,
    app: &App<S, N>,
    area: Rect,
) {
    let stats = app.core.analytics();
    let mut content = vec![
        Line::from(Span::styled(
            "📈 Tasks",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(format!(
            "  Completed {} ({}%) · Overdue {} · On track {}",
            stats.tasks.completed,
            stats.tasks.completion_rate,
            stats.tasks.overdue,
            stats.tasks.on_track
        )),
        Line::from(""),
        Line::from(Span::styled(
            "📅 7 days",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];
    for day in &stats.week.days {
        content.push(Line::from(format!(
            "  {}  {}",
            day.date.format("%a"),
            "■".repeat(day.completed)
        )));
    }
    content.push(Line::from(format!(
        "  This week: {} · Daily average: {:.1}",
        stats.week.total, stats.week.daily_average
    )));
    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "🎯 Focus",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    content.push(Line::from(format!(
        "  Total {} · {} sessions · avg {}",
        format_duration(stats.focus.total_seconds),
        stats.focus.sessions,
        format_duration(stats.focus.average_seconds)
    )));
    content.push(Line::from(format!(
        "  This week {} · {}% of 5h goal",
        format_duration(stats.focus.last_seven_days_seconds),
        stats.focus.weekly_goal_percent
    )));

    let paragraph = Paragraph::new(content).block(Block::default().borders(Borders::ALL));
    f.render_widget(paragraph, area);
}

/// 渲染状态栏
fn render_status_bar<S: KeyValueStore, N: NotificationService>(
    f: &mut Frame,
    app: &App<S, N>,
    area: Rect,
) {
    let status = match (&app.status_message, app.core.last_notification_error()) {
        (Some(msg), _) => msg.clone(),
        (None, Some(err)) => format!("⚠️ {}", err),
        (None, None) => "Tab/h/l:切换标签 | r:刷新 | q:退出 | ?:帮助".to_string(),
    };

    let status_bar = Paragraph::new(status)
        .style(Style::default().bg(Color::DarkGray).fg(Color::White))
        .block(Block::default());

    f.render_widget(status_bar, area);
}

fn render_welcome_back<S: KeyValueStore, N: NotificationService>(f: &mut Frame, app: &App<S, N>) {
    let Some(prompt) = app.core.snapshot().welcome_back else {
        return;
    };
    let area = centered_rect(50, 30, f.area());
    let left = (prompt.deadline - app.core.now()).num_seconds().max(0);
    let content = vec![
        Line::from(""),
        Line::from(format!(
            "Welcome back! You were away for {}.",
            format_duration(prompt.away_seconds)
        )),
        Line::from(""),
        Line::from("r - 继续专注"),
        Line::from("e - 结束本次专注"),
        Line::from(""),
        Line::from(format!("{} 秒后自动继续", left)),
    ];
    let paragraph = Paragraph::new(content)
        .block(
            Block::default()
                .title("Focus paused")
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Black).fg(Color::White)),
        )
        .alignment(Alignment::Center);
    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

/// 渲染对话框
fn render_dialog<S: KeyValueStore, N: NotificationService>(f: &mut Frame, app: &App<S, N>) {
    let area = centered_rect(60, 40, f.area());

    let (title, content) = match app.show_dialog {
        DialogType::DeleteConfirm => {
            let name = app
                .reminder_list_state
                .selected()
                .and_then(|i| app.core.reminders().get(i))
                .map(|r| r.title.clone())
                .unwrap_or_default();
            (
                "确认删除",
                vec![
                    Line::from(""),
                    Line::from("确定要删除这个提醒吗？"),
                    Line::from(""),
                    Line::from(Span::styled(
                        name,
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    )),
                    Line::from(""),
                    Line::from("y - 确认删除"),
                    Line::from("n - 取消"),
                ],
            )
        }
        DialogType::Help => (
            "快捷键帮助",
            vec![
                Line::from(""),
                Line::from(Span::styled("专注", Style::default().add_modifier(Modifier::BOLD))),
                Line::from("  s/Space   : 开始/暂停/继续"),
                Line::from("  e         : 提前结束"),
                Line::from("  n         : 跳过当前阶段"),
                Line::from(""),
                Line::from(Span::styled("提醒", Style::default().add_modifier(Modifier::BOLD))),
                Line::from("  j/k       : 上下移动"),
                Line::from("  x/Space   : 完成"),
                Line::from("  d         : 删除"),
                Line::from(""),
                Line::from(Span::styled("其他", Style::default().add_modifier(Modifier::BOLD))),
                Line::from("  r         : 刷新"),
                Line::from("  q         : 退出（专注中会结束本次专注）"),
                Line::from(""),
                Line::from("按任意键关闭"),
            ],
        ),
        DialogType::None => ("", vec![]),
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::Black).fg(Color::White));

    let paragraph = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: true });

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

/// 居中矩形
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
