//! Live console — tails the server log while accepting command input.
//!
//! One cooperative loop: every tick (~200ms) the log file is re-read,
//! control sequences are stripped, the visible window is redrawn, and at
//! most one keystroke is applied. Input-state transitions live in
//! `ConsoleState` so they stay testable without a terminal.

use std::io::{self, stdout};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::layout::Position;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};
use regex::Regex;

use crate::config::ServerType;
use crate::supervisor::Supervisor;

/// Log redraw cadence; also the bounded wait for one keystroke.
const TICK: Duration = Duration::from_millis(200);

/// Rows not available to the log window: status bar, input box, hint line.
const CHROME_ROWS: u16 = 5;

// ─── Log line cleanup & classification ───────────────────────

fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("static regex"))
}

/// Strip terminal control sequences before width-truncating for display.
pub fn strip_ansi(line: &str) -> String {
    ansi_regex().replace_all(line, "").trim_end().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Error,
    Warn,
    Info,
    Plain,
}

/// Substring classifier, matching what server logs actually print.
pub fn classify(line: &str) -> LineClass {
    if line.contains("ERROR") || line.contains("Exception") {
        LineClass::Error
    } else if line.contains("WARN") {
        LineClass::Warn
    } else if line.contains("INFO") {
        LineClass::Info
    } else {
        LineClass::Plain
    }
}

/// Status-bar label: "1.21.1 (paper)", or a placeholder before any install.
fn status_label(version: Option<&str>, server_type: ServerType) -> String {
    match version {
        Some(v) => format!("{} ({})", v, server_type),
        None => "not installed".to_string(),
    }
}

fn line_style(class: LineClass) -> Style {
    match class {
        LineClass::Error => Style::default().fg(Color::Red),
        LineClass::Warn => Style::default().fg(Color::Yellow),
        LineClass::Info => Style::default().fg(Color::Cyan),
        LineClass::Plain => Style::default(),
    }
}

// ─── Input state ─────────────────────────────────────────────

/// What the loop should do after a keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Exit,
    /// Buffer was submitted. The loop dispatches it only when the server is
    /// running; a stopped server swallows it silently.
    Dispatch(String),
}

pub struct ConsoleState {
    pub buffer: String,
    /// Cursor position in chars, not bytes.
    pub cursor: usize,
    pub scroll: usize,
    pub auto_scroll: bool,
    pub history: Vec<String>,
    /// None = editing a fresh line; Some(i) = showing history[i].
    pub history_idx: Option<usize>,
}

impl ConsoleState {
    pub fn new(history: Vec<String>) -> Self {
        Self {
            buffer: String::new(),
            cursor: 0,
            scroll: 0,
            auto_scroll: true,
            history,
            history_idx: None,
        }
    }

    /// Pin the window to the newest content when auto-scroll is on.
    pub fn pin_to_tail(&mut self, total: usize, visible: usize) {
        if self.auto_scroll {
            self.scroll = total.saturating_sub(visible);
        }
    }

    /// Apply one keystroke. `total` is the current log line count and
    /// `page` the visible window height, both needed for scroll clamping.
    pub fn apply_key(&mut self, code: KeyCode, total: usize, page: usize) -> Action {
        let max_scroll = total.saturating_sub(page);
        match code {
            KeyCode::Esc => return Action::Exit,

            KeyCode::Enter => {
                let command = self.buffer.trim().to_string();
                if !command.is_empty() {
                    self.buffer.clear();
                    self.cursor = 0;
                    self.history_idx = None;
                    self.auto_scroll = true;
                    return Action::Dispatch(command);
                }
            }

            // Walk older entries; stepping past the oldest is a no-op.
            KeyCode::Up => {
                let next = match self.history_idx {
                    None if !self.history.is_empty() => Some(0),
                    Some(i) if i + 1 < self.history.len() => Some(i + 1),
                    other => other,
                };
                if next != self.history_idx {
                    self.history_idx = next;
                    self.recall();
                }
            }

            // Walk newer; stepping below the newest clears the buffer.
            KeyCode::Down => match self.history_idx {
                Some(0) => {
                    self.history_idx = None;
                    self.buffer.clear();
                    self.cursor = 0;
                }
                Some(i) => {
                    self.history_idx = Some(i - 1);
                    self.recall();
                }
                None => {}
            },

            KeyCode::Backspace => {
                if self.cursor > 0 {
                    let idx = byte_index(&self.buffer, self.cursor - 1);
                    self.buffer.remove(idx);
                    self.cursor -= 1;
                }
            }

            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => {
                if self.cursor < self.buffer.chars().count() {
                    self.cursor += 1;
                }
            }

            KeyCode::PageUp => {
                self.auto_scroll = false;
                self.scroll = self.scroll.saturating_sub(page);
            }

            KeyCode::PageDown => {
                self.scroll = (self.scroll + page).min(max_scroll);
                if self.scroll >= max_scroll {
                    self.auto_scroll = true;
                }
            }

            // 'a' toggles auto-scroll only while not typing; mid-command it
            // is ordinary text. Intentional dual meaning.
            KeyCode::Char('a') | KeyCode::Char('A') if self.buffer.is_empty() => {
                self.auto_scroll = !self.auto_scroll;
            }

            KeyCode::Char(c) => {
                let idx = byte_index(&self.buffer, self.cursor);
                self.buffer.insert(idx, c);
                self.cursor += 1;
                self.history_idx = None;
            }

            _ => {}
        }
        Action::None
    }

    fn recall(&mut self) {
        if let Some(i) = self.history_idx {
            self.buffer = self.history[i].clone();
            self.cursor = self.buffer.chars().count();
        }
    }
}

fn byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

// ─── Event loop ──────────────────────────────────────────────

/// Run the console until Esc. The terminal is restored on every exit path,
/// including a panic inside the loop body.
pub async fn run(supervisor: &Supervisor) -> anyhow::Result<()> {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        default_hook(info);
    }));

    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = event_loop(&mut terminal, supervisor).await;

    disable_raw_mode()?;
    execute!(stdout(), LeaveAlternateScreen)?;
    let _ = std::panic::take_hook();
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    supervisor: &Supervisor,
) -> anyhow::Result<()> {
    let log_path = supervisor.log_path();
    let mut state = ConsoleState::new(supervisor.command_history());
    let label = {
        let status = supervisor.status().await;
        status_label(status.version.as_deref(), status.server_type)
    };

    loop {
        let running = supervisor.is_running().await;
        let lines = read_log(&log_path);

        let size = terminal.size()?;
        let visible = size.height.saturating_sub(CHROME_ROWS) as usize;
        state.pin_to_tail(lines.len(), visible);

        terminal.draw(|f| render(f, &state, &lines, visible, running, &label))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match state.apply_key(key.code, lines.len(), visible) {
                    Action::Exit => break,
                    Action::Dispatch(command) => {
                        if running {
                            if let Err(e) = supervisor.send_command(&command).await {
                                tracing::warn!("Console dispatch failed: {}", e);
                            }
                            state.history = supervisor.command_history();
                        }
                        // Stopped server: buffer already cleared, nothing
                        // dispatched, no error surfaced in-line.
                    }
                    Action::None => {}
                }
            }
        }
    }
    Ok(())
}

/// Whole-file re-read each tick; the log is the only source of truth and
/// stays readable even when the session itself is gone.
fn read_log(path: &Path) -> Vec<String> {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .lines()
            .map(strip_ansi)
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn render(
    f: &mut Frame,
    state: &ConsoleState,
    lines: &[String],
    visible: usize,
    running: bool,
    label: &str,
) {
    let [status_area, log_area, input_area, hint_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(f.area());

    // Status bar
    let status = if running {
        Span::styled("● LIVE", Style::default().fg(Color::Green).bold())
    } else {
        Span::styled("○ STOPPED", Style::default().fg(Color::Red).bold())
    };
    let auto = format!("[A]uto-scroll: {}", if state.auto_scroll { "ON" } else { "OFF" });
    let auto_style = if state.auto_scroll {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::Yellow)
    };
    let label = format!("  {}", label);
    let pad = (status_area.width as usize).saturating_sub(
        status.content.chars().count() + label.chars().count() + auto.chars().count() + 1,
    );
    let status_line = Line::from(vec![
        Span::raw(" "),
        status,
        Span::styled(label, Style::default().fg(Color::DarkGray)),
        Span::raw(" ".repeat(pad)),
        Span::styled(auto, auto_style),
    ]);
    f.render_widget(Paragraph::new(status_line), status_area);

    // Log window
    let width = log_area.width as usize;
    let window: Vec<Line> = lines
        .iter()
        .skip(state.scroll)
        .take(visible)
        .map(|l| {
            let truncated: String = l.chars().take(width).collect();
            Line::styled(truncated, line_style(classify(l)))
        })
        .collect();
    f.render_widget(Paragraph::new(window), log_area);

    // Command input
    let input = Paragraph::new(format!("> {}", state.buffer))
        .block(Block::default().borders(Borders::ALL).title(" Command "));
    f.render_widget(input, input_area);
    f.set_cursor_position(Position::new(
        input_area.x + 3 + state.cursor.min(u16::MAX as usize) as u16,
        input_area.y + 1,
    ));

    // Hint line
    let hint = "Enter: Send  ↑↓: History  PgUp/PgDn: Scroll  A: Auto-scroll  Esc: Back";
    f.render_widget(
        Paragraph::new(hint).style(Style::default().fg(Color::Cyan)),
        hint_area,
    );
}
