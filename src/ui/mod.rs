//! Progress reporting for the sync passes
//!
//! Passes talk to a `Ui`; three implementations exist:
//! - `LogUi` turns updates into tracing events (the default)
//! - `TerminalUi` draws a ratatui dashboard (`--tui`)
//! - `SilentUi` drops everything (tests)

mod components;

use anyhow::Result;
use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::time::Duration;
use tracing::{debug, info};

use components::{CounterPanel, LogPanel, ProgressPanel, StatusPanel};

/// Where a pass currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Importing,
    Updating,
    Backfilling,
    Flushing,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Scanning => write!(f, "Finding resume point"),
            Phase::Importing => write!(f, "Importing items"),
            Phase::Updating => write!(f, "Refreshing item classes"),
            Phase::Backfilling => write!(f, "Backfilling locale names"),
            Phase::Flushing => write!(f, "Committing open batches"),
            Phase::Done => write!(f, "Done"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub current: u64,
    /// Zero when the end isn't known up front
    pub total: u64,
    pub label: String,
}

impl Progress {
    pub fn new(current: u64, total: u64, label: impl Into<String>) -> Self {
        Self {
            current,
            total,
            label: label.into(),
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f64 / self.total as f64
        }
    }
}

pub trait Ui {
    fn set_phase(&mut self, phase: Phase);
    fn set_info(&mut self, info: impl Into<String>);
    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>);
    fn set_counters(&mut self, counters: &[(&str, u64)]);
    fn log(&mut self, message: impl Into<String>);

    /// Polled between strides; a pass that sees `true` flushes and returns
    fn stop_requested(&mut self) -> bool {
        false
    }
}

/// Full-screen dashboard
pub struct TerminalUi {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    status: StatusPanel,
    progress: ProgressPanel,
    counters: CounterPanel,
    log: LogPanel,
    stop: bool,
}

impl TerminalUi {
    /// Enter the alternate screen; `pass` is shown in the title
    pub fn new(pass: &str) -> Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            status: StatusPanel::new(pass),
            progress: ProgressPanel::new(),
            counters: CounterPanel::new(),
            log: LogPanel::new(),
            stop: false,
        })
    }

    fn draw(&mut self) -> Result<()> {
        let status = &self.status;
        let progress = &self.progress;
        let counters = &self.counters;
        let log = &self.log;

        self.terminal.draw(|frame| {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(5), // Status
                    Constraint::Length(3), // Progress gauge
                    Constraint::Min(5),    // Counters | log
                ])
                .split(frame.area());

            let bottom = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Length(28), Constraint::Min(20)])
                .split(rows[2]);

            status.render(frame, rows[0]);
            progress.render(frame, rows[1]);
            counters.render(frame, bottom[0]);
            log.render(frame, bottom[1]);
        })?;

        Ok(())
    }

    /// Show the summary and wait for a key before restoring the terminal
    pub fn finish(mut self, summary: &str) -> Result<()> {
        self.set_phase(Phase::Done);
        self.log(summary);
        self.log("Press any key to exit...");
        self.draw()?;

        loop {
            if event::poll(Duration::from_millis(100))? {
                if let CrosstermEvent::Key(_) = event::read()? {
                    break;
                }
            }
        }

        self.restore()
    }

    pub fn restore(mut self) -> Result<()> {
        terminal::disable_raw_mode()?;
        self.terminal.backend_mut().execute(LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Ui for TerminalUi {
    fn set_phase(&mut self, phase: Phase) {
        self.status.set_phase(phase);
        self.draw().ok();
    }

    fn set_info(&mut self, info: impl Into<String>) {
        self.status.set_info(info);
        self.draw().ok();
    }

    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>) {
        self.progress.set_progress(Progress::new(current, total, label));
        self.draw().ok();
    }

    fn set_counters(&mut self, counters: &[(&str, u64)]) {
        self.counters.set(counters);
        self.draw().ok();
    }

    fn log(&mut self, message: impl Into<String>) {
        self.log.add(message);
        self.draw().ok();
    }

    /// `q`, `Esc` or Ctrl+C (raw mode swallows the signal)
    fn stop_requested(&mut self) -> bool {
        while event::poll(Duration::from_millis(0)).unwrap_or(false) {
            if let Ok(CrosstermEvent::Key(KeyEvent { code, modifiers, .. })) = event::read() {
                let ctrl_c = code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL);
                if code == KeyCode::Char('q') || code == KeyCode::Esc || ctrl_c {
                    if !self.stop {
                        self.log.add("Stopping after the current stride...");
                    }
                    self.stop = true;
                }
            }
        }
        self.stop
    }
}

impl Drop for TerminalUi {
    fn drop(&mut self) {
        terminal::disable_raw_mode().ok();
        self.terminal.backend_mut().execute(LeaveAlternateScreen).ok();
        self.terminal.show_cursor().ok();
    }
}

/// Reports through tracing; progress goes out at debug level
#[derive(Default)]
pub struct LogUi;

impl Ui for LogUi {
    fn set_phase(&mut self, phase: Phase) {
        info!(%phase, "phase");
    }

    fn set_info(&mut self, info: impl Into<String>) {
        info!("{}", info.into());
    }

    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>) {
        debug!(current, total, label = %label.into(), "progress");
    }

    fn set_counters(&mut self, counters: &[(&str, u64)]) {
        let line: Vec<String> = counters.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        debug!("{}", line.join(" "));
    }

    fn log(&mut self, message: impl Into<String>) {
        info!("{}", message.into());
    }
}

#[derive(Default)]
pub struct SilentUi;

impl SilentUi {
    pub fn new() -> Self {
        Self
    }
}

impl Ui for SilentUi {
    fn set_phase(&mut self, _phase: Phase) {}
    fn set_info(&mut self, _info: impl Into<String>) {}
    fn set_progress(&mut self, _current: u64, _total: u64, _label: impl Into<String>) {}
    fn set_counters(&mut self, _counters: &[(&str, u64)]) {}
    fn log(&mut self, _message: impl Into<String>) {}
}
