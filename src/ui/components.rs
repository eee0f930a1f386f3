use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph};
use ratatui::Frame;

use super::{Phase, Progress};

/// Pass name, phase and a line of context
pub struct StatusPanel {
    pass: String,
    phase: Phase,
    info: String,
}

impl StatusPanel {
    pub fn new(pass: &str) -> Self {
        Self {
            pass: pass.to_string(),
            phase: Phase::Scanning,
            info: String::new(),
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn set_info(&mut self, info: impl Into<String>) {
        self.info = info.into();
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let color = match self.phase {
            Phase::Done => Color::Green,
            Phase::Flushing => Color::Yellow,
            _ => Color::Cyan,
        };
        let phase_style = Style::default().fg(color).add_modifier(Modifier::BOLD);

        let lines = vec![
            Line::from(vec![
                Span::styled(format!(" {} ", self.pass), phase_style),
                Span::raw("· "),
                Span::styled(self.phase.to_string(), phase_style),
            ]),
            Line::from(""),
            Line::from(vec![
                Span::raw("   "),
                Span::styled(&self.info, Style::default().fg(Color::Gray)),
            ]),
        ];

        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Guild Bank Item Seeder ")
            .border_style(Style::default().fg(Color::Blue));

        frame.render_widget(Paragraph::new(lines).block(block), area);
    }
}

pub struct ProgressPanel {
    progress: Option<Progress>,
}

impl ProgressPanel {
    pub fn new() -> Self {
        Self { progress: None }
    }

    pub fn set_progress(&mut self, progress: Progress) {
        self.progress = Some(progress);
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::LEFT | Borders::RIGHT)
            .border_style(Style::default().fg(Color::Blue));

        let Some(progress) = &self.progress else {
            frame.render_widget(Paragraph::new("").block(block), area);
            return;
        };

        let label = if progress.total > 0 {
            format!(
                "{}: {}/{} ({:.0}%)",
                progress.label,
                progress.current,
                progress.total,
                progress.ratio() * 100.0
            )
        } else {
            format!("{}: {} done", progress.label, progress.current)
        };

        let gauge = Gauge::default()
            .block(block)
            .gauge_style(Style::default().fg(Color::Cyan).bg(Color::DarkGray))
            .ratio(progress.ratio().min(1.0))
            .label(label);

        frame.render_widget(gauge, area);
    }
}

/// Running totals for the pass
pub struct CounterPanel {
    rows: Vec<(String, u64)>,
}

impl CounterPanel {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn set(&mut self, counters: &[(&str, u64)]) {
        self.rows = counters.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Totals ")
            .border_style(Style::default().fg(Color::Blue));

        let items: Vec<ListItem> = self
            .rows
            .iter()
            .map(|(label, value)| {
                let value_style = if *value == 0 {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
                };
                ListItem::new(Line::from(vec![
                    Span::styled(format!(" {:<15}", label), Style::default().fg(Color::Gray)),
                    Span::styled(format!("{:>8}", value), value_style),
                ]))
            })
            .collect();

        frame.render_widget(List::new(items).block(block), area);
    }
}

/// Most recent activity, newest at the bottom
pub struct LogPanel {
    entries: Vec<String>,
    max_entries: usize,
}

impl LogPanel {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            max_entries: 200,
        }
    }

    pub fn add(&mut self, message: impl Into<String>) {
        self.entries.push(message.into());
        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Activity ")
            .border_style(Style::default().fg(Color::Blue));

        let visible = area.height.saturating_sub(2) as usize;
        let start = self.entries.len().saturating_sub(visible);
        let newest = self.entries.len().saturating_sub(1);

        let items: Vec<ListItem> = self.entries[start..]
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let color = if start + i == newest { Color::White } else { Color::DarkGray };
                ListItem::new(Span::styled(format!(" {}", entry), Style::default().fg(color)))
            })
            .collect();

        frame.render_widget(List::new(items).block(block), area);
    }
}
