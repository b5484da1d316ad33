use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Widget};

use crate::export::{format_latency, format_mbps, history_line};
use crate::state::{Direction as TestDirection, Outcome, SessionPhase, Snapshot};
use crate::tui::theme::Theme;

/// Full-scale values the gauge steps through
const GAUGE_SCALES: [f64; 4] = [10.0, 100.0, 1000.0, 10000.0];

/// Smallest full-scale value that fits `mbps`
pub fn gauge_scale(mbps: f64) -> f64 {
    GAUGE_SCALES
        .iter()
        .copied()
        .find(|&scale| mbps <= scale)
        .unwrap_or(GAUGE_SCALES[GAUGE_SCALES.len() - 1])
}

fn gauge_ratio(mbps: f64) -> f64 {
    if !mbps.is_finite() || mbps <= 0.0 {
        return 0.0;
    }
    (mbps / gauge_scale(mbps)).clamp(0.0, 1.0)
}

/// Gauge, readouts, server label and history
pub struct MainView<'a> {
    snapshot: &'a Snapshot,
    theme: &'a Theme,
}

impl<'a> MainView<'a> {
    pub fn new(snapshot: &'a Snapshot, theme: &'a Theme) -> Self {
        Self { snapshot, theme }
    }

    fn label_style(&self) -> Style {
        match self.snapshot.last_outcome {
            Some(Outcome::Failed(_)) => Style::default().fg(self.theme.error).bold(),
            _ => Style::default().fg(self.theme.text),
        }
    }

    fn readout(&self, title: &str, value: String, unit: &str, color: Color) -> Paragraph<'a> {
        Paragraph::new(vec![
            Line::from(Span::styled(
                title.to_string(),
                Style::default().fg(self.theme.text_dim),
            )),
            Line::from(vec![
                Span::styled(value, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(format!(" {}", unit)),
            ]),
        ])
        .centered()
    }
}

impl Widget for MainView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let snap = self.snapshot;
        let phase = if snap.running {
            snap.phase.label()
        } else {
            "ready"
        };
        let title = format!(
            "ndtspeed {} \u{2500}\u{2500} {} ",
            env!("CARGO_PKG_VERSION"),
            phase
        );

        let block = Block::default()
            .title(title)
            .title_style(Style::default().fg(self.theme.header))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.border));

        let inner = block.inner(area);
        block.render(area, buf);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // server label
                Constraint::Length(1),
                Constraint::Length(3), // gauge
                Constraint::Length(1),
                Constraint::Length(2), // readouts
                Constraint::Length(1),
                Constraint::Min(0), // history
            ])
            .split(inner);

        Paragraph::new(snap.server_label.as_str())
            .style(self.label_style())
            .centered()
            .render(chunks[0], buf);

        let gauge_color = match snap.phase {
            SessionPhase::Running(TestDirection::Upload) => self.theme.upload,
            _ => self.theme.download,
        };
        Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.text_dim))
                    .title(format!(" 0 \u{2026} {} Mbps ", gauge_scale(snap.gauge_mbps))),
            )
            .gauge_style(Style::default().fg(gauge_color).bg(self.theme.gauge_track))
            .ratio(gauge_ratio(snap.gauge_mbps))
            .label(format!("{} Mbps", format_mbps(snap.gauge_mbps)))
            .render(chunks[2], buf);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
            ])
            .split(chunks[4]);
        self.readout("Download", format_mbps(snap.download_mbps), "Mbps", self.theme.download)
            .render(columns[0], buf);
        self.readout("Upload", format_mbps(snap.upload_mbps), "Mbps", self.theme.upload)
            .render(columns[1], buf);
        self.readout("Latency", format_latency(snap.latency_ms), "ms", self.theme.latency)
            .render(columns[2], buf);

        let items: Vec<ListItem> = if snap.history.is_empty() {
            vec![ListItem::new(Span::styled(
                "No measurements yet. Press s to start.",
                Style::default().fg(self.theme.text_dim),
            ))]
        } else {
            snap.history
                .iter()
                .map(|entry| ListItem::new(history_line(entry)).fg(self.theme.text))
                .collect()
        };
        List::new(items)
            .block(
                Block::default()
                    .title(" History ")
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(self.theme.text_dim)),
            )
            .render(chunks[6], buf);
    }
}
