use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Widget};

use crate::tui::theme::Theme;

const SHORTCUTS: &[(&str, &str)] = &[
    ("  s/Enter ", "Start a test"),
    ("  x/Esc   ", "Stop the running test"),
    ("  t       ", "Cycle theme"),
    ("  ?/h     ", "Show this help"),
    ("  q       ", "Quit"),
];

/// Help overlay
pub struct HelpView<'a> {
    theme: &'a Theme,
}

impl<'a> HelpView<'a> {
    pub fn new(theme: &'a Theme) -> Self {
        Self { theme }
    }
}

impl Widget for HelpView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Calculate centered popup area
        let popup_width = 50.min(area.width.saturating_sub(4));
        let popup_height = 14.min(area.height.saturating_sub(4));
        let popup_x = (area.width - popup_width) / 2 + area.x;
        let popup_y = (area.height - popup_height) / 2 + area.y;
        let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

        Clear.render(popup_area, buf);

        let block = Block::default()
            .title(format!(" Help \u{2014} ndtspeed {} ", env!("CARGO_PKG_VERSION")))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.border));

        let inner = block.inner(popup_area);
        block.render(popup_area, buf);

        let mut lines = vec![Line::from("")];
        for (keys, action) in SHORTCUTS {
            lines.push(Line::from(vec![
                Span::styled(*keys, Style::default().fg(self.theme.shortcut)),
                Span::raw(*action),
            ]));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "  Measurements by M-Lab ndt7; results are",
            Style::default().fg(self.theme.text_dim),
        )));
        lines.push(Line::from(Span::styled(
            "  published under the M-Lab data policy.",
            Style::default().fg(self.theme.text_dim),
        )));
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "  Press any key to close",
            Style::default().fg(self.theme.text_dim),
        )));

        Paragraph::new(lines).render(inner, buf);
    }
}
