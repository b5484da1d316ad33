use anyhow::Result;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::Style;
use ratatui::widgets::Paragraph;
use scopeguard::defer;
use std::io::stdout;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::controller::ControllerHandle;
use crate::state::Snapshot;
use crate::tui::theme::Theme;
use crate::tui::views::{HelpView, MainView};

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Start,
    Stop,
    CycleTheme,
    Help,
    Quit,
}

impl KeyAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('s') | KeyCode::Enter => Some(Self::Start),
            KeyCode::Char('x') | KeyCode::Esc => Some(Self::Stop),
            KeyCode::Char('t') => Some(Self::CycleTheme),
            KeyCode::Char('?') | KeyCode::Char('h') => Some(Self::Help),
            KeyCode::Char('q') => Some(Self::Quit),
            _ => None,
        }
    }
}

/// UI state
#[derive(Default)]
pub struct UiState {
    /// Show help overlay
    pub show_help: bool,
    /// Status message to display
    pub status_message: Option<(String, std::time::Instant)>,
    /// Current theme index
    pub theme_index: usize,
}

impl UiState {
    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some((msg.into(), std::time::Instant::now()));
    }

    pub fn clear_old_status(&mut self) {
        if let Some((_, time)) = &self.status_message
            && time.elapsed() > Duration::from_secs(3)
        {
            self.status_message = None;
        }
    }

    /// Apply a key action; returns true when the UI should exit
    pub fn apply(&mut self, action: KeyAction, snapshot: &Snapshot, controller: &ControllerHandle) -> bool {
        match action {
            KeyAction::Start => {
                if snapshot.running {
                    self.set_status("A test is already running");
                } else {
                    controller.start();
                }
            }
            KeyAction::Stop => {
                if snapshot.running {
                    controller.stop();
                }
            }
            KeyAction::CycleTheme => {
                let names = Theme::list();
                self.theme_index = (self.theme_index + 1) % names.len();
                self.set_status(format!("Theme: {}", names[self.theme_index]));
            }
            KeyAction::Help => self.show_help = true,
            KeyAction::Quit => return true,
        }
        false
    }
}

/// Run the TUI application. Returns the final theme name for persistence.
pub async fn run_tui(
    controller: ControllerHandle,
    cancel: CancellationToken,
    initial_theme: Theme,
) -> Result<String> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;

    // Ensure terminal is restored on any exit (success, error, or panic)
    defer! {
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
    }

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut ui_state = UiState {
        theme_index: Theme::index_of(initial_theme.name()),
        ..Default::default()
    };
    let tick_rate = Duration::from_millis(100);

    run_app(&mut terminal, &controller, &mut ui_state, cancel, tick_rate).await?;

    Ok(Theme::list()[ui_state.theme_index].to_string())
}

async fn run_app<B>(
    terminal: &mut Terminal<B>,
    controller: &ControllerHandle,
    ui_state: &mut UiState,
    cancel: CancellationToken,
    tick_rate: Duration,
) -> Result<()>
where
    B: ratatui::backend::Backend,
{
    let theme_names = Theme::list();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        ui_state.clear_old_status();
        let theme = Theme::by_name(theme_names[ui_state.theme_index]);
        let snapshot = controller.snapshot();

        terminal.draw(|f| draw_ui(f, &snapshot, ui_state, &theme))?;

        // Handle input with timeout
        if event::poll(tick_rate)?
            && let Event::Key(key) = event::read()?
        {
            if key.kind != KeyEventKind::Press {
                continue;
            }

            if ui_state.show_help {
                ui_state.show_help = false;
                continue;
            }

            if let Some(action) = KeyAction::from_key(key.code)
                && ui_state.apply(action, &snapshot, controller)
            {
                cancel.cancel();
                break;
            }
        }

        // Let the controller task run between frames
        tokio::task::yield_now().await;
    }

    Ok(())
}

fn draw_ui(f: &mut ratatui::Frame, snapshot: &Snapshot, ui_state: &UiState, theme: &Theme) {
    let area = f.area();

    // Layout: main view + status bar
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    f.render_widget(MainView::new(snapshot, theme), chunks[0]);

    let status_text = if let Some((ref msg, _)) = ui_state.status_message {
        msg.clone()
    } else if snapshot.running {
        "x stop | t theme | ? help | q quit".to_string()
    } else {
        "s start | t theme | ? help | q quit".to_string()
    };

    let status_bar = Paragraph::new(status_text).style(Style::default().fg(theme.text_dim));
    f.render_widget(status_bar, chunks[1]);

    if ui_state.show_help {
        f.render_widget(HelpView::new(theme), area);
    }
}
