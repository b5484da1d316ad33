//! Color themes for the speed test screen.
//!
//! Built-in themes: default, dracula, nord, gruvbox, solarized, monochrome.
//! Selected with `--theme` or cycled with `t`; the last choice is saved.

use ratatui::style::Color;
use std::borrow::Cow;

/// Every color the UI draws with
#[derive(Clone, Debug)]
pub struct Theme {
    name: Cow<'static, str>,

    pub border: Color,
    pub text: Color,
    pub text_dim: Color,

    // Readouts
    pub download: Color,
    pub upload: Color,
    pub latency: Color,
    /// Unfilled part of the gauge
    pub gauge_track: Color,

    pub error: Color,
    pub shortcut: Color,
    pub header: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::default_theme()
    }
}

impl Theme {
    pub fn default_theme() -> Self {
        Self {
            name: Cow::Borrowed("default"),
            border: Color::Cyan,
            text: Color::White,
            text_dim: Color::Gray,
            download: Color::Green,
            upload: Color::Magenta,
            latency: Color::Yellow,
            gauge_track: Color::DarkGray,
            error: Color::Red,
            shortcut: Color::Yellow,
            header: Color::Cyan,
        }
    }

    pub fn dracula() -> Self {
        Self {
            name: Cow::Borrowed("dracula"),
            border: Color::Rgb(189, 147, 249),      // Purple
            text: Color::Rgb(248, 248, 242),
            text_dim: Color::Rgb(98, 114, 164),     // Comment
            download: Color::Rgb(80, 250, 123),     // Green
            upload: Color::Rgb(255, 121, 198),      // Pink
            latency: Color::Rgb(241, 250, 140),     // Yellow
            gauge_track: Color::Rgb(68, 71, 90),
            error: Color::Rgb(255, 85, 85),
            shortcut: Color::Rgb(241, 250, 140),
            header: Color::Rgb(255, 121, 198),
        }
    }

    pub fn nord() -> Self {
        Self {
            name: Cow::Borrowed("nord"),
            border: Color::Rgb(136, 192, 208),      // Nord8
            text: Color::Rgb(236, 239, 244),        // Nord6
            text_dim: Color::Rgb(76, 86, 106),      // Nord3
            download: Color::Rgb(163, 190, 140),    // Nord14
            upload: Color::Rgb(180, 142, 173),      // Nord15
            latency: Color::Rgb(235, 203, 139),     // Nord13
            gauge_track: Color::Rgb(59, 66, 82),    // Nord1
            error: Color::Rgb(191, 97, 106),        // Nord11
            shortcut: Color::Rgb(235, 203, 139),
            header: Color::Rgb(136, 192, 208),
        }
    }

    pub fn gruvbox() -> Self {
        Self {
            name: Cow::Borrowed("gruvbox"),
            border: Color::Rgb(254, 128, 25),       // Orange
            text: Color::Rgb(235, 219, 178),
            text_dim: Color::Rgb(146, 131, 116),
            download: Color::Rgb(184, 187, 38),
            upload: Color::Rgb(211, 134, 155),
            latency: Color::Rgb(250, 189, 47),
            gauge_track: Color::Rgb(80, 73, 69),
            error: Color::Rgb(251, 73, 52),
            shortcut: Color::Rgb(250, 189, 47),
            header: Color::Rgb(254, 128, 25),
        }
    }

    pub fn solarized() -> Self {
        Self {
            name: Cow::Borrowed("solarized"),
            border: Color::Rgb(42, 161, 152),       // Cyan
            text: Color::Rgb(131, 148, 150),        // base0
            text_dim: Color::Rgb(88, 110, 117),     // base01
            download: Color::Rgb(133, 153, 0),
            upload: Color::Rgb(108, 113, 196),      // Violet
            latency: Color::Rgb(181, 137, 0),
            gauge_track: Color::Rgb(7, 54, 66),     // base02
            error: Color::Rgb(220, 50, 47),
            shortcut: Color::Rgb(181, 137, 0),
            header: Color::Rgb(203, 75, 22),
        }
    }

    /// Grayscale; errors still stand out through bold text
    pub fn monochrome() -> Self {
        Self {
            name: Cow::Borrowed("monochrome"),
            border: Color::Rgb(200, 200, 200),
            text: Color::Rgb(255, 255, 255),
            text_dim: Color::Rgb(128, 128, 128),
            download: Color::Rgb(230, 230, 230),
            upload: Color::Rgb(170, 170, 170),
            latency: Color::Rgb(200, 200, 200),
            gauge_track: Color::Rgb(60, 60, 60),
            error: Color::Rgb(255, 255, 255),
            shortcut: Color::Rgb(220, 220, 220),
            header: Color::Rgb(255, 255, 255),
        }
    }

    /// Get a theme by name; unknown names give the default theme
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "dracula" => Self::dracula(),
            "nord" => Self::nord(),
            "gruvbox" => Self::gruvbox(),
            "solarized" => Self::solarized(),
            "monochrome" | "mono" => Self::monochrome(),
            _ => Self::default_theme(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All theme names, in cycling order
    pub fn list() -> &'static [&'static str] {
        &[
            "default",
            "dracula",
            "nord",
            "gruvbox",
            "solarized",
            "monochrome",
        ]
    }

    /// Position of `name` in [`Theme::list`], 0 when unknown
    pub fn index_of(name: &str) -> usize {
        let canonical = Self::by_name(name);
        Self::list()
            .iter()
            .position(|&n| n == canonical.name())
            .unwrap_or(0)
    }
}
