use serde::{Deserialize, Serialize};

/// Command substrings marking a pane as one of ours. Classification is
/// observation-only; tmux owns the pane tree.
pub const UTILITY_TAGS: &[&str] = &[
    "sidebar",
    "sidebar-renderer",
    "pane-header",
    "pane-bar",
    "tabbar",
    "tabby",
];

/// Per-window boolean flags set by external tools through tmux user-options.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Indicators {
    pub activity: bool,
    pub bell: bool,
    pub silence: bool,
    pub busy: bool,
    pub input: bool,
}

impl Indicators {
    pub fn any(&self) -> bool {
        self.activity || self.bell || self.silence || self.busy || self.input
    }
}

/// A tmux pane as observed by the last refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pane {
    pub id: String,
    pub window_id: String,
    pub index: u32,
    /// Currently running command (`pane_current_command`).
    pub command: String,
    /// The argv tmux executed to spawn the pane (`pane_start_command`).
    pub start_command: String,
    /// `@tabby_pane_title` override; wins over the live title.
    pub locked_title: Option<String>,
    pub title: String,
    pub active: bool,
    pub width: u16,
    pub height: u16,
    pub dead: bool,
    pub pid: Option<u32>,
    /// Working directory of the pane's process.
    pub path: String,
}

impl Pane {
    pub fn is_utility(&self) -> bool {
        UTILITY_TAGS
            .iter()
            .any(|tag| self.command.contains(tag) || self.start_command.contains(tag))
    }

    pub fn display_title(&self) -> &str {
        match &self.locked_title {
            Some(t) if !t.is_empty() => t,
            _ => {
                if self.title.is_empty() {
                    &self.command
                } else {
                    &self.title
                }
            }
        }
    }
}

/// A tmux window with its panes, indicator flags, and Tabby's window-scoped
/// user options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    pub id: String,
    pub index: u32,
    pub name: String,
    pub active: bool,
    pub indicators: Indicators,
    /// `@tabby_group`; None means the synthetic "Default" group.
    pub group: Option<String>,
    /// `@tabby_color`; the sentinel "transparent" suppresses the background.
    pub custom_color: Option<String>,
    pub collapsed: bool,
    pub name_locked: bool,
    pub icon: Option<String>,
    pub panes: Vec<Pane>,
}

impl Window {
    pub fn content_panes(&self) -> impl Iterator<Item = &Pane> {
        self.panes.iter().filter(|p| !p.is_utility())
    }

    pub fn utility_panes(&self) -> impl Iterator<Item = &Pane> {
        self.panes.iter().filter(|p| p.is_utility())
    }

    /// True when every remaining pane is one of ours: the window exists
    /// only to host a sidebar and should be reaped.
    pub fn has_only_utility_panes(&self) -> bool {
        !self.panes.is_empty() && self.panes.iter().all(|p| p.is_utility())
    }

    pub fn active_pane(&self) -> Option<&Pane> {
        self.panes.iter().find(|p| p.active)
    }

    pub fn group_name(&self) -> &str {
        self.group.as_deref().filter(|g| !g.is_empty()).unwrap_or("Default")
    }
}
