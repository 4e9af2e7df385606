use crate::error::TabbyError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global config: ~/.config/tabby/config.toml
///
/// The daemon only consumes the structured result; the file is written by
/// the user or by the setup scripts. A missing file means defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TabbyConfig {
    /// Group themes in display order. Windows whose `@tabby_group` names
    /// none of these still render, appended after the configured groups.
    pub groups: Vec<GroupTheme>,
    pub widgets: WidgetToggles,
    pub sidebar: SidebarConfig,
    pub timing: TimingConfig,
    pub icons: IconConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupTheme {
    pub name: String,
    pub icon: String,
    pub fg: String,
    pub bg: String,
}

impl Default for GroupTheme {
    fn default() -> Self {
        Self {
            name: "Default".into(),
            icon: "●".into(),
            fg: "#d0d0d0".into(),
            bg: "#303030".into(),
        }
    }
}

/// Pinned widgets, rendered below the scrollable window list in a fixed
/// order: clock, pet, git, session info, stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetToggles {
    pub clock: bool,
    pub pet: bool,
    pub git: bool,
    pub session_info: bool,
    pub stats: bool,
}

impl Default for WidgetToggles {
    fn default() -> Self {
        Self {
            clock: true,
            pet: true,
            git: true,
            session_info: true,
            stats: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidebarConfig {
    /// Desired sidebar width in cells. Re-asserted on every structural
    /// change; tmux would otherwise compress the pane under layout pressure.
    pub width: u16,
    pub min_width: u16,
    /// Below this width the pet items bar stacks onto its own line.
    pub mobile_threshold: u16,
    /// Content panes shorter than this never get a header pane.
    pub header_min_pane_height: u16,
}

impl Default for SidebarConfig {
    fn default() -> Self {
        Self {
            width: 25,
            min_width: 15,
            mobile_threshold: 20,
            header_min_pane_height: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long a `busy` indicator is trusted before being cleared.
    pub busy_stale_secs: u64,
    /// Minimum gap between two pane-layout reconciliation passes.
    pub layout_cooldown_ms: u64,
    /// Zero connected clients for this long means the daemon exits.
    pub idle_exit_secs: u64,
    pub window_refresh_secs: u64,
    pub layout_check_secs: u64,
    pub animation_ms: u64,
    pub git_refresh_secs: u64,
    pub watchdog_secs: u64,
    /// Soft deadline for a single tmux invocation.
    pub tmux_timeout_secs: u64,
    /// Per-step deadlines; a breach self-terminates the daemon.
    pub refresh_deadline_secs: u64,
    pub git_deadline_secs: u64,
    /// Outbound frames held per client before the oldest render is dropped.
    pub client_queue_depth: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            busy_stale_secs: 300,
            layout_cooldown_ms: 50,
            idle_exit_secs: 30,
            window_refresh_secs: 5,
            layout_check_secs: 2,
            animation_ms: 100,
            git_refresh_secs: 5,
            watchdog_secs: 5,
            tmux_timeout_secs: 4,
            refresh_deadline_secs: 8,
            git_deadline_secs: 6,
            client_queue_depth: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IconConfig {
    pub expanded: String,
    pub collapsed: String,
    pub active: String,
    pub branch_mid: String,
    pub branch_last: String,
    pub bell: String,
    pub activity: String,
    pub silence: String,
    /// Spinner frames cycled while a window is busy.
    pub busy_frames: Vec<String>,
    /// Frames cycled while a window waits for input. A single frame means
    /// a static icon (no animation ticks needed).
    pub input_frames: Vec<String>,
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            expanded: "▾".into(),
            collapsed: "▸".into(),
            active: "●".into(),
            branch_mid: "├─".into(),
            branch_last: "└─".into(),
            bell: "!".into(),
            activity: "*".into(),
            silence: "~".into(),
            busy_frames: ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]
                .into_iter()
                .map(String::from)
                .collect(),
            input_frames: vec!["?".into()],
        }
    }
}

impl Default for TabbyConfig {
    fn default() -> Self {
        Self {
            groups: vec![GroupTheme::default()],
            widgets: WidgetToggles::default(),
            sidebar: SidebarConfig::default(),
            timing: TimingConfig::default(),
            icons: IconConfig::default(),
        }
    }
}

impl TabbyConfig {
    /// Position of a group name in the configured ordering. Unconfigured
    /// groups sort after all configured ones, alphabetically.
    pub fn group_order(&self, name: &str) -> usize {
        self.groups
            .iter()
            .position(|g| g.name == name)
            .unwrap_or(self.groups.len())
    }

    pub fn theme_for(&self, name: &str) -> Option<&GroupTheme> {
        self.groups.iter().find(|g| g.name == name)
    }
}

/// Load configuration, falling back to built-in defaults when the file is
/// absent. A malformed file is an error, never silently ignored.
pub fn load_config(path: Option<&Path>) -> Result<TabbyConfig, TabbyError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => global_config_dir().join("config.toml"),
    };
    if !path.exists() {
        return Ok(TabbyConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| TabbyError::Config(format!("Failed to read {}: {e}", path.display())))?;
    toml::from_str(&content)
        .map_err(|e| TabbyError::Config(format!("Failed to parse {}: {e}", path.display())))
}

pub fn global_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("tabby")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let cfg = load_config(Some(Path::new("/nonexistent/config.toml"))).unwrap();
        assert_eq!(cfg.sidebar.width, 25);
        assert_eq!(cfg.sidebar.min_width, 15);
        assert!(cfg.widgets.pet);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r##"
[[groups]]
name = "work"
icon = "W"
fg = "#ffffff"
bg = "#000080"

[sidebar]
width = 32
"##,
        )
        .unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.sidebar.width, 32);
        assert_eq!(cfg.sidebar.min_width, 15); // default preserved
        assert_eq!(cfg.groups.len(), 1);
        assert_eq!(cfg.groups[0].name, "work");
        assert_eq!(cfg.group_order("work"), 0);
        assert_eq!(cfg.group_order("unknown"), 1);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not = [valid").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
