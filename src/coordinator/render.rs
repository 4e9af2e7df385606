use crate::config::TabbyConfig;
use crate::domain::model::Model;
use crate::domain::pet::PetInteraction;
use crate::domain::window::Window;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WIDTH: u16 = 25;
pub const DEFAULT_HEIGHT: u16 = 24;
pub const MIN_WIDTH: u16 = 10;
pub const MIN_HEIGHT: u16 = 5;

/// A clickable span of the rendered content. Sidebar regions cover whole
/// lines; header frames are one line tall, so their buttons carry a column
/// range as well.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region {
    #[serde(rename = "startLine")]
    pub start_line: usize,
    #[serde(rename = "endLine")]
    pub end_line: usize,
    #[serde(rename = "startCol", skip_serializing_if = "Option::is_none")]
    pub start_col: Option<usize>,
    #[serde(rename = "endCol", skip_serializing_if = "Option::is_none")]
    pub end_col: Option<usize>,
    pub action: String,
    pub target: String,
}

impl Region {
    pub fn line(line: usize, action: &str, target: &str) -> Self {
        Self {
            start_line: line,
            end_line: line,
            start_col: None,
            end_col: None,
            action: action.into(),
            target: target.into(),
        }
    }

    pub fn contains(&self, line: usize, col: usize) -> bool {
        if line < self.start_line || line > self.end_line {
            return false;
        }
        match (self.start_col, self.end_col) {
            (Some(s), Some(e)) => col >= s && col <= e,
            _ => true,
        }
    }
}

/// One rendered framebuffer for one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub seq: u64,
    pub content: String,
    #[serde(rename = "pinnedContent")]
    pub pinned_content: String,
    pub width: u16,
    pub height: u16,
    #[serde(rename = "totalLines")]
    pub total_lines: usize,
    #[serde(rename = "pinnedHeight")]
    pub pinned_height: usize,
    pub regions: Vec<Region>,
    #[serde(rename = "sidebar_bg", skip_serializing_if = "Option::is_none")]
    pub sidebar_bg: Option<String>,
}

/// One button cell on the pet items bar: line (pinned-relative), column
/// span, and the interaction a click resolves to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PetCell {
    pub line: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub action: PetInteraction,
}

/// Widget-internal click map for the pet rows. Lines are pinned-relative.
#[derive(Debug, Clone, Default)]
pub struct PetLayout {
    pub ground_line: Option<usize>,
    pub items_cells: Vec<PetCell>,
    /// Ground-row column of the pet itself and of each poop.
    pub pet_col: usize,
    pub poop_cols: Vec<usize>,
}

impl PetLayout {
    /// Resolve a pinned-relative click to a pet interaction.
    pub fn hit(&self, line: usize, col: usize) -> Option<PetInteraction> {
        for cell in &self.items_cells {
            if cell.line == line && col >= cell.start_col && col <= cell.end_col {
                return Some(cell.action);
            }
        }
        if self.ground_line == Some(line) {
            if self.poop_cols.iter().any(|c| col.abs_diff(*c) <= 1) {
                return Some(PetInteraction::Scoop);
            }
            if col.abs_diff(self.pet_col) <= 1 {
                return Some(PetInteraction::Pet);
            }
        }
        None
    }
}

/// The scrollable part of one sidebar render; the pinned block is built
/// separately by the widgets.
#[derive(Debug, Clone, Default)]
pub struct SidebarRender {
    pub content: String,
    pub total_lines: usize,
    pub regions: Vec<Region>,
    /// Window session-index per selectable window line, in display order.
    pub window_lines: Vec<u32>,
}

pub fn clamp_size(width: u16, height: u16) -> (u16, u16) {
    let w = if width < MIN_WIDTH { DEFAULT_WIDTH } else { width };
    let h = if height < MIN_HEIGHT { DEFAULT_HEIGHT } else { height };
    (w, h)
}

// --- ANSI styling -----------------------------------------------------------

pub fn fg(hex: &str) -> String {
    match parse_hex(hex) {
        Some((r, g, b)) => format!("\x1b[38;2;{r};{g};{b}m"),
        None => String::new(),
    }
}

pub fn bg(hex: &str) -> String {
    match parse_hex(hex) {
        Some((r, g, b)) => format!("\x1b[48;2;{r};{g};{b}m"),
        None => String::new(),
    }
}

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const REVERSE: &str = "\x1b[7m";

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

/// Resolved style for one window line.
pub struct WindowStyle {
    pub prefix: String,
    pub bg_hex: Option<String>,
}

/// Custom color beats group theme; the "transparent" sentinel means no
/// background at all, dim when inactive and bright when active.
pub fn resolve_window_style(window: &Window, group_fg: &str, group_bg: &str) -> WindowStyle {
    match window.custom_color.as_deref() {
        Some("transparent") => {
            let mut prefix = String::new();
            if window.active {
                prefix.push_str(BOLD);
            } else {
                prefix.push_str(DIM);
            }
            WindowStyle {
                prefix,
                bg_hex: None,
            }
        }
        Some(custom) => WindowStyle {
            prefix: format!("{}{}", fg("#ffffff"), bg(custom)),
            bg_hex: Some(custom.to_string()),
        },
        None => WindowStyle {
            prefix: format!("{}{}", fg(group_fg), bg(group_bg)),
            bg_hex: Some(group_bg.to_string()),
        },
    }
}

pub fn truncate(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let take = max.saturating_sub(1);
    let mut out: String = text.chars().take(take).collect();
    out.push('…');
    out
}

// --- Sidebar ----------------------------------------------------------------

/// Lay out the scrollable window list plus buttons. Widgets are rendered
/// separately into the pinned slot by the caller.
pub fn render_window_list(
    model: &Model,
    cfg: &TabbyConfig,
    width: u16,
    cursor: Option<usize>,
) -> SidebarRender {
    let mut lines: Vec<String> = Vec::new();
    let mut regions: Vec<Region> = Vec::new();
    let mut window_lines: Vec<u32> = Vec::new();
    let icons = &cfg.icons;
    let name_width = width.saturating_sub(6) as usize;

    for group in &model.groups {
        let collapsed = model.collapsed_groups.contains(&group.name);
        let disclosure = if collapsed {
            &icons.collapsed
        } else {
            &icons.expanded
        };
        let mut header = format!(
            "{}{} {} {}",
            fg(&group.fg),
            disclosure,
            group.icon,
            group.name
        );
        if collapsed {
            header.push_str(&format!(" ({})", group.window_ids.len()));
        }
        header.push_str(RESET);
        regions.push(Region::line(lines.len(), "toggle_group", &group.name));
        lines.push(header);

        if collapsed {
            continue;
        }

        let member_count = group.window_ids.len();
        for (pos, window_id) in group.window_ids.iter().enumerate() {
            let Some(window) = model.window_by_id(window_id) else {
                continue;
            };
            let last = pos + 1 == member_count;
            let at_cursor = cursor == Some(window_lines.len());
            regions.push(Region::line(
                lines.len(),
                "select_window",
                &window.index.to_string(),
            ));
            window_lines.push(window.index);
            lines.push(window_line(window, cfg, last, at_cursor, name_width, model));

            if window.panes.len() > 1 && !window.collapsed {
                let panes: Vec<_> = window.panes.iter().collect();
                for (pidx, pane) in panes.iter().enumerate() {
                    let pane_last = pidx + 1 == panes.len();
                    let branch = if pane_last {
                        &icons.branch_last
                    } else {
                        &icons.branch_mid
                    };
                    let marker = if window.active && pane.active {
                        icons.active.as_str()
                    } else {
                        " "
                    };
                    regions.push(Region::line(lines.len(), "select_pane", &pane.id));
                    lines.push(format!(
                        "   {marker}{branch} {}{}",
                        truncate(pane.display_title(), name_width.saturating_sub(4)),
                        RESET
                    ));
                }
            }
        }
    }

    for (label, action) in [
        ("+ new tab", "new_tab"),
        ("+ new group", "new_group"),
        ("× close tab", "close_tab"),
    ] {
        regions.push(Region::line(lines.len(), "button", action));
        lines.push(format!("{DIM}{label}{RESET}"));
    }

    SidebarRender {
        total_lines: lines.len(),
        content: lines.join("\n"),
        regions,
        window_lines,
    }
}

fn window_line(
    window: &Window,
    cfg: &TabbyConfig,
    last: bool,
    at_cursor: bool,
    name_width: usize,
    model: &Model,
) -> String {
    let icons = &cfg.icons;
    let group = model
        .groups
        .iter()
        .find(|g| g.window_ids.contains(&window.id));
    let (group_fg, group_bg) = group
        .map(|g| (g.fg.as_str(), g.bg.as_str()))
        .unwrap_or(("#d0d0d0", "#303030"));
    let style = resolve_window_style(window, group_fg, group_bg);

    let indicator = indicator_cell(window, cfg, model.anim_frame);
    let branch = if last {
        icons.branch_last.as_str()
    } else {
        icons.branch_mid.as_str()
    };

    // The active window overlays the branch head: collapse icon when the
    // window has hidden panes to disclose, active marker otherwise.
    let head = if window.active {
        if window.panes.len() > 1 {
            if window.collapsed {
                icons.collapsed.clone()
            } else {
                icons.expanded.clone()
            }
        } else {
            icons.active.clone()
        }
    } else {
        branch.to_string()
    };

    let cursor_mark = if at_cursor { REVERSE } else { "" };
    let icon = window
        .icon
        .as_deref()
        .map(|i| format!("{i} "))
        .unwrap_or_default();
    let name = truncate(&window.name, name_width.saturating_sub(icon.chars().count()));
    format!(
        "{cursor_mark}{}{indicator}{head} {icon}{name}{RESET}",
        style.prefix
    )
}

fn indicator_cell(window: &Window, cfg: &TabbyConfig, anim_frame: u64) -> String {
    let icons = &cfg.icons;
    let ind = &window.indicators;
    if ind.busy && !icons.busy_frames.is_empty() {
        let frame = anim_frame as usize % icons.busy_frames.len();
        return icons.busy_frames[frame].clone();
    }
    if ind.input && !icons.input_frames.is_empty() {
        let frame = anim_frame as usize % icons.input_frames.len();
        return icons.input_frames[frame].clone();
    }
    if ind.bell {
        return icons.bell.clone();
    }
    if ind.activity {
        return icons.activity.clone();
    }
    if ind.silence {
        return icons.silence.clone();
    }
    " ".into()
}

// --- Header -----------------------------------------------------------------

/// One-line frame for a header client, matching the target pane's width.
/// Buttons carry column ranges; the frame has only one line to hit.
pub fn render_header(title: &str, pane_id: &str, width: u16) -> (String, Vec<Region>) {
    let buttons = [("rename", "✎"), ("split", "◫"), ("close", "×")];
    let button_width: usize = buttons.iter().map(|(_, g)| g.chars().count() + 1).sum();
    let title_width = (width as usize).saturating_sub(button_width + 2);

    let mut line = format!("{DIM}{}{RESET}", truncate(title, title_width));
    let mut regions = Vec::new();
    let mut col = title_width + 1;
    for (action, glyph) in buttons {
        regions.push(Region {
            start_line: 0,
            end_line: 0,
            start_col: Some(col),
            end_col: Some(col + glyph.chars().count()),
            action: action.into(),
            target: pane_id.into(),
        });
        line.push_str(&format!(" {glyph}"));
        col += glyph.chars().count() + 1;
    }
    (line, regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::window::{Indicators, Pane};
    use chrono::Utc;

    fn make_pane(id: &str, window_id: &str, index: u32, active: bool) -> Pane {
        Pane {
            id: id.into(),
            window_id: window_id.into(),
            index,
            command: "zsh".into(),
            start_command: String::new(),
            locked_title: None,
            title: format!("pane{index}"),
            active,
            width: 80,
            height: 24,
            dead: false,
            pid: Some(100),
            path: "/tmp".into(),
        }
    }

    fn make_window(id: &str, index: u32, active: bool, panes: usize) -> Window {
        Window {
            id: id.into(),
            index,
            name: format!("win{index}"),
            active,
            indicators: Indicators::default(),
            group: None,
            custom_color: None,
            collapsed: false,
            name_locked: false,
            icon: None,
            panes: (0..panes)
                .map(|i| make_pane(&format!("%{index}{i}"), id, i as u32, active && i == 0))
                .collect(),
        }
    }

    fn model_with(windows: Vec<Window>) -> Model {
        let mut model = Model::new("main");
        model.replace_windows(windows, &TabbyConfig::default(), Utc::now());
        model
    }

    #[test]
    fn test_clamp_size() {
        assert_eq!(clamp_size(8, 40), (DEFAULT_WIDTH, 40));
        assert_eq!(clamp_size(80, 3), (80, DEFAULT_HEIGHT));
        assert_eq!(clamp_size(10, 5), (10, 5));
    }

    #[test]
    fn test_group_header_and_window_regions() {
        let model = model_with(vec![
            make_window("@1", 0, true, 1),
            make_window("@2", 1, false, 1),
        ]);
        let cfg = TabbyConfig::default();
        let render = render_window_list(&model, &cfg, 25, None);

        assert_eq!(render.regions[0].action, "toggle_group");
        assert_eq!(render.regions[0].target, "Default");
        let selects: Vec<_> = render
            .regions
            .iter()
            .filter(|r| r.action == "select_window")
            .collect();
        assert_eq!(selects.len(), 2);
        assert_eq!(selects[0].target, "0");
        assert_eq!(selects[1].target, "1");
        assert_eq!(render.window_lines, vec![0, 1]);
    }

    #[test]
    fn test_collapsed_group_shows_count_and_hides_windows() {
        let mut model = model_with(vec![
            make_window("@1", 0, true, 1),
            make_window("@2", 1, false, 1),
        ]);
        model.toggle_group("Default");
        let render = render_window_list(&model, &TabbyConfig::default(), 25, None);

        assert!(render.content.contains("(2)"));
        assert!(render.regions.iter().all(|r| r.action != "select_window"));
        assert!(render.window_lines.is_empty());
    }

    #[test]
    fn test_multi_pane_window_lists_panes() {
        let model = model_with(vec![make_window("@1", 0, true, 3)]);
        let render = render_window_list(&model, &TabbyConfig::default(), 25, None);

        let panes: Vec<_> = render
            .regions
            .iter()
            .filter(|r| r.action == "select_pane")
            .collect();
        assert_eq!(panes.len(), 3);
        assert_eq!(panes[0].target, "%00");
    }

    #[test]
    fn test_collapsed_window_hides_panes() {
        let mut w = make_window("@1", 0, true, 3);
        w.collapsed = true;
        let model = model_with(vec![w]);
        let render = render_window_list(&model, &TabbyConfig::default(), 25, None);
        assert!(render.regions.iter().all(|r| r.action != "select_pane"));
    }

    #[test]
    fn test_buttons_present() {
        let model = model_with(vec![make_window("@1", 0, true, 1)]);
        let render = render_window_list(&model, &TabbyConfig::default(), 25, None);
        let buttons: Vec<_> = render
            .regions
            .iter()
            .filter(|r| r.action == "button")
            .map(|r| r.target.as_str())
            .collect();
        assert_eq!(buttons, vec!["new_tab", "new_group", "close_tab"]);
    }

    #[test]
    fn test_transparent_sentinel_suppresses_background() {
        let mut w = make_window("@1", 0, false, 1);
        w.custom_color = Some("transparent".into());
        let style = resolve_window_style(&w, "#aaaaaa", "#222222");
        assert!(style.bg_hex.is_none());
        assert!(style.prefix.contains(DIM));

        w.active = true;
        let style = resolve_window_style(&w, "#aaaaaa", "#222222");
        assert!(style.prefix.contains(BOLD));
    }

    #[test]
    fn test_custom_color_overrides_group_theme() {
        let mut w = make_window("@1", 0, false, 1);
        w.custom_color = Some("#112233".into());
        let style = resolve_window_style(&w, "#aaaaaa", "#222222");
        assert_eq!(style.bg_hex.as_deref(), Some("#112233"));
    }

    #[test]
    fn test_truncate_marks_overflow() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-name", 8), "a-very-…");
    }

    #[test]
    fn test_header_regions_carry_columns() {
        let (line, regions) = render_header("vim main.rs", "%7", 60);
        assert!(!line.is_empty());
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].action, "rename");
        assert_eq!(regions[0].target, "%7");
        assert!(regions.iter().all(|r| r.start_col.is_some()));
        // Later buttons sit further right.
        assert!(regions[1].start_col > regions[0].start_col);
    }

    #[test]
    fn test_region_containment_with_columns() {
        let region = Region {
            start_line: 0,
            end_line: 0,
            start_col: Some(5),
            end_col: Some(8),
            action: "close".into(),
            target: "%1".into(),
        };
        assert!(region.contains(0, 6));
        assert!(!region.contains(0, 2));
        assert!(!region.contains(1, 6));

        let line_region = Region::line(3, "select_window", "1");
        assert!(line_region.contains(3, 0));
        assert!(line_region.contains(3, 99));
        assert!(!line_region.contains(2, 0));
    }
}
