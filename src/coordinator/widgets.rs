use crate::config::TabbyConfig;
use crate::coordinator::render::{PetCell, PetLayout, DIM, RESET};
use crate::domain::model::Model;
use crate::domain::pet::{ItemKind, PetActivity, PetInteraction, PetState};
use chrono::{DateTime, Local};

/// The pinned block below the scrollable list.
#[derive(Debug, Clone, Default)]
pub struct PinnedRender {
    pub lines: Vec<String>,
    pub pet: Option<PetLayout>,
}

/// Render enabled widgets in their fixed order: clock, pet, git, session
/// info, stats.
pub fn render_pinned(
    model: &Model,
    cfg: &TabbyConfig,
    width: u16,
    client_count: usize,
    now: DateTime<Local>,
) -> PinnedRender {
    let mut out = PinnedRender::default();

    if cfg.widgets.clock {
        out.lines.push(render_clock(now, width));
    }
    if cfg.widgets.pet {
        let offset = out.lines.len();
        let (mut lines, mut layout) = render_pet(&model.pet, width, cfg.sidebar.mobile_threshold);
        layout.ground_line = layout.ground_line.map(|l| l + offset);
        for cell in &mut layout.items_cells {
            cell.line += offset;
        }
        out.lines.append(&mut lines);
        out.pet = Some(layout);
    }
    if cfg.widgets.git {
        if let Some(git) = &model.git {
            out.lines.push(format!(
                "{DIM} {} ±{}{}{} ({}){RESET}",
                truncate_widget(&git.branch, width.saturating_sub(12) as usize),
                git.dirty,
                if git.ahead > 0 {
                    format!(" ↑{}", git.ahead)
                } else {
                    String::new()
                },
                if git.behind > 0 {
                    format!(" ↓{}", git.behind)
                } else {
                    String::new()
                },
                git.repo_name,
            ));
        }
    }
    if cfg.widgets.session_info {
        let pane_count: usize = model.windows.iter().map(|w| w.panes.len()).sum();
        out.lines.push(format!(
            "{DIM} {}  {}w/{}p  {} viewer{}{RESET}",
            model.session,
            model.windows.len(),
            pane_count,
            client_count,
            if client_count == 1 { "" } else { "s" },
        ));
    }
    if cfg.widgets.stats {
        if let Some(stats) = &model.stats {
            out.lines.push(format!(
                "{DIM} load {:.2}  mem {}/{}M{RESET}",
                stats.load_one, stats.mem_used_mb, stats.mem_total_mb,
            ));
        }
    }

    out
}

pub fn render_clock(now: DateTime<Local>, width: u16) -> String {
    let text = if width >= 22 {
        now.format("%H:%M  %a %d %b").to_string()
    } else {
        now.format("%H:%M").to_string()
    };
    format!("{DIM} {text}{RESET}")
}

fn pet_glyph(activity: PetActivity) -> char {
    match activity {
        PetActivity::Idle => 'ᗢ',
        PetActivity::Walking => 'ᗢ',
        PetActivity::Jumping => 'ᗜ',
        PetActivity::Playing => 'ᗥ',
        PetActivity::Eating => 'ᗧ',
        PetActivity::Sleeping => 'ᶻ',
        PetActivity::Happy => 'ᗜ',
        PetActivity::Hungry => 'ᗝ',
        PetActivity::Shooting => 'ᗪ',
    }
}

fn item_glyph(kind: ItemKind) -> char {
    match kind {
        ItemKind::Food => '▪',
        ItemKind::Yarn => '●',
        ItemKind::Poop => '♨',
        ItemKind::Heart => '♥',
    }
}

/// Five rows: thought marquee, high air, low air, ground, items bar. One
/// cell per creature or object. Narrow widths stack the items bar onto two
/// lines so the buttons stay hittable.
pub fn render_pet(pet: &PetState, width: u16, mobile_threshold: u16) -> (Vec<String>, PetLayout) {
    let cols = width.max(8) as usize;
    let mut layout = PetLayout::default();
    let mut lines = Vec::with_capacity(5);

    lines.push(thought_row(pet, cols));

    let mut high = vec![' '; cols];
    let mut low = vec![' '; cols];
    let mut ground = vec![' '; cols];

    for item in &pet.items {
        let col = (item.x.round() as usize).min(cols - 1);
        let row = if item.y >= 2.0 {
            &mut high
        } else if item.y >= 1.0 {
            &mut low
        } else {
            if item.kind == ItemKind::Poop {
                layout.poop_cols.push(col);
            }
            &mut ground
        };
        row[col] = item_glyph(item.kind);
    }

    let pet_col = (pet.x.round() as usize).min(cols - 1);
    let pet_row = if pet.y >= 2.0 {
        &mut high
    } else if pet.y >= 1.0 {
        &mut low
    } else {
        layout.pet_col = pet_col;
        &mut ground
    };
    pet_row[pet_col] = pet_glyph(pet.activity);

    lines.push(high.into_iter().collect());
    lines.push(low.into_iter().collect());
    layout.ground_line = Some(lines.len());
    lines.push(ground.into_iter().collect());

    if width < mobile_threshold {
        // Stacked: feed/play on one line, scoop below it.
        let line_no = lines.len();
        let (text, mut cells) = items_bar(
            line_no,
            &[("feed", PetInteraction::Feed), ("play", PetInteraction::Play)],
        );
        lines.push(text);
        layout.items_cells.append(&mut cells);

        let line_no = lines.len();
        let (text, mut cells) = items_bar(line_no, &[("scoop", PetInteraction::Scoop)]);
        lines.push(text);
        layout.items_cells.append(&mut cells);
    } else {
        let line_no = lines.len();
        let (text, mut cells) = items_bar(
            line_no,
            &[
                ("feed", PetInteraction::Feed),
                ("play", PetInteraction::Play),
                ("scoop", PetInteraction::Scoop),
            ],
        );
        lines.push(text);
        layout.items_cells.append(&mut cells);
    }

    (lines, layout)
}

fn items_bar(line_no: usize, buttons: &[(&str, PetInteraction)]) -> (String, Vec<PetCell>) {
    let mut line = String::new();
    let mut cells = Vec::new();
    let mut col = 0usize;
    for (label, action) in buttons {
        let text = format!("[{label}]");
        cells.push(PetCell {
            line: line_no,
            start_col: col,
            end_col: col + text.chars().count() - 1,
            action: *action,
        });
        col += text.chars().count() + 1;
        line.push_str(&text);
        line.push(' ');
    }
    (format!("{DIM}{}{RESET}", line.trim_end()), cells)
}

fn thought_row(pet: &PetState, cols: usize) -> String {
    let Some(thought) = pet.current_thought() else {
        return String::new();
    };
    let visible = cols.saturating_sub(4);
    let chars: Vec<char> = thought.chars().collect();
    let text: String = if chars.len() <= visible {
        thought.to_string()
    } else {
        // Marquee: rotate through thought + gap.
        let padded: Vec<char> = chars
            .iter()
            .copied()
            .chain("   ".chars())
            .collect();
        (0..visible)
            .map(|i| padded[(pet.marquee_offset + i) % padded.len()])
            .collect()
    };
    format!("{DIM}💭 {text}{RESET}")
}

fn truncate_widget(text: &str, max: usize) -> String {
    crate::coordinator::render::truncate(text, max.max(4))
}
