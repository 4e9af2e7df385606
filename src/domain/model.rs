use crate::config::TabbyConfig;
use crate::domain::group::{resolve_groups, Group};
use crate::domain::pet::PetState;
use crate::domain::window::Window;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Opaque record produced by the git collector. The daemon only renders it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GitStatus {
    pub repo_name: String,
    pub branch: String,
    pub dirty: usize,
    pub ahead: usize,
    pub behind: usize,
}

/// Opaque record produced by the stats collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemStats {
    pub load_one: f64,
    pub mem_used_mb: u64,
    pub mem_total_mb: u64,
}

/// In-memory snapshot of the session. Single writer (the coordinator);
/// everything derived is recomputed on replace.
#[derive(Debug, Clone)]
pub struct Model {
    pub session: String,
    pub windows: Vec<Window>,
    pub groups: Vec<Group>,
    pub collapsed_groups: HashSet<String>,
    /// When each window's busy flag was first observed, for staleness.
    pub busy_since: HashMap<String, DateTime<Utc>>,
    pub pet: PetState,
    pub git: Option<GitStatus>,
    pub stats: Option<SystemStats>,
    /// Bumped on every replace; renders observe monotonic versions.
    pub version: u64,
    /// Advanced by the animation ticker; drives spinner frames.
    pub anim_frame: u64,
}

impl Model {
    pub fn new(session: &str) -> Self {
        Self {
            session: session.to_string(),
            windows: Vec::new(),
            groups: Vec::new(),
            collapsed_groups: HashSet::new(),
            busy_since: HashMap::new(),
            pet: PetState::default(),
            git: None,
            stats: None,
            version: 0,
            anim_frame: 0,
        }
    }

    /// Swap in a freshly listed window set and recompute grouping and
    /// busy bookkeeping.
    pub fn replace_windows(&mut self, windows: Vec<Window>, cfg: &TabbyConfig, now: DateTime<Utc>) {
        self.windows = windows;
        self.groups = resolve_groups(&self.windows, cfg);

        // Track when busy turned on; drop entries for windows that cleared
        // it or disappeared.
        let mut seen: HashSet<&str> = HashSet::new();
        for w in &self.windows {
            if w.indicators.busy {
                seen.insert(w.id.as_str());
            }
        }
        self.busy_since.retain(|id, _| seen.contains(id.as_str()));
        for w in &self.windows {
            if w.indicators.busy {
                self.busy_since.entry(w.id.clone()).or_insert(now);
            }
        }

        self.version += 1;
    }

    /// Windows whose busy flag has outlived the staleness horizon.
    pub fn stale_busy_windows(&self, horizon_secs: u64, now: DateTime<Utc>) -> Vec<String> {
        self.busy_since
            .iter()
            .filter(|(_, since)| {
                (now - **since).num_seconds() >= horizon_secs as i64
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn window_by_id(&self, id: &str) -> Option<&Window> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn window_by_index(&self, index: u32) -> Option<&Window> {
        self.windows.iter().find(|w| w.index == index)
    }

    pub fn active_window(&self) -> Option<&Window> {
        self.windows.iter().find(|w| w.active)
    }

    /// Flip a window's collapsed flag (its pane list disclosure). Returns
    /// the new state, or None for an unknown window.
    pub fn toggle_window(&mut self, index: u32) -> Option<bool> {
        let window = self.windows.iter_mut().find(|w| w.index == index)?;
        window.collapsed = !window.collapsed;
        Some(window.collapsed)
    }

    /// Flip a group's collapsed flag. Returns the new collapsed state.
    pub fn toggle_group(&mut self, name: &str) -> bool {
        if self.collapsed_groups.remove(name) {
            false
        } else {
            self.collapsed_groups.insert(name.to_string());
            true
        }
    }

    /// The collapsed set serialised for `@tabby_collapsed_groups`.
    pub fn collapsed_groups_json(&self) -> String {
        let mut names: Vec<&str> = self.collapsed_groups.iter().map(String::as_str).collect();
        names.sort_unstable();
        serde_json::to_string(&names).unwrap_or_else(|_| "[]".into())
    }

    pub fn load_collapsed_groups(&mut self, json: &str) {
        if let Ok(names) = serde_json::from_str::<Vec<String>>(json) {
            self.collapsed_groups = names.into_iter().collect();
        }
    }

    /// Deterministic short digest over everything that affects the window
    /// list rendering. Used to skip broadcasts when nothing visible moved.
    pub fn windows_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for w in &self.windows {
            hasher.update(w.id.as_bytes());
            hasher.update(w.index.to_le_bytes());
            hasher.update(w.name.as_bytes());
            hasher.update([
                w.active as u8,
                w.collapsed as u8,
                w.indicators.activity as u8,
                w.indicators.bell as u8,
                w.indicators.silence as u8,
                w.indicators.busy as u8,
                w.indicators.input as u8,
            ]);
            hasher.update(w.group.as_deref().unwrap_or("").as_bytes());
            hasher.update(w.custom_color.as_deref().unwrap_or("").as_bytes());
            for p in &w.panes {
                hasher.update(p.id.as_bytes());
                hasher.update(p.display_title().as_bytes());
                hasher.update([p.active as u8, p.dead as u8]);
                hasher.update(p.width.to_le_bytes());
                hasher.update(p.height.to_le_bytes());
            }
            hasher.update([0x1f]);
        }
        let mut names: Vec<&str> = self.collapsed_groups.iter().map(String::as_str).collect();
        names.sort_unstable();
        for n in names {
            hasher.update(n.as_bytes());
        }
        short_hex(hasher)
    }

    pub fn git_hash(&self) -> String {
        let mut hasher = Sha256::new();
        if let Some(git) = &self.git {
            hasher.update(git.repo_name.as_bytes());
            hasher.update(git.branch.as_bytes());
            hasher.update(git.dirty.to_le_bytes());
            hasher.update(git.ahead.to_le_bytes());
            hasher.update(git.behind.to_le_bytes());
        }
        short_hex(hasher)
    }

    pub fn pet_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let p = &self.pet;
        hasher.update((p.x.round() as i64).to_le_bytes());
        hasher.update((p.y.round() as i64).to_le_bytes());
        hasher.update(format!("{:?}", p.activity).as_bytes());
        hasher.update((p.hunger.round() as i64).to_le_bytes());
        hasher.update((p.happiness.round() as i64).to_le_bytes());
        hasher.update(p.marquee_offset.to_le_bytes());
        for item in &p.items {
            hasher.update(format!("{:?}", item.kind).as_bytes());
            hasher.update((item.x.round() as i64).to_le_bytes());
            hasher.update((item.y.round() as i64).to_le_bytes());
        }
        if let Some(t) = p.current_thought() {
            hasher.update(t.as_bytes());
        }
        short_hex(hasher)
    }

    /// True while any indicator needs per-frame redraws: a busy spinner, or
    /// a multi-frame input indicator.
    pub fn has_active_indicator_animation(&self, input_frames: usize) -> bool {
        self.windows.iter().any(|w| {
            w.indicators.busy || (w.indicators.input && input_frames > 1)
        })
    }
}

fn short_hex(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::window::{Indicators, Pane};

    fn make_window(id: &str, index: u32, active: bool) -> Window {
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
            panes: vec![Pane {
                id: format!("%{index}"),
                window_id: id.into(),
                index: 0,
                command: "zsh".into(),
                start_command: String::new(),
                locked_title: None,
                title: String::new(),
                active: true,
                width: 80,
                height: 24,
                dead: false,
                pid: Some(100),
                path: "/tmp".into(),
            }],
        }
    }

    #[test]
    fn test_replace_bumps_version_and_regroups() {
        let mut model = Model::new("main");
        let cfg = TabbyConfig::default();
        model.replace_windows(vec![make_window("@1", 0, true)], &cfg, Utc::now());
        assert_eq!(model.version, 1);
        assert_eq!(model.groups.len(), 1);
        model.replace_windows(vec![], &cfg, Utc::now());
        assert_eq!(model.version, 2);
        assert!(model.groups.is_empty());
    }

    #[test]
    fn test_windows_hash_stable_and_sensitive() {
        let mut model = Model::new("main");
        let cfg = TabbyConfig::default();
        model.replace_windows(
            vec![make_window("@1", 0, true), make_window("@2", 1, false)],
            &cfg,
            Utc::now(),
        );
        let h1 = model.windows_hash();
        assert_eq!(h1, model.windows_hash());

        model.windows[1].name = "renamed".into();
        assert_ne!(h1, model.windows_hash());
    }

    #[test]
    fn test_toggle_window_flips_collapse() {
        let mut model = Model::new("main");
        let cfg = TabbyConfig::default();
        model.replace_windows(vec![make_window("@1", 0, true)], &cfg, Utc::now());

        assert_eq!(model.toggle_window(0), Some(true));
        assert!(model.windows[0].collapsed);
        assert_eq!(model.toggle_window(0), Some(false));
        assert_eq!(model.toggle_window(99), None);
    }

    #[test]
    fn test_toggle_group_round_trips() {
        let mut model = Model::new("main");
        let before = model.collapsed_groups_json();
        assert!(model.toggle_group("work"));
        assert_eq!(model.collapsed_groups_json(), r#"["work"]"#);
        assert!(!model.toggle_group("work"));
        assert_eq!(model.collapsed_groups_json(), before);
    }

    #[test]
    fn test_collapsed_groups_json_round_trip() {
        let mut model = Model::new("main");
        model.toggle_group("b");
        model.toggle_group("a");
        let json = model.collapsed_groups_json();
        assert_eq!(json, r#"["a","b"]"#);

        let mut other = Model::new("main");
        other.load_collapsed_groups(&json);
        assert_eq!(other.collapsed_groups, model.collapsed_groups);
    }

    #[test]
    fn test_busy_since_tracks_flag_lifetime() {
        let mut model = Model::new("main");
        let cfg = TabbyConfig::default();
        let t0 = Utc::now();

        let mut w = make_window("@1", 0, true);
        w.indicators.busy = true;
        model.replace_windows(vec![w.clone()], &cfg, t0);
        assert!(model.busy_since.contains_key("@1"));

        // Still busy on a later refresh: original timestamp preserved.
        let t1 = t0 + chrono::Duration::seconds(10);
        model.replace_windows(vec![w.clone()], &cfg, t1);
        assert_eq!(model.busy_since["@1"], t0);

        // Cleared: bookkeeping drops the entry.
        w.indicators.busy = false;
        model.replace_windows(vec![w], &cfg, t1);
        assert!(model.busy_since.is_empty());
    }

    #[test]
    fn test_stale_busy_detection() {
        let mut model = Model::new("main");
        let cfg = TabbyConfig::default();
        let t0 = Utc::now();

        let mut w = make_window("@1", 0, true);
        w.indicators.busy = true;
        model.replace_windows(vec![w], &cfg, t0);

        assert!(model.stale_busy_windows(300, t0).is_empty());
        let late = t0 + chrono::Duration::seconds(301);
        assert_eq!(model.stale_busy_windows(300, late), vec!["@1".to_string()]);
    }

    #[test]
    fn test_indicator_animation_predicate() {
        let mut model = Model::new("main");
        let cfg = TabbyConfig::default();
        model.replace_windows(vec![make_window("@1", 0, true)], &cfg, Utc::now());
        assert!(!model.has_active_indicator_animation(1));

        model.windows[0].indicators.input = true;
        assert!(!model.has_active_indicator_animation(1)); // static icon
        assert!(model.has_active_indicator_animation(4)); // animated frames

        model.windows[0].indicators.input = false;
        model.windows[0].indicators.busy = true;
        assert!(model.has_active_indicator_animation(1));
    }
}
