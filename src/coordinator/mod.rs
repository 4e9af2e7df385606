pub mod actions;
pub mod input;
pub mod render;
pub mod widgets;

use crate::config::TabbyConfig;
use crate::coordinator::actions::Action;
use crate::coordinator::input::{handle_key, KeyOutcome, KeyState};
use crate::coordinator::render::{
    clamp_size, render_header, render_window_list, Frame, PetLayout, Region,
};
use crate::domain::model::{GitStatus, Model, SystemStats};
use crate::domain::window::Window;
use crate::error::TabbyError;
use crate::infra::pet_store::PetStore;
use crate::infra::tmux::{pane_target_regex, TmuxClient};
use chrono::{Local, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// What an input event asks the caller to do next. Refreshes coalesce in
/// the scheduler; a redraw touches only the originating client; menus and
/// pickers go back to that client as targeted one-shot messages.
#[derive(Debug, Clone, PartialEq)]
pub enum InputResponse {
    None,
    RedrawClient,
    NeedsRefresh,
    ShowMenu(Vec<crate::server::protocol::MenuItem>),
    ShowMarkerPicker(Vec<String>),
}

enum MouseHit {
    Act(Action),
    WindowMenu(String),
}

/// Context menu for a right-clicked window line.
fn window_context_menu(window_index: &str) -> Vec<crate::server::protocol::MenuItem> {
    use crate::server::protocol::MenuItem;
    [
        ("Select", "select_window"),
        ("Collapse/expand", "toggle_window"),
        ("Close", "close_window"),
    ]
    .into_iter()
    .map(|(label, action)| MenuItem {
        label: label.into(),
        action: action.into(),
        target: window_index.to_string(),
    })
    .collect()
}

/// Per-client render bookkeeping: last frame's regions and layout, cursor
/// and confirmation state for the keymap.
#[derive(Debug, Default)]
struct ClientView {
    seq: u64,
    width: u16,
    height: u16,
    regions: Vec<Region>,
    window_lines: Vec<u32>,
    pet: Option<PetLayout>,
    pinned_height: usize,
    keys: KeyState,
}

/// Single writer to the model and single producer of render frames.
/// tmux calls never run under a lock; mutations take the write lock
/// briefly at the end of a step.
pub struct Coordinator {
    cfg: TabbyConfig,
    tmux: TmuxClient,
    pet_store: PetStore,
    model: RwLock<Model>,
    clients: Mutex<HashMap<String, ClientView>>,
}

impl Coordinator {
    pub fn new(cfg: TabbyConfig, tmux: TmuxClient, pet_store: PetStore, session: &str) -> Self {
        Self {
            cfg,
            tmux,
            pet_store,
            model: RwLock::new(Model::new(session)),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn tmux(&self) -> &TmuxClient {
        &self.tmux
    }

    /// Restore durable state: the pet file and the collapsed-group set
    /// persisted as a session option.
    pub async fn bootstrap(&self) {
        let pet = self.pet_store.load().await;
        let collapsed = self
            .tmux
            .get_session_option("@tabby_collapsed_groups")
            .await;
        let mut model = self.model.write().await;
        model.pet = pet;
        if let Some(json) = collapsed {
            model.load_collapsed_groups(&json);
        }
    }

    /// Fetch a fresh window list and swap it into the model. Busy flags
    /// older than the staleness horizon are cleared here, through the
    /// facade, before any frame is produced from the new snapshot.
    pub async fn refresh_windows(&self) -> Result<String, TabbyError> {
        let windows = self.tmux.list_windows_with_panes().await?;
        let now = Utc::now();

        let stale: Vec<String> = {
            let mut model = self.model.write().await;
            model.replace_windows(windows, &self.cfg, now);
            let stale = model.stale_busy_windows(self.cfg.timing.busy_stale_secs, now);
            for id in &stale {
                if let Some(w) = model.windows.iter_mut().find(|w| &w.id == id) {
                    w.indicators.busy = false;
                }
                model.busy_since.remove(id);
            }
            stale
        };

        for id in &stale {
            info!(window = %id, "clearing stale busy indicator");
            self.tmux.unset_window_option(id, "@tabby_busy").await;
        }

        Ok(self.model.read().await.windows_hash())
    }

    pub async fn model_snapshot(&self) -> Model {
        self.model.read().await.clone()
    }

    pub async fn active_window_id(&self) -> Option<String> {
        self.model.read().await.active_window().map(|w| w.id.clone())
    }

    pub async fn set_git(&self, git: Option<GitStatus>) -> bool {
        let mut model = self.model.write().await;
        let before = model.git_hash();
        model.git = git;
        model.git_hash() != before
    }

    pub async fn set_stats(&self, stats: Option<SystemStats>) {
        self.model.write().await.stats = stats;
    }

    /// Working directory of the focused content pane, for the git widget.
    pub async fn active_pane_path(&self) -> Option<std::path::PathBuf> {
        let model = self.model.read().await;
        let window = model.active_window()?;
        let pane = window.panes.iter().find(|p| p.active && !p.is_utility())?;
        if pane.path.is_empty() {
            None
        } else {
            Some(std::path::PathBuf::from(&pane.path))
        }
    }

    /// One animation frame: advance spinner frames and pet physics.
    /// Returns true when something observable changed. The pet file is
    /// written on every tick that mutated pet state, so physics survive
    /// an unclean exit.
    pub async fn tick_animation(&self) -> bool {
        let (changed, pet_changed) = {
            let mut model = self.model.write().await;
            let mut changed = false;
            if model.has_active_indicator_animation(self.cfg.icons.input_frames.len()) {
                model.anim_frame = model.anim_frame.wrapping_add(1);
                changed = true;
            }
            let mut pet_changed = false;
            if self.cfg.widgets.pet {
                let width = self.cfg.sidebar.width;
                pet_changed = model.pet.tick(Utc::now(), width);
            }
            (changed || pet_changed, pet_changed)
        };
        if pet_changed {
            self.persist_pet().await;
        }
        changed
    }

    /// Drain any thought the external generator left beside the pet file.
    /// Returns true when a new thought arrived.
    pub async fn poll_pet_thought(&self) -> bool {
        let Some(thought) = self.pet_store.take_thought().await else {
            return false;
        };
        self.model.write().await.pet.push_thought(thought);
        self.persist_pet().await;
        true
    }

    pub async fn persist_pet(&self) {
        let pet = self.model.read().await.pet.clone();
        if let Err(e) = self.pet_store.save(&pet).await {
            warn!(error = %e, "failed to persist pet state");
        }
    }

    // --- client lifecycle ---------------------------------------------------

    pub async fn client_attached(&self, client_id: &str) {
        self.clients
            .lock()
            .await
            .insert(client_id.to_string(), ClientView::default());
    }

    pub async fn client_detached(&self, client_id: &str) {
        self.clients.lock().await.remove(client_id);
    }

    pub async fn update_client_size(&self, client_id: &str, width: u16, height: u16) {
        if let Some(view) = self.clients.lock().await.get_mut(client_id) {
            view.width = width;
            view.height = height;
        }
    }

    /// Map a viewer's pane id to its client identity: the enclosing window
    /// for sidebars, `header:<target>` for headers.
    pub async fn resolve_identity(&self, pane_id: &str) -> Option<String> {
        {
            let model = self.model.read().await;
            for window in &model.windows {
                if let Some(pane) = window.panes.iter().find(|p| p.id == pane_id) {
                    if let Some(caps) = pane_target_regex().captures(&pane.start_command) {
                        return Some(format!("header:{}", &caps[1]));
                    }
                    return Some(window.id.clone());
                }
            }
        }
        // Pane spawned after our last refresh: ask tmux directly.
        self.tmux.window_of_pane(pane_id).await
    }

    // --- rendering ----------------------------------------------------------

    /// Produce the next frame for a client. Sequence numbers are per
    /// client and strictly ascending.
    pub async fn render_for_client(&self, client_id: &str, width: u16, height: u16) -> Frame {
        if let Some(pane_id) = client_id.strip_prefix("header:") {
            return self.render_header_frame(client_id, pane_id, width).await;
        }
        self.render_sidebar_frame(client_id, width, height).await
    }

    async fn render_sidebar_frame(&self, client_id: &str, width: u16, height: u16) -> Frame {
        let (width, height) = clamp_size(width, height);
        let model = self.model.read().await;

        let mut clients = self.clients.lock().await;
        let view = clients.entry(client_id.to_string()).or_default();

        let cursor = Some(view.keys.cursor);
        let list = render_window_list(&model, &self.cfg, width, cursor);
        let pinned = widgets::render_pinned(
            &model,
            &self.cfg,
            width,
            clients.len(),
            Local::now(),
        );

        let view = clients.get_mut(client_id).expect("inserted above");
        view.seq += 1;
        view.width = width;
        view.height = height;
        view.regions = list.regions.clone();
        view.window_lines = list.window_lines.clone();
        view.pet = pinned.pet.clone();
        view.pinned_height = pinned.lines.len();
        // Keep the cursor inside the selectable range after topology moves.
        if view.keys.cursor >= list.window_lines.len() {
            view.keys.cursor = list.window_lines.len().saturating_sub(1);
        }

        let sidebar_bg = model
            .active_window()
            .and_then(|w| match w.custom_color.as_deref() {
                Some("transparent") => None,
                Some(c) => Some(c.to_string()),
                None => model
                    .groups
                    .iter()
                    .find(|g| g.window_ids.contains(&w.id))
                    .map(|g| g.bg.clone()),
            });

        Frame {
            seq: view.seq,
            content: list.content,
            pinned_content: pinned.lines.join("\n"),
            width,
            height,
            total_lines: list.total_lines,
            pinned_height: pinned.lines.len(),
            regions: list.regions,
            sidebar_bg,
        }
    }

    async fn render_header_frame(&self, client_id: &str, pane_id: &str, width: u16) -> Frame {
        let model = self.model.read().await;
        let (title, pane_width) = model
            .windows
            .iter()
            .flat_map(|w| w.panes.iter())
            .find(|p| p.id == pane_id)
            .map(|p| (p.display_title().to_string(), p.width))
            .unwrap_or_else(|| (String::new(), width));

        let width = if pane_width > 0 { pane_width } else { width };
        let (line, regions) = render_header(&title, pane_id, width);

        let mut clients = self.clients.lock().await;
        let view = clients.entry(client_id.to_string()).or_default();
        view.seq += 1;
        view.width = width;
        view.height = 1;
        view.regions = regions.clone();

        Frame {
            seq: view.seq,
            content: line,
            pinned_content: String::new(),
            width,
            height: 1,
            total_lines: 1,
            pinned_height: 0,
            regions,
            sidebar_bg: None,
        }
    }

    // --- input --------------------------------------------------------------

    pub async fn handle_input(
        &self,
        client_id: &str,
        event: &crate::server::protocol::InputEvent,
    ) -> InputResponse {
        use crate::server::protocol::InputKind;
        match event.kind {
            InputKind::Action => {
                let action = Action::from_tag(
                    event.resolved_action.as_deref().unwrap_or(""),
                    event.resolved_target.as_deref().unwrap_or(""),
                );
                match action {
                    Some(action) => self.execute(client_id, action).await,
                    None => {
                        debug!(client = client_id, action = ?event.resolved_action, "unknown resolved action");
                        InputResponse::None
                    }
                }
            }
            InputKind::Mouse => self.handle_mouse(client_id, event).await,
            InputKind::Key => self.handle_key_event(client_id, event).await,
        }
    }

    async fn handle_mouse(
        &self,
        client_id: &str,
        event: &crate::server::protocol::InputEvent,
    ) -> InputResponse {
        // Presses act; drags, releases and scrolls are the viewer's
        // business.
        if let Some(action) = event.action.as_deref() {
            if action != "press" && action != "click" {
                return InputResponse::None;
            }
        }
        let right_click = matches!(event.button.as_deref(), Some("right") | Some("3"));
        if !right_click {
            if let Some(button) = event.button.as_deref() {
                if button != "left" && button != "1" {
                    return InputResponse::None;
                }
            }
        }

        let (Some(x), Some(y)) = (event.mouse_x, event.mouse_y) else {
            return InputResponse::None;
        };
        let offset = event.viewport_offset.unwrap_or(0);

        let hit = {
            let clients = self.clients.lock().await;
            let Some(view) = clients.get(client_id) else {
                return InputResponse::None;
            };

            let content_rows = (view.height as usize).saturating_sub(view.pinned_height);
            if (y as usize) >= content_rows {
                // Click landed on the pinned block.
                let pinned_line = y as usize - content_rows;
                view.pet
                    .as_ref()
                    .and_then(|layout| layout.hit(pinned_line, x as usize))
                    .map(Action::Pet)
                    .map(MouseHit::Act)
            } else {
                let content_line = y as usize + offset;
                view.regions
                    .iter()
                    .find(|r| r.contains(content_line, x as usize))
                    .and_then(|r| {
                        if right_click && r.action == "select_window" {
                            Some(MouseHit::WindowMenu(r.target.clone()))
                        } else if right_click {
                            None
                        } else {
                            Action::from_tag(&r.action, &r.target).map(MouseHit::Act)
                        }
                    })
            }
        };

        match hit {
            Some(MouseHit::Act(action)) => self.execute(client_id, action).await,
            Some(MouseHit::WindowMenu(index)) => {
                InputResponse::ShowMenu(window_context_menu(&index))
            }
            None => InputResponse::None,
        }
    }

    async fn handle_key_event(
        &self,
        client_id: &str,
        event: &crate::server::protocol::InputEvent,
    ) -> InputResponse {
        let Some(key) = event.key.as_deref() else {
            return InputResponse::None;
        };

        let (outcome, close_target) = {
            let mut clients = self.clients.lock().await;
            let Some(view) = clients.get_mut(client_id) else {
                return InputResponse::None;
            };
            let window_lines = view.window_lines.clone();
            let outcome = handle_key(&mut view.keys, key, &window_lines);
            let close_target = window_lines.get(view.keys.cursor).copied();
            (outcome, close_target)
        };

        match outcome {
            KeyOutcome::Redraw => InputResponse::RedrawClient,
            KeyOutcome::Ignored => InputResponse::None,
            KeyOutcome::Run(Action::CloseTab) => {
                // Keymap closes the window under the cursor, not the
                // active one.
                self.close_window(close_target).await;
                InputResponse::NeedsRefresh
            }
            KeyOutcome::Run(action) => self.execute(client_id, action).await,
        }
    }

    // --- action execution ---------------------------------------------------

    async fn execute(&self, client_id: &str, action: Action) -> InputResponse {
        let needs_refresh = action.needs_refresh();
        match action {
            Action::SelectWindow(index) => {
                self.tmux.select_window(index).await;
                self.tmux.focus_right().await;
            }
            Action::SelectPane(pane_id) => {
                self.tmux.select_pane(&pane_id).await;
            }
            Action::ToggleGroup(name) => {
                let json = {
                    let mut model = self.model.write().await;
                    model.toggle_group(&name);
                    model.collapsed_groups_json()
                };
                self.tmux
                    .set_session_option("@tabby_collapsed_groups", &json)
                    .await;
                return InputResponse::RedrawClient;
            }
            Action::ToggleWindow(index) => {
                let toggled = {
                    let mut model = self.model.write().await;
                    model
                        .toggle_window(index)
                        .map(|collapsed| (model.window_by_index(index).map(|w| w.id.clone()), collapsed))
                };
                if let Some((Some(id), collapsed)) = toggled {
                    if collapsed {
                        self.tmux.set_window_option(&id, "@tabby_collapsed", "1").await;
                    } else {
                        self.tmux.unset_window_option(&id, "@tabby_collapsed").await;
                    }
                }
                return InputResponse::RedrawClient;
            }
            Action::NewTab => {
                self.tmux.new_window().await;
            }
            Action::NewGroup => {
                // The new-group prompt lives in an external script; nothing
                // to mutate here.
                debug!(client = client_id, "new_group requested");
            }
            Action::CloseTab => {
                let active = self.active_window_id().await;
                if let Some(id) = active {
                    self.tmux.kill_window(&id).await;
                }
            }
            Action::CloseWindow(index) => {
                self.close_window(Some(index)).await;
            }
            Action::RenamePane(pane_id) => {
                // The header's rename button opens the marker picker; the
                // picked glyph comes back as a locked pane title write from
                // the rename script.
                debug!(client = client_id, pane = %pane_id, "marker picker requested");
                return InputResponse::ShowMarkerPicker(
                    ["●", "◆", "▲", "★", "⚑", "✎", "♥"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                );
            }
            Action::SplitPane { pane_id, horizontal } => {
                let target = if pane_id.is_empty() {
                    self.active_content_pane().await
                } else {
                    Some(pane_id)
                };
                if let Some(target) = target {
                    self.tmux.split_pane(&target, horizontal).await;
                }
            }
            Action::ClosePane(pane_id) => {
                self.tmux.kill_pane(&pane_id).await;
            }
            Action::Pet(interaction) => {
                {
                    let mut model = self.model.write().await;
                    let width = self.cfg.sidebar.width;
                    model.pet.interact(interaction, Utc::now(), width);
                }
                self.persist_pet().await;
                return InputResponse::RedrawClient;
            }
            Action::FocusMain => {
                self.tmux.focus_right().await;
            }
            Action::QuitClient => {
                // The viewer exits on its own; the reaped connection is our
                // signal.
            }
            Action::ToggleSidebar => {
                // Owned by the external toggle script via @tabby_sidebar.
                debug!(client = client_id, "sidebar toggle requested");
            }
        }

        if needs_refresh {
            InputResponse::NeedsRefresh
        } else {
            InputResponse::None
        }
    }

    async fn close_window(&self, index: Option<u32>) {
        let id = {
            let model = self.model.read().await;
            match index {
                Some(i) => model.window_by_index(i).map(|w| w.id.clone()),
                None => model.active_window().map(|w| w.id.clone()),
            }
        };
        if let Some(id) = id {
            self.tmux.kill_window(&id).await;
        }
    }

    async fn active_content_pane(&self) -> Option<String> {
        let model = self.model.read().await;
        let window = model.active_window()?;
        window
            .panes
            .iter()
            .find(|p| p.active && !p.is_utility())
            .or_else(|| window.content_panes().next())
            .map(|p| p.id.clone())
    }

    /// Windows currently known to the model, for the reconciler.
    pub async fn windows(&self) -> Vec<Window> {
        self.model.read().await.windows.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tmux::testing::FakeRunner;
    use crate::infra::tmux::FIELD_SEP;
    use crate::server::protocol::{InputEvent, InputKind};
    use std::sync::Arc;

    fn sep(fields: &[&str]) -> String {
        fields.join(&FIELD_SEP.to_string())
    }

    fn window_line(id: &str, index: &str, name: &str, active: &str) -> String {
        sep(&[id, index, name, active, "", "", "0", "0", "", "", "", "", "", ""])
    }

    fn pane_line(id: &str, window: &str, index: &str, cmd: &str, active: &str) -> String {
        sep(&[id, window, index, cmd, "", "", "", active, "80", "24", "0", "77", "/tmp"])
    }

    fn coordinator_with(runner: Arc<FakeRunner>) -> (Coordinator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let tmux = TmuxClient::with_runner("main", Box::new(runner));
        let store = PetStore::new(dir.path());
        (
            Coordinator::new(TabbyConfig::default(), tmux, store, "main"),
            dir,
        )
    }

    fn action_event(action: &str, target: &str) -> InputEvent {
        InputEvent {
            seq: 1,
            kind: InputKind::Action,
            resolved_action: Some(action.into()),
            resolved_target: Some(target.into()),
            mouse_x: None,
            mouse_y: None,
            button: None,
            action: None,
            viewport_offset: None,
            key: None,
        }
    }

    fn key_event(key: &str) -> InputEvent {
        InputEvent {
            seq: 1,
            kind: InputKind::Key,
            resolved_action: None,
            resolved_target: None,
            mouse_x: None,
            mouse_y: None,
            button: None,
            action: None,
            viewport_offset: None,
            key: Some(key.into()),
        }
    }

    #[tokio::test]
    async fn test_select_window_issues_select_then_focus_right() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond(
            "list-windows",
            &format!(
                "{}\n{}",
                window_line("@1", "0", "zero", "1"),
                window_line("@2", "1", "one", "0")
            ),
        );
        runner.respond("list-panes", &pane_line("%1", "@1", "0", "zsh", "1"));

        let (coord, _dir) = coordinator_with(runner.clone());
        coord.refresh_windows().await.unwrap();
        coord.client_attached("@1").await;

        let response = coord
            .handle_input("@1", &action_event("select_window", "1"))
            .await;
        assert_eq!(response, InputResponse::NeedsRefresh);

        let selects = runner.calls_for("select-window");
        assert_eq!(selects.len(), 1);
        assert!(selects[0].contains(&"main:1".to_string()));
        let panes = runner.calls_for("select-pane");
        assert_eq!(panes.len(), 1);
        assert!(panes[0].contains(&"-R".to_string()));
    }

    #[tokio::test]
    async fn test_toggle_group_round_trip_side_effects() {
        let runner = Arc::new(FakeRunner::new());
        let (coord, _dir) = coordinator_with(runner.clone());
        coord.client_attached("@1").await;

        let r1 = coord
            .handle_input("@1", &action_event("toggle_group", "work"))
            .await;
        assert_eq!(r1, InputResponse::RedrawClient);
        let r2 = coord
            .handle_input("@1", &action_event("toggle_group", "work"))
            .await;
        assert_eq!(r2, InputResponse::RedrawClient);

        // Net effect on the model: nothing collapsed.
        let model = coord.model_snapshot().await;
        assert!(model.collapsed_groups.is_empty());

        // Exactly two writes of the session option, no other mutations.
        let sets = runner.calls_for("set-option");
        assert_eq!(sets.len(), 2);
        assert!(sets
            .iter()
            .all(|c| c.contains(&"@tabby_collapsed_groups".to_string())));
        assert!(runner.calls_for("kill-window").is_empty());
        assert!(runner.calls_for("new-window").is_empty());
    }

    #[tokio::test]
    async fn test_sequence_numbers_strictly_ascend() {
        let runner = Arc::new(FakeRunner::new());
        let (coord, _dir) = coordinator_with(runner);
        coord.client_attached("@1").await;

        let f1 = coord.render_for_client("@1", 25, 40).await;
        let f2 = coord.render_for_client("@1", 25, 40).await;
        let f3 = coord.render_for_client("@1", 25, 40).await;
        assert!(f1.seq < f2.seq && f2.seq < f3.seq);
    }

    #[tokio::test]
    async fn test_width_clamping() {
        let runner = Arc::new(FakeRunner::new());
        let (coord, _dir) = coordinator_with(runner);
        coord.client_attached("@1").await;

        let frame = coord.render_for_client("@1", 8, 3).await;
        assert_eq!(frame.width, render::DEFAULT_WIDTH);
        assert_eq!(frame.height, render::DEFAULT_HEIGHT);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond("list-windows", &window_line("@1", "0", "zero", "1"));
        runner.respond("list-panes", &pane_line("%1", "@1", "0", "zsh", "1"));

        let (coord, _dir) = coordinator_with(runner);
        let h1 = coord.refresh_windows().await.unwrap();
        let h2 = coord.refresh_windows().await.unwrap();
        assert_eq!(h1, h2);
    }

    #[tokio::test]
    async fn test_mouse_press_resolves_window_region() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond("list-windows", &window_line("@1", "0", "zero", "1"));
        runner.respond("list-panes", &pane_line("%1", "@1", "0", "zsh", "1"));

        let (coord, _dir) = coordinator_with(runner.clone());
        coord.refresh_windows().await.unwrap();
        coord.client_attached("@1").await;
        coord.render_for_client("@1", 25, 40).await;

        // Line 0 is the group header, line 1 the window.
        let event = InputEvent {
            seq: 2,
            kind: InputKind::Mouse,
            resolved_action: None,
            resolved_target: None,
            mouse_x: Some(3),
            mouse_y: Some(1),
            button: Some("left".into()),
            action: Some("press".into()),
            viewport_offset: Some(0),
            key: None,
        };
        let response = coord.handle_input("@1", &event).await;
        assert_eq!(response, InputResponse::NeedsRefresh);
        assert_eq!(runner.calls_for("select-window").len(), 1);
    }

    #[tokio::test]
    async fn test_mouse_scroll_offset_shifts_hit() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond(
            "list-windows",
            &format!(
                "{}\n{}",
                window_line("@1", "0", "zero", "1"),
                window_line("@2", "1", "one", "0")
            ),
        );
        runner.respond("list-panes", &pane_line("%1", "@1", "0", "zsh", "1"));

        let (coord, _dir) = coordinator_with(runner.clone());
        coord.refresh_windows().await.unwrap();
        coord.client_attached("@1").await;
        coord.render_for_client("@1", 25, 40).await;

        // Screen y=0 with viewport offset 2 lands on content line 2: the
        // second window.
        let event = InputEvent {
            seq: 2,
            kind: InputKind::Mouse,
            resolved_action: None,
            resolved_target: None,
            mouse_x: Some(3),
            mouse_y: Some(0),
            button: Some("left".into()),
            action: Some("press".into()),
            viewport_offset: Some(2),
            key: None,
        };
        coord.handle_input("@1", &event).await;
        let selects = runner.calls_for("select-window");
        assert_eq!(selects.len(), 1);
        assert!(selects[0].contains(&"main:1".to_string()));
    }

    #[tokio::test]
    async fn test_key_cursor_and_confirm_close() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond(
            "list-windows",
            &format!(
                "{}\n{}",
                window_line("@1", "0", "zero", "1"),
                window_line("@2", "1", "one", "0")
            ),
        );
        runner.respond("list-panes", &pane_line("%1", "@1", "0", "zsh", "1"));

        let (coord, _dir) = coordinator_with(runner.clone());
        coord.refresh_windows().await.unwrap();
        coord.client_attached("@1").await;
        coord.render_for_client("@1", 25, 40).await;

        assert_eq!(
            coord.handle_input("@1", &key_event("j")).await,
            InputResponse::RedrawClient
        );
        // d arms confirmation, y kills the cursor window (@2).
        coord.handle_input("@1", &key_event("d")).await;
        let response = coord.handle_input("@1", &key_event("y")).await;
        assert_eq!(response, InputResponse::NeedsRefresh);

        let kills = runner.calls_for("kill-window");
        assert_eq!(kills.len(), 1);
        assert!(kills[0].contains(&"@2".to_string()));
    }

    #[tokio::test]
    async fn test_animation_tick_persists_pet_physics() {
        let runner = Arc::new(FakeRunner::new());
        let (coord, dir) = coordinator_with(runner);
        coord.client_attached("@1").await;
        coord.render_for_client("@1", 25, 40).await;

        // Pinned block: clock, five pet rows, session info. Screen row 37
        // is the pet's ground row; the default pet sits at column 2.
        let click = InputEvent {
            seq: 1,
            kind: InputKind::Mouse,
            resolved_action: None,
            resolved_target: None,
            mouse_x: Some(2),
            mouse_y: Some(37),
            button: Some("left".into()),
            action: Some("press".into()),
            viewport_offset: Some(0),
            key: None,
        };
        coord.handle_input("@1", &click).await;

        let store = PetStore::new(dir.path());
        let after_click = store.load().await;
        assert_eq!(after_click.counters.pets, 1);
        assert!(after_click.vy > 0.0);

        // The physics tick alone must reach disk too.
        assert!(coord.tick_animation().await);
        let after_tick = store.load().await;
        assert!(after_tick.y > 0.0);
    }

    #[tokio::test]
    async fn test_header_client_renders_one_line_with_pane_buttons() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond("list-windows", &window_line("@1", "0", "zero", "1"));
        runner.respond(
            "list-panes",
            &format!(
                "{}\n{}",
                pane_line("%1", "@1", "0", "vim", "1"),
                pane_line("%2", "@1", "1", "zsh", "0")
            ),
        );

        let (coord, _dir) = coordinator_with(runner);
        coord.refresh_windows().await.unwrap();
        coord.client_attached("header:%1").await;

        let frame = coord.render_for_client("header:%1", 80, 1).await;
        assert_eq!(frame.total_lines, 1);
        assert_eq!(frame.width, 80);
        assert!(frame.regions.iter().all(|r| r.target == "%1"));
        let actions: Vec<&str> = frame.regions.iter().map(|r| r.action.as_str()).collect();
        assert_eq!(actions, vec!["rename", "split", "close"]);
    }

    #[tokio::test]
    async fn test_stale_busy_cleared_before_next_frame() {
        let runner = Arc::new(FakeRunner::new());
        let busy = sep(&["@1", "0", "zero", "1", "", "", "0", "1", "", "", "", "", "", ""]);
        runner.respond("list-windows", &busy);
        runner.respond("list-panes", &pane_line("%1", "@1", "0", "zsh", "1"));

        let mut cfg = TabbyConfig::default();
        cfg.timing.busy_stale_secs = 0; // horizon elapses immediately
        let dir = tempfile::tempdir().unwrap();
        let tmux = TmuxClient::with_runner("main", Box::new(runner.clone()));
        let store = PetStore::new(dir.path());
        let coord = Coordinator::new(cfg, tmux, store, "main");

        coord.refresh_windows().await.unwrap();

        // Facade told to clear the option.
        let unsets = runner.calls_for("set-option");
        assert!(unsets
            .iter()
            .any(|c| c.contains(&"@tabby_busy".to_string()) && c.contains(&"-wu".to_string())));

        // And the produced frame shows no spinner.
        coord.client_attached("@1").await;
        let model = coord.model_snapshot().await;
        assert!(!model.windows[0].indicators.busy);
    }

    #[tokio::test]
    async fn test_resolve_identity_for_header_and_sidebar() {
        let runner = Arc::new(FakeRunner::new());
        runner.respond("list-windows", &window_line("@1", "0", "zero", "1"));
        let header = sep(&[
            "%9",
            "@1",
            "1",
            "tabby",
            "tabby pane-header --pane %1",
            "",
            "",
            "0",
            "80",
            "1",
            "0",
            "88",
            "/tmp",
        ]);
        runner.respond(
            "list-panes",
            &format!("{}\n{}", pane_line("%1", "@1", "0", "zsh", "1"), header),
        );

        let (coord, _dir) = coordinator_with(runner);
        coord.refresh_windows().await.unwrap();

        assert_eq!(coord.resolve_identity("%1").await.as_deref(), Some("@1"));
        assert_eq!(
            coord.resolve_identity("%9").await.as_deref(),
            Some("header:%1")
        );
    }
}
