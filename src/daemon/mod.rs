pub mod reconcile;
pub mod watchdog;

use crate::config::TabbyConfig;
use crate::coordinator::render::Frame;
use crate::coordinator::{Coordinator, InputResponse};
use crate::error::TabbyError;
use crate::infra::pet_store::PetStore;
use crate::infra::pidfile::PidFile;
use crate::infra::tmux::TmuxClient;
use crate::server::protocol::InputEvent;
use crate::server::{Server, ServerHandler};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use watchdog::Heartbeat;

/// Wires the server's callbacks into the coordinator and turns
/// needs-refresh responses into refresh tokens for the scheduler.
struct CoordinatorHandler {
    coordinator: Arc<Coordinator>,
    refresh_tx: mpsc::Sender<()>,
}

#[async_trait]
impl ServerHandler for CoordinatorHandler {
    async fn resolve_identity(&self, pane_id: &str) -> Option<String> {
        self.coordinator.resolve_identity(pane_id).await
    }

    async fn render_for(&self, client_id: &str, width: u16, height: u16) -> Frame {
        self.coordinator
            .render_for_client(client_id, width, height)
            .await
    }

    async fn on_input(&self, client_id: &str, event: InputEvent) -> InputResponse {
        self.coordinator.handle_input(client_id, &event).await
    }

    async fn client_attached(&self, client_id: &str) {
        self.coordinator.client_attached(client_id).await;
        // A fresh viewer wants a reconciled frame promptly.
        let _ = self.refresh_tx.try_send(());
    }

    async fn client_detached(&self, client_id: &str) {
        self.coordinator.client_detached(client_id).await;
        let _ = self.refresh_tx.try_send(());
    }

    async fn update_client_size(&self, client_id: &str, width: u16, height: u16) {
        self.coordinator
            .update_client_size(client_id, width, height)
            .await;
    }

    async fn refresh_requested(&self) {
        let _ = self.refresh_tx.try_send(());
    }
}

/// Run the daemon for one tmux session until shutdown.
pub async fn run(
    session: String,
    cfg: TabbyConfig,
    socket_path: PathBuf,
    pid_path: PathBuf,
) -> Result<(), TabbyError> {
    let pidfile = Arc::new(PidFile::acquire(&pid_path)?);

    let tmux = TmuxClient::new(
        &session,
        Duration::from_secs(cfg.timing.tmux_timeout_secs),
    );
    if !tmux.session_exists().await {
        pidfile.release();
        return Err(TabbyError::SessionGone(session));
    }
    tmux.set_session_option("@tabby_daemon_pid", &std::process::id().to_string())
        .await;

    let pet_store = PetStore::new(&crate::config::global_config_dir());
    let coordinator = Arc::new(Coordinator::new(cfg.clone(), tmux, pet_store, &session));
    coordinator.bootstrap().await;

    let (refresh_tx, refresh_rx) = mpsc::channel::<()>(64);
    let handler = Arc::new(CoordinatorHandler {
        coordinator: coordinator.clone(),
        refresh_tx: refresh_tx.clone(),
    });
    let server = Server::new(socket_path, handler, cfg.timing.client_queue_depth);
    let accept_task = server.start()?;

    let heartbeat = Heartbeat::new();
    let watchdog_task = tokio::spawn(watchdog::run_heartbeat_watchdog(
        heartbeat.clone(),
        Duration::from_secs(cfg.timing.watchdog_secs * 3),
    ));

    let mut scheduler = Scheduler {
        coordinator: coordinator.clone(),
        server,
        cfg,
        pidfile: pidfile.clone(),
        refresh_tx,
        last_layout_pass: None,
        last_windows_hash: String::new(),
        idle_since: None,
    };
    let result = scheduler.run(refresh_rx, heartbeat).await;

    info!("shutting down");
    watchdog_task.abort();
    scheduler.server.shutdown().await;
    accept_task.abort();
    coordinator.persist_pet().await;
    pidfile.release();
    result
}

struct Scheduler {
    coordinator: Arc<Coordinator>,
    server: Server,
    cfg: TabbyConfig,
    pidfile: Arc<PidFile>,
    refresh_tx: mpsc::Sender<()>,
    last_layout_pass: Option<Instant>,
    last_windows_hash: String,
    idle_since: Option<Instant>,
}

impl Scheduler {
    /// The main loop: tickers, signals, and refresh tokens in one select.
    /// Every iteration beats the heartbeat.
    async fn run(
        &mut self,
        mut refresh_rx: mpsc::Receiver<()>,
        heartbeat: Heartbeat,
    ) -> Result<(), TabbyError> {
        let mut sigusr1 = signal(SignalKind::user_defined1())
            .map_err(|e| TabbyError::State(format!("signal handler: {e}")))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| TabbyError::State(format!("signal handler: {e}")))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| TabbyError::State(format!("signal handler: {e}")))?;

        let t = &self.cfg.timing;
        let mut window_tick = tokio::time::interval(Duration::from_secs(t.window_refresh_secs));
        let mut layout_tick = tokio::time::interval(Duration::from_secs(t.layout_check_secs));
        let mut anim_tick = tokio::time::interval(Duration::from_millis(t.animation_ms));
        let mut git_tick = tokio::time::interval(Duration::from_secs(t.git_refresh_secs));
        let mut watch_tick = tokio::time::interval(Duration::from_secs(t.watchdog_secs));
        for ticker in [
            &mut window_tick,
            &mut layout_tick,
            &mut anim_tick,
            &mut git_tick,
            &mut watch_tick,
        ] {
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        }

        // Initial reconciliation before any client asks.
        self.run_signal_refresh(&mut refresh_rx).await?;
        heartbeat.beat();

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("SIGTERM received");
                    break;
                }
                _ = sigint.recv() => {
                    info!("SIGINT received");
                    break;
                }
                _ = sigusr1.recv() => {
                    self.run_signal_refresh(&mut refresh_rx).await?;
                }
                Some(_) = refresh_rx.recv() => {
                    self.run_signal_refresh(&mut refresh_rx).await?;
                }
                _ = window_tick.tick() => {
                    self.run_signal_refresh(&mut refresh_rx).await?;
                }
                _ = layout_tick.tick() => {
                    self.layout_pass().await;
                }
                _ = anim_tick.tick() => {
                    self.animation_pass().await;
                }
                _ = git_tick.tick() => {
                    self.git_pass().await;
                }
                _ = watch_tick.tick() => {
                    if !self.watchdog_pass().await {
                        break;
                    }
                }
            }
            heartbeat.beat();
        }
        Ok(())
    }

    /// Signal-refresh entry: coalesce queued tokens, run the pass under its
    /// deadline, then drain the tokens our own splits and kills provoked.
    async fn run_signal_refresh(
        &mut self,
        refresh_rx: &mut mpsc::Receiver<()>,
    ) -> Result<(), TabbyError> {
        let coalesced = drain(refresh_rx);
        if coalesced > 0 {
            debug!(tokens = coalesced, "coalesced refresh burst");
        }

        let deadline = Duration::from_secs(self.cfg.timing.refresh_deadline_secs);
        match tokio::time::timeout(deadline, self.signal_refresh_pass()).await {
            Ok(Err(e)) if !e.is_transient() => return Err(e),
            Ok(Err(e)) => warn!(error = %e, "refresh pass failed; retrying next tick"),
            Ok(Ok(())) => {}
            Err(_) => watchdog::terminate_self("signal refresh exceeded deadline"),
        }

        let echoed = drain(refresh_rx);
        if echoed > 0 {
            debug!(tokens = echoed, "discarded self-caused refresh tokens");
        }
        Ok(())
    }

    /// The hot path, in strict order: model refresh, sidebar spawn, orphan
    /// cleanup, header sync, border/size sync on change, broadcast.
    async fn signal_refresh_pass(&mut self) -> Result<(), TabbyError> {
        let hash = self.coordinator.refresh_windows().await?;
        let windows = self.coordinator.windows().await;
        let tmux = self.coordinator.tmux();

        let cooldown = Duration::from_millis(self.cfg.timing.layout_cooldown_ms);
        let layout_allowed = self
            .last_layout_pass
            .map(|at| at.elapsed() >= cooldown)
            .unwrap_or(true);

        if layout_allowed {
            self.last_layout_pass = Some(Instant::now());
            let width = reconcile::desired_sidebar_width(tmux, &self.cfg).await;

            let sidebar_on = tmux
                .get_session_option("@tabby_sidebar")
                .await
                .map(|v| v != "off" && v != "0")
                .unwrap_or(true);
            if sidebar_on {
                let sidebar_clients: HashSet<String> = self
                    .server
                    .client_ids()
                    .await
                    .into_iter()
                    .filter(|id| !id.starts_with("header:"))
                    .collect();
                reconcile::spawn_missing_sidebars(tmux, width, &windows, &sidebar_clients).await;
            }

            reconcile::kill_orphan_sidebars(tmux, &windows).await;
            reconcile::cleanup_utility_only_windows(tmux, &windows).await;

            let headers_on = tmux
                .get_session_option("@tabby_pane_headers")
                .await
                .map(|v| v == "on" || v == "1")
                .unwrap_or(false);
            let quiesce = tmux.get_session_option("@tabby_spawning").await.is_some();
            let report = reconcile::sync_headers(tmux, &self.cfg, headers_on, quiesce).await;
            if report.killed > 0 {
                // tmux rebalances splits after mass kills; push back.
                reconcile::enforce_sidebar_widths(tmux, width).await;
            }
        }

        if hash != self.last_windows_hash {
            self.last_windows_hash = hash;
            reconcile::apply_border_styles(tmux, &windows, &self.cfg).await;
            self.sync_client_sizes(&windows).await;
        }

        self.server.broadcast_render().await;
        Ok(())
    }

    /// Fallback pane-layout check: the reconciliation steps alone, against
    /// fresh listings, catching anything the hooks missed.
    async fn layout_pass(&mut self) {
        let cooldown = Duration::from_millis(self.cfg.timing.layout_cooldown_ms);
        if let Some(at) = self.last_layout_pass {
            if at.elapsed() < cooldown {
                return;
            }
        }
        self.last_layout_pass = Some(Instant::now());

        let windows = self.coordinator.windows().await;
        let tmux = self.coordinator.tmux();
        let width = reconcile::desired_sidebar_width(tmux, &self.cfg).await;

        reconcile::kill_orphan_sidebars(tmux, &windows).await;
        reconcile::cleanup_utility_only_windows(tmux, &windows).await;

        let headers_on = tmux
            .get_session_option("@tabby_pane_headers")
            .await
            .map(|v| v == "on" || v == "1")
            .unwrap_or(false);
        let quiesce = tmux.get_session_option("@tabby_spawning").await.is_some();
        let report = reconcile::sync_headers(tmux, &self.cfg, headers_on, quiesce).await;
        if report.killed > 0 || report.spawned > 0 {
            reconcile::enforce_sidebar_widths(tmux, width).await;
        }
    }

    /// 10 Hz tick. Dirty-checked, and only the active window's sidebar is
    /// redrawn; hidden sidebars do not need per-frame updates.
    async fn animation_pass(&mut self) {
        if !self.coordinator.tick_animation().await {
            return;
        }
        if let Some(active) = self.coordinator.active_window_id().await {
            self.server.render_active_window_only(&active).await;
        }
    }

    /// Periodic git/stats collection, off the runtime's worker threads.
    async fn git_pass(&mut self) {
        let deadline = Duration::from_secs(self.cfg.timing.git_deadline_secs);
        let pass = async {
            let path = self
                .coordinator
                .active_pane_path()
                .await
                .or_else(|| std::env::current_dir().ok());
            let git = match path {
                Some(path) => {
                    tokio::task::spawn_blocking(move || crate::infra::git::collect(&path))
                        .await
                        .unwrap_or(None)
                }
                None => None,
            };
            let mut changed = self.coordinator.set_git(git).await;

            if self.cfg.widgets.stats {
                self.coordinator
                    .set_stats(crate::infra::stats::collect())
                    .await;
            }
            changed |= self.coordinator.poll_pet_thought().await;
            changed
        };

        match tokio::time::timeout(deadline, pass).await {
            Ok(true) => self.server.broadcast_render().await,
            Ok(false) => {}
            Err(_) => watchdog::terminate_self("git pass exceeded deadline"),
        }
    }

    /// Liveness sweep: dead utility panes, idle exit, socket and PID-file
    /// ownership. Returns false when the daemon should stop.
    async fn watchdog_pass(&mut self) -> bool {
        let respawn = reconcile::reap_dead_utility_panes(self.coordinator.tmux()).await;
        if !respawn.is_empty() {
            let _ = self.refresh_tx.try_send(());
        }

        // 30 s with zero clients means nobody is looking; exit.
        if self.server.client_count().await == 0 {
            let idle_since = self.idle_since.get_or_insert_with(Instant::now);
            if idle_since.elapsed() >= Duration::from_secs(self.cfg.timing.idle_exit_secs) {
                info!("no clients for idle window; exiting");
                return false;
            }
        } else {
            self.idle_since = None;
        }

        // Another daemon taking the PID file, or a vanished socket, means
        // we are no longer the session's daemon.
        if !self.pidfile.still_owned() {
            warn!("PID file taken over by another daemon; exiting");
            return false;
        }
        if !self.server.socket_path().exists() {
            warn!("listen socket vanished; exiting");
            return false;
        }

        true
    }

    async fn sync_client_sizes(&self, windows: &[crate::domain::window::Window]) {
        for id in self.server.client_ids().await {
            if let Some(pane_id) = id.strip_prefix("header:") {
                let target = windows
                    .iter()
                    .flat_map(|w| w.panes.iter())
                    .find(|p| p.id == pane_id);
                if let Some(pane) = target {
                    self.server.update_client_size(&id, pane.width, 1).await;
                }
            } else if let Some(window) = windows.iter().find(|w| w.id == id) {
                if let Some(sidebar) = window
                    .utility_panes()
                    .find(|p| p.command.contains("sidebar") || p.start_command.contains("sidebar"))
                {
                    self.server
                        .update_client_size(&id, sidebar.width, sidebar.height)
                        .await;
                }
            }
        }
    }
}

fn drain(rx: &mut mpsc::Receiver<()>) -> usize {
    let mut n = 0;
    while rx.try_recv().is_ok() {
        n += 1;
    }
    n
}
