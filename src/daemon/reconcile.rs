use crate::config::TabbyConfig;
use crate::domain::window::{Pane, Window};
use crate::infra::tmux::{pane_target_regex, TmuxClient};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// What one header pass did, for logging and assertions.
#[derive(Debug, Default, PartialEq)]
pub struct HeaderSyncReport {
    pub spawned: usize,
    pub killed: usize,
    pub resized: usize,
}

/// Shell command for a sidebar renderer pane. The tag in the name is what
/// classifies the pane as ours on the next listing.
fn sidebar_command(window_id: &str) -> String {
    format!("tabby sidebar-renderer --window {window_id}")
}

fn header_command(pane_id: &str) -> String {
    format!("tabby pane-header --pane {pane_id}")
}

fn is_sidebar_pane(pane: &Pane) -> bool {
    pane.is_utility()
        && (pane.command.contains("sidebar") || pane.start_command.contains("sidebar"))
}

fn is_header_pane(pane: &Pane) -> bool {
    pane.is_utility()
        && (pane.command.contains("pane-header") || pane.start_command.contains("pane-header"))
}

/// Numeric part of a `%N` pane id, for lowest-id dedup.
fn pane_number(pane_id: &str) -> u64 {
    pane_id.trim_start_matches('%').parse().unwrap_or(u64::MAX)
}

/// Spawn a sidebar renderer for every window that has neither a connected
/// sidebar client nor any live utility pane. The live check goes straight
/// to tmux per window; our cached panes may already be stale.
pub async fn spawn_missing_sidebars(
    tmux: &TmuxClient,
    width: u16,
    windows: &[Window],
    sidebar_clients: &HashSet<String>,
) -> usize {
    let mut spawned = 0;
    for window in windows {
        if sidebar_clients.contains(&window.id) {
            continue;
        }
        let Ok(live) = tmux.list_panes_for_window(&window.id).await else {
            continue;
        };
        if live.is_empty() || live.iter().any(|p| p.is_utility()) {
            continue;
        }
        info!(window = %window.id, "spawning sidebar");
        match tmux
            .split_sidebar(&window.id, width, &sidebar_command(&window.id))
            .await
        {
            Ok(pane_id) => {
                debug!(window = %window.id, pane = %pane_id, "sidebar spawned");
                spawned += 1;
            }
            Err(e) => warn!(window = %window.id, error = %e, "sidebar spawn failed"),
        }
    }
    spawned
}

/// Kill sidebar panes in windows that have no content panes left, per the
/// model snapshot. tmux reaps the emptied window itself.
pub async fn kill_orphan_sidebars(tmux: &TmuxClient, windows: &[Window]) -> usize {
    let mut killed = 0;
    for window in windows {
        if !window.has_only_utility_panes() {
            continue;
        }
        for pane in window.utility_panes() {
            info!(window = %window.id, pane = %pane.id, "killing orphan sidebar");
            tmux.kill_pane(&pane.id).await;
            killed += 1;
        }
    }
    killed
}

/// Second pass against a direct per-window query: remove any window that
/// holds nothing but utility panes. The previously active window is
/// reselected first so focus does not land in a dying window.
pub async fn cleanup_utility_only_windows(tmux: &TmuxClient, windows: &[Window]) -> usize {
    let mut cleaned = 0;
    for window in windows {
        let Ok(live) = tmux.list_panes_for_window(&window.id).await else {
            continue;
        };
        if live.is_empty() || !live.iter().all(|p| p.is_utility()) {
            continue;
        }
        if window.active {
            tmux.select_last_window().await;
        }
        info!(window = %window.id, "removing utility-only window");
        tmux.kill_window(&window.id).await;
        cleaned += 1;
    }
    cleaned
}

/// Keep one header pane aligned above each content pane. tmux can
/// rearrange the tree at any moment, so every decision here starts from a
/// fresh session-wide listing.
pub async fn sync_headers(
    tmux: &TmuxClient,
    cfg: &TabbyConfig,
    headers_enabled: bool,
    spawning_quiesce: bool,
) -> HeaderSyncReport {
    let mut report = HeaderSyncReport::default();
    if spawning_quiesce {
        debug!("header pass skipped: spawn quiesce active");
        return report;
    }

    let Ok(panes) = tmux.list_session_panes().await else {
        return report;
    };

    let content: HashMap<&str, &Pane> = panes
        .iter()
        .filter(|p| !p.is_utility())
        .map(|p| (p.id.as_str(), p))
        .collect();

    // Header panes grouped by the target id embedded in their start command.
    let mut headers: HashMap<String, Vec<&Pane>> = HashMap::new();
    for pane in panes.iter().filter(|p| is_header_pane(p)) {
        match pane_target_regex().captures(&pane.start_command) {
            Some(caps) => headers.entry(caps[1].to_string()).or_default().push(pane),
            None => {
                // A header we cannot attribute is unmanageable; reap it.
                warn!(pane = %pane.id, "header with no extractable target");
                tmux.kill_pane(&pane.id).await;
                report.killed += 1;
            }
        }
    }

    if !headers_enabled {
        for group in headers.values() {
            for header in group {
                tmux.kill_pane(&header.id).await;
                report.killed += 1;
            }
        }
        return report;
    }

    let mut covered: HashSet<String> = HashSet::new();
    for (target, mut group) in headers {
        // Duplicates are a spawn-race outcome: keep the numerically-lowest
        // pane id, kill the rest.
        group.sort_by_key(|p| pane_number(&p.id));
        for extra in group.split_off(1) {
            info!(header = %extra.id, target = %target, "killing duplicate header");
            tmux.kill_pane(&extra.id).await;
            report.killed += 1;
        }
        let header = group[0];

        let Some(target_pane) = content.get(target.as_str()) else {
            info!(header = %header.id, target = %target, "killing header with missing target");
            tmux.kill_pane(&header.id).await;
            report.killed += 1;
            continue;
        };

        // A width mismatch means the target was split beneath the header.
        if header.width != target_pane.width {
            info!(
                header = %header.id,
                header_width = header.width,
                target_width = target_pane.width,
                "killing width-mismatched header"
            );
            tmux.kill_pane(&header.id).await;
            report.killed += 1;
            continue;
        }

        if header.height > 1 {
            tmux.resize_pane_height(&header.id, 1).await;
            report.resized += 1;
        }
        covered.insert(target);
    }

    for (id, pane) in &content {
        if covered.contains(*id) {
            continue;
        }
        if pane.height < cfg.sidebar.header_min_pane_height {
            continue;
        }
        match tmux.split_header(id, &header_command(id)).await {
            Ok(new_pane) => {
                debug!(target = %id, header = %new_pane, "header spawned");
                report.spawned += 1;
            }
            Err(e) => warn!(target = %id, error = %e, "header spawn failed"),
        }
    }

    report
}

/// Re-assert the configured width on every sidebar pane. This is the only
/// thing standing between tmux's layout pressure and a 1-cell sidebar.
pub async fn enforce_sidebar_widths(tmux: &TmuxClient, width: u16) -> usize {
    let Ok(panes) = tmux.list_session_panes().await else {
        return 0;
    };
    let mut resized = 0;
    for pane in panes.iter().filter(|p| is_sidebar_pane(p)) {
        if pane.width != width {
            tmux.resize_pane_width(&pane.id, width).await;
            resized += 1;
        }
    }
    resized
}

/// Desired sidebar width: the session option, clamped to the minimum,
/// falling back to configuration.
pub async fn desired_sidebar_width(tmux: &TmuxClient, cfg: &TabbyConfig) -> u16 {
    let configured = tmux
        .get_session_option("@tabby_sidebar_width")
        .await
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(cfg.sidebar.width);
    configured.max(cfg.sidebar.min_width)
}

/// Theme the non-sidebar pane borders of each window after a topology
/// change.
pub async fn apply_border_styles(tmux: &TmuxClient, windows: &[Window], cfg: &TabbyConfig) {
    for window in windows {
        let color = window
            .custom_color
            .as_deref()
            .filter(|c| *c != "transparent")
            .map(String::from)
            .or_else(|| cfg.theme_for(window.group_name()).map(|t| t.bg.clone()))
            .unwrap_or_else(|| "#303030".into());
        tmux.set_window_option(&window.id, "pane-border-style", &format!("fg={color}"))
            .await;
        tmux.set_window_option(
            &window.id,
            "pane-active-border-style",
            &format!("fg={color},bold"),
        )
        .await;
    }
}

/// Watchdog sweep over utility panes: a dead pane, or one whose process
/// has exited without tmux noticing, is killed. Returns the windows whose
/// sidebar died so the caller can respawn.
pub async fn reap_dead_utility_panes(tmux: &TmuxClient) -> Vec<String> {
    let Ok(panes) = tmux.list_session_panes().await else {
        return Vec::new();
    };
    let mut respawn = Vec::new();
    for pane in panes.iter().filter(|p| p.is_utility()) {
        let process_gone = pane
            .pid
            .map(|pid| !crate::infra::pidfile::process_alive(pid))
            .unwrap_or(false);
        if pane.dead || process_gone {
            info!(pane = %pane.id, dead = pane.dead, "reaping dead utility pane");
            tmux.kill_pane(&pane.id).await;
            if is_sidebar_pane(pane) {
                respawn.push(pane.window_id.clone());
            }
        }
    }
    respawn
}
