use crate::domain::window::{Indicators, Pane, Window};
use crate::error::TabbyError;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Record separator used in `-F` format strings. Non-printable, so it never
/// collides with window names or pane titles.
pub const FIELD_SEP: char = '\u{1f}';

/// Extracts the target pane id from a header process's start command,
/// e.g. `tabby-header --pane %12`.
pub fn pane_target_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:--pane|--target)[= ](%\d+)").expect("static regex"))
}

/// Low-level command seam. The real runner shells out to tmux; tests swap
/// in a recording fake.
#[async_trait]
pub trait TmuxCommands: Send + Sync {
    /// Run one tmux invocation and return trimmed stdout.
    async fn run(&self, args: &[String]) -> Result<String, TabbyError>;
}

#[async_trait]
impl<T: TmuxCommands + ?Sized> TmuxCommands for std::sync::Arc<T> {
    async fn run(&self, args: &[String]) -> Result<String, TabbyError> {
        (**self).run(args).await
    }
}

/// Shells out to the tmux CLI with a soft deadline per invocation. tmux
/// commands are expensive; a call that outlives the deadline is abandoned
/// and logged, never awaited further.
pub struct CliRunner {
    timeout: Duration,
}

impl CliRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl TmuxCommands for CliRunner {
    async fn run(&self, args: &[String]) -> Result<String, TabbyError> {
        let fut = Command::new("tmux").args(args).output();
        let output = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(args = ?args, timeout_ms = self.timeout.as_millis() as u64, "tmux command timed out");
                return Err(TabbyError::TmuxTimeout(args.join(" ")));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("no server running") {
                return Err(TabbyError::TmuxUnavailable);
            }
            if stderr.contains("session not found") || stderr.contains("can't find session") {
                return Err(TabbyError::SessionGone(stderr));
            }
            return Err(TabbyError::Tmux(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

/// All tmux operations, scoped to one session. Nothing else in the daemon
/// shells out to tmux.
pub struct TmuxClient {
    session: String,
    runner: Box<dyn TmuxCommands>,
}

impl TmuxClient {
    pub fn is_available() -> bool {
        which::which("tmux").is_ok()
    }

    pub fn new(session: &str, timeout: Duration) -> Self {
        Self {
            session: session.to_string(),
            runner: Box::new(CliRunner::new(timeout)),
        }
    }

    pub fn with_runner(session: &str, runner: Box<dyn TmuxCommands>) -> Self {
        Self {
            session: session.to_string(),
            runner,
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    async fn run(&self, args: &[&str]) -> Result<String, TabbyError> {
        let owned: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.runner.run(&owned).await
    }

    /// Fire-and-forget variant: errors are logged, never surfaced.
    async fn run_logged(&self, args: &[&str]) {
        if let Err(e) = self.run(args).await {
            debug!(args = ?args, error = %e, "tmux command failed");
        }
    }

    fn window_target(&self, suffix: &str) -> String {
        format!("{}:{}", self.session, suffix)
    }

    /// One `list-windows` plus one `list-panes -s`, both with
    /// record-delimited formats, parsed line-by-line.
    pub async fn list_windows_with_panes(&self) -> Result<Vec<Window>, TabbyError> {
        let window_format = window_format();
        let pane_format = pane_format();

        let windows_out = self
            .run(&["list-windows", "-t", &self.session, "-F", &window_format])
            .await?;
        let panes_out = self
            .run(&["list-panes", "-s", "-t", &self.session, "-F", &pane_format])
            .await?;

        let mut windows: Vec<Window> = windows_out.lines().filter_map(parse_window_line).collect();
        windows.sort_by_key(|w| w.index);

        for line in panes_out.lines() {
            let Some(pane) = parse_pane_line(line) else {
                continue;
            };
            if let Some(window) = windows.iter_mut().find(|w| w.id == pane.window_id) {
                window.panes.push(pane);
            }
        }
        for window in &mut windows {
            window.panes.sort_by_key(|p| p.index);
        }
        Ok(windows)
    }

    /// Fresh listing of every pane in the session, for reconciliation
    /// passes that must not trust cached state.
    pub async fn list_session_panes(&self) -> Result<Vec<Pane>, TabbyError> {
        let pane_format = pane_format();
        let out = self
            .run(&["list-panes", "-s", "-t", &self.session, "-F", &pane_format])
            .await?;
        Ok(out.lines().filter_map(parse_pane_line).collect())
    }

    /// Fresh pane listing for one window. The reconciler compares against
    /// this, never against cached panes.
    pub async fn list_panes_for_window(&self, window_id: &str) -> Result<Vec<Pane>, TabbyError> {
        let pane_format = pane_format();
        let out = self
            .run(&["list-panes", "-t", window_id, "-F", &pane_format])
            .await?;
        Ok(out.lines().filter_map(parse_pane_line).collect())
    }

    pub async fn select_window(&self, index: u32) {
        let target = self.window_target(&index.to_string());
        self.run_logged(&["select-window", "-t", &target]).await;
    }

    pub async fn select_pane(&self, pane_id: &str) {
        self.run_logged(&["select-pane", "-t", pane_id]).await;
    }

    /// Move focus out of the sidebar into the content pane to its right.
    pub async fn focus_right(&self) {
        self.run_logged(&["select-pane", "-R"]).await;
    }

    /// Select the previously active window. Used before reaping a window
    /// the user is currently looking at.
    pub async fn select_last_window(&self) {
        self.run_logged(&["last-window", "-t", &self.session]).await;
    }

    pub async fn new_window(&self) {
        self.run_logged(&["new-window", "-t", &self.session]).await;
    }

    pub async fn kill_window(&self, window_id: &str) {
        self.run_logged(&["kill-window", "-t", window_id]).await;
    }

    /// Split a sidebar pane off the left edge of a window. Returns the new
    /// pane id. Best-effort caller; the reconciler retries next pass.
    pub async fn split_sidebar(
        &self,
        window_id: &str,
        width: u16,
        command: &str,
    ) -> Result<String, TabbyError> {
        let size = width.to_string();
        self.run(&[
            "split-window",
            "-hb",
            "-l",
            &size,
            "-t",
            window_id,
            "-P",
            "-F",
            "#{pane_id}",
            command,
        ])
        .await
    }

    /// Split a one-line header pane above a content pane.
    pub async fn split_header(
        &self,
        target_pane: &str,
        command: &str,
    ) -> Result<String, TabbyError> {
        self.run(&[
            "split-window",
            "-vb",
            "-l",
            "1",
            "-t",
            target_pane,
            "-P",
            "-F",
            "#{pane_id}",
            command,
        ])
        .await
    }

    pub async fn kill_pane(&self, pane_id: &str) {
        self.run_logged(&["kill-pane", "-t", pane_id]).await;
    }

    /// User-initiated split of a content pane.
    pub async fn split_pane(&self, pane_id: &str, horizontal: bool) {
        let dir = if horizontal { "-h" } else { "-v" };
        self.run_logged(&["split-window", dir, "-t", pane_id]).await;
    }

    /// Window containing a pane, straight from tmux. Used when a pane is
    /// too fresh to appear in the cached model.
    pub async fn window_of_pane(&self, pane_id: &str) -> Option<String> {
        match self
            .run(&["display-message", "-t", pane_id, "-p", "#{window_id}"])
            .await
        {
            Ok(v) if !v.is_empty() => Some(v),
            _ => None,
        }
    }

    pub async fn resize_pane_width(&self, pane_id: &str, width: u16) {
        let size = width.to_string();
        self.run_logged(&["resize-pane", "-t", pane_id, "-x", &size])
            .await;
    }

    pub async fn resize_pane_height(&self, pane_id: &str, height: u16) {
        let size = height.to_string();
        self.run_logged(&["resize-pane", "-t", pane_id, "-y", &size])
            .await;
    }

    pub async fn set_window_option(&self, window_id: &str, name: &str, value: &str) {
        self.run_logged(&["set-option", "-w", "-t", window_id, name, value])
            .await;
    }

    pub async fn unset_window_option(&self, window_id: &str, name: &str) {
        self.run_logged(&["set-option", "-wu", "-t", window_id, name])
            .await;
    }

    pub async fn get_window_option(&self, window_id: &str, name: &str) -> Option<String> {
        match self
            .run(&["show-options", "-wqv", "-t", window_id, name])
            .await
        {
            Ok(v) if !v.is_empty() => Some(v),
            _ => None,
        }
    }

    pub async fn set_session_option(&self, name: &str, value: &str) {
        self.run_logged(&["set-option", "-t", &self.session, name, value])
            .await;
    }

    pub async fn get_session_option(&self, name: &str) -> Option<String> {
        match self
            .run(&["show-options", "-qv", "-t", &self.session, name])
            .await
        {
            Ok(v) if !v.is_empty() => Some(v),
            _ => None,
        }
    }

    pub async fn get_pane_option(&self, pane_id: &str, name: &str) -> Option<String> {
        match self
            .run(&["show-options", "-pqv", "-t", pane_id, name])
            .await
        {
            Ok(v) if !v.is_empty() => Some(v),
            _ => None,
        }
    }

    /// Cheap existence probe for the scoped session.
    pub async fn session_exists(&self) -> bool {
        self.run(&["has-session", "-t", &self.session]).await.is_ok()
    }
}

/// Read the PID file and send the refresh signal to the daemon it names.
/// Used by `tabby-daemon --send-refresh`, which tmux hooks invoke.
pub fn signal_refresh(pid_file: &std::path::Path, session: &str) -> Result<(), TabbyError> {
    let contents = std::fs::read_to_string(pid_file)
        .map_err(|_| TabbyError::DaemonNotRunning(session.to_string()))?;
    let pid: i32 = contents
        .trim()
        .parse()
        .map_err(|_| TabbyError::DaemonNotRunning(session.to_string()))?;
    // Signal 0 probes existence before we commit to SIGUSR1.
    if unsafe { libc::kill(pid, 0) } != 0 {
        return Err(TabbyError::DaemonNotRunning(session.to_string()));
    }
    if unsafe { libc::kill(pid, libc::SIGUSR1) } != 0 {
        return Err(TabbyError::DaemonNotRunning(session.to_string()));
    }
    Ok(())
}

fn window_format() -> String {
    [
        "#{window_id}",
        "#{window_index}",
        "#{window_name}",
        "#{window_active}",
        "#{@tabby_group}",
        "#{@tabby_color}",
        "#{@tabby_collapsed}",
        "#{@tabby_busy}",
        "#{@tabby_input}",
        "#{@tabby_bell}",
        "#{@tabby_activity}",
        "#{@tabby_silence}",
        "#{@tabby_name_locked}",
        "#{@tabby_icon}",
    ]
    .join(&FIELD_SEP.to_string())
}

fn pane_format() -> String {
    [
        "#{pane_id}",
        "#{window_id}",
        "#{pane_index}",
        "#{pane_current_command}",
        "#{pane_start_command}",
        "#{@tabby_pane_title}",
        "#{pane_title}",
        "#{pane_active}",
        "#{pane_width}",
        "#{pane_height}",
        "#{pane_dead}",
        "#{pane_pid}",
        "#{pane_current_path}",
    ]
    .join(&FIELD_SEP.to_string())
}

fn flag(field: &str) -> bool {
    field == "1" || field == "on" || field == "true"
}

fn parse_window_line(line: &str) -> Option<Window> {
    let fields: Vec<&str> = line.split(FIELD_SEP).collect();
    if fields.len() < 14 {
        return None;
    }
    Some(Window {
        id: fields[0].to_string(),
        index: fields[1].parse().ok()?,
        name: fields[2].to_string(),
        active: flag(fields[3]),
        group: non_empty(fields[4]),
        custom_color: non_empty(fields[5]),
        collapsed: flag(fields[6]),
        indicators: Indicators {
            busy: flag(fields[7]),
            input: flag(fields[8]),
            bell: flag(fields[9]),
            activity: flag(fields[10]),
            silence: flag(fields[11]),
        },
        name_locked: flag(fields[12]),
        icon: non_empty(fields[13]),
        panes: Vec::new(),
    })
}

fn parse_pane_line(line: &str) -> Option<Pane> {
    let fields: Vec<&str> = line.split(FIELD_SEP).collect();
    if fields.len() < 13 {
        return None;
    }
    Some(Pane {
        id: fields[0].to_string(),
        window_id: fields[1].to_string(),
        index: fields[2].parse().ok()?,
        command: fields[3].to_string(),
        start_command: fields[4].to_string(),
        locked_title: non_empty(fields[5]),
        title: fields[6].to_string(),
        active: flag(fields[7]),
        width: fields[8].parse().unwrap_or(0),
        height: fields[9].parse().unwrap_or(0),
        dead: flag(fields[10]),
        pid: fields[11].parse().ok(),
        path: fields[12].to_string(),
    })
}

fn non_empty(field: &str) -> Option<String> {
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Recording fake for tests: canned stdout per command prefix, plus a
    /// log of every invocation.
    pub struct FakeRunner {
        pub calls: Mutex<Vec<Vec<String>>>,
        responses: Mutex<HashMap<String, Vec<String>>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(HashMap::new()),
            }
        }

        /// Queue a response for invocations whose first word matches `verb`.
        /// Responses for a verb are consumed in order; the last one repeats.
        pub fn respond(&self, verb: &str, stdout: &str) {
            self.responses
                .lock()
                .unwrap()
                .entry(verb.to_string())
                .or_default()
                .push(stdout.to_string());
        }

        pub fn calls_for(&self, verb: &str) -> Vec<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.first().map(String::as_str) == Some(verb))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl TmuxCommands for FakeRunner {
        async fn run(&self, args: &[String]) -> Result<String, TabbyError> {
            self.calls.lock().unwrap().push(args.to_vec());
            let verb = args.first().cloned().unwrap_or_default();
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(&verb) {
                Some(queue) if !queue.is_empty() => {
                    if queue.len() == 1 {
                        Ok(queue[0].clone())
                    } else {
                        Ok(queue.remove(0))
                    }
                }
                _ => Ok(String::new()),
            }
        }
    }
}
