use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Scheduler liveness marker. The loop beats once per iteration; an
/// independent task self-terminates the daemon when beats stop, so a
/// wedged tmux call cannot silently halt the system.
#[derive(Clone)]
pub struct Heartbeat {
    last_beat_ms: Arc<AtomicI64>,
}

impl Heartbeat {
    pub fn new() -> Self {
        let hb = Self {
            last_beat_ms: Arc::new(AtomicI64::new(0)),
        };
        hb.beat();
        hb
    }

    pub fn beat(&self) {
        self.last_beat_ms
            .store(chrono::Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    pub fn age(&self) -> Duration {
        let last = self.last_beat_ms.load(Ordering::SeqCst);
        let now = chrono::Utc::now().timestamp_millis();
        Duration::from_millis(now.saturating_sub(last).max(0) as u64)
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Orderly self-termination: raise SIGTERM at ourselves so the scheduler's
/// shutdown arm runs. Restarting beats wedging.
pub fn terminate_self(reason: &str) {
    error!(reason, "self-terminating");
    unsafe {
        libc::kill(std::process::id() as i32, libc::SIGTERM);
    }
}

/// Watch the heartbeat; returns only when termination has been requested.
pub async fn run_heartbeat_watchdog(heartbeat: Heartbeat, stale_after: Duration) {
    let mut ticker = tokio::time::interval(stale_after / 2);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if heartbeat.age() > stale_after {
            terminate_self("scheduler heartbeat stale");
            return;
        }
    }
}
