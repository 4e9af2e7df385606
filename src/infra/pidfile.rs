use crate::error::TabbyError;
use std::path::{Path, PathBuf};

/// The daemon's claim on a session. Ownership of the PID file is the
/// liveness proof: another daemon replacing it means we must exit.
pub struct PidFile {
    path: PathBuf,
    pid: u32,
}

/// Path for a session's PID file under the system temp directory.
pub fn pid_file_path(session: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tabby-daemon-{session}.pid"))
}

/// Path for a session's control socket.
pub fn socket_path(session: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tabby-daemon-{session}.sock"))
}

impl PidFile {
    /// Write our PID, replacing any stale claim. Refuses when the recorded
    /// PID still names a live process.
    pub fn acquire(path: &Path) -> Result<Self, TabbyError> {
        if let Some(pid) = read_pid(path) {
            if pid != std::process::id() && process_alive(pid) {
                return Err(TabbyError::State(format!(
                    "another daemon (pid {pid}) owns {}",
                    path.display()
                )));
            }
        }
        std::fs::write(path, std::process::id().to_string())?;
        Ok(Self {
            path: path.to_path_buf(),
            pid: std::process::id(),
        })
    }

    /// True while the file still names us. A takeover by a newer daemon
    /// flips this to false.
    pub fn still_owned(&self) -> bool {
        read_pid(&self.path) == Some(self.pid)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file, but only when it is still ours.
    pub fn release(&self) {
        if self.still_owned() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

pub fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()?
        .trim()
        .parse::<u32>()
        .ok()
}

/// Zero-signal probe: does the process exist?
pub fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}
