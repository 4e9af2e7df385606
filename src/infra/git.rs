use crate::domain::model::GitStatus;
use git2::{Repository, StatusOptions};
use std::path::Path;

/// Collect the git record for the git widget. Opaque to the rest of the
/// daemon; any failure is "no git state here". Blocking; callers wrap it
/// in `spawn_blocking`.
pub fn collect(start_path: &Path) -> Option<GitStatus> {
    let repo = Repository::discover(start_path).ok()?;
    let workdir = repo.workdir()?;
    let repo_name = workdir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let head = repo.head().ok();
    let branch = head
        .as_ref()
        .and_then(|h| h.shorthand())
        .unwrap_or("HEAD")
        .to_string();

    let mut opts = StatusOptions::new();
    opts.include_untracked(true).exclude_submodules(true);
    let dirty = repo
        .statuses(Some(&mut opts))
        .map(|s| s.len())
        .unwrap_or(0);

    let (ahead, behind) = ahead_behind(&repo).unwrap_or((0, 0));

    Some(GitStatus {
        repo_name,
        branch,
        dirty,
        ahead,
        behind,
    })
}

fn ahead_behind(repo: &Repository) -> Option<(usize, usize)> {
    let head = repo.head().ok()?;
    let local = head.target()?;
    let branch_name = head.shorthand()?;
    let upstream = repo
        .find_branch(branch_name, git2::BranchType::Local)
        .ok()?
        .upstream()
        .ok()?;
    let upstream_oid = upstream.get().target()?;
    repo.graph_ahead_behind(local, upstream_oid).ok()
}
