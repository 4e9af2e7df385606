use crate::config::TabbyConfig;
use crate::domain::window::Window;
use serde::{Deserialize, Serialize};

/// A display partition of windows sharing a theme. Membership comes from
/// the window-scoped `@tabby_group` option; ordering from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub icon: String,
    pub fg: String,
    pub bg: String,
    /// Member window ids in session index order, resolved on regroup.
    pub window_ids: Vec<String>,
}

/// Partition windows into groups. Every window lands in exactly one group;
/// windows naming no group collect into "Default". Configured groups come
/// first in configuration order, then any ad-hoc groups alphabetically.
pub fn resolve_groups(windows: &[Window], cfg: &TabbyConfig) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();

    for window in windows {
        let name = window.group_name();
        let group = match groups.iter_mut().find(|g| g.name == name) {
            Some(g) => g,
            None => {
                let theme = cfg.theme_for(name);
                groups.push(Group {
                    name: name.to_string(),
                    icon: theme.map(|t| t.icon.clone()).unwrap_or_else(|| "●".into()),
                    fg: theme.map(|t| t.fg.clone()).unwrap_or_else(|| "#d0d0d0".into()),
                    bg: theme.map(|t| t.bg.clone()).unwrap_or_else(|| "#303030".into()),
                    window_ids: Vec::new(),
                });
                groups.last_mut().unwrap()
            }
        };
        group.window_ids.push(window.id.clone());
    }

    groups.sort_by(|a, b| {
        cfg.group_order(&a.name)
            .cmp(&cfg.group_order(&b.name))
            .then_with(|| a.name.cmp(&b.name))
    });
    groups
}
