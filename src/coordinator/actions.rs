use crate::domain::pet::PetInteraction;

/// Semantic actions a client event resolves to. The coordinator turns
/// these into tmux commands; none of them mutate the pane tree directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SelectWindow(u32),
    SelectPane(String),
    ToggleGroup(String),
    /// Disclose or hide a window's pane list.
    ToggleWindow(u32),
    NewTab,
    NewGroup,
    CloseTab,
    /// Close a specific window (context menu), not the active one.
    CloseWindow(u32),
    /// Header buttons, scoped to the target pane.
    RenamePane(String),
    SplitPane { pane_id: String, horizontal: bool },
    ClosePane(String),
    Pet(PetInteraction),
    /// Keymap-only: hand focus back to the content pane.
    FocusMain,
    /// Keymap-only: the viewer should exit.
    QuitClient,
    /// Keymap-only: collapse or expand the sidebar (external toggle script).
    ToggleSidebar,
}

impl Action {
    /// Whether executing this action warrants a model refresh. Refreshes
    /// coalesce in the scheduler; nothing broadcasts synchronously.
    pub fn needs_refresh(&self) -> bool {
        match self {
            Action::SelectWindow(_)
            | Action::SelectPane(_)
            | Action::NewTab
            | Action::CloseTab
            | Action::CloseWindow(_)
            | Action::SplitPane { .. }
            | Action::ClosePane(_) => true,
            Action::ToggleGroup(_)
            | Action::ToggleWindow(_)
            | Action::NewGroup
            | Action::RenamePane(_)
            | Action::Pet(_)
            | Action::FocusMain
            | Action::QuitClient
            | Action::ToggleSidebar => false,
        }
    }

    /// Resolve a pre-resolved wire action (`resolved_action` +
    /// `resolved_target`) or a matched region into a semantic action.
    pub fn from_tag(action: &str, target: &str) -> Option<Action> {
        match action {
            "select_window" => target.parse().ok().map(Action::SelectWindow),
            "select_pane" => Some(Action::SelectPane(target.to_string())),
            "toggle_group" => Some(Action::ToggleGroup(target.to_string())),
            "toggle_window" => target.parse().ok().map(Action::ToggleWindow),
            "close_window" => target.parse().ok().map(Action::CloseWindow),
            "button" | "" => match target {
                "new_tab" => Some(Action::NewTab),
                "new_group" => Some(Action::NewGroup),
                "close_tab" => Some(Action::CloseTab),
                _ => None,
            },
            // Header buttons arrive with the pane id as target.
            "rename" => Some(Action::RenamePane(target.to_string())),
            "split" => Some(Action::SplitPane {
                pane_id: target.to_string(),
                horizontal: true,
            }),
            "close" => Some(Action::ClosePane(target.to_string())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tag_window_and_pane() {
        assert_eq!(
            Action::from_tag("select_window", "3"),
            Some(Action::SelectWindow(3))
        );
        assert_eq!(
            Action::from_tag("select_pane", "%7"),
            Some(Action::SelectPane("%7".into()))
        );
        assert_eq!(Action::from_tag("select_window", "not-a-number"), None);
    }

    #[test]
    fn test_from_tag_buttons() {
        assert_eq!(Action::from_tag("button", "new_tab"), Some(Action::NewTab));
        assert_eq!(
            Action::from_tag("button", "close_tab"),
            Some(Action::CloseTab)
        );
        assert_eq!(Action::from_tag("button", "bogus"), None);
    }

    #[test]
    fn test_needs_refresh_table() {
        assert!(Action::SelectWindow(1).needs_refresh());
        assert!(Action::SelectPane("%1".into()).needs_refresh());
        assert!(Action::NewTab.needs_refresh());
        assert!(Action::CloseTab.needs_refresh());
        assert!(!Action::ToggleGroup("g".into()).needs_refresh());
        assert!(!Action::NewGroup.needs_refresh());
        assert!(!Action::Pet(PetInteraction::Feed).needs_refresh());
    }
}
