use crate::coordinator::actions::Action;

/// Keymap state kept per sidebar client: cursor over window lines and a
/// pending close confirmation.
#[derive(Debug, Clone, Default)]
pub struct KeyState {
    pub cursor: usize,
    pub confirm_close: bool,
}

/// What a key press asks the coordinator to do.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    /// Re-render this client only (cursor moved, confirmation toggled).
    Redraw,
    /// Execute a semantic action.
    Run(Action),
    Ignored,
}

/// The fixed sidebar keymap. `window_lines` is the selectable-window list
/// from this client's last render, in display order.
pub fn handle_key(state: &mut KeyState, key: &str, window_lines: &[u32]) -> KeyOutcome {
    // A pending confirmation swallows everything except its own answer.
    if state.confirm_close {
        state.confirm_close = false;
        return match key {
            "y" => match window_lines.get(state.cursor) {
                Some(_) => KeyOutcome::Run(Action::CloseTab),
                None => KeyOutcome::Redraw,
            },
            _ => KeyOutcome::Redraw,
        };
    }

    match key {
        "q" | "ctrl+c" => KeyOutcome::Run(Action::QuitClient),
        "esc" => KeyOutcome::Run(Action::FocusMain),
        "j" | "down" => {
            if !window_lines.is_empty() && state.cursor + 1 < window_lines.len() {
                state.cursor += 1;
            }
            KeyOutcome::Redraw
        }
        "k" | "up" => {
            state.cursor = state.cursor.saturating_sub(1);
            KeyOutcome::Redraw
        }
        "enter" => match window_lines.get(state.cursor) {
            Some(index) => KeyOutcome::Run(Action::SelectWindow(*index)),
            None => KeyOutcome::Ignored,
        },
        "left" | "right" => match window_lines.get(state.cursor) {
            Some(index) => KeyOutcome::Run(Action::ToggleWindow(*index)),
            None => KeyOutcome::Ignored,
        },
        "d" | "x" => {
            if window_lines.get(state.cursor).is_some() {
                state.confirm_close = true;
                KeyOutcome::Redraw
            } else {
                KeyOutcome::Ignored
            }
        }
        "c" | "n" => KeyOutcome::Run(Action::NewTab),
        "|" | "%" => KeyOutcome::Run(Action::SplitPane {
            pane_id: String::new(),
            horizontal: true,
        }),
        "-" | "\"" => KeyOutcome::Run(Action::SplitPane {
            pane_id: String::new(),
            horizontal: false,
        }),
        "ctrl+<" | "alt+<" => KeyOutcome::Run(Action::ToggleSidebar),
        _ => KeyOutcome::Ignored,
    }
}
