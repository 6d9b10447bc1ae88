use crate::app::InputMode;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Down,
    Up,
    PageDown,
    PageUp,
    Top,
    Bottom,
    NextTab,
    PrevTab,
    NextContainer,
    PrevContainer,
    ToggleFocus,
    ToggleHelp,
    SelectPod,
    Refresh,
    StartFilter,
    StartExec,
    ShowYaml,
    PickNamespace,
    ClearOverlay,
    SubmitInput,
    CancelInput,
    Backspace,
    InputChar(char),
}

pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }
    match mode {
        InputMode::Normal => map_normal_mode_key(key),
        InputMode::Filter | InputMode::Exec => map_input_mode_key(key),
    }
}

fn map_normal_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('j') | KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::Up),
        KeyCode::Char('g') | KeyCode::Home => Some(Action::Top),
        KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::PageDown)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::PageUp),
        KeyCode::Right | KeyCode::Char('l') => Some(Action::NextTab),
        KeyCode::Left | KeyCode::Char('h') => Some(Action::PrevTab),
        KeyCode::Char(']') => Some(Action::NextContainer),
        KeyCode::Char('[') => Some(Action::PrevContainer),
        KeyCode::Tab => Some(Action::ToggleFocus),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Enter => Some(Action::SelectPod),
        KeyCode::Char('r') | KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::Char('/') => Some(Action::StartFilter),
        KeyCode::Char('x') | KeyCode::Char('s') => Some(Action::StartExec),
        KeyCode::Char('y') => Some(Action::ShowYaml),
        KeyCode::Char('n') => Some(Action::PickNamespace),
        KeyCode::Esc => Some(Action::ClearOverlay),
        _ => None,
    }
}

fn map_input_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Enter => Some(Action::SubmitInput),
        KeyCode::Esc => Some(Action::CancelInput),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Up => Some(Action::Up),
        KeyCode::Down => Some(Action::Down),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::Char(c) => Some(Action::InputChar(c)),
        _ => None,
    }
}
