//! Customizable keybindings for maskpaint.
//!
//! Each shortcut maps to exactly one core [`Action`]. Pointer input is not
//! bound here: strokes, panning and the brush-resize gesture go through
//! [`crate::session::PointerEvent`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum number of classes that can have hotkeys (1-9 keys).
pub const MAX_CLASS_HOTKEYS: usize = 9;

/// Keyboard keys the core reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    Key0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    Left,
    Right,
    Comma,
    Period,
    Space,
}

impl Key {
    const LETTERS: [Key; 26] = [
        Key::A, Key::B, Key::C, Key::D, Key::E, Key::F, Key::G, Key::H, Key::I, Key::J, Key::K,
        Key::L, Key::M, Key::N, Key::O, Key::P, Key::Q, Key::R, Key::S, Key::T, Key::U, Key::V,
        Key::W, Key::X, Key::Y, Key::Z,
    ];

    const DIGITS: [Key; 10] = [
        Key::Key0, Key::Key1, Key::Key2, Key::Key3, Key::Key4, Key::Key5, Key::Key6, Key::Key7,
        Key::Key8, Key::Key9,
    ];

    /// Key for a character, if it has one.
    pub fn from_char(c: char) -> Option<Self> {
        let c = c.to_ascii_uppercase();
        match c {
            'A'..='Z' => Some(Self::LETTERS[usize::from(c as u8 - b'A')]),
            '0'..='9' => Some(Self::DIGITS[usize::from(c as u8 - b'0')]),
            ',' => Some(Key::Comma),
            '.' => Some(Key::Period),
            ' ' => Some(Key::Space),
            _ => None,
        }
    }

    /// Digit value of a number key.
    pub fn digit(self) -> Option<u8> {
        Self::DIGITS
            .iter()
            .position(|&k| k == self)
            .and_then(|d| u8::try_from(d).ok())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(d) = self.digit() {
            return write!(f, "{d}");
        }
        match self {
            Key::Left => f.write_str("Left"),
            Key::Right => f.write_str("Right"),
            Key::Comma => f.write_str(","),
            Key::Period => f.write_str("."),
            Key::Space => f.write_str("Space"),
            letter => write!(f, "{letter:?}"),
        }
    }
}

/// A key plus modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shortcut {
    pub key: Key,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
}

impl Shortcut {
    pub const fn plain(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            shift: false,
        }
    }

    pub const fn ctrl(key: Key) -> Self {
        Self {
            key,
            ctrl: true,
            shift: false,
        }
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        write!(f, "{}", self.key)
    }
}

/// Error parsing a shortcut such as `ctrl+z`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown shortcut '{0}'")]
pub struct ParseShortcutError(pub String);

impl FromStr for Shortcut {
    type Err = ParseShortcutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseShortcutError(s.to_string());
        let mut shortcut = Shortcut::plain(Key::Space);
        let mut key = None;
        for part in s.split('+').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" => shortcut.ctrl = true,
                "shift" => shortcut.shift = true,
                "left" => key = Some(Key::Left),
                "right" => key = Some(Key::Right),
                "space" => key = Some(Key::Space),
                other => {
                    let mut chars = other.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => key = Some(Key::from_char(c).ok_or_else(err)?),
                        _ => return Err(err()),
                    }
                }
            }
        }
        shortcut.key = key.ok_or_else(err)?;
        Ok(shortcut)
    }
}

/// Core operations reachable from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Undo,
    Redo,
    /// Clear the label; the presentation layer confirms before dispatching
    ClearLabel,
    NextSample,
    PreviousSample,
    /// Paint with the class of this id
    SelectClass(u8),
    ToggleAssist,
    Eraser,
}

/// Keybinding configuration for the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub undo: Vec<Shortcut>,
    pub redo: Vec<Shortcut>,
    pub clear_label: Vec<Shortcut>,
    pub next_sample: Vec<Shortcut>,
    pub previous_sample: Vec<Shortcut>,
    pub toggle_assist: Vec<Shortcut>,
    pub eraser: Vec<Shortcut>,

    /// Hotkeys for class selection (index 0-8 maps to class ids 1-9)
    /// None means no hotkey assigned for that slot
    pub class_hotkeys: [Option<Key>; MAX_CLASS_HOTKEYS],
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            undo: vec![Shortcut::ctrl(Key::Z)],
            redo: vec![
                Shortcut::ctrl(Key::Y),
                Shortcut {
                    key: Key::Z,
                    ctrl: true,
                    shift: true,
                },
            ],
            clear_label: vec![Shortcut::plain(Key::C)],
            next_sample: vec![Shortcut::plain(Key::Period), Shortcut::plain(Key::Right)],
            previous_sample: vec![Shortcut::plain(Key::Comma), Shortcut::plain(Key::Left)],
            toggle_assist: vec![Shortcut::plain(Key::S)],
            eraser: vec![Shortcut::plain(Key::E)],
            class_hotkeys: [
                Some(Key::Key1),
                Some(Key::Key2),
                Some(Key::Key3),
                Some(Key::Key4),
                Some(Key::Key5),
                Some(Key::Key6),
                Some(Key::Key7),
                Some(Key::Key8),
                Some(Key::Key9),
            ],
        }
    }
}

impl KeyBindings {
    /// Create new keybindings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the action that corresponds to a shortcut, if any.
    pub fn action_for(&self, shortcut: Shortcut) -> Option<Action> {
        let table = [
            (&self.undo, Action::Undo),
            (&self.redo, Action::Redo),
            (&self.clear_label, Action::ClearLabel),
            (&self.next_sample, Action::NextSample),
            (&self.previous_sample, Action::PreviousSample),
            (&self.toggle_assist, Action::ToggleAssist),
            (&self.eraser, Action::Eraser),
        ];
        if let Some((_, action)) = table
            .iter()
            .find(|(shortcuts, _)| shortcuts.contains(&shortcut))
        {
            return Some(*action);
        }

        if shortcut.ctrl || shortcut.shift {
            return None;
        }
        self.class_id_for_key(shortcut.key).map(Action::SelectClass)
    }

    /// Get the class id that corresponds to a key press, if any.
    pub fn class_id_for_key(&self, key: Key) -> Option<u8> {
        self.class_hotkeys
            .iter()
            .position(|hotkey| *hotkey == Some(key))
            .and_then(|index| u8::try_from(index + 1).ok())
    }
}
