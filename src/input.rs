use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

/// Non-printable keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Left,
    Right,
    Up,
    Down,
    Escape,
    Plus,
    Minus,
    LeftShift,
    RightShift,
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Default)]
struct Cursor {
    position: Option<Vec2>,
    delta: Vec2,
}

/// Input snapshot filled by the window event handler and drained once per
/// frame by the session.
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    pressed: RwLock<Vec<KeyCode>>,
    mouse_buttons: RwLock<HashSet<MouseButton>>,
    cursor: RwLock<Cursor>,
    scroll: RwLock<f32>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as held. Auto-repeat does not count as a new press.
    pub fn set_key_down(&self, key: KeyCode) {
        if self.keys.write().insert(key) {
            self.pressed.write().push(key);
        }
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn set_mouse_button_down(&self, button: MouseButton) {
        self.mouse_buttons.write().insert(button);
    }

    pub fn set_mouse_button_up(&self, button: MouseButton) {
        self.mouse_buttons.write().remove(&button);
    }

    /// Records the cursor position. The first sample only seeds the position.
    pub fn set_mouse_position(&self, position: Vec2) {
        let mut cursor = self.cursor.write();
        if let Some(previous) = cursor.position {
            cursor.delta += position - previous;
        }
        cursor.position = Some(position);
    }

    pub fn add_scroll(&self, lines: f32) {
        *self.scroll.write() += lines;
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.read().contains(&button)
    }

    pub fn mouse_position(&self) -> Option<Vec2> {
        self.cursor.read().position
    }

    /// Keys pressed since the last call, in press order.
    pub fn take_pressed(&self) -> Vec<KeyCode> {
        std::mem::take(&mut *self.pressed.write())
    }

    /// Cursor movement accumulated since the last call.
    pub fn take_mouse_delta(&self) -> Vec2 {
        std::mem::take(&mut self.cursor.write().delta)
    }

    /// Scroll lines accumulated since the last call.
    pub fn take_scroll(&self) -> f32 {
        std::mem::take(&mut *self.scroll.write())
    }
}
