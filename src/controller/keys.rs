//! Held-key table
//!
//! One slot per virtual-key code, so lookups never hash and iteration order
//! is fixed.

use crate::input::KeyCode;

const KEY_SLOTS: usize = 256;

#[derive(Clone)]
pub struct KeyStateTable {
    pressed: [bool; KEY_SLOTS],
}

impl Default for KeyStateTable {
    fn default() -> Self {
        Self {
            pressed: [false; KEY_SLOTS],
        }
    }
}

impl std::fmt::Debug for KeyStateTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.pressed_keys()).finish()
    }
}

impl KeyStateTable {
    /// Records the edge and returns the previous state.
    pub fn set(&mut self, key: KeyCode, down: bool) -> bool {
        std::mem::replace(&mut self.pressed[key.index()], down)
    }

    pub fn is_down(&self, key: KeyCode) -> bool {
        self.pressed[key.index()]
    }

    pub fn all_down(&self, keys: &[KeyCode]) -> bool {
        keys.iter().all(|&key| self.is_down(key))
    }

    /// Held keys in ascending code order
    pub fn pressed_keys(&self) -> impl Iterator<Item = KeyCode> + '_ {
        self.pressed
            .iter()
            .enumerate()
            .filter(|&(_, &down)| down)
            .map(|(code, _)| KeyCode(code as u8))
    }
}
