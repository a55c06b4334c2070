//! Default mouse/keyboard to pad mapping
//!
//! Pure classification: no state is read or written here. The engine decides
//! what a classified action does in the current mode.

use crate::controller::state::{Button, DPadEdges};
use crate::input::{KeyCode, MouseButton};

/// Keys that terminate the process when held together
pub const SAFETY_CHORD: [KeyCode; 2] = [KeyCode::DIGIT_1, KeyCode::DIGIT_0];

/// Button driven by both the wheel pulse and its keyboard key
pub const PULSED_BUTTON: Button = Button::Y;

/// Directional keys composing the left stick
pub const STICK_UP: KeyCode = KeyCode::W;
pub const STICK_LEFT: KeyCode = KeyCode::A;
pub const STICK_DOWN: KeyCode = KeyCode::S;
pub const STICK_RIGHT: KeyCode = KeyCode::D;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Left,
    Right,
}

/// What a raw button or key means to the pad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Full-scale trigger while held
    Trigger(Trigger),
    /// Flip controller/passthrough on release
    ToggleMode,
    Button(Button),
    DPad(DPadEdges),
    /// Keyboard half of the pulsed button
    PulseKey,
    /// One of the four left-stick keys
    StickKey,
}

pub fn map_mouse_button(button: MouseButton) -> Action {
    match button {
        MouseButton::Primary => Action::Trigger(Trigger::Right),
        MouseButton::Secondary => Action::Trigger(Trigger::Left),
        MouseButton::Tertiary => Action::ToggleMode,
        MouseButton::Side1 => Action::Button(Button::LeftBumper),
        MouseButton::Side2 => Action::Button(Button::RightBumper),
    }
}

/// `None` means the key has no mapping.
pub fn map_key(key: KeyCode) -> Option<Action> {
    let action = match key {
        KeyCode::ESCAPE => Action::Button(Button::Start),
        KeyCode::TAB => Action::Button(Button::Back),
        KeyCode::SPACE => Action::Button(Button::A),
        KeyCode::L | KeyCode::SHIFT | KeyCode::LEFT_SHIFT | KeyCode::RIGHT_SHIFT => {
            Action::Button(Button::B)
        }
        KeyCode::F => Action::Button(Button::X),
        KeyCode::DIGIT_1 => Action::DPad(DPadEdges::SOUTH),
        KeyCode::DIGIT_2 => Action::DPad(DPadEdges::WEST),
        KeyCode::DIGIT_3 => Action::DPad(DPadEdges::EAST),
        KeyCode::Q => Action::Button(Button::LeftThumb),
        KeyCode::E => Action::Button(Button::RightThumb),
        KeyCode::R => Action::PulseKey,
        STICK_UP | STICK_LEFT | STICK_DOWN | STICK_RIGHT => Action::StickKey,
        _ => return None,
    };
    Some(action)
}

pub fn is_chord_key(key: KeyCode) -> bool {
    SAFETY_CHORD.contains(&key)
}
