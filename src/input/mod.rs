//! Raw input model
//!
//! Events as delivered by the raw-input collaborator, before any mapping:
//!
//! 1. [`aggregator`] - folds pointer deltas into timed motion samples
//! 2. [`source`] - line-oriented event source driving the engine
//!
//! ```text
//! OS hook / replay ──► RawInputEvent ──► ControllerStateEngine::handle
//! ```

pub mod aggregator;
pub mod source;

use std::fmt;

pub use aggregator::{MotionAggregator, MotionSample};

/// Raw event from the input collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInputEvent {
    Motion { dx: i32, dy: i32 },
    ButtonDown(MouseButton),
    ButtonUp(MouseButton),
    Wheel(i32),
    Key { key: KeyCode, down: bool },
}

// Mouse button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Primary,
    Secondary,
    Tertiary,
    Side1,
    Side2,
}

impl MouseButton {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "primary" | "left" => Some(Self::Primary),
            "secondary" | "right" => Some(Self::Secondary),
            "tertiary" | "middle" => Some(Self::Tertiary),
            "side1" | "x1" => Some(Self::Side1),
            "side2" | "x2" => Some(Self::Side2),
            _ => None,
        }
    }
}

/// Virtual-key code of a keyboard key
///
/// Codes follow the Windows virtual-key numbering, which keeps every key in a
/// single byte and lets the key state live in a flat table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u8);

impl KeyCode {
    pub const TAB: Self = Self(0x09);
    pub const SHIFT: Self = Self(0x10);
    pub const ESCAPE: Self = Self(0x1B);
    pub const SPACE: Self = Self(0x20);
    pub const DIGIT_0: Self = Self(0x30);
    pub const DIGIT_1: Self = Self(0x31);
    pub const DIGIT_2: Self = Self(0x32);
    pub const DIGIT_3: Self = Self(0x33);
    pub const A: Self = Self(b'A');
    pub const D: Self = Self(b'D');
    pub const E: Self = Self(b'E');
    pub const F: Self = Self(b'F');
    pub const L: Self = Self(b'L');
    pub const Q: Self = Self(b'Q');
    pub const R: Self = Self(b'R');
    pub const S: Self = Self(b'S');
    pub const W: Self = Self(b'W');
    pub const LEFT_SHIFT: Self = Self(0xA0);
    pub const RIGHT_SHIFT: Self = Self(0xA1);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Parses a key name, a `0x`-prefixed code or a decimal code.
    pub fn parse(token: &str) -> Option<Self> {
        let lower = token.to_ascii_lowercase();
        match lower.as_str() {
            "escape" | "esc" => return Some(Self::ESCAPE),
            "tab" => return Some(Self::TAB),
            "space" => return Some(Self::SPACE),
            "shift" => return Some(Self::SHIFT),
            "lshift" => return Some(Self::LEFT_SHIFT),
            "rshift" => return Some(Self::RIGHT_SHIFT),
            _ => {}
        }

        if let Some(hex) = lower.strip_prefix("0x") {
            return u8::from_str_radix(hex, 16).ok().map(Self);
        }

        let mut chars = token.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_alphabetic() {
                return Some(Self(c.to_ascii_uppercase() as u8));
            }
            if c.is_ascii_digit() {
                return Some(Self(c as u8));
            }
        }

        token.parse::<u8>().ok().map(Self)
    }
}

impl fmt::Debug for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::TAB => write!(f, "Tab"),
            Self::SHIFT => write!(f, "Shift"),
            Self::ESCAPE => write!(f, "Escape"),
            Self::SPACE => write!(f, "Space"),
            Self::LEFT_SHIFT => write!(f, "LShift"),
            Self::RIGHT_SHIFT => write!(f, "RShift"),
            Self(code) if code.is_ascii_digit() || code.is_ascii_uppercase() => {
                write!(f, "{}", code as char)
            }
            Self(code) => write!(f, "VK(0x{:02X})", code),
        }
    }
}

/// What the host hook should do with the raw event after the engine saw it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Swallow the event; the OS never sees it
    Consume,
    /// Forward the event to the OS unchanged
    PassThrough,
}
