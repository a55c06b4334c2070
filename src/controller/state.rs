//! Logical controller state
//!
//! Everything the engine tracks about the virtual pad: two sticks, two
//! triggers, the face/shoulder buttons and the composed dpad direction.

use bitflags::bitflags;
use glam::Vec2;
use std::fmt;

/// Digital button on the virtual pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    X,
    Y,
    Start,
    Back,
    LeftBumper,
    RightBumper,
    LeftThumb,
    RightThumb,
}

impl Button {
    pub const ALL: [Button; 10] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::Start,
        Button::Back,
        Button::LeftBumper,
        Button::RightBumper,
        Button::LeftThumb,
        Button::RightThumb,
    ];

    pub fn flag(self) -> Buttons {
        match self {
            Button::A => Buttons::A,
            Button::B => Buttons::B,
            Button::X => Buttons::X,
            Button::Y => Buttons::Y,
            Button::Start => Buttons::START,
            Button::Back => Buttons::BACK,
            Button::LeftBumper => Buttons::LEFT_SHOULDER,
            Button::RightBumper => Buttons::RIGHT_SHOULDER,
            Button::LeftThumb => Buttons::LEFT_THUMB,
            Button::RightThumb => Buttons::RIGHT_THUMB,
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Button::A => "A",
            Button::B => "B",
            Button::X => "X",
            Button::Y => "Y",
            Button::Start => "Start",
            Button::Back => "Back",
            Button::LeftBumper => "LB",
            Button::RightBumper => "RB",
            Button::LeftThumb => "LeftThumb",
            Button::RightThumb => "RightThumb",
        };
        write!(f, "{}", name)
    }
}

bitflags! {
    /// Button word in XInput layout; the dpad occupies the four low bits.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u16 {
        const DPAD_UP        = 0x0001;
        const DPAD_DOWN      = 0x0002;
        const DPAD_LEFT      = 0x0004;
        const DPAD_RIGHT     = 0x0008;
        const START          = 0x0010;
        const BACK           = 0x0020;
        const LEFT_THUMB     = 0x0040;
        const RIGHT_THUMB    = 0x0080;
        const LEFT_SHOULDER  = 0x0100;
        const RIGHT_SHOULDER = 0x0200;
        const A              = 0x1000;
        const B              = 0x2000;
        const X              = 0x4000;
        const Y              = 0x8000;
    }
}

/// Composed dpad direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DPad {
    #[default]
    Neutral,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl DPad {
    /// Dpad bits of the XInput button word
    pub fn buttons(self) -> Buttons {
        match self {
            DPad::Neutral => Buttons::empty(),
            DPad::North => Buttons::DPAD_UP,
            DPad::NorthEast => Buttons::DPAD_UP | Buttons::DPAD_RIGHT,
            DPad::East => Buttons::DPAD_RIGHT,
            DPad::SouthEast => Buttons::DPAD_DOWN | Buttons::DPAD_RIGHT,
            DPad::South => Buttons::DPAD_DOWN,
            DPad::SouthWest => Buttons::DPAD_DOWN | Buttons::DPAD_LEFT,
            DPad::West => Buttons::DPAD_LEFT,
            DPad::NorthWest => Buttons::DPAD_UP | Buttons::DPAD_LEFT,
        }
    }
}

bitflags! {
    /// Held dpad edges, one bit per compass edge
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DPadEdges: u8 {
        const NORTH = 0b0001;
        const SOUTH = 0b0010;
        const EAST  = 0b0100;
        const WEST  = 0b1000;
    }
}

impl DPadEdges {
    pub fn direction(self) -> DPad {
        DPAD_TABLE[self.bits() as usize]
    }
}

/// Direction for each of the 16 edge combinations.
///
/// Diagonals win over single edges. Opposing edges do not cancel: the first
/// matching rule in NE, NW, SE, SW, N, S, W, E order decides.
pub const DPAD_TABLE: [DPad; 16] = build_dpad_table();

const fn build_dpad_table() -> [DPad; 16] {
    let mut table = [DPad::Neutral; 16];
    let mut bits = 0;
    while bits < 16 {
        let north = bits & DPadEdges::NORTH.bits() as usize != 0;
        let south = bits & DPadEdges::SOUTH.bits() as usize != 0;
        let east = bits & DPadEdges::EAST.bits() as usize != 0;
        let west = bits & DPadEdges::WEST.bits() as usize != 0;

        table[bits] = if north && east {
            DPad::NorthEast
        } else if north && west {
            DPad::NorthWest
        } else if south && east {
            DPad::SouthEast
        } else if south && west {
            DPad::SouthWest
        } else if north {
            DPad::North
        } else if south {
            DPad::South
        } else if west {
            DPad::West
        } else if east {
            DPad::East
        } else {
            DPad::Neutral
        };
        bits += 1;
    }
    table
}

/// Operating mode of the remapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Mouse and keyboard drive the virtual pad
    Controller,
    /// Input goes to the OS untouched; pad held neutral
    Passthrough,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Controller => write!(f, "Controller"),
            Mode::Passthrough => write!(f, "Mouse+KB"),
        }
    }
}

/// Logical state of the virtual pad
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    pub left_stick: Vec2,
    pub right_stick: Vec2,
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub buttons: Buttons,
    pub dpad: DPad,
}

impl ControllerState {
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    pub fn button(&self, button: Button) -> bool {
        self.buttons.contains(button.flag())
    }

    /// Sets the button and reports whether the state changed.
    pub fn set_button(&mut self, button: Button, down: bool) -> bool {
        let before = self.buttons;
        self.buttons.set(button.flag(), down);
        before != self.buttons
    }
}
