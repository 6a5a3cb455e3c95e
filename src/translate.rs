//! Conversions between the native (XInput) encoding, the generic
//! DualShock 4-shaped pad state and the DualShock 4 bus report.
//!
//! Everything here is pure. Lossy steps: 16-bit sticks and motors narrow to
//! 8 bits on the way to the cross encoding, L2/R2 digital bits and the
//! touchpad click have no native counterpart and are dropped on the way back.

use crate::device::{
    ds4buttons, xbuttons, Ds4Report, GamepadState, PadVibration, SinkReport, TargetKind,
    XInputGamepad, XInputVibration, TRIGGER_THRESHOLD,
};
use serde::{Deserialize, Serialize};

/// The nine d-pad positions. The discriminant is the DS4 d-pad index.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DpadDirection {
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
    Neutral = 8,
}

impl DpadDirection {
    pub const ALL: [DpadDirection; 9] = [
        DpadDirection::North,
        DpadDirection::NorthEast,
        DpadDirection::East,
        DpadDirection::SouthEast,
        DpadDirection::South,
        DpadDirection::SouthWest,
        DpadDirection::West,
        DpadDirection::NorthWest,
        DpadDirection::Neutral,
    ];

    /// Resolve four half-axis flags to a single direction.
    ///
    /// Diagonals are checked before cardinals, so a diagonal wins whenever
    /// both of its half-axes are held. Opposing flags are resolved by the
    /// fixed check order (N-W, N-E, S-W, S-E, N, S, W, E).
    pub fn from_half_axes(north: bool, south: bool, west: bool, east: bool) -> Self {
        if north && west {
            DpadDirection::NorthWest
        } else if north && east {
            DpadDirection::NorthEast
        } else if south && west {
            DpadDirection::SouthWest
        } else if south && east {
            DpadDirection::SouthEast
        } else if north {
            DpadDirection::North
        } else if south {
            DpadDirection::South
        } else if west {
            DpadDirection::West
        } else if east {
            DpadDirection::East
        } else {
            DpadDirection::Neutral
        }
    }

    pub fn from_native_buttons(buttons: u16) -> Self {
        Self::from_half_axes(
            buttons & xbuttons::DPAD_UP != 0,
            buttons & xbuttons::DPAD_DOWN != 0,
            buttons & xbuttons::DPAD_LEFT != 0,
            buttons & xbuttons::DPAD_RIGHT != 0,
        )
    }

    pub fn native_mask(self) -> u16 {
        use xbuttons::{DPAD_DOWN, DPAD_LEFT, DPAD_RIGHT, DPAD_UP};
        match self {
            DpadDirection::North => DPAD_UP,
            DpadDirection::NorthEast => DPAD_UP | DPAD_RIGHT,
            DpadDirection::East => DPAD_RIGHT,
            DpadDirection::SouthEast => DPAD_DOWN | DPAD_RIGHT,
            DpadDirection::South => DPAD_DOWN,
            DpadDirection::SouthWest => DPAD_DOWN | DPAD_LEFT,
            DpadDirection::West => DPAD_LEFT,
            DpadDirection::NorthWest => DPAD_UP | DPAD_LEFT,
            DpadDirection::Neutral => 0,
        }
    }

    pub fn cross_index(self) -> u8 {
        self as u8
    }

    /// Out-of-range indices read as released.
    pub fn from_cross_index(index: u8) -> Self {
        Self::ALL
            .get(index as usize)
            .copied()
            .unwrap_or(DpadDirection::Neutral)
    }
}

/// Face, shoulder, trigger and stick buttons of the cross layout, in bit
/// order starting after the d-pad nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Square,
    Cross,
    Circle,
    Triangle,
    L1,
    R1,
    L2,
    R2,
    Share,
    Options,
    L3,
    R3,
}

impl Button {
    pub const ALL: [Button; 12] = [
        Button::Square,
        Button::Cross,
        Button::Circle,
        Button::Triangle,
        Button::L1,
        Button::R1,
        Button::L2,
        Button::R2,
        Button::Share,
        Button::Options,
        Button::L3,
        Button::R3,
    ];

    pub fn cross_bit(self) -> u16 {
        match self {
            Button::Square => ds4buttons::SQUARE,
            Button::Cross => ds4buttons::CROSS,
            Button::Circle => ds4buttons::CIRCLE,
            Button::Triangle => ds4buttons::TRIANGLE,
            Button::L1 => ds4buttons::SHOULDER_LEFT,
            Button::R1 => ds4buttons::SHOULDER_RIGHT,
            Button::L2 => ds4buttons::TRIGGER_LEFT,
            Button::R2 => ds4buttons::TRIGGER_RIGHT,
            Button::Share => ds4buttons::SHARE,
            Button::Options => ds4buttons::OPTIONS,
            Button::L3 => ds4buttons::THUMB_LEFT,
            Button::R3 => ds4buttons::THUMB_RIGHT,
        }
    }

    /// `None` for the digital trigger buttons, which XInput lacks.
    pub fn native_mask(self) -> Option<u16> {
        match self {
            Button::Square => Some(xbuttons::X),
            Button::Cross => Some(xbuttons::A),
            Button::Circle => Some(xbuttons::B),
            Button::Triangle => Some(xbuttons::Y),
            Button::L1 => Some(xbuttons::LEFT_SHOULDER),
            Button::R1 => Some(xbuttons::RIGHT_SHOULDER),
            Button::L2 | Button::R2 => None,
            Button::Share => Some(xbuttons::BACK),
            Button::Options => Some(xbuttons::START),
            Button::L3 => Some(xbuttons::LEFT_THUMB),
            Button::R3 => Some(xbuttons::RIGHT_THUMB),
        }
    }
}

/// Signed 16-bit axis to 0..=255, -32768 -> 0, 0 -> 128, 32767 -> 255.
pub fn axis_to_cross(value: i16) -> u8 {
    let shifted = value as i32 + 32768;
    ((shifted * 255 + 32767) / 65535) as u8
}

/// Inverse of [`axis_to_cross`]; one cross step is 257 native units.
pub fn axis_from_cross(value: u8) -> i16 {
    (value as i32 * 257 - 32768) as i16
}

/// Native Y grows upwards, cross Y grows downwards.
pub fn axis_y_to_cross(value: i16) -> u8 {
    axis_to_cross(value.saturating_neg())
}

pub fn axis_y_from_cross(value: u8) -> i16 {
    axis_from_cross(value).saturating_neg()
}

pub fn motor_to_cross(speed: u16) -> u8 {
    (speed >> 8) as u8
}

pub fn motor_from_cross(magnitude: u8) -> u16 {
    u16::from(magnitude) * 257
}

impl From<&XInputGamepad> for GamepadState {
    fn from(g: &XInputGamepad) -> Self {
        let mut buttons = 0u16;
        for button in Button::ALL {
            if let Some(mask) = button.native_mask() {
                if g.buttons & mask == mask {
                    buttons |= button.cross_bit();
                }
            }
        }
        if g.left_trigger >= TRIGGER_THRESHOLD {
            buttons |= Button::L2.cross_bit();
        }
        if g.right_trigger >= TRIGGER_THRESHOLD {
            buttons |= Button::R2.cross_bit();
        }

        let special = if g.buttons & xbuttons::GUIDE != 0 {
            ds4buttons::SPECIAL_PS
        } else {
            0
        };

        GamepadState {
            buttons,
            dpad: DpadDirection::from_native_buttons(g.buttons),
            special,
            left_stick: (axis_to_cross(g.thumb_lx), axis_y_to_cross(g.thumb_ly)),
            right_stick: (axis_to_cross(g.thumb_rx), axis_y_to_cross(g.thumb_ry)),
            left_trigger: g.left_trigger,
            right_trigger: g.right_trigger,
        }
    }
}

impl From<&GamepadState> for XInputGamepad {
    fn from(s: &GamepadState) -> Self {
        let mut buttons = s.dpad.native_mask();
        for button in Button::ALL {
            if let Some(mask) = button.native_mask() {
                if s.buttons & button.cross_bit() != 0 {
                    buttons |= mask;
                }
            }
        }
        if s.special & ds4buttons::SPECIAL_PS != 0 {
            buttons |= xbuttons::GUIDE;
        }

        XInputGamepad {
            buttons,
            left_trigger: s.left_trigger,
            right_trigger: s.right_trigger,
            thumb_lx: axis_from_cross(s.left_stick.0),
            thumb_ly: axis_y_from_cross(s.left_stick.1),
            thumb_rx: axis_from_cross(s.right_stick.0),
            thumb_ry: axis_y_from_cross(s.right_stick.1),
        }
    }
}

impl From<&GamepadState> for Ds4Report {
    fn from(s: &GamepadState) -> Self {
        Ds4Report {
            thumb_lx: s.left_stick.0,
            thumb_ly: s.left_stick.1,
            thumb_rx: s.right_stick.0,
            thumb_ry: s.right_stick.1,
            buttons: (s.buttons & !ds4buttons::DPAD_MASK) | s.dpad.cross_index() as u16,
            special: s.special,
            trigger_l: s.left_trigger,
            trigger_r: s.right_trigger,
        }
    }
}

impl From<&XInputGamepad> for Ds4Report {
    fn from(g: &XInputGamepad) -> Self {
        Ds4Report::from(&GamepadState::from(g))
    }
}

impl From<XInputVibration> for PadVibration {
    fn from(v: XInputVibration) -> Self {
        PadVibration {
            large_motor: motor_to_cross(v.left_motor),
            small_motor: motor_to_cross(v.right_motor),
        }
    }
}

impl From<PadVibration> for XInputVibration {
    fn from(v: PadVibration) -> Self {
        XInputVibration {
            left_motor: motor_from_cross(v.large_motor),
            right_motor: motor_from_cross(v.small_motor),
        }
    }
}

/// Native payload to whatever the target of `kind` consumes.
pub fn native_to_sink(state: &XInputGamepad, kind: TargetKind) -> SinkReport {
    match kind {
        TargetKind::Xbox360 => SinkReport::Xbox360(*state),
        TargetKind::DualShock4 => SinkReport::DualShock4(Ds4Report::from(state)),
    }
}

/// Cross payload to whatever the target of `kind` consumes.
pub fn cross_to_sink(state: &GamepadState, kind: TargetKind) -> SinkReport {
    match kind {
        TargetKind::Xbox360 => SinkReport::Xbox360(XInputGamepad::from(state)),
        TargetKind::DualShock4 => SinkReport::DualShock4(Ds4Report::from(state)),
    }
}
