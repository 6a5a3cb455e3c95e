use crate::translate::DpadDirection;
use serde::{Deserialize, Serialize};

/// XInput button bits as they appear in `XInputGamepad::buttons`.
pub mod xbuttons {
    pub const DPAD_UP: u16 = 0x0001;
    pub const DPAD_DOWN: u16 = 0x0002;
    pub const DPAD_LEFT: u16 = 0x0004;
    pub const DPAD_RIGHT: u16 = 0x0008;
    pub const START: u16 = 0x0010;
    pub const BACK: u16 = 0x0020;
    pub const LEFT_THUMB: u16 = 0x0040;
    pub const RIGHT_THUMB: u16 = 0x0080;
    pub const LEFT_SHOULDER: u16 = 0x0100;
    pub const RIGHT_SHOULDER: u16 = 0x0200;
    pub const GUIDE: u16 = 0x0400;
    pub const A: u16 = 0x1000;
    pub const B: u16 = 0x2000;
    pub const X: u16 = 0x4000;
    pub const Y: u16 = 0x8000;

    pub const DPAD: u16 = DPAD_UP | DPAD_DOWN | DPAD_LEFT | DPAD_RIGHT;
}

/// DualShock 4 button bits. The low nibble of `Ds4Report::buttons` holds
/// the d-pad index, not flags.
pub mod ds4buttons {
    pub const SQUARE: u16 = 1 << 4;
    pub const CROSS: u16 = 1 << 5;
    pub const CIRCLE: u16 = 1 << 6;
    pub const TRIANGLE: u16 = 1 << 7;
    pub const SHOULDER_LEFT: u16 = 1 << 8;
    pub const SHOULDER_RIGHT: u16 = 1 << 9;
    pub const TRIGGER_LEFT: u16 = 1 << 10;
    pub const TRIGGER_RIGHT: u16 = 1 << 11;
    pub const SHARE: u16 = 1 << 12;
    pub const OPTIONS: u16 = 1 << 13;
    pub const THUMB_LEFT: u16 = 1 << 14;
    pub const THUMB_RIGHT: u16 = 1 << 15;

    pub const DPAD_MASK: u16 = 0x000F;

    pub const SPECIAL_PS: u8 = 1 << 0;
    pub const SPECIAL_TOUCHPAD: u8 = 1 << 1;
}

/// Analog trigger value at or above which a trigger counts as pressed.
pub const TRIGGER_THRESHOLD: u8 = 30;

/// Native (XInput-shaped) gamepad report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XInputGamepad {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

/// DualShock 4 report as pushed to the virtual bus.
///
/// Sticks are 0..=255 with 128 centred; Y grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ds4Report {
    pub thumb_lx: u8,
    pub thumb_ly: u8,
    pub thumb_rx: u8,
    pub thumb_ry: u8,
    pub buttons: u16,
    pub special: u8,
    pub trigger_l: u8,
    pub trigger_r: u8,
}

impl Ds4Report {
    /// Sticks centred, nothing pressed, d-pad released.
    pub fn neutral() -> Self {
        Self {
            thumb_lx: 0x80,
            thumb_ly: 0x80,
            thumb_rx: 0x80,
            thumb_ry: 0x80,
            buttons: DpadDirection::Neutral.cross_index() as u16,
            special: 0,
            trigger_l: 0,
            trigger_r: 0,
        }
    }

    pub fn dpad(&self) -> DpadDirection {
        DpadDirection::from_cross_index((self.buttons & ds4buttons::DPAD_MASK) as u8)
    }
}

impl Default for Ds4Report {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Generic pad state carried by the DualShock 4-shaped protocol.
///
/// `buttons` uses the DS4 bit layout with the d-pad nibble always clear;
/// the d-pad lives in `dpad`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamepadState {
    pub buttons: u16,
    pub dpad: DpadDirection,
    pub special: u8,
    pub left_stick: (u8, u8),
    pub right_stick: (u8, u8),
    pub left_trigger: u8,
    pub right_trigger: u8,
}

impl Default for GamepadState {
    fn default() -> Self {
        Self {
            buttons: 0,
            dpad: DpadDirection::Neutral,
            special: 0,
            left_stick: (0x80, 0x80),
            right_stick: (0x80, 0x80),
            left_trigger: 0,
            right_trigger: 0,
        }
    }
}

/// Native motor speeds, full 16-bit range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XInputVibration {
    pub left_motor: u16,
    pub right_motor: u16,
}

/// DualShock 4-shaped motor magnitudes, 8-bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadVibration {
    pub large_motor: u8,
    pub small_motor: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightBarColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

/// One feedback notification from the virtual bus.
///
/// The bus reports motors in 8-bit units for both controller kinds;
/// `light_bar` is only ever set for DualShock 4 targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Feedback {
    pub vibration: PadVibration,
    pub light_bar: Option<LightBarColor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    Xbox360,
    DualShock4,
}

/// A full report in the shape the target's kind expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkReport {
    Xbox360(XInputGamepad),
    DualShock4(Ds4Report),
}

impl SinkReport {
    /// The report that puts a target of `kind` at rest.
    pub fn neutral(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Xbox360 => SinkReport::Xbox360(XInputGamepad::default()),
            TargetKind::DualShock4 => SinkReport::DualShock4(Ds4Report::neutral()),
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            SinkReport::Xbox360(_) => TargetKind::Xbox360,
            SinkReport::DualShock4(_) => TargetKind::DualShock4,
        }
    }
}
