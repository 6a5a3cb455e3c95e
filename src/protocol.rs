//! Gamepad channel messages. The transport owns their byte framing.

use crate::device::{GamepadState, LightBarColor, PadVibration, XInputGamepad, XInputVibration};

/// Which parameter shape a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// XInput-shaped.
    Native,
    /// DualShock 4-shaped.
    Cross,
}

/// Kind of a [`Packet`], independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    GetStateRequest,
    GetStateResponse,
    SetStateRequest,
    GetStateRequestDs4,
    GetStateResponseDs4,
    SetStateRequestDs4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    GetStateRequest {
        user_index: u32,
    },
    GetStateResponse {
        user_index: u32,
        /// 0 on success, otherwise the remote device error.
        result: u32,
        packet_number: u32,
        state: XInputGamepad,
    },
    SetStateRequest {
        user_index: u32,
        vibration: XInputVibration,
    },
    GetStateRequestDs4 {
        user_index: u32,
    },
    GetStateResponseDs4 {
        user_index: u32,
        result: u32,
        state: GamepadState,
    },
    SetStateRequestDs4 {
        user_index: u32,
        vibration: Option<PadVibration>,
        light_bar: Option<LightBarColor>,
    },
}

impl Packet {
    pub fn get_state_request(encoding: Encoding, user_index: u32) -> Self {
        match encoding {
            Encoding::Native => Packet::GetStateRequest { user_index },
            Encoding::Cross => Packet::GetStateRequestDs4 { user_index },
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Packet::GetStateRequest { .. } => MessageType::GetStateRequest,
            Packet::GetStateResponse { .. } => MessageType::GetStateResponse,
            Packet::SetStateRequest { .. } => MessageType::SetStateRequest,
            Packet::GetStateRequestDs4 { .. } => MessageType::GetStateRequestDs4,
            Packet::GetStateResponseDs4 { .. } => MessageType::GetStateResponseDs4,
            Packet::SetStateRequestDs4 { .. } => MessageType::SetStateRequestDs4,
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            Packet::GetStateRequest { .. }
            | Packet::GetStateResponse { .. }
            | Packet::SetStateRequest { .. } => Encoding::Native,
            Packet::GetStateRequestDs4 { .. }
            | Packet::GetStateResponseDs4 { .. }
            | Packet::SetStateRequestDs4 { .. } => Encoding::Cross,
        }
    }

    pub fn user_index(&self) -> u32 {
        match *self {
            Packet::GetStateRequest { user_index }
            | Packet::GetStateResponse { user_index, .. }
            | Packet::SetStateRequest { user_index, .. }
            | Packet::GetStateRequestDs4 { user_index }
            | Packet::GetStateResponseDs4 { user_index, .. }
            | Packet::SetStateRequestDs4 { user_index, .. } => user_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_follows_encoding() {
        assert_eq!(
            Packet::get_state_request(Encoding::Native, 0),
            Packet::GetStateRequest { user_index: 0 }
        );
        assert_eq!(
            Packet::get_state_request(Encoding::Cross, 3).message_type(),
            MessageType::GetStateRequestDs4
        );
    }

    #[test]
    fn responses_classify_by_shape() {
        let native = Packet::GetStateResponse {
            user_index: 1,
            result: 0,
            packet_number: 9,
            state: XInputGamepad::default(),
        };
        assert_eq!(native.encoding(), Encoding::Native);
        assert_eq!(native.message_type(), MessageType::GetStateResponse);
        assert_eq!(native.user_index(), 1);

        let cross = Packet::SetStateRequestDs4 {
            user_index: 0,
            vibration: None,
            light_bar: Some(LightBarColor {
                red: 1,
                green: 2,
                blue: 3,
            }),
        };
        assert_eq!(cross.encoding(), Encoding::Cross);
        assert_eq!(cross.message_type(), MessageType::SetStateRequestDs4);
    }

    #[test]
    fn classifies_encoding() {
        assert_eq!(
            Packet::get_state_request(Encoding::Cross, 0).encoding(),
            Encoding::Cross
        );
        assert_eq!(
            Packet::SetStateRequest {
                user_index: 2,
                vibration: XInputVibration::default()
            }
            .user_index(),
            2
        );
    }
}
