use crate::config::{ControllerMode, Timing};
use crate::device::{SinkReport, TargetKind};
use crate::error::{RdpGamepadError, Result};
use crate::platform::Channel;
use crate::processor::ProcessorStatus;
use crate::protocol::{Encoding, Packet};
use crate::translate::{cross_to_sink, native_to_sink};
use crate::vigem::{VirtualClient, VirtualTarget};
use std::sync::Arc;

/// Only the first remote controller is bridged per channel.
const USER_INDEX: u32 = 0;

enum Response {
    State(SinkReport),
    DeviceError(u32),
}

/// The per-tick connection state machine.
///
/// Owns the channel and at most one virtual target. The two are brought up
/// together and torn down together by [`Session::tidy`]. Driven by
/// [`Session::tick`]; the caller owns the cadence.
pub(crate) struct Session {
    channel: Box<dyn Channel>,
    client: Arc<VirtualClient>,
    target: Option<VirtualTarget>,
    mode: ControllerMode,
    timing: Timing,
    status: Arc<ProcessorStatus>,
    open_retry: u32,
    poll_ticks: u32,
    last_response_tick: u32,
    connected: bool,
}

impl Session {
    pub fn new(
        channel: Box<dyn Channel>,
        client: Arc<VirtualClient>,
        mode: ControllerMode,
        timing: Timing,
        status: Arc<ProcessorStatus>,
    ) -> Self {
        Self {
            channel,
            client,
            target: None,
            mode,
            timing,
            status,
            open_retry: 0,
            poll_ticks: 0,
            last_response_tick: 0,
            connected: false,
        }
    }

    pub fn tick(&mut self) {
        self.poll_ticks = self.poll_ticks.wrapping_add(1);

        if !self.channel.is_open() {
            if self.open_retry > 0 {
                self.open_retry -= 1;
                self.tidy();
                return;
            }
            if let Err(e) = self.channel.open() {
                log::debug!("Gamepad channel unavailable: {}", e);
                self.open_retry = self.timing.open_retry_ticks;
                self.tidy();
                return;
            }
            log::info!("Gamepad channel open ({:?})", self.mode);
        }

        if !self.connected {
            if let Err(e) = self.connect_target() {
                log::warn!("Failed to create virtual controller: {}", e);
                self.open_retry = self.timing.open_retry_ticks;
                self.tidy();
                return;
            }
        }

        if let Err(e) = self.exchange() {
            log::debug!("Gamepad session lost: {}", e);
            self.tidy();
        }
    }

    fn connect_target(&mut self) -> Result<()> {
        let target = self.client.create_target(self.mode.sink())?;
        self.target = Some(target);
        self.connected = true;
        self.status.set_connected(true);
        self.status.set_error_code(0);
        Ok(())
    }

    /// One request/response round. Any error ends the connection.
    fn exchange(&mut self) -> Result<()> {
        let source = self.mode.source();
        let target = self
            .target
            .as_mut()
            .ok_or_else(|| RdpGamepadError::ViGEm("connected without a target".into()))?;

        self.channel
            .send(&Packet::get_state_request(source, USER_INDEX))?;

        if let Some(packet) = feedback_packet(source, target) {
            self.channel.send(&packet)?;
        }

        while let Some(packet) = self.channel.receive() {
            let Some(response) = accept_response(&packet, source, target.kind()) else {
                log::trace!("Ignoring {:?}", packet.message_type());
                continue;
            };
            match response {
                Response::State(report) => push(target, &report),
                Response::DeviceError(code) => {
                    log::debug!("Remote controller error {:#x}", code);
                    reset(target);
                    self.status.set_error_code(code);
                }
            }
            self.last_response_tick = self.poll_ticks;
        }

        if self.poll_ticks < self.last_response_tick
            || self.poll_ticks - self.last_response_tick > self.timing.stale_timeout_ticks
        {
            reset(target);
        }

        if !self.channel.is_open() {
            return Err(RdpGamepadError::Channel("closed by peer".into()));
        }
        Ok(())
    }

    /// Release the target, close the channel and reset the tick counter.
    /// The open-retry countdown is left alone.
    pub fn tidy(&mut self) {
        self.target = None;
        self.channel.close();
        if self.connected {
            log::info!("Gamepad channel closed");
        }
        self.connected = false;
        self.status.set_connected(false);
        self.poll_ticks = 0;
    }

    /// Tear down and hand the channel back for reuse.
    pub fn finish(mut self) -> Box<dyn Channel> {
        self.tidy();
        self.channel
    }

    #[cfg(test)]
    pub fn poll_ticks(&self) -> u32 {
        self.poll_ticks
    }

    #[cfg(test)]
    pub fn target_kind(&self) -> Option<TargetKind> {
        self.target.as_ref().map(VirtualTarget::kind)
    }
}

fn feedback_packet(source: Encoding, target: &mut VirtualTarget) -> Option<Packet> {
    match source {
        Encoding::Native => target
            .take_vibration()
            .map(|vibration| Packet::SetStateRequest {
                user_index: USER_INDEX,
                vibration: vibration.into(),
            }),
        Encoding::Cross => {
            let vibration = target.take_vibration();
            let light_bar = target.take_light_bar();
            (vibration.is_some() || light_bar.is_some()).then_some(Packet::SetStateRequestDs4 {
                user_index: USER_INDEX,
                vibration,
                light_bar,
            })
        }
    }
}

fn accept_response(packet: &Packet, source: Encoding, kind: TargetKind) -> Option<Response> {
    let response = match (source, packet) {
        (
            Encoding::Native,
            Packet::GetStateResponse {
                user_index: USER_INDEX,
                result,
                state,
                ..
            },
        ) => match *result {
            0 => Response::State(native_to_sink(state, kind)),
            code => Response::DeviceError(code),
        },
        (
            Encoding::Cross,
            Packet::GetStateResponseDs4 {
                user_index: USER_INDEX,
                result,
                state,
            },
        ) => match *result {
            0 => Response::State(cross_to_sink(state, kind)),
            code => Response::DeviceError(code),
        },
        _ => return None,
    };
    Some(response)
}

fn push(target: &VirtualTarget, report: &SinkReport) {
    if let Err(e) = target.set_state(report) {
        log::warn!("Failed to update virtual controller: {}", e);
    }
}

fn reset(target: &VirtualTarget) {
    push(target, &SinkReport::neutral(target.kind()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{
        ds4buttons, xbuttons, Ds4Report, Feedback, GamepadState, LightBarColor, PadVibration,
        XInputGamepad, XInputVibration,
    };
    use crate::platform::mock::{MockBus, MockChannel};
    use crate::translate::DpadDirection;

    struct Rig {
        channel: MockChannel,
        bus: Arc<MockBus>,
        status: Arc<ProcessorStatus>,
        session: Session,
    }

    fn rig(mode: ControllerMode) -> Rig {
        let channel = MockChannel::default();
        let bus = Arc::new(MockBus::default());
        let status = Arc::new(ProcessorStatus::default());
        let session = Session::new(
            Box::new(channel.clone()),
            VirtualClient::new(bus.clone()),
            mode,
            Timing::default(),
            status.clone(),
        );
        Rig {
            channel,
            bus,
            status,
            session,
        }
    }

    fn pad() -> XInputGamepad {
        XInputGamepad {
            buttons: xbuttons::A | xbuttons::DPAD_UP | xbuttons::DPAD_LEFT,
            left_trigger: 200,
            right_trigger: 0,
            thumb_lx: 12_000,
            thumb_ly: -8_000,
            thumb_rx: 0,
            thumb_ry: 32_767,
        }
    }

    fn native_response(result: u32, state: XInputGamepad) -> Packet {
        Packet::GetStateResponse {
            user_index: 0,
            result,
            packet_number: 1,
            state,
        }
    }

    fn cross_pad() -> GamepadState {
        GamepadState {
            buttons: ds4buttons::CIRCLE | ds4buttons::OPTIONS,
            dpad: DpadDirection::SouthWest,
            special: 0,
            left_stick: (0, 255),
            right_stick: (128, 128),
            left_trigger: 0,
            right_trigger: 90,
        }
    }

    fn cross_response(result: u32, state: GamepadState) -> Packet {
        Packet::GetStateResponseDs4 {
            user_index: 0,
            result,
            state,
        }
    }

    #[test]
    fn open_failure_backs_off_for_retry_ticks() {
        let mut r = rig(ControllerMode::XInputToXbox360);
        r.channel.state().fail_open = true;

        r.session.tick();
        assert_eq!(r.channel.state().open_attempts, 1);

        for _ in 0..Timing::default().open_retry_ticks {
            r.session.tick();
        }
        assert_eq!(r.channel.state().open_attempts, 1);

        r.session.tick();
        assert_eq!(r.channel.state().open_attempts, 2);
        assert!(!r.status.is_connected());
        assert_eq!(r.bus.state().plugged, 0);
    }

    #[test]
    fn target_created_once_per_connection() {
        let mut r = rig(ControllerMode::XInputToDualShock4);
        for _ in 0..10 {
            r.session.tick();
        }
        assert_eq!(r.channel.state().open_attempts, 1);
        assert_eq!(r.bus.state().plugged, 1);
        assert_eq!(r.session.target_kind(), Some(TargetKind::DualShock4));
        assert!(r.status.is_connected());
        assert_eq!(r.session.poll_ticks(), 10);
    }

    #[test]
    fn sends_state_request_in_source_encoding() {
        let mut r = rig(ControllerMode::Ds4ToXbox360);
        r.session.tick();
        assert_eq!(
            r.channel.take_sent(),
            vec![Packet::GetStateRequestDs4 { user_index: 0 }]
        );

        let mut r = rig(ControllerMode::XInputToXbox360);
        r.session.tick();
        assert_eq!(
            r.channel.take_sent(),
            vec![Packet::GetStateRequest { user_index: 0 }]
        );
    }

    #[test]
    fn native_response_drives_xbox360_target() {
        let mut r = rig(ControllerMode::XInputToXbox360);
        r.channel.push(native_response(0, pad()));
        r.session.tick();
        assert_eq!(r.bus.last_report(), Some(SinkReport::Xbox360(pad())));
        assert_eq!(r.status.error_code(), 0);
    }

    #[test]
    fn native_response_drives_ds4_target() {
        let mut r = rig(ControllerMode::XInputToDualShock4);
        r.channel.push(native_response(0, pad()));
        r.session.tick();
        let expected = Ds4Report::from(&pad());
        assert_eq!(r.bus.last_report(), Some(SinkReport::DualShock4(expected)));
        assert_eq!(expected.dpad(), DpadDirection::NorthWest);
        assert_ne!(expected.buttons & ds4buttons::TRIGGER_LEFT, 0);
    }

    #[test]
    fn cross_response_drives_both_sinks() {
        let mut r = rig(ControllerMode::Ds4ToDualShock4);
        r.channel.push(cross_response(0, cross_pad()));
        r.session.tick();
        assert_eq!(
            r.bus.last_report(),
            Some(SinkReport::DualShock4(Ds4Report::from(&cross_pad())))
        );

        let mut r = rig(ControllerMode::Ds4ToXbox360);
        r.channel.push(cross_response(0, cross_pad()));
        r.session.tick();
        let expected = XInputGamepad::from(&cross_pad());
        assert_eq!(r.bus.last_report(), Some(SinkReport::Xbox360(expected)));
        assert_eq!(
            expected.buttons,
            xbuttons::B | xbuttons::START | xbuttons::DPAD_DOWN | xbuttons::DPAD_LEFT
        );
    }

    #[test]
    fn device_error_zeroes_target_and_records_code() {
        let mut r = rig(ControllerMode::XInputToDualShock4);
        r.channel.push(native_response(0, pad()));
        r.channel.push(native_response(0x48F, pad()));
        r.session.tick();
        assert_eq!(
            r.bus.last_report(),
            Some(SinkReport::neutral(TargetKind::DualShock4))
        );
        assert_eq!(r.status.error_code(), 0x48F);
        assert!(r.status.is_connected());
    }

    #[test]
    fn error_code_clears_on_reconnect() {
        let mut r = rig(ControllerMode::XInputToXbox360);
        r.channel.push(native_response(7, pad()));
        r.channel.state().drop_after_drain = true;
        r.session.tick();
        assert_eq!(r.status.error_code(), 7);
        assert!(!r.status.is_connected());

        r.session.tick();
        assert!(r.status.is_connected());
        assert_eq!(r.status.error_code(), 0);
    }

    #[test]
    fn ignores_other_users_and_other_encoding() {
        let mut r = rig(ControllerMode::XInputToXbox360);
        r.channel.push(Packet::GetStateResponse {
            user_index: 1,
            result: 0,
            packet_number: 0,
            state: pad(),
        });
        r.channel.push(cross_response(0, cross_pad()));
        r.channel.push(Packet::GetStateRequest { user_index: 0 });
        r.session.tick();
        assert_eq!(r.bus.report_count(), 0);
    }

    #[test]
    fn stale_input_is_zeroed_until_next_response() {
        let mut r = rig(ControllerMode::XInputToXbox360);
        let timeout = Timing::default().stale_timeout_ticks;

        r.channel.push(native_response(0, pad()));
        r.session.tick();
        assert_eq!(r.bus.report_count(), 1);

        for _ in 0..timeout {
            r.session.tick();
        }
        assert_eq!(r.bus.report_count(), 1);

        r.session.tick();
        assert_eq!(r.bus.report_count(), 2);
        assert_eq!(r.bus.last_report(), Some(SinkReport::neutral(TargetKind::Xbox360)));

        r.session.tick();
        assert_eq!(r.bus.report_count(), 3);
        assert_eq!(r.bus.last_report(), Some(SinkReport::neutral(TargetKind::Xbox360)));

        r.channel.push(native_response(0, pad()));
        r.session.tick();
        assert_eq!(r.bus.last_report(), Some(SinkReport::Xbox360(pad())));
    }

    #[test]
    fn reconnected_session_starts_stale() {
        let mut r = rig(ControllerMode::XInputToXbox360);
        for _ in 0..4 {
            r.session.tick();
        }
        r.channel.push(native_response(0, pad()));
        r.channel.state().drop_after_drain = true;
        r.session.tick();
        assert_eq!(r.session.poll_ticks(), 0);

        // First tick of the new connection has no response yet and the
        // counter restarted below the last response tick.
        r.session.tick();
        assert_eq!(r.session.poll_ticks(), 1);
        assert_eq!(r.bus.last_report(), Some(SinkReport::neutral(TargetKind::Xbox360)));
    }

    #[test]
    fn send_failure_tidies_everything() {
        let mut r = rig(ControllerMode::Ds4ToDualShock4);
        r.session.tick();
        assert_eq!(r.bus.live_count(), 1);

        r.channel.state().fail_send = true;
        r.session.tick();
        assert_eq!(r.bus.live_count(), 0);
        assert!(!r.channel.state().open);
        assert!(!r.status.is_connected());
        assert_eq!(r.session.poll_ticks(), 0);

        // No backoff after a send failure: the next tick reopens.
        r.channel.state().fail_send = false;
        r.session.tick();
        assert_eq!(r.channel.state().open_attempts, 2);
        assert_eq!(r.bus.live_count(), 1);
    }

    #[test]
    fn channel_closed_mid_tick_tidies() {
        let mut r = rig(ControllerMode::XInputToXbox360);
        r.session.tick();
        r.channel.state().drop_after_drain = true;
        r.session.tick();
        assert_eq!(r.bus.live_count(), 0);
        assert_eq!(r.bus.state().unplugged, 1);
        assert!(!r.status.is_connected());
    }

    #[test]
    fn allocation_failure_tidies_with_backoff() {
        let mut r = rig(ControllerMode::XInputToXbox360);
        r.bus.state().fail_plug_in = true;
        r.session.tick();
        assert_eq!(r.channel.state().open_attempts, 1);
        assert!(!r.channel.state().open);
        assert!(!r.status.is_connected());

        r.bus.state().fail_plug_in = false;
        for _ in 0..Timing::default().open_retry_ticks {
            r.session.tick();
        }
        assert_eq!(r.channel.state().open_attempts, 1);
        r.session.tick();
        assert_eq!(r.channel.state().open_attempts, 2);
        assert!(r.status.is_connected());
    }

    #[test]
    fn rumble_is_forwarded_once_in_native_units() {
        let mut r = rig(ControllerMode::XInputToXbox360);
        r.session.tick();
        r.channel.take_sent();

        r.bus.notify(Feedback {
            vibration: PadVibration {
                large_motor: 255,
                small_motor: 128,
            },
            light_bar: None,
        });
        r.session.tick();
        assert_eq!(
            r.channel.take_sent(),
            vec![
                Packet::GetStateRequest { user_index: 0 },
                Packet::SetStateRequest {
                    user_index: 0,
                    vibration: XInputVibration {
                        left_motor: 0xFFFF,
                        right_motor: 0x8080,
                    },
                },
            ]
        );

        r.session.tick();
        assert_eq!(
            r.channel.take_sent(),
            vec![Packet::GetStateRequest { user_index: 0 }]
        );
    }

    #[test]
    fn ds4_feedback_carries_light_bar() {
        let color = LightBarColor {
            red: 0,
            green: 0,
            blue: 255,
        };
        let rumble = PadVibration {
            large_motor: 40,
            small_motor: 0,
        };

        let mut r = rig(ControllerMode::Ds4ToDualShock4);
        r.session.tick();
        r.channel.take_sent();
        r.bus.notify(Feedback {
            vibration: rumble,
            light_bar: Some(color),
        });
        r.session.tick();
        assert_eq!(
            r.channel.take_sent()[1],
            Packet::SetStateRequestDs4 {
                user_index: 0,
                vibration: Some(rumble),
                light_bar: Some(color),
            }
        );
    }

    #[test]
    fn ds4_sink_feedback_in_native_mode_sends_rumble_only() {
        let mut r = rig(ControllerMode::XInputToDualShock4);
        r.session.tick();
        r.channel.take_sent();
        r.bus.notify(Feedback {
            vibration: PadVibration {
                large_motor: 0x10,
                small_motor: 0xFF,
            },
            light_bar: Some(LightBarColor {
                red: 255,
                green: 255,
                blue: 0,
            }),
        });
        r.session.tick();
        assert_eq!(
            r.channel.take_sent()[1],
            Packet::SetStateRequest {
                user_index: 0,
                vibration: XInputVibration {
                    left_motor: 0x1010,
                    right_motor: 0xFFFF,
                },
            }
        );
    }

    #[test]
    fn ds4_source_on_xbox360_sink_sends_rumble_only() {
        let mut r = rig(ControllerMode::Ds4ToXbox360);
        r.session.tick();
        r.channel.take_sent();
        let rumble = PadVibration {
            large_motor: 9,
            small_motor: 3,
        };
        r.bus.notify(Feedback {
            vibration: rumble,
            light_bar: None,
        });
        r.session.tick();
        assert_eq!(
            r.channel.take_sent()[1],
            Packet::SetStateRequestDs4 {
                user_index: 0,
                vibration: Some(rumble),
                light_bar: None,
            }
        );
    }

    #[test]
    fn finish_releases_everything() {
        let mut r = rig(ControllerMode::XInputToDualShock4);
        r.session.tick();
        let channel = r.session.finish();
        assert!(!channel.is_open());
        assert_eq!(r.bus.live_count(), 0);
        assert!(!r.status.is_connected());
    }
}
