mod config;
mod device;
mod error;
mod platform;
mod processor;
mod protocol;
mod session;
mod state;
mod translate;
mod vigem;

pub use config::{AppConfig, ControllerConfig, ControllerMode, Timing};
pub use device::{
    ds4buttons, xbuttons, Ds4Report, Feedback, GamepadState, LightBarColor, PadVibration,
    SinkReport, TargetKind, XInputGamepad, XInputVibration, TRIGGER_THRESHOLD,
};
pub use error::{RdpGamepadError, Result};
pub use platform::{connect_virtual_bus, Channel, FeedbackSender, TargetHandle, VirtualBus};
pub use processor::{GamepadProcessor, ProcessorStatus};
pub use protocol::{Encoding, MessageType, Packet};
pub use state::{GamepadHost, SlotStatus};
pub use translate::{
    axis_from_cross, axis_to_cross, axis_y_from_cross, axis_y_to_cross, cross_to_sink,
    motor_from_cross, motor_to_cross, native_to_sink, Button, DpadDirection,
};
pub use vigem::{VirtualClient, VirtualTarget};

/// Set up `env_logger`. Logs at `info` unless `RUST_LOG` says otherwise.
/// Calling it again is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
