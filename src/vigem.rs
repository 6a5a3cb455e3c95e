//! Virtual controller client and targets.
//!
//! A [`VirtualClient`] owns the connection to the device-emulation bus and
//! is the only way to create a [`VirtualTarget`]. Each target keeps the
//! client alive through an `Arc`, so tearing down in either order is safe.
//!
//! Feedback (rumble, light bar) arrives on a driver-owned thread. It is
//! passed as a message into the target's own queue and folded into the
//! pending slots by whoever reads it, so no lock is shared with the driver.

use crate::device::{Feedback, LightBarColor, PadVibration, SinkReport, TargetKind};
use crate::error::{RdpGamepadError, Result};
use crate::platform::{self, TargetHandle, VirtualBus};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

pub struct VirtualClient {
    bus: Arc<dyn VirtualBus>,
}

impl VirtualClient {
    pub fn new(bus: Arc<dyn VirtualBus>) -> Arc<Self> {
        Arc::new(Self { bus })
    }

    /// Connect to the platform bus (ViGEmBus on Windows).
    pub fn connect() -> Result<Arc<Self>> {
        Ok(Self::new(platform::connect_virtual_bus()?))
    }

    /// Plug in a new controller of `kind`.
    pub fn create_target(self: &Arc<Self>, kind: TargetKind) -> Result<VirtualTarget> {
        let (tx, rx) = mpsc::channel();
        let handle = self.bus.plug_in(kind, tx)?;
        log::info!("Plugged in virtual {:?} controller ({})", kind, handle.0);
        Ok(VirtualTarget {
            client: Arc::clone(self),
            handle,
            kind,
            feedback: rx,
            pending_vibration: None,
            pending_light_bar: None,
        })
    }
}

/// One emulated controller. Unplugged from the bus when dropped.
pub struct VirtualTarget {
    client: Arc<VirtualClient>,
    handle: TargetHandle,
    kind: TargetKind,
    feedback: Receiver<Feedback>,
    pending_vibration: Option<PadVibration>,
    pending_light_bar: Option<LightBarColor>,
}

impl VirtualTarget {
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn handle(&self) -> TargetHandle {
        self.handle
    }

    /// Push a full report to the bus immediately.
    pub fn set_state(&self, report: &SinkReport) -> Result<()> {
        if report.kind() != self.kind {
            return Err(RdpGamepadError::ViGEm(format!(
                "{:?} report sent to {:?} target",
                report.kind(),
                self.kind
            )));
        }
        self.client.bus.update(self.handle, report)
    }

    /// Put the controller at rest: nothing pressed, sticks centred.
    pub fn reset(&self) -> Result<()> {
        self.set_state(&SinkReport::neutral(self.kind))
    }

    /// Most recent rumble since the last call, if any.
    pub fn take_vibration(&mut self) -> Option<PadVibration> {
        self.drain_feedback();
        self.pending_vibration.take()
    }

    /// Most recent light-bar colour since the last call. Always `None` for
    /// Xbox 360 targets.
    pub fn take_light_bar(&mut self) -> Option<LightBarColor> {
        self.drain_feedback();
        self.pending_light_bar.take()
    }

    fn drain_feedback(&mut self) {
        while let Ok(feedback) = self.feedback.try_recv() {
            self.pending_vibration = Some(feedback.vibration);
            if self.kind == TargetKind::DualShock4 {
                if let Some(color) = feedback.light_bar {
                    self.pending_light_bar = Some(color);
                }
            }
        }
    }
}

impl Drop for VirtualTarget {
    fn drop(&mut self) {
        match self.client.bus.unplug(self.handle) {
            Ok(()) => log::info!("Unplugged virtual {:?} controller ({})", self.kind, self.handle.0),
            Err(e) => log::warn!("Failed to unplug target {}: {}", self.handle.0, e),
        }
    }
}
