use crate::device::{Feedback, SinkReport, TargetKind};
use crate::error::Result;
use crate::protocol::Packet;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

/// Remote-session transport carrying gamepad packets.
///
/// Calls are expected to return within a bounded time; nothing above this
/// trait cancels or times them out.
pub trait Channel: Send {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn send(&mut self, packet: &Packet) -> Result<()>;
    /// Next queued inbound packet, `None` when nothing is waiting. Never blocks.
    fn receive(&mut self) -> Option<Packet>;
}

/// Opaque id of one controller allocated on a [`VirtualBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetHandle(pub u64);

/// Where the bus delivers feedback for one target. Sending may happen from
/// any thread; a send error means the target is gone and can be ignored.
pub type FeedbackSender = mpsc::Sender<Feedback>;

/// A connected session with the local device-emulation driver.
pub trait VirtualBus: Send + Sync {
    /// Allocate, plug in and register feedback for a new controller.
    fn plug_in(&self, kind: TargetKind, feedback: FeedbackSender) -> Result<TargetHandle>;
    /// Push a full report. Synchronous; nothing is buffered.
    fn update(&self, handle: TargetHandle, report: &SinkReport) -> Result<()>;
    /// Unregister feedback, unplug and free the controller.
    fn unplug(&self, handle: TargetHandle) -> Result<()>;
}

/// Pump `next` into `feedback` on a named thread until either side closes.
/// Backends use this to bridge driver notification streams.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
pub(crate) fn spawn_feedback<F>(
    name: &str,
    feedback: FeedbackSender,
    mut next: F,
) -> Result<thread::JoinHandle<()>>
where
    F: FnMut() -> Option<Feedback> + Send + 'static,
{
    let handle = thread::Builder::new().name(name.into()).spawn(move || {
        while let Some(update) = next() {
            if feedback.send(update).is_err() {
                break;
            }
        }
    })?;
    Ok(handle)
}

#[cfg(target_os = "windows")]
mod windows;

#[cfg(test)]
pub(crate) mod mock;

/// Connect to the platform's virtual gamepad bus.
pub fn connect_virtual_bus() -> Result<Arc<dyn VirtualBus>> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::ViGEmBus::connect()?))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(crate::error::RdpGamepadError::PlatformNotSupported(
            std::env::consts::OS.into(),
        ))
    }
}
