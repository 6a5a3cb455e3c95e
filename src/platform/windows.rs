//! Windows virtual bus on top of the ViGEmBus driver.
//!
//! Every plugged-in controller gets its own feedback thread that turns
//! driver notifications into [`Feedback`] messages. The thread ends when the
//! driver closes the notification stream on unplug, or when the target's
//! mailbox is gone.

use super::{spawn_feedback, FeedbackSender, TargetHandle, VirtualBus};
use crate::device::{
    Ds4Report, Feedback, LightBarColor, PadVibration, SinkReport, TargetKind, XInputGamepad,
};
use crate::error::{RdpGamepadError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use vigem_rust::{Client, X360Button, X360Report};

type UpdateFn = Box<dyn Fn(&SinkReport) -> Result<()> + Send>;

/// A live driver target. Dropping `update` drops the driver handle, which
/// unplugs the controller.
struct Plugged {
    kind: TargetKind,
    update: UpdateFn,
}

pub struct ViGEmBus {
    // Declared before `client` so targets are released first.
    live: Mutex<HashMap<u64, Plugged>>,
    next: AtomicU64,
    client: Client,
}

impl ViGEmBus {
    pub fn connect() -> Result<Self> {
        let client = Client::connect().map_err(|e| {
            RdpGamepadError::ViGEm(format!(
                "Failed to connect to ViGEmBus, is the driver installed? {}",
                e
            ))
        })?;
        log::info!("Connected to ViGEmBus");
        Ok(Self {
            live: Mutex::new(HashMap::new()),
            next: AtomicU64::new(1),
            client,
        })
    }

    fn live(&self) -> MutexGuard<'_, HashMap<u64, Plugged>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn plug_in_x360(&self, feedback: FeedbackSender) -> Result<UpdateFn> {
        let target = self
            .client
            .new_x360_target()
            .plugin()
            .map_err(vigem_err("plug in Xbox 360 target"))?;
        target
            .wait_for_ready()
            .map_err(vigem_err("wait for Xbox 360 target"))?;
        let notifications = target
            .register_notification()
            .map_err(vigem_err("register Xbox 360 notification"))?;
        spawn_feedback("rdpgamepad-x360-feedback", feedback, move || {
            match notifications.recv() {
                Ok(Ok(n)) => Some(Feedback {
                    vibration: PadVibration {
                        large_motor: n.large_motor,
                        small_motor: n.small_motor,
                    },
                    light_bar: None,
                }),
                _ => None,
            }
        })?;
        Ok(Box::new(move |report| match report {
            SinkReport::Xbox360(g) => target
                .update(&x360_report(g))
                .map_err(vigem_err("update Xbox 360 target")),
            other => Err(kind_mismatch(other.kind(), TargetKind::Xbox360)),
        }))
    }

    fn plug_in_ds4(&self, feedback: FeedbackSender) -> Result<UpdateFn> {
        let target = self
            .client
            .new_ds4_target()
            .plugin()
            .map_err(vigem_err("plug in DualShock 4 target"))?;
        target
            .wait_for_ready()
            .map_err(vigem_err("wait for DualShock 4 target"))?;
        let notifications = target
            .register_notification()
            .map_err(vigem_err("register DualShock 4 notification"))?;
        spawn_feedback("rdpgamepad-ds4-feedback", feedback, move || {
            match notifications.recv() {
                Ok(Ok(n)) => Some(Feedback {
                    vibration: PadVibration {
                        large_motor: n.large_motor,
                        small_motor: n.small_motor,
                    },
                    light_bar: Some(LightBarColor {
                        red: n.lightbar.red,
                        green: n.lightbar.green,
                        blue: n.lightbar.blue,
                    }),
                }),
                _ => None,
            }
        })?;
        Ok(Box::new(move |report| match report {
            SinkReport::DualShock4(r) => target
                .update(&ds4_report(r))
                .map_err(vigem_err("update DualShock 4 target")),
            other => Err(kind_mismatch(other.kind(), TargetKind::DualShock4)),
        }))
    }
}

impl VirtualBus for ViGEmBus {
    fn plug_in(&self, kind: TargetKind, feedback: FeedbackSender) -> Result<TargetHandle> {
        let update = match kind {
            TargetKind::Xbox360 => self.plug_in_x360(feedback)?,
            TargetKind::DualShock4 => self.plug_in_ds4(feedback)?,
        };
        let handle = self.next.fetch_add(1, Ordering::SeqCst);
        self.live().insert(handle, Plugged { kind, update });
        Ok(TargetHandle(handle))
    }

    fn update(&self, handle: TargetHandle, report: &SinkReport) -> Result<()> {
        let live = self.live();
        let plugged = live
            .get(&handle.0)
            .ok_or_else(|| RdpGamepadError::ViGEm(format!("Unknown target {}", handle.0)))?;
        (plugged.update)(report)
    }

    fn unplug(&self, handle: TargetHandle) -> Result<()> {
        let plugged = self
            .live()
            .remove(&handle.0)
            .ok_or_else(|| RdpGamepadError::ViGEm(format!("Unknown target {}", handle.0)))?;
        log::debug!("Releasing {:?} target {}", plugged.kind, handle.0);
        drop(plugged);
        Ok(())
    }
}

fn x360_report(g: &XInputGamepad) -> X360Report {
    X360Report {
        buttons: X360Button::from_bits_retain(g.buttons),
        left_trigger: g.left_trigger,
        right_trigger: g.right_trigger,
        thumb_lx: g.thumb_lx,
        thumb_ly: g.thumb_ly,
        thumb_rx: g.thumb_rx,
        thumb_ry: g.thumb_ry,
    }
}

fn ds4_report(r: &Ds4Report) -> vigem_rust::Ds4Report {
    let mut out = vigem_rust::Ds4Report::default();
    out.thumb_lx = r.thumb_lx;
    out.thumb_ly = r.thumb_ly;
    out.thumb_rx = r.thumb_rx;
    out.thumb_ry = r.thumb_ry;
    out.buttons = r.buttons;
    out.special = r.special;
    out.trigger_l = r.trigger_l;
    out.trigger_r = r.trigger_r;
    out
}

fn kind_mismatch(report: TargetKind, target: TargetKind) -> RdpGamepadError {
    RdpGamepadError::ViGEm(format!("{:?} report sent to {:?} target", report, target))
}

fn vigem_err<E: std::fmt::Display>(action: &'static str) -> impl Fn(E) -> RdpGamepadError {
    move |e| RdpGamepadError::ViGEm(format!("Failed to {}: {}", action, e))
}
