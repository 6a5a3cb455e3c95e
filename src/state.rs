use crate::config::{AppConfig, ControllerConfig, ControllerMode};
use crate::error::{RdpGamepadError, Result};
use crate::platform::Channel;
use crate::processor::GamepadProcessor;
use crate::vigem::VirtualClient;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Diagnostics for one controller slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub slot: u8,
    pub mode: ControllerMode,
    pub running: bool,
    pub connected: bool,
    pub error_code: u32,
}

struct Slot {
    config: ControllerConfig,
    processor: GamepadProcessor,
}

impl Slot {
    fn status(&self) -> SlotStatus {
        SlotStatus {
            slot: self.config.slot,
            mode: self.config.mode,
            running: self.processor.is_running(),
            connected: self.processor.is_connected(),
            error_code: self.processor.error_code(),
        }
    }
}

struct Inner {
    config: AppConfig,
    slots: Vec<Slot>,
}

/// Runs one independent processor per enabled controller slot. All of them
/// share a single virtual bus connection.
pub struct GamepadHost {
    inner: Mutex<Inner>,
}

impl GamepadHost {
    /// Build processors for every enabled slot. `open_channel` supplies the
    /// transport for a slot number.
    pub fn new<F>(config: AppConfig, client: Arc<VirtualClient>, mut open_channel: F) -> Result<Self>
    where
        F: FnMut(u8) -> Result<Box<dyn Channel>>,
    {
        config.validate()?;
        let slots = config
            .enabled_controllers()
            .map(|c| {
                Ok(Slot {
                    config: c.clone(),
                    processor: GamepadProcessor::new(
                        open_channel(c.slot)?,
                        client.clone(),
                        config.timing,
                    ),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        log::info!("Gamepad host ready with {} slot(s)", slots.len());
        Ok(Self {
            inner: Mutex::new(Inner { config, slots }),
        })
    }

    /// Load the config file and connect to the platform bus.
    pub fn from_config_file<F>(open_channel: F) -> Result<Self>
    where
        F: FnMut(u8) -> Result<Box<dyn Channel>>,
    {
        let config = AppConfig::load()?;
        Self::new(config, VirtualClient::connect()?, open_channel)
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start every slot that is not already running.
    pub fn start_all(&self) -> Result<()> {
        let mut inner = self.lock_inner();
        for slot in inner.slots.iter_mut().filter(|s| !s.processor.is_running()) {
            slot.processor.start(slot.config.mode)?;
        }
        Ok(())
    }

    pub fn stop_all(&self) {
        let mut inner = self.lock_inner();
        for slot in inner.slots.iter_mut() {
            slot.processor.stop();
        }
    }

    /// Switch a slot to `mode`. The new mode is recorded first; a running
    /// slot is then restarted, and if that fails it stays stopped and the
    /// error is returned.
    pub fn set_mode(&self, slot: u8, mode: ControllerMode) -> Result<()> {
        let mut inner = self.lock_inner();
        let Inner { config, slots } = &mut *inner;
        let target = slots
            .iter_mut()
            .find(|s| s.config.slot == slot)
            .ok_or_else(|| RdpGamepadError::Config(format!("Controller slot {} is not enabled", slot)))?;
        target.config.mode = mode;
        if let Some(c) = config.controllers.iter_mut().find(|c| c.slot == slot) {
            c.mode = mode;
        }
        let was_running = target.processor.is_running();
        target.processor.stop();
        if was_running {
            target.processor.start(mode)?;
        }
        Ok(())
    }

    pub fn status(&self) -> Vec<SlotStatus> {
        self.lock_inner().slots.iter().map(Slot::status).collect()
    }

    /// Current configuration, including mode changes made at runtime.
    pub fn config(&self) -> AppConfig {
        self.lock_inner().config.clone()
    }
}

impl Drop for GamepadHost {
    fn drop(&mut self) {
        self.stop_all();
    }
}
