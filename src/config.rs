use crate::device::TargetKind;
use crate::error::{RdpGamepadError, Result};
use crate::protocol::Encoding;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which protocol shape the remote side speaks and which controller is
/// emulated locally. Fixed for the lifetime of a running processor.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
pub enum ControllerMode {
    /// XInput ---> Xbox 360.
    #[default]
    #[serde(rename = "xinput_to_xbox360")]
    XInputToXbox360 = 0,
    /// DualShock 4 ---> Xbox 360.
    #[serde(rename = "ds4_to_xbox360")]
    Ds4ToXbox360 = 1,
    /// DualShock 4 ---> DualShock 4.
    #[serde(rename = "ds4_to_ds4")]
    Ds4ToDualShock4 = 2,
    /// XInput ---> DualShock 4.
    #[serde(rename = "xinput_to_ds4")]
    XInputToDualShock4 = 3,
}

impl ControllerMode {
    pub const ALL: [ControllerMode; 4] = [
        ControllerMode::XInputToXbox360,
        ControllerMode::Ds4ToXbox360,
        ControllerMode::Ds4ToDualShock4,
        ControllerMode::XInputToDualShock4,
    ];

    /// Encoding of the packets exchanged over the channel.
    pub fn source(self) -> Encoding {
        match self {
            ControllerMode::XInputToXbox360 | ControllerMode::XInputToDualShock4 => Encoding::Native,
            ControllerMode::Ds4ToXbox360 | ControllerMode::Ds4ToDualShock4 => Encoding::Cross,
        }
    }

    /// Kind of virtual controller plugged into the local bus.
    pub fn sink(self) -> TargetKind {
        match self {
            ControllerMode::XInputToXbox360 | ControllerMode::Ds4ToXbox360 => TargetKind::Xbox360,
            ControllerMode::Ds4ToDualShock4 | ControllerMode::XInputToDualShock4 => {
                TargetKind::DualShock4
            }
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| *m as u8 == value)
    }
}

/// Polling cadence and the tick-denominated timeouts derived from it.
///
/// Both timeouts are counted in ticks, so changing `poll_interval_ms`
/// changes their wall-clock length too.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timing {
    pub poll_interval_ms: u64,
    /// Ticks to wait after a failed channel open before trying again.
    /// 35 ticks at 16ms is ~560ms.
    pub open_retry_ticks: u32,
    /// Ticks without a state response before the target is forced neutral.
    pub stale_timeout_ticks: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval_ms: 16,
            open_retry_ticks: 35,
            stale_timeout_ticks: 120,
        }
    }
}

impl Timing {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControllerConfig {
    pub slot: u8,
    #[serde(default)]
    pub mode: ControllerMode,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub timing: Timing,
    #[serde(default = "default_controllers")]
    pub controllers: Vec<ControllerConfig>,
}

fn default_controllers() -> Vec<ControllerConfig> {
    vec![ControllerConfig {
        slot: 0,
        mode: ControllerMode::default(),
        enabled: true,
    }]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timing: Timing::default(),
            controllers: default_controllers(),
        }
    }
}

impl AppConfig {
    fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| RdpGamepadError::Config("Cannot find config directory".into()))?
            .join("rdpgamepad");
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join("config.json"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }
        let data = std::fs::read_to_string(&path)?;
        Self::from_json(&data)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, data)?;
        Ok(())
    }

    /// Parse and validate a config document.
    pub fn from_json(data: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let mut seen = Vec::with_capacity(self.controllers.len());
        for c in &self.controllers {
            if seen.contains(&c.slot) {
                return Err(RdpGamepadError::Config(format!(
                    "Controller slot {} configured twice",
                    c.slot
                )));
            }
            seen.push(c.slot);
        }
        Ok(())
    }

    pub fn enabled_controllers(&self) -> impl Iterator<Item = &ControllerConfig> {
        self.controllers.iter().filter(|c| c.enabled)
    }
}
