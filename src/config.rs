// Serial settings, protocol constants, wheel-base configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Serial link defaults for Roboteq controllers
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

// Raw motor RPM per wheel RPM
pub const GEAR_RATIO: i32 = 160;

// Controller speed units per unit of requested base speed
pub const SPEED_SCALE: i32 = 10;

// Largest magnitude accepted by `!G`
pub const MAX_COMMAND: i32 = 1000;

// Bench commands are re-sent at this rate while held
pub const COMMAND_REPEAT_HZ: u64 = 10;

// How long the bench tool holds a speed/move command before stopping
pub const DEFAULT_HOLD_MS: u64 = 2000;

// Events kept per controller before the oldest are dropped
pub const EVENT_LOG_CAPACITY: usize = 64;

/// Errors produced while loading or validating a [`WheelBaseConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected one or two serial ports, got {0}")]
    PortCount(usize),
}

/// How to reach the motor controller(s) of the base.
///
/// One port selects the single-controller topology, two ports select the
/// dual-controller topology (left side first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelBaseConfig {
    pub ports: Vec<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUDRATE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl WheelBaseConfig {
    /// Config for a single controller driving both wheels
    pub fn single(port: impl Into<String>) -> Self {
        Self::with_ports(vec![port.into()])
    }

    /// Config for one controller per side
    pub fn dual(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::with_ports(vec![left.into(), right.into()])
    }

    fn with_ports(ports: Vec<String>) -> Self {
        Self {
            ports,
            baud_rate: DEFAULT_BAUDRATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.ports.len() {
            1 | 2 => Ok(()),
            n => Err(ConfigError::PortCount(n)),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
