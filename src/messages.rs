// Message types exchanged with whatever front-end drives the base

use serde::{Deserialize, Serialize};

use crate::motor::{ControllerEvent, Severity, Topology};

// Drive request from teleop/scripts -> base
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    pub speed: f32,
    pub turn: f32,
}

// Snapshot of the base read back from the controllers
// Readings are optional because a single failed query shouldn't hide the rest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub topology: Topology,
    pub fault_query_ok: bool,
    pub battery_voltage: Option<f32>,
    pub speed_ratio_rpm: Option<[i32; 2]>,
    pub events: Vec<ControllerEvent>,
}

/// Health summary derived from a telemetry snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BaseHealth {
    Ok,
    Degraded,
    Fault,
    CommsLost,
}

impl From<&Telemetry> for BaseHealth {
    fn from(telemetry: &Telemetry) -> Self {
        if !telemetry.fault_query_ok {
            BaseHealth::CommsLost
        } else if telemetry.events.iter().any(|e| e.severity == Severity::Error) {
            BaseHealth::Fault
        } else if !telemetry.events.is_empty()
            || telemetry.battery_voltage.is_none()
            || telemetry.speed_ratio_rpm.is_none()
        {
            BaseHealth::Degraded
        } else {
            BaseHealth::Ok
        }
    }
}
