//! Controller fault bitmask decoding and the structured event log.
//!
//! The `?FF` query returns a bitmask of simultaneously active conditions.
//! [`FaultFlags`] decodes it through [`FAULT_TABLE`] (bit position to
//! condition, low bit first) and renders it as one sentence, e.g.
//! `"Overheat Overvoltage fault."`.
//!
//! Anything an operator should hear about without the call failing is
//! recorded as a [`ControllerEvent`] in a bounded [`EventLog`].

use std::collections::VecDeque;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::roboteq::Channel;

/// A single hardware fault condition reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCondition {
    Overheat,
    Overvoltage,
    Undervoltage,
    ShortCircuit,
}

impl FaultCondition {
    pub fn label(self) -> &'static str {
        match self {
            FaultCondition::Overheat => "Overheat",
            FaultCondition::Overvoltage => "Overvoltage",
            FaultCondition::Undervoltage => "Undervoltage",
            FaultCondition::ShortCircuit => "Short circuit",
        }
    }
}

/// Bit position of each condition in the `FF` bitmask
pub const FAULT_TABLE: [(u8, FaultCondition); 4] = [
    (0, FaultCondition::Overheat),
    (1, FaultCondition::Overvoltage),
    (2, FaultCondition::Undervoltage),
    (3, FaultCondition::ShortCircuit),
];

/// Decoded `FF` bitmask. Bits above bit 3 are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FaultFlags(u8);

impl FaultFlags {
    pub const NONE: FaultFlags = FaultFlags(0);

    pub fn from_bits(bits: i32) -> Self {
        FaultFlags((bits & 0x0F) as u8)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, condition: FaultCondition) -> bool {
        self.conditions().any(|c| c == condition)
    }

    /// Active conditions in bit order, low to high
    pub fn conditions(self) -> impl Iterator<Item = FaultCondition> {
        FAULT_TABLE
            .into_iter()
            .filter(move |&(bit, _)| self.0 & (1 << bit) != 0)
            .map(|(_, condition)| condition)
    }
}

impl fmt::Display for FaultFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("No fault.");
        }
        for condition in self.conditions() {
            write!(f, "{} ", condition.label())?;
        }
        f.write_str("fault.")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// `?FF` reported active conditions
    Fault(FaultFlags),
    /// `!MS` went unacknowledged and the channel was forced to zero speed
    StopFallback { channel: u8, recovered: bool },
}

/// Something a controller reported that callers may want to act on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerEvent {
    pub severity: Severity,
    pub port: String,
    pub kind: EventKind,
    pub timestamp: SystemTime,
}

impl ControllerEvent {
    pub fn fault(port: &str, flags: FaultFlags) -> Self {
        Self {
            severity: Severity::Error,
            port: port.to_string(),
            kind: EventKind::Fault(flags),
            timestamp: SystemTime::now(),
        }
    }

    pub fn stop_fallback(port: &str, channel: Channel, recovered: bool) -> Self {
        Self {
            severity: if recovered { Severity::Warning } else { Severity::Error },
            port: port.to_string(),
            kind: EventKind::StopFallback {
                channel: channel.number(),
                recovered,
            },
            timestamp: SystemTime::now(),
        }
    }

    /// Fault conditions carried by this event, empty for non-fault events
    pub fn faults(&self) -> FaultFlags {
        match self.kind {
            EventKind::Fault(flags) => flags,
            _ => FaultFlags::NONE,
        }
    }

    /// Operator-facing text
    pub fn message(&self) -> String {
        match self.kind {
            EventKind::Fault(flags) => format!("ROBOTEQ: {}", flags),
            EventKind::StopFallback { channel, recovered: true } => format!(
                "ROBOTEQ: Stop on channel {} not acknowledged, speed forced to zero.",
                channel
            ),
            EventKind::StopFallback { channel, recovered: false } => format!(
                "ROBOTEQ: Stop on channel {} not acknowledged and zero speed not confirmed.",
                channel
            ),
        }
    }
}

/// Bounded FIFO of events; the oldest entry is dropped when full
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<ControllerEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, event: ControllerEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControllerEvent> {
        self.events.iter()
    }

    pub fn latest(&self) -> Option<&ControllerEvent> {
        self.events.back()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Remove and return every recorded event, oldest first
    pub fn drain(&mut self) -> Vec<ControllerEvent> {
        self.events.drain(..).collect()
    }
}
