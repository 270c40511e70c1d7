// Client for one Roboteq dual-channel motor controller
//
// Every operation is a strict command/response round trip over the link.
// Ack-style commands report success as a bool; value queries return Result.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::fault::{ControllerEvent, EventLog, FaultFlags};
use super::link::{Link, SerialLink};
use super::roboteq::{Channel, Command, Response, Result, RoboteqError};
use crate::config::{DEFAULT_TIMEOUT_MS, EVENT_LOG_CAPACITY, GEAR_RATIO};

/// One physical controller and the link it is reached through
pub struct ControllerClient<L: Link = SerialLink> {
    link: L,
    timeout: Duration,
    events: EventLog,
}

impl ControllerClient<SerialLink> {
    /// Open a serial connection to the controller on `port`
    pub fn open(port: &str, baudrate: u32, timeout: Duration) -> Result<Self> {
        let link = SerialLink::open(port, baudrate, timeout)?;
        Ok(Self::with_link_timeout(link, timeout))
    }
}

impl<L: Link> ControllerClient<L> {
    /// Wrap an already-open link using the default read timeout
    pub fn with_link(link: L) -> Self {
        Self::with_link_timeout(link, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    pub fn with_link_timeout(link: L, timeout: Duration) -> Self {
        Self {
            link,
            timeout,
            events: EventLog::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    pub fn port(&self) -> &str {
        self.link.port()
    }

    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// Send one command and classify the single reply
    fn round_trip(&mut self, command: &Command) -> Result<Response> {
        let payload = command.to_string();
        self.link.send(&payload)?;
        let raw = self.link.receive(self.timeout)?;
        Ok(Response::parse(&raw))
    }

    /// Send `command` and report whether it was acknowledged
    pub(crate) fn send_success(&mut self, command: &Command) -> bool {
        match self.round_trip(command) {
            Ok(Response::Ack) => true,
            Ok(response) => {
                warn!(
                    "{}: {} not acknowledged (got {:?})",
                    self.link.port(),
                    command,
                    response.to_string()
                );
                false
            }
            Err(e) => {
                warn!("{}: {} failed: {}", self.link.port(), command, e);
                false
            }
        }
    }

    /// Send a query and return the integer payload of its reply
    fn query(&mut self, command: Command) -> Result<i32> {
        let response = self.round_trip(&command)?;
        match (&response, command.query_key()) {
            (Response::Query { key, value }, Some(expected)) if key == expected => Ok(*value),
            _ => Err(RoboteqError::UnexpectedResponse {
                port: self.link.port().to_string(),
                command: command.to_string(),
                response: response.to_string(),
            }),
        }
    }

    /// Set the speed of one channel in controller units (-1000..=1000)
    pub fn set_speed(&mut self, channel: Channel, value: i32) -> bool {
        debug!("{}: channel {} speed {}", self.link.port(), channel, value);
        self.send_success(&Command::SetSpeed { channel, value })
    }

    /// Stop one channel.
    ///
    /// If the stop is not acknowledged the channel is commanded to zero speed
    /// once, and the result of that command is returned.
    pub fn stop_motor(&mut self, channel: Channel) -> bool {
        if self.send_success(&Command::MotorStop(channel)) {
            return true;
        }

        let recovered = self.set_speed(channel, 0);
        let event = ControllerEvent::stop_fallback(self.link.port(), channel, recovered);
        if recovered {
            warn!(port = %event.port, channel = channel.number(), "{}", event.message());
        } else {
            error!(port = %event.port, channel = channel.number(), "{}", event.message());
        }
        self.events.push(event);
        recovered
    }

    /// Stop every channel; true only if all of them stopped
    pub fn stop(&mut self) -> bool {
        Channel::ALL
            .into_iter()
            .fold(true, |ok, channel| self.stop_motor(channel) && ok)
    }

    pub fn estop(&mut self) -> bool {
        info!("{}: emergency stop", self.link.port());
        self.send_success(&Command::EmergencyStop)
    }

    pub fn release_estop(&mut self) -> bool {
        info!("{}: releasing emergency stop", self.link.port());
        self.send_success(&Command::ReleaseEmergencyStop)
    }

    /// Query and decode the fault bitmask, recording an event for any fault
    pub fn query_fault_flags(&mut self) -> Result<FaultFlags> {
        let flags = FaultFlags::from_bits(self.query(Command::QueryFaultFlags)?);
        if !flags.is_empty() {
            let event = ControllerEvent::fault(self.link.port(), flags);
            error!(
                port = %event.port,
                fault_bits = flags.bits(),
                "{}",
                event.message()
            );
            self.events.push(event);
        }
        Ok(flags)
    }

    /// True if the fault query completed, whether or not faults are active
    pub fn read_fault_flags(&mut self) -> bool {
        match self.query_fault_flags() {
            Ok(_) => true,
            Err(e) => {
                warn!("{}: fault flag query failed: {}", self.link.port(), e);
                false
            }
        }
    }

    pub fn read_motor_speed_rpm(&mut self, channel: Channel) -> Result<i32> {
        self.query(Command::QueryMotorRpm(channel))
    }

    pub fn read_motor_speed_ratio_rpm(&mut self, channel: Channel) -> Result<i32> {
        self.query(Command::QueryMotorRatioRpm(channel))
    }

    /// Wheel RPM from channel 1 motor RPM through the gearbox
    pub fn read_wheel_speed_rpm(&mut self) -> Result<i32> {
        Ok(self.read_motor_speed_rpm(Channel::ONE)? / GEAR_RATIO)
    }

    /// Battery voltage in volts (the controller reports tenths of a volt)
    pub fn read_battery_voltage(&mut self) -> Result<f32> {
        let tenths = self.query(Command::QueryBatteryVoltage)?;
        Ok(tenths as f32 / 10.0)
    }

    /// Close and reopen the link
    pub fn reset(&mut self) -> Result<()> {
        info!("{}: resetting link", self.link.port());
        self.link.close();
        self.link.open()?;
        Ok(())
    }

    /// Zero every channel, then release the link.
    ///
    /// The link is closed even if a zero-speed command is not acknowledged;
    /// the return value reports whether all of them were.
    pub fn close(&mut self) -> bool {
        if !self.link.is_open() {
            return true;
        }
        let zeroed = Channel::ALL
            .into_iter()
            .fold(true, |ok, channel| self.set_speed(channel, 0) && ok);
        self.link.close();
        info!("{}: closed (motors zeroed: {})", self.link.port(), zeroed);
        zeroed
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<ControllerEvent> {
        self.events.drain()
    }
}

impl<L: Link> Drop for ControllerClient<L> {
    fn drop(&mut self) {
        // Leave motors at zero if the owner never closed us
        if self.link.is_open() && !self.close() {
            warn!("{}: failed to zero motors on drop", self.link.port());
        }
    }
}
