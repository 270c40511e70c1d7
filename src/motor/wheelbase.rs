// Two-wheeled base on one or two Roboteq controllers
//
// The topology is resolved once at construction into a mapping table from
// each side to the (controller, channel) outputs it drives. Every operation
// walks that table, so callers see the same behaviour for either wiring.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::controller::ControllerClient;
use super::fault::ControllerEvent;
use super::kinematics::{WheelSpeeds, drive_to_wheel_speeds};
use super::link::{Link, SerialLink};
use super::roboteq::{Channel, Result};
use crate::config::{ConfigError, WheelBaseConfig};

/// How the two wheels are wired to controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// One controller: left wheel on channel 1, right wheel on channel 2
    Single,
    /// One controller per side, each driving both of its channels
    Dual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// A physical output: index into the base's controllers plus a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTarget {
    pub controller: usize,
    pub channel: Channel,
}

/// Outputs driven by one side and the sign `move_base` applies to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideMapping {
    pub targets: Vec<ChannelTarget>,
    pub move_sign: i32,
}

/// Resolved side-to-output table, fixed for the lifetime of the base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelMapping {
    pub left: SideMapping,
    pub right: SideMapping,
}

// Motors are mounted mirrored, so forward motion spins the left side negative
const LEFT_MOVE_SIGN: i32 = -1;
const RIGHT_MOVE_SIGN: i32 = 1;

impl Topology {
    pub fn controller_count(self) -> usize {
        match self {
            Topology::Single => 1,
            Topology::Dual => 2,
        }
    }

    pub fn mapping(self) -> WheelMapping {
        let target = |controller, channel| ChannelTarget { controller, channel };
        match self {
            Topology::Single => WheelMapping {
                left: SideMapping {
                    targets: vec![target(0, Channel::ONE)],
                    move_sign: LEFT_MOVE_SIGN,
                },
                right: SideMapping {
                    targets: vec![target(0, Channel::TWO)],
                    move_sign: RIGHT_MOVE_SIGN,
                },
            },
            Topology::Dual => WheelMapping {
                left: SideMapping {
                    targets: Channel::ALL.into_iter().map(|ch| target(0, ch)).collect(),
                    move_sign: LEFT_MOVE_SIGN,
                },
                right: SideMapping {
                    targets: Channel::ALL.into_iter().map(|ch| target(1, ch)).collect(),
                    move_sign: RIGHT_MOVE_SIGN,
                },
            },
        }
    }
}

impl WheelMapping {
    pub fn side(&self, side: Side) -> &SideMapping {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Every mapped output, left side first
    pub fn targets(&self) -> impl Iterator<Item = (Side, ChannelTarget)> + '_ {
        let left = self.left.targets.iter().map(|&t| (Side::Left, t));
        let right = self.right.targets.iter().map(|&t| (Side::Right, t));
        left.chain(right)
    }
}

/// Left/right wheel base over one or two controllers
pub struct WheelBase<L: Link = SerialLink> {
    controllers: Vec<ControllerClient<L>>,
    topology: Topology,
    mapping: WheelMapping,
}

impl WheelBase<SerialLink> {
    /// Open every configured port; one port selects `Single`, two select `Dual`
    pub fn open(config: &WheelBaseConfig) -> Result<Self> {
        Self::open_with(config, |port| {
            ControllerClient::open(port, config.baud_rate, config.timeout())
        })
    }
}

impl<L: Link> WheelBase<L> {
    pub fn single(controller: ControllerClient<L>) -> Self {
        Self::with_topology(vec![controller], Topology::Single)
    }

    pub fn dual(left: ControllerClient<L>, right: ControllerClient<L>) -> Self {
        Self::with_topology(vec![left, right], Topology::Dual)
    }

    /// Open each configured port with `opener`, then pick the topology.
    ///
    /// Stops at the first port that fails to open; controllers already
    /// opened are dropped, which zeroes their motors.
    pub fn open_with(
        config: &WheelBaseConfig,
        opener: impl FnMut(&str) -> Result<ControllerClient<L>>,
    ) -> Result<Self> {
        config.validate()?;
        let controllers = config
            .ports
            .iter()
            .map(String::as_str)
            .map(opener)
            .collect::<Result<Vec<_>>>()?;
        Self::from_controllers(controllers)
    }

    /// One controller selects `Single`, two select `Dual` (left first)
    pub fn from_controllers(mut controllers: Vec<ControllerClient<L>>) -> Result<Self> {
        match controllers.len() {
            1 | 2 => {}
            n => return Err(ConfigError::PortCount(n).into()),
        }
        let last = controllers.pop();
        match (controllers.pop(), last) {
            (Some(left), Some(right)) => Ok(Self::dual(left, right)),
            (None, Some(only)) => Ok(Self::single(only)),
            _ => Err(ConfigError::PortCount(0).into()),
        }
    }

    fn with_topology(controllers: Vec<ControllerClient<L>>, topology: Topology) -> Self {
        let ports: Vec<&str> = controllers.iter().map(|c| c.port()).collect();
        info!("Wheel base on {:?} ({:?} topology)", ports, topology);
        Self {
            controllers,
            topology,
            mapping: topology.mapping(),
        }
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn mapping(&self) -> &WheelMapping {
        &self.mapping
    }

    /// Run `op` on every controller without short-circuiting; true if all succeed
    fn broadcast(&mut self, mut op: impl FnMut(&mut ControllerClient<L>) -> bool) -> bool {
        self.controllers
            .iter_mut()
            .fold(true, |ok, controller| op(controller) && ok)
    }

    /// Write `left` to every left output and `right` to every right output
    pub fn set_speed(&mut self, left: i32, right: i32) -> bool {
        debug!("Setting wheel speeds: left={}, right={}", left, right);
        let mut ok = true;
        for (side, target) in self.mapping.targets() {
            let value = match side {
                Side::Left => left,
                Side::Right => right,
            };
            ok &= self.controllers[target.controller].set_speed(target.channel, value);
        }
        ok
    }

    /// Drive the base from a forward speed and a turn rate.
    ///
    /// Fault flags are queried once per mapped output first; if any query
    /// fails no motion is commanded and `false` is returned.
    pub fn move_base(&mut self, speed: f32, turn: f32) -> bool {
        for (_, target) in self.mapping.targets() {
            if !self.controllers[target.controller].read_fault_flags() {
                warn!(
                    "Fault check failed on {} channel {}, not moving",
                    self.controllers[target.controller].port(),
                    target.channel
                );
                return false;
            }
        }

        let wheels = drive_to_wheel_speeds(speed, turn);
        let signed = WheelSpeeds::new(
            wheels.left * self.mapping.left.move_sign,
            wheels.right * self.mapping.right.move_sign,
        );
        debug!("move speed={} turn={} -> {:?}", speed, turn, signed);
        self.set_speed(signed.left, signed.right)
    }

    pub fn stop(&mut self) -> bool {
        info!("Stopping all motors");
        self.broadcast(|c| c.stop())
    }

    pub fn e_stop(&mut self) -> bool {
        self.broadcast(|c| c.estop())
    }

    pub fn release_estop(&mut self) -> bool {
        self.broadcast(|c| c.release_estop())
    }

    /// True only if every controller's fault query completed
    pub fn read_fault_flags(&mut self) -> bool {
        self.broadcast(|c| c.read_fault_flags())
    }

    /// Ratio RPM `[left, right]`, read from the first output of each side
    pub fn read_motor_speed_ratio(&mut self) -> Result<[i32; 2]> {
        let left = self.read_side_ratio(Side::Left)?;
        let right = self.read_side_ratio(Side::Right)?;
        Ok([left, right])
    }

    fn read_side_ratio(&mut self, side: Side) -> Result<i32> {
        let target = self.mapping.side(side).targets[0];
        self.controllers[target.controller].read_motor_speed_ratio_rpm(target.channel)
    }

    /// Battery voltage in volts, from the first controller
    pub fn read_battery_voltage(&mut self) -> Result<f32> {
        self.controllers[0].read_battery_voltage()
    }

    /// Reopen every controller link.
    ///
    /// Every controller is attempted; the first failure is returned.
    pub fn reset(&mut self) -> Result<()> {
        let mut first_err = None;
        for controller in &mut self.controllers {
            if let Err(e) = controller.reset() {
                warn!("{}: reset failed: {}", controller.port(), e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Zero and close every controller
    pub fn close(&mut self) -> bool {
        info!("Closing wheel base");
        self.broadcast(|c| c.close())
    }

    /// Events recorded by every controller, oldest first per controller
    pub fn events(&self) -> Vec<ControllerEvent> {
        self.controllers
            .iter()
            .flat_map(|c| c.events().iter().cloned())
            .collect()
    }

    pub fn take_events(&mut self) -> Vec<ControllerEvent> {
        self.controllers
            .iter_mut()
            .flat_map(|c| c.take_events())
            .collect()
    }
}
