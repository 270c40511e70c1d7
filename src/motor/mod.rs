// Motor control module for the Roboteq wheel base
//
// Provides:
// - Serial link abstraction (real port and in-memory mock)
// - Roboteq ASCII command/response protocol
// - Fault bitmask decoding and controller events
// - Differential-drive transform
// - Single/dual controller wheel base API

mod controller;
pub mod fault;
pub mod kinematics;
pub mod link;
pub mod mock;
pub mod roboteq;
mod wheelbase;

pub use controller::ControllerClient;
pub use fault::{ControllerEvent, EventKind, FaultCondition, FaultFlags, Severity};
pub use kinematics::{WheelSpeeds, drive_to_wheel_speeds};
pub use link::{Link, LinkError, SerialLink};
pub use mock::MockLink;
pub use roboteq::{Channel, Command, Response, RoboteqError};
pub use wheelbase::{ChannelTarget, Side, SideMapping, Topology, WheelBase, WheelMapping};
