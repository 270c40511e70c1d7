// Differential-drive transform for the two-wheeled base
// Converts a (speed, turn) request into left/right wheel commands in controller units.

use crate::config::{MAX_COMMAND, SPEED_SCALE};

/// Wheel commands for the two sides of the base, in controller units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelSpeeds {
    pub left: i32,
    pub right: i32,
}

impl WheelSpeeds {
    pub fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns speeds as array [left, right]
    pub fn as_array(&self) -> [i32; 2] {
        [self.left, self.right]
    }
}

impl From<[i32; 2]> for WheelSpeeds {
    fn from([left, right]: [i32; 2]) -> Self {
        Self::new(left, right)
    }
}

/// Convert a drive request to wheel commands
///
/// # Arguments
/// * `speed` - Forward speed (positive = forward)
/// * `turn` - Turn rate (positive = counter-clockwise, left wheel slows)
///
/// Mounting signs are not applied here; see `WheelBase::move_base`.
///
/// The turning convention (`left = speed - turn`, `right = speed + turn`) has
/// only been checked for `turn = 0`. Confirm the turn direction on hardware
/// before relying on it.
pub fn drive_to_wheel_speeds(speed: f32, turn: f32) -> WheelSpeeds {
    drive_to_wheel_speeds_with_params(speed, turn, SPEED_SCALE, MAX_COMMAND)
}

/// Convert a drive request to wheel commands with custom parameters
pub fn drive_to_wheel_speeds_with_params(
    speed: f32,
    turn: f32,
    scale: i32,
    max_command: i32,
) -> WheelSpeeds {
    let mut left = (speed - turn) * scale as f32;
    let mut right = (speed + turn) * scale as f32;

    // Scale both sides together so the turn ratio survives saturation
    let largest = left.abs().max(right.abs());
    if largest > max_command as f32 {
        let factor = max_command as f32 / largest;
        left *= factor;
        right *= factor;
    }

    WheelSpeeds {
        left: to_command(left, max_command),
        right: to_command(right, max_command),
    }
}

fn to_command(value: f32, max_command: i32) -> i32 {
    if value.is_nan() {
        return 0;
    }
    (value.round() as i32).clamp(-max_command, max_command)
}
