//! Client library for a six-axis desktop robot arm controller speaking a
//! line-delimited JSON protocol over TCP, plus the forward/inverse kinematics
//! needed to drive it in Cartesian space.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod arm;
pub mod drivers;
pub mod errors;
pub mod kinematics;
pub mod packets;

pub use arm::RobotArm;
pub use drivers::{ArmDriver, ArmDriverConfig, Correlator};
pub use errors::ArmError;
pub use kinematics::{JointChain, JointParameter, KinematicsEngine, SolverOptions};
pub use packets::{Command, FrameDecoder, Reply, ResponseFrame};

/// Joint angles in degrees, base to wrist. Radians are used only inside the
/// kinematics engine.
pub type JointAnglesDeg = [f64; 6];

/// End-effector pose. Translation in meters, orientation in degrees using the
/// intrinsic Z-Y-X (yaw, pitch, roll) rotation order. The same order is used
/// by forward and inverse kinematics and on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { x, y, z, roll, pitch, yaw }
    }

    /// Positional `[x, y, z, roll, pitch, yaw]` form, the order the wire uses.
    pub fn to_array(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.roll, self.pitch, self.yaw]
    }

    pub fn from_array(v: [f64; 6]) -> Self {
        Self { x: v[0], y: v[1], z: v[2], roll: v[3], pitch: v[4], yaw: v[5] }
    }
}

/// Controller execution mode. `Seq` queues commands and runs them strictly in
/// order; `Int` executes immediately, interrupting whatever is running, which
/// breaks FIFO assumptions. Some operations (inter-command delay) are only
/// valid in `Seq` mode.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotMode {
    #[serde(rename = "SEQ")]
    Seq,
    #[serde(rename = "INT")]
    Int,
}

impl RobotMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotMode::Seq => "SEQ",
            RobotMode::Int => "INT",
        }
    }
}

impl fmt::Display for RobotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RobotMode {
    type Err = ArmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SEQ" => Ok(RobotMode::Seq),
            "INT" => Ok(RobotMode::Int),
            other => Err(ArmError::Validation(format!(
                "mode must be SEQ or INT, got `{other}`"
            ))),
        }
    }
}

/// Lifecycle of the controller connection. Created `Connecting`, becomes
/// `Connected` once the socket is up, `Failed` on any mid-session I/O error
/// and `Disconnected` after an orderly shutdown. Calls made in any state but
/// `Connected` fail fast instead of hanging.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Rounds a wire-bound angle or coordinate to 3 decimals so floating-point
/// noise from radian/degree conversion never reaches the controller.
pub(crate) fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_str() {
        assert_eq!("SEQ".parse::<RobotMode>().unwrap(), RobotMode::Seq);
        assert_eq!("INT".parse::<RobotMode>().unwrap(), RobotMode::Int);
        assert_eq!(RobotMode::Seq.as_str(), "SEQ");
        assert!("seq".parse::<RobotMode>().is_err());
    }

    #[test]
    fn round3_strips_conversion_noise() {
        assert_eq!(round3(29.999999999999996), 30.0);
        assert_eq!(round3(-0.0004), -0.0);
        assert_eq!(round3(1.23456), 1.235);
    }
}
