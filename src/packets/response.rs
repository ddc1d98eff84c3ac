use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ArmError, Pose, RobotMode};

/// One decoded frame from the controller. Depending on firmware revision the
/// echoed name arrives under either the `command` or the `return` key; the
/// alias accepts both.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    #[serde(alias = "return")]
    pub command: String,
    #[serde(default)]
    pub data: Value,
}

/// Result of one completed operation: the echoed command name plus whatever
/// the controller attached to it. Setters report `"true"`/`"false"`, getters
/// carry their value in `data`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Reply {
    pub command: String,
    pub data: Value,
}

impl Reply {
    pub fn from_frame(frame: ResponseFrame) -> Self {
        Self { command: frame.command, data: frame.data }
    }

    /// Whether the controller reported success. Setters answer with the
    /// strings `"true"`/`"false"`; anything else (getter payloads) counts as
    /// success because the controller only echoes data it accepted.
    pub fn succeeded(&self) -> bool {
        match &self.data {
            Value::String(s) => s != "false",
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    /// Decodes the payload of `get_joint_angle_all`: six angles in degrees.
    pub fn angles(&self) -> Result<[f64; 6], ArmError> {
        let values = self.numbers()?;
        let angles: [f64; 6] = values.try_into().map_err(|v: Vec<f64>| {
            ArmError::Protocol(format!(
                "`{}` returned {} joint values, expected 6",
                self.command,
                v.len()
            ))
        })?;
        Ok(angles)
    }

    /// Decodes the payload of `get_coordinate`: `[x, y, z, roll, pitch, yaw]`.
    pub fn pose(&self) -> Result<Pose, ArmError> {
        Ok(Pose::from_array(self.angles()?))
    }

    /// Decodes the payload of `get_robot_mode`.
    pub fn mode(&self) -> Result<RobotMode, ArmError> {
        let s = self.data.as_str().ok_or_else(|| {
            ArmError::Protocol(format!("`{}` returned a non-string mode: {}", self.command, self.data))
        })?;
        s.parse()
            .map_err(|_| ArmError::Protocol(format!("`{}` returned unknown mode `{s}`", self.command)))
    }

    fn numbers(&self) -> Result<Vec<f64>, ArmError> {
        let array = self.data.as_array().ok_or_else(|| {
            ArmError::Protocol(format!("`{}` returned non-array data: {}", self.command, self.data))
        })?;
        array
            .iter()
            .map(|v| {
                v.as_f64().ok_or_else(|| {
                    ArmError::Protocol(format!("`{}` returned non-numeric value: {v}", self.command))
                })
            })
            .collect()
    }
}
