use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{json, Value};

use crate::{round3, Pose, RobotMode};

/// One request to the controller. Each variant carries strongly-typed fields
/// and serializes to the controller's positional-array shape:
/// `{"command": <name>, "data": [..]}`, with `data` omitted for commands that
/// take no arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `set_joint_initialize`: drive every joint back to its zero mark.
    Initialize,
    /// `set_joint_angle`: move one joint. Joint index is 1-based, speed is a
    /// percentage, angle in degrees.
    SetJointAngle { joint: u8, speed: u8, angle: f64 },
    /// `set_joint_angle_all_time`: coordinated move of all six joints at a
    /// shared speed percentage.
    SetJointAngleAllTime { speed: u8, angles: [f64; 6] },
    /// `set_joint_angle_all`: coordinated move at the controller's default
    /// speed.
    SetJointAngleAll { angles: [f64; 6] },
    /// `set_joint_stop`: halt the current motion.
    Stop,
    /// `set_joint_emergency_stop`: hard stop, drops the motion queue.
    EmergencyStop,
    /// `set_end_tool`: energize or release the end-of-arm tool. The firmware
    /// takes a single flag here; tool selection is a controller-side setting.
    SetEndTool { enable: bool },
    /// `set_robot_io_interface`: switch one of the four IO ports.
    SetIo { io: u8, status: bool },
    /// `set_time_delay`: insert a pause between queued commands. Only
    /// meaningful in SEQ mode.
    SetTimeDelay { millis: u32 },
    /// `set_robot_mode`: switch between SEQ and INT execution.
    SetMode { mode: RobotMode },
    /// `set_coordinate`: Cartesian move resolved by the controller.
    SetCoordinate { speed: u8, pose: Pose },
    /// `set_coordinate_teach`: record the given pose as a teach point.
    SetCoordinateTeach { pose: Pose },
    /// `get_joint_angle_all`: read back all six joint angles in degrees.
    GetJointAngleAll,
    /// `get_robot_mode`: read the current execution mode.
    GetMode,
    /// `get_coordinate`: read the current end-effector pose.
    GetCoordinate,
}

impl Command {
    /// Wire name of the command; also what the controller echoes back, and
    /// therefore the correlation key.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Initialize => "set_joint_initialize",
            Command::SetJointAngle { .. } => "set_joint_angle",
            Command::SetJointAngleAllTime { .. } => "set_joint_angle_all_time",
            Command::SetJointAngleAll { .. } => "set_joint_angle_all",
            Command::Stop => "set_joint_stop",
            Command::EmergencyStop => "set_joint_emergency_stop",
            Command::SetEndTool { .. } => "set_end_tool",
            Command::SetIo { .. } => "set_robot_io_interface",
            Command::SetTimeDelay { .. } => "set_time_delay",
            Command::SetMode { .. } => "set_robot_mode",
            Command::SetCoordinate { .. } => "set_coordinate",
            Command::SetCoordinateTeach { .. } => "set_coordinate_teach",
            Command::GetJointAngleAll => "get_joint_angle_all",
            Command::GetMode => "get_robot_mode",
            Command::GetCoordinate => "get_coordinate",
        }
    }

    /// Positional payload, or `None` for commands sent without a `data` key.
    /// Angles and coordinates are rounded to 3 decimals before they hit the
    /// wire.
    pub fn data(&self) -> Option<Vec<Value>> {
        fn angles_json(angles: &[f64; 6]) -> impl Iterator<Item = Value> + '_ {
            angles.iter().map(|a| json!(round3(*a)))
        }

        match self {
            Command::Initialize => Some(vec![json!(0)]),
            Command::SetJointAngle { joint, speed, angle } => {
                Some(vec![json!(joint), json!(speed), json!(round3(*angle))])
            }
            Command::SetJointAngleAllTime { speed, angles } => {
                let mut data = vec![json!(speed)];
                data.extend(angles_json(angles));
                Some(data)
            }
            Command::SetJointAngleAll { angles } => Some(angles_json(angles).collect()),
            Command::Stop | Command::EmergencyStop => None,
            Command::SetEndTool { enable } => Some(vec![json!(enable)]),
            Command::SetIo { io, status } => Some(vec![json!(io), json!(status)]),
            Command::SetTimeDelay { millis } => Some(vec![json!(millis)]),
            Command::SetMode { mode } => Some(vec![json!(mode.as_str())]),
            Command::SetCoordinate { speed, pose } => {
                let mut data = vec![json!(speed)];
                data.extend(pose.to_array().iter().map(|v| json!(round3(*v))));
                Some(data)
            }
            Command::SetCoordinateTeach { pose } => {
                Some(pose.to_array().iter().map(|v| json!(round3(*v))).collect())
            }
            Command::GetJointAngleAll | Command::GetMode | Command::GetCoordinate => None,
        }
    }
}

impl Serialize for Command {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.data();
        let mut map = serializer.serialize_map(Some(if data.is_some() { 2 } else { 1 }))?;
        map.serialize_entry("command", self.name())?;
        if let Some(data) = data {
            map.serialize_entry("data", &data)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_angle_all_time_payload_is_speed_then_angles() {
        let cmd = Command::SetJointAngleAllTime {
            speed: 50,
            angles: [10.0, 20.0, 30.0, 40.0, 50.0, 60.0],
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(
            json,
            r#"{"command":"set_joint_angle_all_time","data":[50,10.0,20.0,30.0,40.0,50.0,60.0]}"#
        );
    }

    #[test]
    fn getters_omit_the_data_key() {
        let json = serde_json::to_string(&Command::GetJointAngleAll).unwrap();
        assert_eq!(json, r#"{"command":"get_joint_angle_all"}"#);
        let value: Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("data").is_none());
    }

    #[test]
    fn angles_are_rounded_to_three_decimals() {
        let cmd = Command::SetJointAngle {
            joint: 1,
            speed: 90,
            angle: 29.999999999999996,
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["data"][2], json!(30.0));
    }

    #[test]
    fn mode_serializes_as_wire_string() {
        let value = serde_json::to_value(Command::SetMode { mode: RobotMode::Int }).unwrap();
        assert_eq!(value["command"], "set_robot_mode");
        assert_eq!(value["data"][0], "INT");
    }

    #[test]
    fn io_payload_is_port_then_state() {
        let value = serde_json::to_value(Command::SetIo { io: 2, status: true }).unwrap();
        assert_eq!(value["data"], json!([2, true]));
    }
}
