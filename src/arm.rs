use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::drivers::{ArmDriver, ArmDriverConfig};
use crate::kinematics::{JointChain, KinematicsEngine};
use crate::packets::{Command, Reply};
use crate::{ArmError, ConnectionState, JointAnglesDeg, Pose, RobotMode};

/// Public API for one six-axis arm. Builds commands, validates their
/// arguments before anything reaches the wire, drives the session driver,
/// and runs the kinematics engine for coordinate-based calls.
///
/// Every operation returns a [`Reply`] (echoed command name plus controller
/// payload) or a typed decode of it; expected failures come back as
/// [`ArmError`] variants.
#[derive(Debug, Clone)]
pub struct RobotArm {
    driver: ArmDriver,
    kinematics: KinematicsEngine,
    /// Last successfully commanded joint vector, degrees. Seeds the inverse
    /// solver so consecutive Cartesian moves stay on the same branch.
    last_commanded: Arc<Mutex<JointAnglesDeg>>,
}

impl RobotArm {
    /// Connects to the controller described by `config`, using `chain` as the
    /// arm geometry (supply [`JointChain::default`] for the factory arm).
    pub async fn connect(config: ArmDriverConfig, chain: JointChain) -> Result<Self, ArmError> {
        let driver = ArmDriver::connect(config).await?;
        Ok(Self {
            driver,
            kinematics: KinematicsEngine::new(chain),
            last_commanded: Arc::new(Mutex::new([0.0; 6])),
        })
    }

    pub fn driver(&self) -> &ArmDriver {
        &self.driver
    }

    pub fn kinematics(&self) -> &KinematicsEngine {
        &self.kinematics
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.driver.state().await
    }

    pub async fn shutdown(&self) {
        self.driver.shutdown().await;
    }

    /// Drives every joint back to its zero mark.
    pub async fn initialize(&self) -> Result<Reply, ArmError> {
        let reply = self.call(Command::Initialize).await?;
        if reply.succeeded() {
            *self.last_commanded.lock().await = [0.0; 6];
        }
        Ok(reply)
    }

    /// Moves a single joint (1-based index) to `angle` degrees.
    pub async fn set_joint_angle(&self, joint: u8, speed: u8, angle: f64) -> Result<Reply, ArmError> {
        if !(1..=6).contains(&joint) {
            return Err(ArmError::Validation(format!("joint index must be 1..=6, got {joint}")));
        }
        validate_speed(speed)?;
        self.validate_joint_angle(joint, angle)?;
        let reply = self.call(Command::SetJointAngle { joint, speed, angle }).await?;
        if reply.succeeded() {
            self.last_commanded.lock().await[usize::from(joint) - 1] = angle;
        }
        Ok(reply)
    }

    /// Coordinated move of all six joints at a shared speed percentage.
    pub async fn set_joint_angle_all_time(
        &self,
        speed: u8,
        angles: JointAnglesDeg,
    ) -> Result<Reply, ArmError> {
        validate_speed(speed)?;
        self.validate_angles(&angles)?;
        let reply = self.call(Command::SetJointAngleAllTime { speed, angles }).await?;
        if reply.succeeded() {
            *self.last_commanded.lock().await = angles;
        }
        Ok(reply)
    }

    /// Coordinated move at the controller's default speed.
    pub async fn set_joint_angle_all(&self, angles: JointAnglesDeg) -> Result<Reply, ArmError> {
        self.validate_angles(&angles)?;
        let reply = self.call(Command::SetJointAngleAll { angles }).await?;
        if reply.succeeded() {
            *self.last_commanded.lock().await = angles;
        }
        Ok(reply)
    }

    /// Halts the current motion. Goes out on the immediate path, ahead of
    /// anything still queued.
    pub async fn stop(&self) -> Result<Reply, ArmError> {
        info!("issuing stop");
        Ok(Reply::from_frame(self.driver.send_immediate(Command::Stop).await?))
    }

    /// Hard stop; the controller drops its motion queue. Immediate path.
    pub async fn emergency_stop(&self) -> Result<Reply, ArmError> {
        info!("issuing emergency stop");
        Ok(Reply::from_frame(self.driver.send_immediate(Command::EmergencyStop).await?))
    }

    /// Energizes or releases the end-of-arm tool.
    pub async fn set_end_tool(&self, enable: bool) -> Result<Reply, ArmError> {
        self.call(Command::SetEndTool { enable }).await
    }

    /// Switches one of the controller's IO ports (0..=3).
    pub async fn set_io(&self, io: u8, status: bool) -> Result<Reply, ArmError> {
        if io > 3 {
            return Err(ArmError::Validation(format!("io port must be 0..=3, got {io}")));
        }
        self.call(Command::SetIo { io, status }).await
    }

    /// Inserts a pause of `millis` (0..=3000) between queued commands. Only
    /// valid while the controller runs in SEQ mode; INT mode executes
    /// immediately and has no queue to delay.
    pub async fn set_time_delay(&self, millis: u32) -> Result<Reply, ArmError> {
        if millis > 3000 {
            return Err(ArmError::Validation(format!("delay must be 0..=3000 ms, got {millis}")));
        }
        let mode = self.driver.mode().await;
        if mode != RobotMode::Seq {
            return Err(ArmError::Validation(format!(
                "inter-command delay requires SEQ mode, controller is in {mode}"
            )));
        }
        self.call(Command::SetTimeDelay { millis }).await
    }

    /// Switches the controller between SEQ and INT execution.
    pub async fn set_robot_mode(&self, mode: RobotMode) -> Result<Reply, ArmError> {
        let reply = self.call(Command::SetMode { mode }).await?;
        if reply.succeeded() {
            self.driver.set_mode(mode).await;
        }
        Ok(reply)
    }

    /// Reads the controller's execution mode and re-syncs the local copy.
    pub async fn get_robot_mode(&self) -> Result<RobotMode, ArmError> {
        let reply = self.call(Command::GetMode).await?;
        let mode = reply.mode()?;
        self.driver.set_mode(mode).await;
        Ok(mode)
    }

    /// Cartesian move resolved by the controller's own solver.
    pub async fn set_coordinate(&self, speed: u8, pose: Pose) -> Result<Reply, ArmError> {
        validate_speed(speed)?;
        self.call(Command::SetCoordinate { speed, pose }).await
    }

    /// Records `pose` as a teach point on the controller.
    pub async fn set_coordinate_teach(&self, pose: Pose) -> Result<Reply, ArmError> {
        self.call(Command::SetCoordinateTeach { pose }).await
    }

    /// Reads all six joint angles, degrees.
    pub async fn get_joint_angle_all(&self) -> Result<JointAnglesDeg, ArmError> {
        self.call(Command::GetJointAngleAll).await?.angles()
    }

    /// Reads the current end-effector pose.
    pub async fn get_coordinate(&self) -> Result<Pose, ArmError> {
        self.call(Command::GetCoordinate).await?.pose()
    }

    /// Cartesian move resolved locally: inverse kinematics seeded with the
    /// last commanded configuration, then a coordinated joint move.
    pub async fn move_to_pose(&self, speed: u8, pose: &Pose) -> Result<Reply, ArmError> {
        validate_speed(speed)?;
        let seed = *self.last_commanded.lock().await;
        let angles = self.kinematics.inverse(pose, Some(&seed))?;
        self.set_joint_angle_all_time(speed, angles).await
    }

    /// Joint angles (degrees) to tool pose. Local computation, no wire
    /// traffic.
    pub fn forward_kinematics(&self, angles: &JointAnglesDeg) -> Pose {
        self.kinematics.forward_pose(angles)
    }

    /// Tool pose to joint angles (degrees). Local computation, no wire
    /// traffic.
    pub fn inverse_kinematics(
        &self,
        pose: &Pose,
        seed: Option<&JointAnglesDeg>,
    ) -> Result<JointAnglesDeg, ArmError> {
        self.kinematics.inverse(pose, seed)
    }

    async fn call(&self, command: Command) -> Result<Reply, ArmError> {
        Ok(Reply::from_frame(self.driver.call(command).await?))
    }

    fn validate_joint_angle(&self, joint: u8, angle: f64) -> Result<(), ArmError> {
        let record = &self.kinematics.chain().joints()[usize::from(joint) - 1];
        let (lower, upper) = (record.lower_limit.to_degrees(), record.upper_limit.to_degrees());
        if !(lower..=upper).contains(&angle) {
            return Err(ArmError::Validation(format!(
                "joint {joint} angle {angle} outside [{lower:.3}, {upper:.3}]"
            )));
        }
        Ok(())
    }

    fn validate_angles(&self, angles: &JointAnglesDeg) -> Result<(), ArmError> {
        for (i, angle) in angles.iter().enumerate() {
            self.validate_joint_angle(i as u8 + 1, *angle)?;
        }
        Ok(())
    }
}

fn validate_speed(speed: u8) -> Result<(), ArmError> {
    if !(1..=100).contains(&speed) {
        return Err(ArmError::Validation(format!(
            "speed percentage must be 1..=100, got {speed}"
        )));
    }
    Ok(())
}
