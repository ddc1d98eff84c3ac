use nalgebra::{Isometry3, Matrix6, Translation3, UnitQuaternion, Vector3, Vector6};

use super::{JointChain, JointParameter};
use crate::{round3, ArmError, Pose};

/// Tuning knobs for the damped least-squares inverse solver.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// Iteration cap per seed before the attempt is abandoned.
    pub max_iterations: usize,
    /// Convergence bound on the 6-DoF pose error norm (meters + radians).
    /// The default is sized above the 3-decimal boundary rounding, so a
    /// target read back from the controller or produced by forward
    /// kinematics is still solvable.
    pub tolerance: f64,
    /// Finite-difference step for the numeric Jacobian, radians.
    pub jacobian_step: f64,
    /// Initial Levenberg-Marquardt damping factor.
    pub initial_damping: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-3,
            jacobian_step: 1e-6,
            initial_damping: 1e-3,
        }
    }
}

const MIN_DAMPING: f64 = 1e-9;
const MAX_DAMPING: f64 = 1e9;

/// Fractional positions inside each limit interval tried as restart seeds
/// after the limit midpoints, when the caller's seed stalls. Deterministic on
/// purpose: the same request always produces the same answer.
const RESTART_FRACTIONS: [f64; 3] = [0.25, 0.75, 0.9];

/// Stateless forward/inverse kinematics over one six-joint chain.
///
/// Forward kinematics composes one homogeneous transform per joint in chain
/// order: rotate about the local z-axis by `theta_offset + q`, translate `d`
/// along z, translate `a` along x, rotate `alpha` about x. Inverse
/// kinematics runs damped least-squares iteration with per-step limit
/// clamping; there is no closed form for this geometry.
#[derive(Debug, Clone)]
pub struct KinematicsEngine {
    chain: JointChain,
    options: SolverOptions,
}

impl KinematicsEngine {
    pub fn new(chain: JointChain) -> Self {
        Self { chain, options: SolverOptions::default() }
    }

    pub fn with_options(chain: JointChain, options: SolverOptions) -> Self {
        Self { chain, options }
    }

    pub fn chain(&self) -> &JointChain {
        &self.chain
    }

    /// End-effector transform for joint variables in radians. Deterministic
    /// and non-iterative.
    pub fn forward(&self, q: &[f64; 6]) -> Isometry3<f64> {
        self.chain
            .joints()
            .iter()
            .zip(q)
            .fold(Isometry3::identity(), |acc, (joint, &qi)| {
                acc * joint_transform(joint, qi)
            })
    }

    /// Tool pose for joint angles in degrees. Output coordinates and angles
    /// are rounded to 3 decimals, the same precision the wire carries.
    pub fn forward_pose(&self, q_deg: &[f64; 6]) -> Pose {
        let q = to_radians(q_deg);
        pose_from_isometry(&self.forward(&q))
    }

    /// Solves for joint angles (degrees) reaching `pose`, starting from
    /// `seed_deg` (typically the last commanded configuration) and falling
    /// back to deterministic restart seeds. Every returned angle lies within
    /// its configured limit interval. Fails with [`ArmError::Kinematics`]
    /// when no seed converges; it never returns a best-effort configuration.
    pub fn inverse(&self, pose: &Pose, seed_deg: Option<&[f64; 6]>) -> Result<[f64; 6], ArmError> {
        let target = isometry_from_pose(pose);

        let mut seeds: Vec<[f64; 6]> = Vec::with_capacity(3 + RESTART_FRACTIONS.len());
        if let Some(seed) = seed_deg {
            seeds.push(to_radians(seed));
        }
        seeds.push([0.0; 6]); // home
        seeds.push(self.chain.midpoint());
        for frac in RESTART_FRACTIONS {
            let mut q = [0.0; 6];
            for (qi, joint) in q.iter_mut().zip(self.chain.joints()) {
                *qi = joint.lower_limit + frac * (joint.upper_limit - joint.lower_limit);
            }
            seeds.push(q);
        }

        for seed in seeds {
            if let Some(q) = self.solve_from(&target, seed) {
                let mut out = to_degrees(&q).map(round3);
                // Rounding may nudge a value at a limit just past it.
                for (qi, joint) in out.iter_mut().zip(self.chain.joints()) {
                    *qi = qi.clamp(joint.lower_limit.to_degrees(), joint.upper_limit.to_degrees());
                }
                return Ok(out);
            }
        }
        Err(ArmError::Kinematics(
            "no convergent solution within joint limits".into(),
        ))
    }

    /// One damped least-squares descent from `q`. Returns the converged
    /// configuration (radians, within limits) or `None` when the iteration
    /// cap is reached or damping explodes, which happens when limit clamping
    /// pins the chain short of the target.
    fn solve_from(&self, target: &Isometry3<f64>, mut q: [f64; 6]) -> Option<[f64; 6]> {
        self.chain.clamp(&mut q);
        let mut err = pose_error(target, &self.forward(&q));
        let mut damping = self.options.initial_damping;

        for _ in 0..self.options.max_iterations {
            if err.norm() < self.options.tolerance {
                return Some(q);
            }

            let jac = self.jacobian(&q, &err, target);
            let jt = jac.transpose();
            let normal = jt * jac + Matrix6::identity() * (damping * damping);
            let Some(step) = normal.lu().solve(&(jt * err)) else {
                damping *= 4.0;
                if damping > MAX_DAMPING {
                    return None;
                }
                continue;
            };

            let mut q_next = q;
            for (qi, si) in q_next.iter_mut().zip(step.iter()) {
                *qi += si;
            }
            self.chain.clamp(&mut q_next);
            let err_next = pose_error(target, &self.forward(&q_next));

            if err_next.norm() < err.norm() {
                q = q_next;
                err = err_next;
                damping = (damping * 0.5).max(MIN_DAMPING);
            } else {
                damping *= 4.0;
                if damping > MAX_DAMPING {
                    return None;
                }
            }
        }
        (err.norm() < self.options.tolerance).then_some(q)
    }

    /// Forward-difference approximation of the 6x6 manipulator Jacobian.
    fn jacobian(&self, q: &[f64; 6], base_err: &Vector6<f64>, target: &Isometry3<f64>) -> Matrix6<f64> {
        let h = self.options.jacobian_step;
        let mut jac = Matrix6::zeros();
        for i in 0..JointChain::DOF {
            let mut q_probe = *q;
            q_probe[i] += h;
            let err_probe = pose_error(target, &self.forward(&q_probe));
            jac.set_column(i, &((base_err - err_probe) / h));
        }
        jac
    }
}

fn joint_transform(joint: &JointParameter, q: f64) -> Isometry3<f64> {
    let rz = Isometry3::rotation(Vector3::z() * (joint.theta_offset + q));
    // Tz(d) * Tx(a) * Rx(alpha) collapses to one translate-then-rotate step.
    let link = Isometry3::new(Vector3::new(joint.a, 0.0, joint.d), Vector3::x() * joint.alpha);
    rz * link
}

/// Position delta plus orientation delta (as a rotation vector) between the
/// target and the current transform.
fn pose_error(target: &Isometry3<f64>, current: &Isometry3<f64>) -> Vector6<f64> {
    let dp = target.translation.vector - current.translation.vector;
    let dr = (target.rotation * current.rotation.inverse()).scaled_axis();
    Vector6::new(dp.x, dp.y, dp.z, dr.x, dr.y, dr.z)
}

fn isometry_from_pose(pose: &Pose) -> Isometry3<f64> {
    let rotation = UnitQuaternion::from_euler_angles(
        pose.roll.to_radians(),
        pose.pitch.to_radians(),
        pose.yaw.to_radians(),
    );
    Isometry3::from_parts(Translation3::new(pose.x, pose.y, pose.z), rotation)
}

fn pose_from_isometry(iso: &Isometry3<f64>) -> Pose {
    let (roll, pitch, yaw) = iso.rotation.euler_angles();
    Pose {
        x: round3(iso.translation.x),
        y: round3(iso.translation.y),
        z: round3(iso.translation.z),
        roll: round3(roll.to_degrees()),
        pitch: round3(pitch.to_degrees()),
        yaw: round3(yaw.to_degrees()),
    }
}

fn to_radians(q_deg: &[f64; 6]) -> [f64; 6] {
    q_deg.map(f64::to_radians)
}

fn to_degrees(q_rad: &[f64; 6]) -> [f64; 6] {
    q_rad.map(f64::to_degrees)
}
