use crate::ArmError;

/// Modified Denavit-Hartenberg description of one revolute joint: link twist
/// `alpha`, link length `a`, link offset `d`, construction angle
/// `theta_offset`, and the travel limits on the joint variable. Angles in
/// radians, lengths in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointParameter {
    pub alpha: f64,
    pub a: f64,
    pub d: f64,
    pub theta_offset: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
}

/// Ordered geometry of the six-joint chain, base to wrist.
#[derive(Debug, Clone, PartialEq)]
pub struct JointChain {
    joints: [JointParameter; 6],
}

impl JointChain {
    pub const DOF: usize = 6;

    /// Builds a chain from externally supplied geometry records. Fails unless
    /// there are exactly six and every limit interval is ordered.
    pub fn new(joints: Vec<JointParameter>) -> Result<Self, ArmError> {
        let joints: [JointParameter; Self::DOF] =
            joints.try_into().map_err(|v: Vec<JointParameter>| {
                ArmError::Validation(format!(
                    "expected {} joint records, got {}",
                    Self::DOF,
                    v.len()
                ))
            })?;
        for (i, joint) in joints.iter().enumerate() {
            if joint.lower_limit > joint.upper_limit {
                return Err(ArmError::Validation(format!(
                    "joint {} limits inverted: [{}, {}]",
                    i + 1,
                    joint.lower_limit,
                    joint.upper_limit
                )));
            }
        }
        Ok(Self { joints })
    }

    pub fn joints(&self) -> &[JointParameter; 6] {
        &self.joints
    }

    /// Clamps every joint variable into its limit interval, in place.
    pub fn clamp(&self, q: &mut [f64; 6]) {
        for (qi, joint) in q.iter_mut().zip(&self.joints) {
            *qi = qi.clamp(joint.lower_limit, joint.upper_limit);
        }
    }

    pub fn contains(&self, q: &[f64; 6]) -> bool {
        q.iter()
            .zip(&self.joints)
            .all(|(qi, joint)| (joint.lower_limit..=joint.upper_limit).contains(qi))
    }

    /// Center of every limit interval; the first restart seed the inverse
    /// solver tries after home.
    pub fn midpoint(&self) -> [f64; 6] {
        let mut q = [0.0; 6];
        for (qi, joint) in q.iter_mut().zip(&self.joints) {
            *qi = (joint.lower_limit + joint.upper_limit) / 2.0;
        }
        q
    }
}

/// Factory geometry of the desktop arm this crate ships against.
impl Default for JointChain {
    fn default() -> Self {
        use std::f64::consts::FRAC_PI_2;
        let deg = f64::to_radians;
        Self {
            joints: [
                JointParameter {
                    alpha: 0.0,
                    a: 0.0,
                    d: 0.1535,
                    theta_offset: 0.0,
                    lower_limit: deg(-140.0),
                    upper_limit: deg(140.0),
                },
                JointParameter {
                    alpha: -FRAC_PI_2,
                    a: 0.024,
                    d: 0.0,
                    theta_offset: -FRAC_PI_2,
                    lower_limit: deg(-70.0),
                    upper_limit: deg(70.0),
                },
                JointParameter {
                    alpha: 0.0,
                    a: 0.16072,
                    d: 0.0,
                    theta_offset: 0.0,
                    lower_limit: deg(-60.0),
                    upper_limit: deg(45.0),
                },
                JointParameter {
                    alpha: -FRAC_PI_2,
                    a: 0.0,
                    d: 0.223,
                    theta_offset: 0.0,
                    lower_limit: deg(-150.0),
                    upper_limit: deg(150.0),
                },
                JointParameter {
                    alpha: FRAC_PI_2,
                    a: 0.0,
                    d: 0.0,
                    theta_offset: FRAC_PI_2,
                    lower_limit: deg(-180.0),
                    upper_limit: deg(40.0),
                },
                JointParameter {
                    alpha: FRAC_PI_2,
                    a: 0.0,
                    d: -0.10879,
                    theta_offset: 0.0,
                    lower_limit: deg(-180.0),
                    upper_limit: deg(180.0),
                },
            ],
        }
    }
}
