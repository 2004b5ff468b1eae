// Wheel-base motion for the Aero omni-wheel base
//
// Provides:
// - Omni-wheel kinematics (displacement / twist -> wheel speeds + time)
// - Motion selection between translate, rotate and drift
// - Dead reckoning from commanded wheel speeds

pub mod kinematics;
pub mod odometry;

pub use kinematics::{
    KinematicsError, WheelVelocities, ZERO_MOTION, drift, rotate, translate, velocity_to_wheel,
};
pub use odometry::{BaseDelta, integrate, odometry_delta};

use tracing::warn;

use crate::messages::WheelCommand;

/// Pick the wheel command for a robot-frame displacement.
///
/// Returns `None` for zero motion so callers skip publishing entirely.
pub fn plan_motion(x: f32, y: f32, theta: f32) -> Option<WheelCommand> {
    if theta.abs() < ZERO_MOTION {
        if x.abs() < ZERO_MOTION && y.abs() < ZERO_MOTION {
            return None;
        }
        return Some(translate(x, y));
    }

    if x.abs() < ZERO_MOTION {
        return Some(rotate(theta));
    }

    // Drift only moves along x; lateral intent is dropped
    if y.abs() >= ZERO_MOTION {
        warn!("Drift ignores lateral component y={}", y);
    }
    match drift(x, theta) {
        Ok(cmd) => Some(cmd),
        Err(e) => {
            warn!("{}, holding the base", e);
            Some(WheelCommand::stopped())
        }
    }
}
