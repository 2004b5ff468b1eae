// Dead reckoning from commanded wheel speeds
// Inverse of the displacement kinematics: wheel speeds held for dt -> body motion.

use std::f32::consts::{PI, SQRT_2};

use super::kinematics::{SLIP_CORRECTION, TURN_RADIUS, WHEEL_RADIUS};
use crate::messages::BasePose;

/// Body-frame motion over one interval
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BaseDelta {
    pub dx: f32,
    pub dy: f32,
    pub dtheta: f32,
}

/// Body motion produced by holding `velocities` (deg/s, [fl, fr, rl, rr]) for `dt` seconds.
///
/// Anything other than four wheels gives a zero delta.
pub fn odometry_delta(velocities: &[f32], dt: f32) -> BaseDelta {
    let [fl, fr, rl, rr] = match velocities {
        &[fl, fr, rl, rr] => [fl, fr, rl, rr],
        _ => return BaseDelta::default(),
    };

    // Undo the right-side inversion applied on the wire
    let wheels = [fl, -fr, rl, -rr];

    let vx = 0.25 * SQRT_2 * 0.5 * (wheels[0] + wheels[1] + wheels[2] + wheels[3]);
    let vy = 0.25 * SQRT_2 * 0.5 * (-wheels[0] + wheels[1] + wheels[2] - wheels[3]);

    // Common-mode speed spins the base; translation cancels out of the mean
    let spin = -(fl + fr + rl + rr) * 0.25;

    let to_meters = PI / 180.0 * WHEEL_RADIUS * dt;
    BaseDelta {
        dx: vx * to_meters * SLIP_CORRECTION,
        dy: vy * to_meters * SLIP_CORRECTION,
        dtheta: spin * to_meters / TURN_RADIUS,
    }
}

/// Apply a body-frame delta to a world-frame pose
pub fn integrate(pose: &BasePose, delta: &BaseDelta) -> BasePose {
    let (sin_t, cos_t) = pose.theta.sin_cos();
    let dx = f64::from(delta.dx);
    let dy = f64::from(delta.dy);
    BasePose {
        x: pose.x + dx * cos_t - dy * sin_t,
        y: pose.y + dx * sin_t + dy * cos_t,
        theta: pose.theta + f64::from(delta.dtheta),
    }
}
