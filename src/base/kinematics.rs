// Omni-wheel kinematics for the Aero 4-wheel base
// Converts planar motion intents into per-wheel speeds (deg/s) and an execution time.
//
// Wheel order everywhere is [front-left, front-right, rear-left, rear-right].
// The rollers sit at 45° to each wheel, so the front-left/rear-right pair and the
// front-right/rear-left pair share a velocity profile.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI, SQRT_2};
use tracing::error;

use crate::messages::{BaseTwist, WheelCommand};

/// Wheel radius in meters
pub const WHEEL_RADIUS: f32 = 0.076;
/// Effective wheelbase radius for an in-place spin, meters
pub const TURN_RADIUS: f32 = 0.2974535;
/// Wheel speed used for displacement commands, deg/s
pub const MAX_VELOCITY: f32 = 90.0;

/// Mixing coefficients for the twist -> wheel transform
const K_THETA: f32 = -5.54420;
const K_V: f32 = 13.1579;

/// Empirical slip correction applied to translation time
pub(crate) const SLIP_CORRECTION: f32 = 1.4;

/// Magnitudes below this select a different command variant
pub const ZERO_MOTION: f32 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum KinematicsError {
    #[error("Degenerate drift (x={x}, theta={theta}): derived time is zero")]
    DegenerateDrift { x: f32, theta: f32 },
}

/// Integer wheel speeds (deg/s) produced by the twist transform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelVelocities {
    pub front_left: i16,
    pub front_right: i16,
    pub rear_left: i16,
    pub rear_right: i16,
}

impl WheelVelocities {
    pub fn new(front_left: i16, front_right: i16, rear_left: i16, rear_right: i16) -> Self {
        Self {
            front_left,
            front_right,
            rear_left,
            rear_right,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns velocities as array [fl, fr, rl, rr]
    pub fn as_array(&self) -> [i16; 4] {
        [
            self.front_left,
            self.front_right,
            self.rear_left,
            self.rear_right,
        ]
    }

    /// Hold these speeds for `duration` seconds
    pub fn to_command(&self, duration: f32) -> WheelCommand {
        WheelCommand::new(self.as_array().map(f32::from), duration)
    }
}

/// Speed profile of the front-left / rear-right wheels
fn diagonal_a_speed(x: f32, y: f32) -> f32 {
    if x > 0.0 && y > 0.0 {
        let theta = (y / x).atan();
        MAX_VELOCITY * 4.0 / PI * (FRAC_PI_4 - theta)
    } else if y >= 0.0 && x <= 0.0 {
        -MAX_VELOCITY
    } else if y <= 0.0 && x >= 0.0 {
        MAX_VELOCITY
    } else {
        let theta = (y / x).atan() - PI;
        MAX_VELOCITY * 4.0 / PI * (theta + 0.75 * PI)
    }
}

/// Speed profile of the front-right / rear-left wheels
fn diagonal_b_speed(x: f32, y: f32) -> f32 {
    if x >= 0.0 && y >= 0.0 {
        MAX_VELOCITY
    } else if y > 0.0 && x < 0.0 {
        // Direction angle in the second quadrant
        let theta = PI + (y / x).atan();
        MAX_VELOCITY * 4.0 / PI * (0.75 * PI - theta)
    } else if y < 0.0 && x > 0.0 {
        let theta = (y / x).atan();
        MAX_VELOCITY * 4.0 / PI * (theta + FRAC_PI_4)
    } else {
        -MAX_VELOCITY
    }
}

/// Straight-line translation by (x, y) meters without turning.
///
/// Zero displacement yields a stopped command; callers are expected to
/// treat zero motion as a no-op before getting here.
pub fn translate(x: f32, y: f32) -> WheelCommand {
    let a = diagonal_a_speed(x, y);
    let b = diagonal_b_speed(x, y);
    let velocities = [a, b, b, a];

    // Each wheel pushes along its 45° roller axis: v/sqrt(2) of body speed,
    // split again by 1/sqrt(2) into X and Y, averaged over four wheels.
    let vx = 0.25 * SQRT_2 * 0.5 * (velocities[0] + velocities[1] + velocities[2] + velocities[3]);
    let vy = 0.25 * SQRT_2 * 0.5 * (-velocities[0] + velocities[1] + velocities[2] - velocities[3]);

    let distance = (x * x + y * y).sqrt(); // m
    let velocity_radian = (vx * vx + vy * vy).sqrt() * PI / 180.0; // deg/s -> rad/s
    let wheel_travel = velocity_radian * WHEEL_RADIUS; // m/s

    if distance < ZERO_MOTION || wheel_travel < f32::EPSILON {
        return WheelCommand::stopped();
    }

    // Positive signal moves the robot forward
    WheelCommand::new(
        [velocities[0], -velocities[1], velocities[2], -velocities[3]],
        distance / wheel_travel / SLIP_CORRECTION,
    )
}

/// In-place rotation by `theta` radians (counter-clockwise positive)
pub fn rotate(theta: f32) -> WheelCommand {
    let speed = if theta >= 0.0 {
        -MAX_VELOCITY
    } else {
        MAX_VELOCITY
    };

    let velocity_radian = MAX_VELOCITY * PI / 180.0; // deg/s -> rad/s
    let wheel_travel = WHEEL_RADIUS * velocity_radian; // m/s
    let turn_distance = TURN_RADIUS * theta.abs(); // m

    WheelCommand::new([speed; 4], turn_distance / wheel_travel)
}

/// Forward motion by `x` meters while turning by `theta` radians.
///
/// |theta| is clamped to 90°. Drift turns at half the rate of `rotate`.
pub fn drift(x: f32, theta: f32) -> Result<WheelCommand, KinematicsError> {
    let distance = x.abs();
    let turn = theta.abs().min(FRAC_PI_2);

    // Time from the x integral (V*cos(theta) over a constant-curvature arc,
    // which scales with sin(theta)/theta) equals time from the theta integral.
    // Eliminating v_theta from the two leaves:
    let time = turn * 600.0 / (PI * WHEEL_RADIUS * MAX_VELOCITY)
        * (distance / turn.sin() + SQRT_2 * TURN_RADIUS);
    if time == 0.0 || !time.is_finite() {
        error!("Drift derived time {} for x={}, theta={}", time, x, theta);
        return Err(KinematicsError::DegenerateDrift { x, theta });
    }

    // One side runs at V, the other at V - v_theta. The difference turns the
    // robot at v_theta/2 per side.
    let v_theta = 2.0 * turn * SQRT_2 * TURN_RADIUS / (WHEEL_RADIUS * time * PI) * 300.0;
    // Inner-side command, backward positive
    let v_turn = v_theta - MAX_VELOCITY;
    let m = MAX_VELOCITY;

    let velocities = if theta >= 0.0 {
        if x >= 0.0 {
            [-v_turn, -m, -v_turn, -m]
        } else {
            [-m, -v_turn, -m, -v_turn]
        }
    } else if x <= 0.0 {
        [v_turn, m, v_turn, m]
    } else {
        [m, v_turn, m, v_turn]
    };

    Ok(WheelCommand::new(velocities, time))
}

/// Convert a robot-frame twist to integer wheel speeds (deg/s)
///
/// # Arguments
/// * `twist.x_vel` - Forward velocity in m/s
/// * `twist.y_vel` - Lateral velocity in m/s (positive = left)
/// * `twist.theta_vel` - Rotational velocity in rad/s
pub fn velocity_to_wheel(twist: &BaseTwist) -> WheelVelocities {
    // Heading in local coordinates is always zero
    let (sin_h, cos_h) = 0.0f32.sin_cos();

    // Vehicle axes are swapped relative to the command frame
    let dy = twist.x_vel * cos_h - twist.y_vel * sin_h;
    let dx = twist.x_vel * sin_h + twist.y_vel * cos_h;
    let dtheta = twist.theta_vel;

    let v1 = K_THETA * dtheta + K_V * ((-cos_h + sin_h) * dx + (-cos_h - sin_h) * dy);
    let v2 = K_THETA * dtheta + K_V * ((-cos_h - sin_h) * dx + (cos_h - sin_h) * dy);
    let v3 = K_THETA * dtheta + K_V * ((cos_h - sin_h) * dx + (cos_h + sin_h) * dy);
    let v4 = K_THETA * dtheta + K_V * ((cos_h + sin_h) * dx + (-cos_h + sin_h) * dy);

    // rad/s -> deg/s, truncated
    WheelVelocities {
        front_left: v2.to_degrees() as i16,
        front_right: v1.to_degrees() as i16,
        rear_left: v3.to_degrees() as i16,
        rear_right: v4.to_degrees() as i16,
    }
}
