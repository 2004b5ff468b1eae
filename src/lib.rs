// Motion-control layer for the Aero humanoid base and upper body.
//
// Provides:
// - Omni-wheel base kinematics (displacement / twist -> wheel speeds + time)
// - Trajectory channels and a multi-channel coordinator for joint groups
// - A zenoh runtime tying both to the robot's pub/sub topics

pub mod base;
pub mod clock;
pub mod config;
pub mod error;
pub mod messages;
pub mod runtime;
pub mod trajectory;

pub use error::{MotionError, Result};
