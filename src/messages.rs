// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::trajectory::GoalStatus;

// Velocity command from teleop/scripts -> runtime
// Robot frame: x forward (m/s), y left (m/s), theta counter-clockwise (rad/s)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct BaseTwist {
    pub x_vel: f32,
    pub y_vel: f32,
    pub theta_vel: f32,
}

// Displacement command from navigation -> runtime
// Robot frame: x, y in meters, theta in radians
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct BaseMove {
    pub x: f32,
    pub y: f32,
    pub theta: f32,
}

/// Wheel actuation from runtime -> wheel controllers
///
/// Wheel order is front-left, front-right, rear-left, rear-right.
/// Velocities are in deg/s, duration in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct WheelCommand {
    pub velocities: [f32; 4],
    pub duration: f32,
}

impl WheelCommand {
    pub fn new(velocities: [f32; 4], duration: f32) -> Self {
        Self {
            velocities,
            duration,
        }
    }

    /// All wheels at rest, zero duration
    pub fn stopped() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.velocities.iter().all(|v| *v == 0.0)
    }
}

/// Dead-reckoned base pose published by the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct BasePose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    Moving,
    CmdStale,
}

/// One trajectory waypoint, positions index-aligned to the goal's joint names
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryPoint {
    pub positions: Vec<f64>,
    pub time_from_start: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JointTolerance {
    pub name: String,
    pub position: f64,
    pub velocity: f64,
}

/// Trajectory goal sent to a controller endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryGoal {
    /// Unix time in milliseconds; 0 starts on receipt
    pub stamp_ms: u64,
    pub joint_names: Vec<String>,
    pub points: Vec<TrajectoryPoint>,
    #[serde(default)]
    pub path_tolerance: Vec<JointTolerance>,
    #[serde(default)]
    pub goal_tolerance: Vec<JointTolerance>,
    pub goal_time_tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalRequest {
    pub goal_id: u64,
    pub goal: TrajectoryGoal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelRequest {
    /// Cancel everything up to and including this goal
    pub goal_id: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GoalResult {
    pub goal_id: u64,
    pub status: GoalStatus,
}

/// State snapshot emitted by a trajectory controller
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ControllerState {
    pub joint_names: Vec<String>,
    pub desired: Vec<f64>,
    pub actual: Vec<f64>,
}

/// Whole-body joint state; arrays may be partial (shorter than `name`)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct JointStateMsg {
    pub stamp_ms: u64,
    pub name: Vec<String>,
    #[serde(default)]
    pub position: Vec<f64>,
    #[serde(default)]
    pub velocity: Vec<f64>,
    #[serde(default)]
    pub effort: Vec<f64>,
}

/// Whole-robot angle vector command, index-aligned to the coordinator's joint list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AngleVectorCommand {
    pub positions: Vec<f64>,
    pub duration: f64,
    /// Channel names, a group name, or absent for every channel
    #[serde(default)]
    pub target: Option<Vec<String>>,
}
