// Timeouts, topics, controller configuration
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::trajectory::EndpointDescriptor;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Velocity command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_VEL: &str = "aero/cmd/vel"; // twist commands
pub const TOPIC_CMD_MOVE: &str = "aero/cmd/move"; // displacement commands
pub const TOPIC_CMD_ANGLES: &str = "aero/cmd/angles"; // whole-robot angle vectors
pub const TOPIC_JOINT_STATES: &str = "aero/joint_states"; // whole-body feed
pub const TOPIC_RT_WHEELS: &str = "aero/rt/wheels"; // wheel actuation
pub const TOPIC_HEALTH: &str = "aero/state/health"; // health status
pub const TOPIC_ODOM: &str = "aero/state/odom"; // dead-reckoned pose

// How long a controller endpoint has to produce its first state
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// Slack the controller may take past the last waypoint
pub const GOAL_TIME_TOLERANCE: Duration = Duration::from_millis(500);

// Smallest wait handed to a channel once a shared deadline has passed.
// Zero means "no deadline", so it must never be passed on.
pub const MIN_WAIT_SLICE: Duration = Duration::from_micros(1);

// Wait used to probe for goals finishing between state pushes
pub const INTERPOLATION_PROBE: Duration = Duration::from_micros(10);

/// One joint-group controller as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerConfig {
    pub name: String,
    #[serde(default)]
    pub joints: Vec<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl ControllerConfig {
    /// Endpoint topics, defaulting to `<name>_controller/...`
    pub fn descriptor(&self) -> EndpointDescriptor {
        EndpointDescriptor {
            action: self
                .action
                .clone()
                .unwrap_or_else(|| format!("{}_controller/follow_joint_trajectory", self.name)),
            state: self
                .state
                .clone()
                .unwrap_or_else(|| format!("{}_controller/state", self.name)),
        }
    }
}

/// Robot configuration loaded at startup
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RobotConfig {
    #[serde(default)]
    pub controllers: Vec<ControllerConfig>,
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub goal_time_tolerance_s: Option<f64>,
    #[serde(default)]
    pub start_offset_s: Option<f64>,
    #[serde(default)]
    pub connect_timeout_s: Option<f64>,
}

impl RobotConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn goal_time_tolerance(&self) -> Result<Duration> {
        seconds_or(self.goal_time_tolerance_s, GOAL_TIME_TOLERANCE)
    }

    pub fn start_offset(&self) -> Result<Duration> {
        seconds_or(self.start_offset_s, Duration::ZERO)
    }

    pub fn connect_timeout(&self) -> Result<Duration> {
        seconds_or(self.connect_timeout_s, CONNECT_TIMEOUT)
    }
}

fn seconds_or(value: Option<f64>, default: Duration) -> Result<Duration> {
    match value {
        Some(secs) => Ok(Duration::try_from_secs_f64(secs)?),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MotionError;

    #[test]
    fn test_descriptor_defaults_follow_controller_name() {
        let cfg = ControllerConfig {
            name: "torso".into(),
            joints: vec!["waist_y_joint".into()],
            action: None,
            state: None,
        };
        let desc = cfg.descriptor();
        assert_eq!(desc.action, "torso_controller/follow_joint_trajectory");
        assert_eq!(desc.state, "torso_controller/state");
    }

    #[test]
    fn test_parse_config_with_groups_and_missing_joints() {
        let cfg = RobotConfig::from_json(
            r#"{
                "controllers": [
                    {"name": "torso", "joints": ["waist_y", "waist_p"]},
                    {"name": "head", "action": "aero/head/follow"}
                ],
                "groups": {"upper": ["torso", "head"]},
                "start_offset_s": 0.1
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.controllers.len(), 2);
        assert!(cfg.controllers[1].joints.is_empty());
        assert_eq!(cfg.controllers[1].descriptor().action, "aero/head/follow");
        assert_eq!(cfg.groups["upper"], vec!["torso", "head"]);
        assert_eq!(cfg.start_offset().unwrap(), Duration::from_millis(100));
        assert_eq!(cfg.connect_timeout().unwrap(), CONNECT_TIMEOUT);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let cfg = RobotConfig {
            goal_time_tolerance_s: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            cfg.goal_time_tolerance(),
            Err(MotionError::InvalidDuration(_))
        ));
    }
}
