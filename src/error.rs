// Error types for the motion layer

use crate::base::KinematicsError;
use crate::trajectory::EndpointError;

#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("{owner}: angle vector has {got} values, joint list has {expected}")]
    ShapeMismatch {
        owner: String,
        expected: usize,
        got: usize,
    },

    #[error("{owner}: {waypoints} waypoints but {durations} durations")]
    SequenceMismatch {
        owner: String,
        waypoints: usize,
        durations: usize,
    },

    #[error("Channel {0} is already registered")]
    DuplicateChannel(String),

    #[error("Channel {0} is not registered")]
    UnknownChannel(String),

    #[error("Joint {0} is not owned by any registered channel")]
    UnknownJoint(String),

    #[error("Endpoint for channel {key} unavailable: {source}")]
    EndpointUnavailable {
        key: String,
        #[source]
        source: EndpointError,
    },

    #[error("Timed out connecting channel {0}")]
    ConnectTimeout(String),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),

    #[error("Invalid duration: {0}")]
    InvalidDuration(#[from] std::time::TryFromFloatSecsError),

    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MotionError>;
