// Joint-group trajectory control
//
// A `TrajectoryChannel` drives one controller. The `MultiChannelCoordinator`
// owns all channels and maps whole-robot angle vectors onto them.

pub mod channel;
pub mod coordinator;
pub mod endpoint;
pub mod joint_states;
pub mod joints;
pub mod zenoh_endpoint;

#[cfg(test)]
pub(crate) mod mock;

pub use channel::{ChannelOptions, GoalStart, TrajectoryChannel};
pub use coordinator::{MultiChannelCoordinator, SharedDeadline, Target};
pub use endpoint::{
    ControllerEndpoint, EndpointDescriptor, EndpointError, EndpointFactory, GoalState, GoalStatus,
    GoalTracker,
};
pub use joint_states::{JointStateFeed, JointStates};
pub use joints::{AngleVector, JointAngleMap};
pub use zenoh_endpoint::{ZenohEndpoint, ZenohEndpointFactory};
