// Controller endpoint capability and goal tracking
//
// A channel only talks to its controller through `ControllerEndpoint`, so the
// transport behind it (zenoh, a simulator, a test double) can be swapped freely.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::messages::{ControllerState, TrajectoryGoal};

/// Lifecycle of the most recent goal on one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Idle,
    Pending,
    Active,
    Succeeded,
    Canceled,
    Aborted,
}

impl GoalStatus {
    /// Sent and not yet resolved
    pub fn in_flight(self) -> bool {
        matches!(self, GoalStatus::Pending | GoalStatus::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GoalStatus::Succeeded | GoalStatus::Canceled | GoalStatus::Aborted
        )
    }
}

/// Status of the goal with id `goal_id`; id 0 means nothing was sent yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GoalState {
    pub goal_id: u64,
    pub status: GoalStatus,
}

/// Where a controller lives on the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointDescriptor {
    pub action: String,
    pub state: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Endpoint {0} is closed")]
    Closed(String),

    #[error("Endpoint {0} is unreachable")]
    Unreachable(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// One trajectory controller
pub trait ControllerEndpoint: Send + Sync {
    /// Dispatch a goal, superseding any goal in flight. Status becomes Pending.
    fn send_goal(&self, goal: TrajectoryGoal) -> Result<(), EndpointError>;

    /// Ask the controller to drop the current goal. Returns once the request is dispatched.
    fn cancel_goal(&self) -> Result<(), EndpointError>;

    fn goal_status(&self) -> watch::Receiver<GoalState>;

    /// Latest controller state, `None` until the first one arrives
    fn controller_state(&self) -> watch::Receiver<Option<ControllerState>>;

    fn is_active(&self) -> bool {
        self.goal_status().borrow().status == GoalStatus::Active
    }
}

/// Opens endpoints at registration time
pub trait EndpointFactory: Send + Sync {
    /// Resolves once the endpoint is usable. Callers bound the wait.
    fn connect(
        &self,
        descriptor: &EndpointDescriptor,
    ) -> impl Future<Output = Result<Arc<dyn ControllerEndpoint>, EndpointError>> + Send;
}

/// Goal id allocation and status bookkeeping shared by endpoint implementations
#[derive(Debug)]
pub struct GoalTracker {
    state: watch::Sender<GoalState>,
}

impl GoalTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GoalState::default());
        Self { state }
    }

    /// Allocate the id for a new goal and mark it Pending
    pub fn begin(&self) -> u64 {
        let mut goal_id = 0;
        self.state.send_modify(|s| {
            s.goal_id += 1;
            s.status = GoalStatus::Pending;
            goal_id = s.goal_id;
        });
        goal_id
    }

    pub fn current(&self) -> GoalState {
        *self.state.borrow()
    }

    /// Apply a status report. Reports for superseded or resolved goals are dropped.
    pub fn report(&self, goal_id: u64, status: GoalStatus) -> bool {
        self.state.send_if_modified(|s| {
            if s.goal_id != goal_id || !s.status.in_flight() || s.status == status {
                return false;
            }
            s.status = status;
            true
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<GoalState> {
        self.state.subscribe()
    }
}

impl Default for GoalTracker {
    fn default() -> Self {
        Self::new()
    }
}
