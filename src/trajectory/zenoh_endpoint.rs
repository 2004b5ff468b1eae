// Controller endpoint over zenoh
//
// Key expressions for an endpoint with action `A` and state `S`:
//   A/goal    GoalRequest    runtime -> controller
//   A/cancel  CancelRequest  runtime -> controller
//   A/status  GoalResult     controller -> runtime
//   S         ControllerState controller -> runtime
//
// Payloads are JSON. Sends are queued to a publisher task so `send_goal` and
// `cancel_goal` never block the caller.

use std::fmt::Display;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zenoh::Session;

use super::endpoint::{
    ControllerEndpoint, EndpointDescriptor, EndpointError, EndpointFactory, GoalState, GoalStatus,
    GoalTracker,
};
use crate::messages::{CancelRequest, ControllerState, GoalRequest, GoalResult, TrajectoryGoal};

fn transport<E: Display>(e: E) -> EndpointError {
    EndpointError::Transport(e.to_string())
}

enum Outbound {
    Goal(GoalRequest),
    Cancel(CancelRequest),
}

pub struct ZenohEndpoint {
    action: String,
    goals: Arc<GoalTracker>,
    state: watch::Receiver<Option<ControllerState>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    tasks: Vec<JoinHandle<()>>,
}

impl ZenohEndpoint {
    /// Declare the endpoint's publishers and subscribers and start its tasks
    pub async fn open(session: &Session, descriptor: &EndpointDescriptor) -> Result<Self, EndpointError> {
        let action = descriptor.action.clone();
        let goal_key = format!("{}/goal", action);
        let cancel_key = format!("{}/cancel", action);
        let status_key = format!("{}/status", action);

        let pub_goal = session.declare_publisher(goal_key).await.map_err(transport)?;
        let pub_cancel = session.declare_publisher(cancel_key).await.map_err(transport)?;
        let sub_status = session.declare_subscriber(status_key).await.map_err(transport)?;
        let sub_state = session
            .declare_subscriber(descriptor.state.clone())
            .await
            .map_err(transport)?;

        let goals = Arc::new(GoalTracker::new());
        let (state_tx, state_rx) = watch::channel(None);
        let (outbound, mut queue) = mpsc::unbounded_channel::<Outbound>();

        // 1. Publisher: drain queued goals and cancels in order
        let publisher = tokio::spawn({
            let goals = Arc::clone(&goals);
            let action = action.clone();
            async move {
                while let Some(msg) = queue.recv().await {
                    let (publisher, payload, goal_id) = match &msg {
                        Outbound::Goal(req) => (&pub_goal, serde_json::to_string(req), Some(req.goal_id)),
                        Outbound::Cancel(req) => (&pub_cancel, serde_json::to_string(req), None),
                    };
                    let result = match payload {
                        Ok(json) => publisher.put(json).await.map_err(transport),
                        Err(e) => Err(transport(e)),
                    };
                    if let Err(e) = result {
                        warn!("{}: publish failed: {}", action, e);
                        if let Some(goal_id) = goal_id {
                            goals.report(goal_id, GoalStatus::Aborted);
                        }
                    }
                }
                debug!("{}: outbound queue closed", action);
            }
        });

        // 2. Goal status from the controller
        let status = tokio::spawn({
            let goals = Arc::clone(&goals);
            let action = action.clone();
            async move {
                while let Ok(sample) = sub_status.recv_async().await {
                    let payload = sample.payload().to_bytes();
                    match serde_json::from_slice::<GoalResult>(&payload) {
                        Ok(result) => {
                            if goals.report(result.goal_id, result.status) {
                                debug!("{}: goal {} -> {:?}", action, result.goal_id, result.status);
                            }
                        }
                        Err(e) => warn!("{}: failed to parse goal status: {}", action, e),
                    }
                }
            }
        });

        // 3. Controller state
        let state = tokio::spawn({
            let action = action.clone();
            async move {
                while let Ok(sample) = sub_state.recv_async().await {
                    let payload = sample.payload().to_bytes();
                    match serde_json::from_slice::<ControllerState>(&payload) {
                        Ok(msg) => {
                            state_tx.send_replace(Some(msg));
                        }
                        Err(e) => warn!("{}: failed to parse controller state: {}", action, e),
                    }
                }
            }
        });

        Ok(Self {
            action,
            goals,
            state: state_rx,
            outbound,
            tasks: vec![publisher, status, state],
        })
    }
}

impl ControllerEndpoint for ZenohEndpoint {
    fn send_goal(&self, goal: TrajectoryGoal) -> Result<(), EndpointError> {
        let goal_id = self.goals.begin();
        let request = GoalRequest { goal_id, goal };
        if self.outbound.send(Outbound::Goal(request)).is_err() {
            self.goals.report(goal_id, GoalStatus::Aborted);
            return Err(EndpointError::Closed(self.action.clone()));
        }
        Ok(())
    }

    fn cancel_goal(&self) -> Result<(), EndpointError> {
        let goal_id = self.goals.current().goal_id;
        self.outbound
            .send(Outbound::Cancel(CancelRequest { goal_id }))
            .map_err(|_| EndpointError::Closed(self.action.clone()))
    }

    fn goal_status(&self) -> watch::Receiver<GoalState> {
        self.goals.subscribe()
    }

    fn controller_state(&self) -> watch::Receiver<Option<ControllerState>> {
        self.state.clone()
    }
}

impl Drop for ZenohEndpoint {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Opens zenoh endpoints on a shared session
#[derive(Clone)]
pub struct ZenohEndpointFactory {
    session: Session,
}

impl ZenohEndpointFactory {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl EndpointFactory for ZenohEndpointFactory {
    /// Resolves once the controller has published its first state
    async fn connect(
        &self,
        descriptor: &EndpointDescriptor,
    ) -> Result<Arc<dyn ControllerEndpoint>, EndpointError> {
        let endpoint = ZenohEndpoint::open(&self.session, descriptor).await?;

        info!("Waiting for {} ...", descriptor.state);
        let mut state = endpoint.controller_state();
        let ready = state.wait_for(Option::is_some).await.is_ok();
        if !ready {
            return Err(EndpointError::Closed(descriptor.action.clone()));
        }
        info!("Connected to {}", descriptor.action);
        Ok(Arc::new(endpoint))
    }
}
