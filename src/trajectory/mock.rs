// In-process endpoint and factory for tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use super::endpoint::{
    ControllerEndpoint, EndpointDescriptor, EndpointError, EndpointFactory, GoalState, GoalStatus,
    GoalTracker,
};
use crate::messages::{ControllerState, TrajectoryGoal};

/// Records goals; acknowledges them at once and optionally succeeds them later
pub struct MockEndpoint {
    goals: Arc<GoalTracker>,
    state: watch::Sender<Option<ControllerState>>,
    sent: Mutex<Vec<TrajectoryGoal>>,
    cancels: AtomicUsize,
    complete_after: Option<Duration>,
}

impl MockEndpoint {
    fn build(complete_after: Option<Duration>, state: Option<ControllerState>) -> Arc<Self> {
        let (state, _) = watch::channel(state);
        Arc::new(Self {
            goals: Arc::new(GoalTracker::new()),
            state,
            sent: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            complete_after,
        })
    }

    /// Goals stay active until canceled or reported
    pub fn new() -> Arc<Self> {
        Self::build(None, None)
    }

    /// Every goal succeeds `delay` after it was sent
    pub fn completing_after(delay: Duration) -> Arc<Self> {
        Self::build(Some(delay), None)
    }

    /// Already reporting `positions` as both desired and actual
    pub fn with_state(names: &[&str], positions: &[f64]) -> Arc<Self> {
        Self::build(None, Some(state_msg(names, positions, positions)))
    }

    pub fn push_state(&self, names: &[&str], desired: &[f64], actual: &[f64]) {
        self.state.send_replace(Some(state_msg(names, desired, actual)));
    }

    pub fn report(&self, status: GoalStatus) {
        self.goals.report(self.goals.current().goal_id, status);
    }

    pub fn sent_goals(&self) -> Vec<TrajectoryGoal> {
        self.sent.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

fn state_msg(names: &[&str], desired: &[f64], actual: &[f64]) -> ControllerState {
    ControllerState {
        joint_names: names.iter().map(|s| s.to_string()).collect(),
        desired: desired.to_vec(),
        actual: actual.to_vec(),
    }
}

impl ControllerEndpoint for MockEndpoint {
    fn send_goal(&self, goal: TrajectoryGoal) -> Result<(), EndpointError> {
        self.sent.lock().unwrap().push(goal);
        let goal_id = self.goals.begin();
        self.goals.report(goal_id, GoalStatus::Active);

        if let Some(delay) = self.complete_after {
            let goals = Arc::clone(&self.goals);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                goals.report(goal_id, GoalStatus::Succeeded);
            });
        }
        Ok(())
    }

    fn cancel_goal(&self) -> Result<(), EndpointError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.report(GoalStatus::Canceled);
        Ok(())
    }

    fn goal_status(&self) -> watch::Receiver<GoalState> {
        self.goals.subscribe()
    }

    fn controller_state(&self) -> watch::Receiver<Option<ControllerState>> {
        self.state.subscribe()
    }
}

/// Hands out preloaded endpoints by action name
#[derive(Default)]
pub struct MockFactory {
    endpoints: Mutex<HashMap<String, Arc<MockEndpoint>>>,
    silent: Mutex<HashSet<String>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, action: &str, endpoint: Arc<MockEndpoint>) {
        self.endpoints
            .lock()
            .unwrap()
            .insert(action.to_string(), endpoint);
    }

    /// Connecting to `action` never completes
    pub fn add_silent(&self, action: &str) {
        self.silent.lock().unwrap().insert(action.to_string());
    }
}

impl EndpointFactory for MockFactory {
    async fn connect(
        &self,
        descriptor: &EndpointDescriptor,
    ) -> Result<Arc<dyn ControllerEndpoint>, EndpointError> {
        let silent = self.silent.lock().unwrap().contains(&descriptor.action);
        if silent {
            std::future::pending::<()>().await;
        }
        let found = self.endpoints.lock().unwrap().get(&descriptor.action).cloned();
        match found {
            Some(endpoint) => {
                let endpoint: Arc<dyn ControllerEndpoint> = endpoint;
                Ok(endpoint)
            }
            None => Err(EndpointError::Unreachable(descriptor.action.clone())),
        }
    }
}
