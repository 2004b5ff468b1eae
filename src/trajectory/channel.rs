// One joint group driven by one trajectory controller

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::endpoint::{ControllerEndpoint, GoalState};
use super::joints::{self, AngleVector, JointAngleMap};
use crate::config::GOAL_TIME_TOLERANCE;
use crate::error::{MotionError, Result};
use crate::messages::{ControllerState, TrajectoryGoal, TrajectoryPoint};

/// When a goal's trajectory starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalStart {
    /// Now plus the channel's start offset
    Now,
    /// As soon as the controller receives it
    Immediately,
    At(SystemTime),
}

impl GoalStart {
    fn stamp_ms(self, offset: Duration) -> u64 {
        let at = match self {
            GoalStart::Immediately => return 0,
            GoalStart::Now => SystemTime::now() + offset,
            GoalStart::At(at) => at,
        };
        at.duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOptions {
    pub goal_time_tolerance: Duration,
    pub start_offset: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            goal_time_tolerance: GOAL_TIME_TOLERANCE,
            start_offset: Duration::ZERO,
        }
    }
}

/// Last state reported by the controller, replaced wholesale on every update
#[derive(Debug, Clone, Default)]
struct ChannelState {
    desired: JointAngleMap,
    actual: JointAngleMap,
    received: bool,
}

fn lock(state: &Mutex<ChannelState>) -> MutexGuard<'_, ChannelState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn apply_state(state: &Mutex<ChannelState>, msg: &ControllerState) {
    let next = ChannelState {
        desired: joints::names_to_map(&msg.joint_names, &msg.desired),
        actual: joints::names_to_map(&msg.joint_names, &msg.actual),
        received: true,
    };
    *lock(state) = next;
}

pub struct TrajectoryChannel {
    name: String,
    joint_names: Vec<String>,
    endpoint: Arc<dyn ControllerEndpoint>,
    state: Arc<Mutex<ChannelState>>,
    options: ChannelOptions,
    listener: JoinHandle<()>,
}

impl TrajectoryChannel {
    /// Wrap a connected endpoint. Spawns the state listener, so this must run
    /// inside a tokio runtime.
    pub fn new(
        name: impl Into<String>,
        joint_names: Vec<String>,
        endpoint: Arc<dyn ControllerEndpoint>,
        options: ChannelOptions,
    ) -> Self {
        let name = name.into();
        let state = Arc::new(Mutex::new(ChannelState::default()));

        let mut updates = endpoint.controller_state();
        let initial = updates.borrow_and_update().clone();
        if let Some(msg) = initial {
            apply_state(&state, &msg);
        }

        let listener = tokio::spawn({
            let state = Arc::clone(&state);
            let name = name.clone();
            async move {
                while updates.changed().await.is_ok() {
                    let snapshot = updates.borrow_and_update().clone();
                    if let Some(msg) = snapshot {
                        apply_state(&state, &msg);
                    }
                }
                debug!("State feed for channel {} closed", name);
            }
        });

        Self {
            name,
            joint_names,
            endpoint,
            state,
            options,
            listener,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    /// True once the controller has reported at least one state
    pub fn has_state(&self) -> bool {
        lock(&self.state).received
    }

    pub fn goal_state(&self) -> GoalState {
        *self.endpoint.goal_status().borrow()
    }

    /// Overlay a sparse name -> angle map onto `av` (this channel's order).
    /// Returns false if none of this channel's joints were in the map.
    pub fn convert_to_angle_vector(&self, map: &JointAngleMap, av: &mut AngleVector) -> Result<bool> {
        joints::fill_angle_vector(&self.name, &self.joint_names, map, av)
    }

    /// Same as `convert_to_angle_vector` for parallel name/position lists
    pub fn convert_names_to_angle_vector(
        &self,
        names: &[String],
        positions: &[f64],
        av: &mut AngleVector,
    ) -> Result<bool> {
        if names.is_empty() || positions.is_empty() {
            return Ok(false);
        }
        self.convert_to_angle_vector(&joints::names_to_map(names, positions), av)
    }

    pub fn convert_to_map(&self, av: &[f64]) -> Result<JointAngleMap> {
        joints::angle_vector_to_map(&self.name, &self.joint_names, av)
    }

    pub fn reference_positions(&self) -> JointAngleMap {
        lock(&self.state).desired.clone()
    }

    pub fn actual_positions(&self) -> JointAngleMap {
        lock(&self.state).actual.clone()
    }

    /// Last desired angles in joint order; joints never reported read 0
    pub fn reference_vector(&self) -> AngleVector {
        self.to_vector(&self.reference_positions())
    }

    /// Last actual angles in joint order; joints never reported read 0
    pub fn actual_vector(&self) -> AngleVector {
        self.to_vector(&self.actual_positions())
    }

    fn to_vector(&self, map: &JointAngleMap) -> AngleVector {
        let mut av = vec![0.0; self.joint_names.len()];
        for (slot, name) in av.iter_mut().zip(&self.joint_names) {
            if let Some(&angle) = map.get(name) {
                *slot = angle;
            }
        }
        av
    }

    fn check_len(&self, av: &[f64]) -> Result<()> {
        if av.len() != self.joint_names.len() {
            warn!(
                "{}: angle vector size {} != joint list size {}",
                self.name,
                av.len(),
                self.joint_names.len()
            );
            return Err(MotionError::ShapeMismatch {
                owner: self.name.clone(),
                expected: self.joint_names.len(),
                got: av.len(),
            });
        }
        Ok(())
    }

    fn build_goal(&self, points: Vec<TrajectoryPoint>, start: GoalStart) -> TrajectoryGoal {
        TrajectoryGoal {
            stamp_ms: start.stamp_ms(self.options.start_offset),
            joint_names: self.joint_names.clone(),
            points,
            path_tolerance: Vec::new(),
            goal_tolerance: Vec::new(),
            goal_time_tolerance: self.options.goal_time_tolerance.as_secs_f64(),
        }
    }

    /// Send a single-waypoint goal reaching `av` after `duration`
    pub fn send_angle_vector(&self, av: &[f64], duration: Duration, start: GoalStart) -> Result<()> {
        self.check_len(av)?;

        let point = TrajectoryPoint {
            positions: av.to_vec(),
            time_from_start: duration.as_secs_f64(),
        };
        debug!("{}: sending {:?} over {:?}", self.name, av, duration);
        self.endpoint.send_goal(self.build_goal(vec![point], start))?;
        Ok(())
    }

    /// Send a multi-waypoint goal; each waypoint's time is the running sum of `durations`
    pub fn send_angle_vector_sequence(
        &self,
        avs: &[AngleVector],
        durations: &[Duration],
        start: GoalStart,
    ) -> Result<()> {
        if avs.len() != durations.len() {
            warn!(
                "{}: angle vector sequence size {} != time sequence size {}",
                self.name,
                avs.len(),
                durations.len()
            );
            return Err(MotionError::SequenceMismatch {
                owner: self.name.clone(),
                waypoints: avs.len(),
                durations: durations.len(),
            });
        }
        for av in avs {
            self.check_len(av)?;
        }

        let mut elapsed = Duration::ZERO;
        let points = avs
            .iter()
            .zip(durations)
            .map(|(av, duration)| {
                elapsed += *duration;
                TrajectoryPoint {
                    positions: av.clone(),
                    time_from_start: elapsed.as_secs_f64(),
                }
            })
            .collect();

        debug!("{}: sending {} waypoints over {:?}", self.name, avs.len(), elapsed);
        self.endpoint.send_goal(self.build_goal(points, start))?;
        Ok(())
    }

    /// Move the joints named in `map`, holding the others at their last desired angle.
    /// Returns false (nothing sent) when the map names none of this channel's joints.
    pub fn send_angles(&self, map: &JointAngleMap, duration: Duration, start: GoalStart) -> Result<bool> {
        let mut av = self.reference_vector();
        if !self.convert_to_angle_vector(map, &mut av)? {
            return Ok(false);
        }
        self.send_angle_vector(&av, duration, start)?;
        Ok(true)
    }

    pub fn send_angles_by_name(
        &self,
        names: &[String],
        positions: &[f64],
        duration: Duration,
        start: GoalStart,
    ) -> Result<bool> {
        if names.is_empty() || positions.is_empty() {
            return Ok(false);
        }
        self.send_angles(&joints::names_to_map(names, positions), duration, start)
    }

    pub fn is_interpolating(&self) -> bool {
        self.endpoint.is_active()
    }

    /// Wait until the current goal resolves. A zero timeout waits without a deadline.
    ///
    /// Returns false on timeout; the goal keeps running.
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let mut status = self.endpoint.goal_status();
        let done = status.wait_for(|s| !s.status.in_flight());

        let outcome = if timeout.is_zero() {
            Some(done.await.is_ok())
        } else {
            tokio::time::timeout(timeout, done)
                .await
                .ok()
                .map(|r| r.is_ok())
        };

        match outcome {
            Some(true) => true,
            Some(false) => {
                warn!("{}: goal status feed closed while waiting", self.name);
                false
            }
            None => {
                debug!("{}: wait timed out after {:?}", self.name, timeout);
                false
            }
        }
    }

    /// Dispatch a cancel request without waiting for it to take effect
    pub fn request_cancel(&self) -> Result<()> {
        debug!("{}: cancel requested", self.name);
        self.endpoint.cancel_goal()?;
        Ok(())
    }

    pub async fn cancel(&self, wait: bool) -> Result<()> {
        self.request_cancel()?;
        if wait {
            self.wait_for_completion(Duration::ZERO).await;
        }
        Ok(())
    }

    /// Halt at the last commanded pose by re-sending it over `stop_duration`
    pub fn stop_motion(&self, stop_duration: Duration) -> Result<()> {
        let desired = self.reference_positions();
        if !self.send_angles(&desired, stop_duration, GoalStart::Immediately)? {
            warn!("{}: no controller state yet, nothing to hold", self.name);
        }
        Ok(())
    }
}

impl Drop for TrajectoryChannel {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
