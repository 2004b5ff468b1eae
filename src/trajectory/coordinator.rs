// Multi-channel coordinator
//
// Owns the registry of trajectory channels and groups, splits whole-robot angle
// vectors into per-channel goals, and aggregates completion across channels.
//
// Locking: the registry lock is only held to look up channels. Every wait runs
// on cloned `Arc<TrajectoryChannel>`s with no lock held.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::channel::{ChannelOptions, GoalStart, TrajectoryChannel};
use super::endpoint::{EndpointDescriptor, EndpointFactory};
use super::joint_states::JointStateFeed;
use super::joints::{self, AngleVector, JointAngleMap};
use crate::clock::{Clock, TokioClock};
use crate::config::{CONNECT_TIMEOUT, INTERPOLATION_PROBE, MIN_WAIT_SLICE, RobotConfig};
use crate::error::{MotionError, Result};
use crate::messages::JointStateMsg;

const OWNER: &str = "coordinator";

/// Which channels an operation applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    /// A group alias, or a single channel if no group has this name
    Named(String),
    Channels(Vec<String>),
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Target::Named(name.to_string())
    }
}

impl From<Vec<String>> for Target {
    fn from(names: Vec<String>) -> Self {
        Target::Channels(names)
    }
}

/// One absolute deadline shared by a series of waits
#[derive(Debug, Clone, Copy)]
pub struct SharedDeadline {
    deadline: Option<Instant>,
}

impl SharedDeadline {
    /// A zero timeout means no deadline
    pub fn new(now: Instant, timeout: Duration) -> Self {
        Self {
            deadline: (!timeout.is_zero()).then(|| now + timeout),
        }
    }

    /// Budget for the next wait. Zero only when unbounded; an expired deadline
    /// still yields `MIN_WAIT_SLICE` so it is never read as "wait forever".
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.deadline {
            None => Duration::ZERO,
            Some(deadline) => deadline.saturating_duration_since(now).max(MIN_WAIT_SLICE),
        }
    }
}

#[derive(Default)]
struct Registry {
    channels: HashMap<String, Arc<TrajectoryChannel>>,
    order: Vec<String>,
    groups: HashMap<String, Vec<String>>,
    joint_list: Vec<String>,
}

impl Registry {
    /// Channels selected by `target`, in registration order. Unknown names are dropped.
    fn resolve(&self, target: &Target) -> Vec<Arc<TrajectoryChannel>> {
        let wanted: Vec<&str> = match target {
            Target::All => {
                return self
                    .order
                    .iter()
                    .filter_map(|key| self.channels.get(key).cloned())
                    .collect();
            }
            Target::Named(name) => match self.groups.get(name) {
                Some(members) if !members.is_empty() => {
                    members.iter().map(String::as_str).collect()
                }
                _ => vec![name.as_str()],
            },
            Target::Channels(names) => names.iter().map(String::as_str).collect(),
        };

        for name in &wanted {
            if !self.channels.contains_key(*name) {
                warn!("No channel named {}, skipping", name);
            }
        }

        self.order
            .iter()
            .filter(|key| wanted.contains(&key.as_str()))
            .filter_map(|key| self.channels.get(key).cloned())
            .collect()
    }

    fn owns_joint(&self, joint: &str) -> bool {
        self.channels
            .values()
            .any(|c| c.joint_names().iter().any(|j| j == joint))
    }
}

pub struct MultiChannelCoordinator<F> {
    factory: F,
    clock: Arc<dyn Clock>,
    options: ChannelOptions,
    connect_timeout: Duration,
    registry: RwLock<Registry>,
    joint_states: JointStateFeed,
}

impl<F: EndpointFactory> MultiChannelCoordinator<F> {
    pub fn new(factory: F) -> Self {
        Self::with_clock(factory, Arc::new(TokioClock))
    }

    pub fn with_clock(factory: F, clock: Arc<dyn Clock>) -> Self {
        Self {
            factory,
            clock,
            options: ChannelOptions::default(),
            connect_timeout: CONNECT_TIMEOUT,
            registry: RwLock::new(Registry::default()),
            joint_states: JointStateFeed::new(),
        }
    }

    /// Options applied to channels registered from now on
    pub fn with_options(mut self, options: ChannelOptions, connect_timeout: Duration) -> Self {
        self.options = options;
        self.connect_timeout = connect_timeout;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, target: &Target) -> Vec<Arc<TrajectoryChannel>> {
        self.read().resolve(target)
    }

    // === Registry ===

    /// Connect to a controller and register it under `key`.
    ///
    /// The first registration of a key wins. With `update_joint_list` the
    /// channel's joints are appended to the coordinator's joint list.
    pub async fn register_channel(
        &self,
        key: &str,
        descriptor: &EndpointDescriptor,
        joint_names: Vec<String>,
        update_joint_list: bool,
    ) -> Result<()> {
        let exists = self.read().channels.contains_key(key);
        if exists {
            error!("The same name {} controller already exists", key);
            return Err(MotionError::DuplicateChannel(key.to_string()));
        }

        info!("Connecting channel {} ({})", key, descriptor.action);
        let endpoint = match tokio::time::timeout(
            self.connect_timeout,
            self.factory.connect(descriptor),
        )
        .await
        {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(source)) => {
                error!("Channel {} unavailable: {}", key, source);
                return Err(MotionError::EndpointUnavailable {
                    key: key.to_string(),
                    source,
                });
            }
            Err(_) => {
                error!(
                    "Timed out after {:?} waiting for {}",
                    self.connect_timeout, descriptor.action
                );
                return Err(MotionError::ConnectTimeout(key.to_string()));
            }
        };

        let channel = Arc::new(TrajectoryChannel::new(
            key,
            joint_names,
            endpoint,
            self.options.clone(),
        ));

        let mut registry = self.write();
        if registry.channels.contains_key(key) {
            error!("The same name {} controller already exists", key);
            return Err(MotionError::DuplicateChannel(key.to_string()));
        }
        if update_joint_list {
            registry
                .joint_list
                .extend(channel.joint_names().iter().cloned());
        }
        registry.order.push(key.to_string());
        registry.channels.insert(key.to_string(), channel);
        info!("Registered channel {}", key);
        Ok(())
    }

    /// Replace the joint ordering used for whole-robot vectors
    pub fn define_joint_list(&self, joint_list: Vec<String>) -> Result<()> {
        let mut registry = self.write();
        if let Some(missing) = joint_list.iter().find(|j| !registry.owns_joint(j)) {
            error!("Joint name {} is not found", missing);
            return Err(MotionError::UnknownJoint(missing.clone()));
        }
        registry.joint_list = joint_list;
        Ok(())
    }

    /// Append the joints of `keys`, in that order. Nothing is appended if any key is unknown.
    pub fn extend_joint_list(&self, keys: &[String]) -> Result<()> {
        let mut registry = self.write();
        if let Some(missing) = keys.iter().find(|k| !registry.channels.contains_key(*k)) {
            error!("Can not find controller named {}", missing);
            return Err(MotionError::UnknownChannel(missing.clone()));
        }
        let joints: Vec<String> = keys
            .iter()
            .filter_map(|k| registry.channels.get(k))
            .flat_map(|c| c.joint_names().iter().cloned())
            .collect();
        registry.joint_list.extend(joints);
        Ok(())
    }

    /// Record a group alias. Member names are not checked against the registry.
    pub fn register_group(&self, name: &str, keys: Vec<String>) {
        let mut registry = self.write();
        for key in &keys {
            if !registry.channels.contains_key(key) {
                debug!("Group {} refers to unregistered channel {}", name, key);
            }
        }
        registry.groups.insert(name.to_string(), keys);
    }

    /// Register every controller with a joint list, then the groups.
    /// Returns how many channels were registered.
    pub async fn configure(&self, config: &RobotConfig) -> usize {
        let mut registered = 0;
        for controller in &config.controllers {
            if controller.joints.is_empty() {
                warn!("Controller {} has no joints, skipping", controller.name);
                continue;
            }
            debug!("controller: {} joints: {:?}", controller.name, controller.joints);
            match self
                .register_channel(
                    &controller.name,
                    &controller.descriptor(),
                    controller.joints.clone(),
                    true,
                )
                .await
            {
                Ok(()) => registered += 1,
                Err(e) => warn!("Skipping controller {}: {}", controller.name, e),
            }
        }
        for (name, keys) in &config.groups {
            self.register_group(name, keys.clone());
        }
        registered
    }

    pub fn joint_list(&self) -> Vec<String> {
        self.read().joint_list.clone()
    }

    /// Registered channel names in registration order
    pub fn channel_names(&self) -> Vec<String> {
        self.read().order.clone()
    }

    pub fn channel(&self, key: &str) -> Option<Arc<TrajectoryChannel>> {
        self.read().channels.get(key).cloned()
    }

    pub fn group(&self, name: &str) -> Option<Vec<String>> {
        self.read().groups.get(name).cloned()
    }

    // === Commands ===

    /// Split a whole-robot vector (ordered like `joint_list`) across the target
    /// channels. Channels owning none of the listed joints are skipped.
    /// Returns how many channels received a goal.
    pub fn send_angle_vector(
        &self,
        av: &[f64],
        duration: Duration,
        target: &Target,
        start: GoalStart,
    ) -> Result<usize> {
        let (joint_list, channels) = {
            let registry = self.read();
            (registry.joint_list.clone(), registry.resolve(target))
        };
        let full = joints::angle_vector_to_map(OWNER, &joint_list, av)
            .inspect_err(|e| error!("{}", e))?;

        let mut sent = 0;
        for channel in channels {
            let mut channel_av = channel.reference_vector();
            if !channel.convert_to_angle_vector(&full, &mut channel_av)? {
                debug!("{}: no joints in command, skipping", channel.name());
                continue;
            }
            match channel.send_angle_vector(&channel_av, duration, start) {
                Ok(()) => sent += 1,
                Err(e) => warn!("{}: {}", channel.name(), e),
            }
        }
        Ok(sent)
    }

    /// Per-waypoint version of `send_angle_vector`.
    ///
    /// A waypoint that does not convert for a channel is dropped for that
    /// channel only; its duration carries into the next kept waypoint so the
    /// remaining timing is unchanged.
    pub fn send_angle_vector_sequence(
        &self,
        avs: &[AngleVector],
        durations: &[Duration],
        target: &Target,
        start: GoalStart,
    ) -> Result<usize> {
        if avs.len() != durations.len() {
            error!(
                "angle_vector_sequence: size {} != time sequence size {}",
                avs.len(),
                durations.len()
            );
            return Err(MotionError::SequenceMismatch {
                owner: OWNER.to_string(),
                waypoints: avs.len(),
                durations: durations.len(),
            });
        }

        let (joint_list, channels) = {
            let registry = self.read();
            (registry.joint_list.clone(), registry.resolve(target))
        };

        let mut sent = 0;
        for channel in channels {
            let mut reference = channel.reference_vector();
            let mut channel_avs = Vec::with_capacity(avs.len());
            let mut channel_durations = Vec::with_capacity(avs.len());
            let mut carried = Duration::ZERO;

            for (i, (av, duration)) in avs.iter().zip(durations).enumerate() {
                carried += *duration;
                let full = match joints::angle_vector_to_map(OWNER, &joint_list, av) {
                    Ok(full) => full,
                    Err(e) => {
                        warn!("{}: dropping waypoint {}: {}", channel.name(), i, e);
                        continue;
                    }
                };
                let mut channel_av = reference.clone();
                if channel.convert_to_angle_vector(&full, &mut channel_av)? {
                    reference.clone_from(&channel_av);
                    channel_avs.push(channel_av);
                    channel_durations.push(carried);
                    carried = Duration::ZERO;
                }
            }

            if channel_avs.is_empty() {
                debug!("{}: no waypoints apply, skipping", channel.name());
                continue;
            }
            match channel.send_angle_vector_sequence(&channel_avs, &channel_durations, start) {
                Ok(()) => sent += 1,
                Err(e) => warn!("{}: {}", channel.name(), e),
            }
        }
        Ok(sent)
    }

    /// Sparse command to every channel; unnamed joints hold their last desired angle
    pub fn send_angles(&self, map: &JointAngleMap, duration: Duration, start: GoalStart) -> usize {
        let mut sent = 0;
        for channel in self.resolve(&Target::All) {
            match channel.send_angles(map, duration, start) {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => warn!("{}: {}", channel.name(), e),
            }
        }
        sent
    }

    // === Waiting ===

    async fn wait_channels(&self, channels: &[Arc<TrajectoryChannel>], timeout: Duration) -> bool {
        let deadline = SharedDeadline::new(self.clock.now(), timeout);
        for channel in channels {
            let budget = deadline.remaining(self.clock.now());
            debug!("wait ({}), budget {:?}", channel.name(), budget);
            if !channel.wait_for_completion(budget).await {
                return false;
            }
        }
        true
    }

    /// Wait for every target channel in registration order under one deadline.
    /// A zero timeout waits without a deadline. Stops at the first timeout.
    pub async fn wait_for_completion(&self, target: &Target, timeout: Duration) -> bool {
        let channels = self.resolve(target);
        self.wait_channels(&channels, timeout).await
    }

    /// Best effort: if no channel reports an active goal, a near-zero wait
    /// catches goals that are pending or finished between state pushes.
    pub async fn is_interpolating(&self, target: &Target) -> bool {
        let channels = self.resolve(target);
        if channels.iter().any(|c| c.is_interpolating()) {
            return true;
        }
        !self.wait_channels(&channels, INTERPOLATION_PROBE).await
    }

    /// Cancel every target channel, then optionally wait once across all of them
    pub async fn cancel(&self, target: &Target, wait: bool) {
        let channels = self.resolve(target);
        for channel in &channels {
            if let Err(e) = channel.request_cancel() {
                warn!("{}: cancel failed: {}", channel.name(), e);
            }
        }
        if wait {
            self.wait_channels(&channels, Duration::ZERO).await;
        }
    }

    /// Hold every target channel at its own last desired pose
    pub fn stop_motion(&self, target: &Target, stop_duration: Duration) {
        for channel in self.resolve(target) {
            if let Err(e) = channel.stop_motion(stop_duration) {
                warn!("{}: stop failed: {}", channel.name(), e);
            }
        }
    }

    // === State ===

    pub fn apply_joint_state(&self, msg: &JointStateMsg) {
        self.joint_states.apply(msg);
    }

    pub fn joint_states(&self) -> &JointStateFeed {
        &self.joint_states
    }

    /// Desired angles merged over all channels
    pub fn reference_positions(&self) -> JointAngleMap {
        let mut merged = JointAngleMap::new();
        for channel in self.resolve(&Target::All) {
            merged.extend(channel.reference_positions());
        }
        merged
    }

    /// Measured angles from the whole-body feed
    pub fn actual_positions(&self) -> JointAngleMap {
        self.joint_states.positions()
    }

    /// Desired angles in joint-list order; unknown joints read 0
    pub fn reference_vector(&self) -> AngleVector {
        self.to_vector(&self.reference_positions())
    }

    /// Measured angles in joint-list order; unknown joints read 0
    pub fn actual_vector(&self) -> AngleVector {
        self.to_vector(&self.actual_positions())
    }

    fn to_vector(&self, map: &JointAngleMap) -> AngleVector {
        self.joint_list()
            .iter()
            .map(|j| map.get(j).copied().unwrap_or(0.0))
            .collect()
    }
}
