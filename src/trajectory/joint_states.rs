// Whole-body joint state, merged from partial updates

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::joints::JointAngleMap;
use crate::messages::JointStateMsg;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointStates {
    pub stamp_ms: u64,
    pub position: JointAngleMap,
    pub velocity: HashMap<String, f64>,
    pub effort: HashMap<String, f64>,
}

/// Last value per joint name wins; names absent from an update keep their value
#[derive(Debug, Default)]
pub struct JointStateFeed {
    states: Mutex<Option<JointStates>>,
}

impl JointStateFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<JointStates>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply(&self, msg: &JointStateMsg) {
        let mut guard = self.lock();
        let states = guard.get_or_insert_with(JointStates::default);

        states.stamp_ms = msg.stamp_ms;
        for (name, value) in msg.name.iter().zip(&msg.position) {
            states.position.insert(name.clone(), *value);
        }
        for (name, value) in msg.name.iter().zip(&msg.velocity) {
            states.velocity.insert(name.clone(), *value);
        }
        for (name, value) in msg.name.iter().zip(&msg.effort) {
            states.effort.insert(name.clone(), *value);
        }
    }

    /// True once any update has arrived
    pub fn has_data(&self) -> bool {
        self.lock().is_some()
    }

    pub fn snapshot(&self) -> JointStates {
        self.lock().clone().unwrap_or_default()
    }

    pub fn positions(&self) -> JointAngleMap {
        self.lock()
            .as_ref()
            .map(|s| s.position.clone())
            .unwrap_or_default()
    }
}
