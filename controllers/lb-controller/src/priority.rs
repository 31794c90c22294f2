//! Partition priority store.
//!
//! Priority 0 is the baseline. A partition with an outstanding failure and
//! no resources of its own (typically a partition being emptied) is
//! elevated so that its retries go first on the device. Only the response
//! handler writes priorities; post workers read them to order tenants.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Upper bound for elevated priorities
pub const MAX_PRIORITY: u32 = 10;

#[derive(Debug, Default)]
pub struct PriorityStore {
    priorities: RwLock<HashMap<String, u32>>,
}

impl PriorityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current priority of a partition (0 when never set)
    pub fn get(&self, partition: &str) -> u32 {
        self.priorities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partition)
            .copied()
            .unwrap_or(0)
    }

    pub fn set(&self, partition: &str, priority: u32) {
        let mut priorities = self.priorities.write().unwrap_or_else(PoisonError::into_inner);
        if priority == 0 {
            priorities.remove(partition);
        } else {
            priorities.insert(partition.to_string(), priority.min(MAX_PRIORITY));
        }
    }

    /// Reset a partition to baseline
    pub fn reset(&self, partition: &str) {
        if self.get(partition) > 0 {
            debug!("Resetting priority of partition {}", partition);
        }
        self.set(partition, 0);
    }

    /// Raise a partition's priority by one, capped at `MAX_PRIORITY`
    pub fn elevate(&self, partition: &str) -> u32 {
        let mut priorities = self.priorities.write().unwrap_or_else(PoisonError::into_inner);
        let entry = priorities.entry(partition.to_string()).or_insert(0);
        *entry = (*entry + 1).min(MAX_PRIORITY);
        *entry
    }

    /// Order tenants for posting: highest priority first, then by name.
    pub fn order_tenants(&self, tenants: &[String]) -> Vec<String> {
        let priorities = self.priorities.read().unwrap_or_else(PoisonError::into_inner);
        let mut ordered = tenants.to_vec();
        ordered.sort_by(|a, b| {
            let pa = priorities.get(a).copied().unwrap_or(0);
            let pb = priorities.get(b).copied().unwrap_or(0);
            pb.cmp(&pa).then_with(|| a.cmp(b))
        });
        ordered.dedup();
        ordered
    }
}
