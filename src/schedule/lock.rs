use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::{Result, ScheduleError};

/// Serializes generation and replanning per plan. Both read the full plan
/// state and perform a bulk write, so a second in-flight run for the same
/// plan gets `ScheduleError::Busy` and should retry; runs for other plans
/// proceed independently.
#[derive(Debug, Default)]
pub struct GenerationLocks {
    held: Mutex<HashSet<i64>>,
}

impl GenerationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, plan_id: i64) -> Result<PlanGuard<'_>> {
        let mut held = self.held.lock().expect("lock registry poisoned");
        if !held.insert(plan_id) {
            return Err(ScheduleError::Busy(plan_id));
        }
        Ok(PlanGuard {
            locks: self,
            plan_id,
        })
    }
}

/// Releases the plan's slot when dropped.
#[derive(Debug)]
pub struct PlanGuard<'a> {
    locks: &'a GenerationLocks,
    plan_id: i64,
}

impl Drop for PlanGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().expect("lock registry poisoned");
        held.remove(&self.plan_id);
    }
}
