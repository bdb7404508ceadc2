use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// In-memory last-active instants per runner. Entries are written on exec
/// start and purged when a runner is deleted or found gone; runners that
/// were never exercised have no entry and are never reaped.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    last_active: Mutex<HashMap<String, Instant>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records "now" for the runner.
    pub fn touch(&self, runner_id: &str) {
        let mut map = self.last_active.lock().unwrap();
        map.insert(runner_id.to_string(), Instant::now());
        debug!(runner_id, total_tracked = map.len(), "updated runner activity");
    }

    pub fn last_active(&self, runner_id: &str) -> Option<Instant> {
        self.last_active.lock().unwrap().get(runner_id).copied()
    }

    /// Runners whose last activity is older than the window. Untracked
    /// runners are never returned.
    pub fn inactive(&self, window: Duration) -> Vec<String> {
        let map = self.last_active.lock().unwrap();
        let now = Instant::now();
        map.iter()
            .filter(|(_, last)| now.duration_since(**last) > window)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn remove(&self, runner_id: &str) {
        let mut map = self.last_active.lock().unwrap();
        if map.remove(runner_id).is_some() {
            debug!(runner_id, remaining_tracked = map.len(), "removed runner from activity tracking");
        }
    }

    /// All tracked runner ids.
    pub fn tracked(&self) -> Vec<String> {
        self.last_active.lock().unwrap().keys().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, runner_id: &str, by: Duration) {
        let mut map = self.last_active.lock().unwrap();
        map.insert(runner_id.to_string(), Instant::now() - by);
    }
}
