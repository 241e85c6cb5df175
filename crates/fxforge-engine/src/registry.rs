//! Process-wide task table.
//!
//! Readers get snapshots taken under the same lock the machine mutates
//! through, so a status never shows a half-applied update.

use crate::cancel::CancellationFlag;
use chrono::{DateTime, Duration, Utc};
use fxforge_core::task::{Phase, TaskId, TaskState, TaskStatus};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

struct Entry {
    state: TaskState,
    cancel: CancellationFlag,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, Entry>>>,
    max_retries: u32,
    ttl: Duration,
}

impl TaskRegistry {
    pub fn new(max_retries: u32, ttl: Duration) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            max_retries,
            ttl,
        }
    }

    pub fn create(&self, prompt: impl Into<String>) -> TaskId {
        let state = TaskState::new(prompt, self.max_retries, Utc::now());
        let id = state.id;
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.insert(
            id,
            Entry {
                state,
                cancel: CancellationFlag::new(),
            },
        );
        tracing::info!(task_id = %id, "task created");
        id
    }

    pub fn snapshot(&self, id: TaskId) -> Option<TaskStatus> {
        self.read(id, TaskState::status)
    }

    /// Most recent first.
    pub fn list(&self, limit: usize) -> Vec<TaskStatus> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        let mut statuses: Vec<TaskStatus> = tasks.values().map(|e| e.state.status()).collect();
        statuses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        statuses.truncate(limit);
        statuses
    }

    pub fn stats(&self) -> RegistryStats {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        let mut stats = RegistryStats {
            total: tasks.len(),
            ..RegistryStats::default()
        };
        for entry in tasks.values() {
            match entry.state.phase() {
                Phase::Success => stats.succeeded += 1,
                Phase::Failed => stats.failed += 1,
                _ => stats.active += 1,
            }
        }
        stats
    }

    /// Drop tasks created more than the TTL before `now`. Tasks still
    /// running are cancelled as they go.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let before = tasks.len();
        tasks.retain(|id, entry| {
            let keep = entry.state.created_at + self.ttl > now;
            if !keep {
                entry.cancel.cancel();
                tracing::debug!(task_id = %id, phase = %entry.state.phase(), "evicting expired task");
            }
            keep
        });
        before - tasks.len()
    }

    /// Ask a task to stop at its next suspension point.
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.cancellation(id) {
            Some(flag) => {
                flag.cancel();
                tracing::info!(task_id = %id, "task cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn cancellation(&self, id: TaskId) -> Option<CancellationFlag> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.get(&id).map(|entry| entry.cancel.clone())
    }

    pub(crate) fn read<R>(&self, id: TaskId, f: impl FnOnce(&TaskState) -> R) -> Option<R> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.get(&id).map(|entry| f(&entry.state))
    }

    /// The only write path; used by the task machine.
    pub(crate) fn update<R>(&self, id: TaskId, f: impl FnOnce(&mut TaskState) -> R) -> Option<R> {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.get_mut(&id).map(|entry| f(&mut entry.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TaskRegistry {
        TaskRegistry::new(3, Duration::hours(24))
    }

    #[test]
    fn test_create_and_snapshot() {
        let registry = registry();
        let id = registry.create("a fuzz pedal");
        let status = registry.snapshot(id).unwrap();
        assert_eq!(status.phase, Phase::Pending);
        assert_eq!(status.max_retries, 3);
        assert!(registry.snapshot(TaskId::new()).is_none());
    }

    #[test]
    fn test_list_is_newest_first_and_limited() {
        let registry = registry();
        let first = registry.create("one");
        let second = registry.create("two");
        registry.update(first, |t| t.created_at -= Duration::minutes(5));
        let listed = registry.list(10);
        assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![second, first]);
        assert_eq!(registry.list(1).len(), 1);
    }

    #[test]
    fn test_stats_by_phase() {
        let registry = registry();
        let done = registry.create("done");
        let broken = registry.create("broken");
        registry.create("waiting");
        let now = Utc::now();
        registry.update(done, |t| {
            for phase in [Phase::Synthesizing, Phase::Pushing, Phase::Building, Phase::Success] {
                t.transition(phase, now).unwrap();
            }
        });
        registry.update(broken, |t| t.transition(Phase::Failed, now).unwrap());
        assert_eq!(
            registry.stats(),
            RegistryStats {
                total: 3,
                active: 1,
                succeeded: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn test_evict_expired_cancels_and_removes() {
        let registry = registry();
        let old = registry.create("old");
        let fresh = registry.create("fresh");
        let flag = registry.cancellation(old).unwrap();
        registry.update(old, |t| t.created_at -= Duration::hours(25));

        assert_eq!(registry.evict_expired(Utc::now()), 1);
        assert!(registry.snapshot(old).is_none());
        assert!(registry.snapshot(fresh).is_some());
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_cancel_unknown_task() {
        let registry = registry();
        assert!(!registry.cancel(TaskId::new()));
        let id = registry.create("x");
        assert!(registry.cancel(id));
        assert!(registry.cancellation(id).unwrap().is_cancelled());
    }
}
