//! Task registry.
//!
//! The registry is the only shared mutable state in the monitor. Each entry
//! carries a generation number assigned at registration; every status
//! change is a compare-and-set on `(id, generation, Pending)` under the
//! map's shard lock, so a stale poller can never touch a newer task that
//! reused its id, and cancellation always beats an in-flight resolution.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use qxmon_core::{TaskId, Tick};
use tokio_util::sync::CancellationToken;

use crate::error::{MonitorError, MonitorResult};
use crate::task::TaskStatus;

#[derive(Debug)]
struct TaskEntry {
    generation: u64,
    status: TaskStatus,
    deadline: Tick,
    intent: &'static str,
    created_at: DateTime<Utc>,
    /// Wakes the poller's sleep on cancel.
    wake: CancellationToken,
}

/// Read-only view of a registered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub status: TaskStatus,
    pub deadline: Tick,
    pub intent: &'static str,
    pub created_at: DateTime<Utc>,
}

/// Handle returned to the poller that owns a registration.
#[derive(Debug, Clone)]
pub(crate) struct Registration {
    pub generation: u64,
    pub wake: CancellationToken,
}

#[derive(Debug, Default)]
pub(crate) struct TaskRegistry {
    tasks: DashMap<TaskId, TaskEntry>,
    next_generation: AtomicU64,
}

impl TaskRegistry {
    /// Insert a Pending entry.
    ///
    /// Fails if the id is still Pending. A terminal entry whose callback is
    /// still running is replaced; its poller only removes entries of its own
    /// generation.
    pub fn register(
        &self,
        id: &TaskId,
        deadline: Tick,
        intent: &'static str,
        wake: CancellationToken,
    ) -> MonitorResult<Registration> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = TaskEntry {
            generation,
            status: TaskStatus::Pending,
            deadline,
            intent,
            created_at: Utc::now(),
            wake: wake.clone(),
        };

        match self.tasks.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().status == TaskStatus::Pending {
                    return Err(MonitorError::DuplicateTask(id.clone()));
                }
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }

        Ok(Registration { generation, wake })
    }

    /// True while this registration is the current one and still Pending.
    pub fn is_live(&self, id: &TaskId, generation: u64) -> bool {
        self.tasks
            .get(id)
            .is_some_and(|e| e.generation == generation && e.status == TaskStatus::Pending)
    }

    /// Move a live Pending registration to `to`. Returns false if it was
    /// cancelled or replaced in the meantime.
    pub fn transition(&self, id: &TaskId, generation: u64, to: TaskStatus) -> bool {
        match self.tasks.get_mut(id) {
            Some(mut entry)
                if entry.generation == generation && entry.status == TaskStatus::Pending =>
            {
                entry.status = to;
                true
            }
            _ => false,
        }
    }

    /// Drop the entry if it still belongs to `generation`.
    pub fn remove(&self, id: &TaskId, generation: u64) -> bool {
        self.tasks
            .remove_if(id, |_, e| e.generation == generation)
            .is_some()
    }

    /// Cancel a Pending task: the entry is removed and its poller woken.
    /// Returns the cancelled entry's snapshot.
    pub fn cancel(&self, id: &TaskId) -> Option<TaskSnapshot> {
        let (id, entry) = self
            .tasks
            .remove_if(id, |_, e| e.status == TaskStatus::Pending)?;
        entry.wake.cancel();
        Some(TaskSnapshot {
            id,
            status: TaskStatus::Cancelled,
            deadline: entry.deadline,
            intent: entry.intent,
            created_at: entry.created_at,
        })
    }

    /// Ids of every Pending task.
    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|e| e.status == TaskStatus::Pending)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.tasks.get(id).map(|e| e.status)
    }

    pub fn snapshot(&self, id: &TaskId) -> Option<TaskSnapshot> {
        self.tasks.get(id).map(|e| TaskSnapshot {
            id: e.key().clone(),
            status: e.status,
            deadline: e.deadline,
            intent: e.intent,
            created_at: e.created_at,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|e| e.status == TaskStatus::Pending)
            .count()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(registry: &TaskRegistry, id: &str) -> MonitorResult<Registration> {
        registry.register(
            &TaskId::from(id),
            Tick::new(110),
            "maker",
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_duplicate_pending_rejected() {
        let registry = TaskRegistry::default();
        register(&registry, "a").unwrap();

        let err = register(&registry, "a").unwrap_err();
        assert_eq!(err, MonitorError::DuplicateTask(TaskId::from("a")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_transition_is_single_shot() {
        let registry = TaskRegistry::default();
        let id = TaskId::from("a");
        let reg = register(&registry, "a").unwrap();

        assert!(registry.transition(&id, reg.generation, TaskStatus::Resolved));
        assert!(!registry.transition(&id, reg.generation, TaskStatus::Expired));
        assert_eq!(registry.status(&id), Some(TaskStatus::Resolved));
        assert!(!registry.is_live(&id, reg.generation));
    }

    #[test]
    fn test_cancel_beats_resolution() {
        let registry = TaskRegistry::default();
        let id = TaskId::from("a");
        let reg = register(&registry, "a").unwrap();

        let snapshot = registry.cancel(&id).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Cancelled);
        assert!(reg.wake.is_cancelled());

        assert!(!registry.transition(&id, reg.generation, TaskStatus::Resolved));
        assert_eq!(registry.status(&id), None);
        assert!(registry.cancel(&id).is_none());
    }

    #[test]
    fn test_cancel_ignores_terminal() {
        let registry = TaskRegistry::default();
        let id = TaskId::from("a");
        let reg = register(&registry, "a").unwrap();
        registry.transition(&id, reg.generation, TaskStatus::Expired);

        assert!(registry.cancel(&id).is_none());
        assert_eq!(registry.status(&id), Some(TaskStatus::Expired));
    }

    #[test]
    fn test_reuse_after_terminal_gets_new_generation() {
        let registry = TaskRegistry::default();
        let id = TaskId::from("a");
        let first = register(&registry, "a").unwrap();
        registry.transition(&id, first.generation, TaskStatus::Resolved);

        let second = register(&registry, "a").unwrap();
        assert_ne!(first.generation, second.generation);

        // The old poller finishing its callback must not drop the new task.
        assert!(!registry.remove(&id, first.generation));
        assert!(registry.is_live(&id, second.generation));
        assert_eq!(registry.pending_count(), 1);
    }

    #[test]
    fn test_pending_ids() {
        let registry = TaskRegistry::default();
        register(&registry, "a").unwrap();
        let b = register(&registry, "b").unwrap();
        registry.transition(&TaskId::from("b"), b.generation, TaskStatus::Resolved);

        assert_eq!(registry.pending_ids(), vec![TaskId::from("a")]);
        assert_eq!(registry.len(), 2);
    }
}
