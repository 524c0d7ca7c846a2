//! Bounded registry of background task statuses.

use chronicle_rs_config::TasksConfig;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Processing,
    Completed,
    Failed,
}

/// Snapshot of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    /// Percent, 0 to 100.
    pub progress: u8,
    pub message: String,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        self.state != TaskState::Processing
    }
}

#[derive(Debug)]
struct TaskEntry {
    status: TaskStatus,
    order: u64,
    finished_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<String, TaskEntry>,
    next_order: u64,
}

/// Task id to status map with a fixed capacity and a TTL for finished tasks.
///
/// Creating a task first drops finished tasks older than the TTL. If the
/// registry is still full, the oldest finished task goes, and failing that
/// the oldest task of any state.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    capacity: usize,
    ttl: Duration,
}

impl TaskRegistry {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn from_config(config: &TasksConfig) -> Self {
        Self::new(config.capacity, Duration::from_secs(config.ttl_secs))
    }

    /// Register a new processing task.
    pub fn create(&self, message: impl Into<String>) -> TaskHandle {
        self.create_at(message.into(), Instant::now())
    }

    fn create_at(&self, message: String, now: Instant) -> TaskHandle {
        let id = Uuid::new_v4().simple().to_string();
        let mut inner = self.inner.lock();
        self.evict(&mut inner, now);
        let order = inner.next_order;
        inner.next_order += 1;
        inner.entries.insert(
            id.clone(),
            TaskEntry {
                status: TaskStatus {
                    state: TaskState::Processing,
                    progress: 0,
                    message,
                },
                order,
                finished_at: None,
            },
        );
        debug!("registered task (id={}, tasks={})", id, inner.entries.len());
        TaskHandle {
            id,
            registry: self.clone(),
        }
    }

    fn evict(&self, inner: &mut RegistryInner, now: Instant) {
        let ttl = self.ttl;
        inner.entries.retain(|_, entry| {
            entry
                .finished_at
                .is_none_or(|finished| now.saturating_duration_since(finished) <= ttl)
        });
        while inner.entries.len() >= self.capacity {
            let victim = oldest(inner, |entry| entry.finished_at.is_some())
                .or_else(|| oldest(inner, |_| true));
            let Some(victim) = victim else {
                break;
            };
            debug!("evicting task at capacity (id={})", victim);
            inner.entries.remove(&victim);
        }
    }

    pub fn status(&self, id: &str) -> Option<TaskStatus> {
        self.inner
            .lock()
            .entries
            .get(id)
            .map(|entry| entry.status.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update(&self, id: &str, state: TaskState, progress: u8, message: String, now: Instant) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.entries.get_mut(id) else {
            debug!("ignoring update for evicted task (id={})", id);
            return;
        };
        entry.status = TaskStatus {
            state,
            progress: progress.min(100),
            message,
        };
        if state != TaskState::Processing {
            entry.finished_at.get_or_insert(now);
        }
    }
}

fn oldest(inner: &RegistryInner, predicate: impl Fn(&TaskEntry) -> bool) -> Option<String> {
    inner
        .entries
        .iter()
        .filter(|(_, entry)| predicate(entry))
        .min_by_key(|(_, entry)| entry.order)
        .map(|(id, _)| id.clone())
}

/// Write access to one task's status.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: String,
    registry: TaskRegistry,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn progress(&self, percent: u8, message: impl Into<String>) {
        self.registry.update(
            &self.id,
            TaskState::Processing,
            percent,
            message.into(),
            Instant::now(),
        );
    }

    pub fn complete(&self, message: impl Into<String>) {
        self.registry
            .update(&self.id, TaskState::Completed, 100, message.into(), Instant::now());
    }

    pub fn fail(&self, message: impl Into<String>) {
        let progress = self.status().map_or(0, |status| status.progress);
        self.registry
            .update(&self.id, TaskState::Failed, progress, message.into(), Instant::now());
    }

    pub fn status(&self) -> Option<TaskStatus> {
        self.registry.status(&self.id)
    }
}
