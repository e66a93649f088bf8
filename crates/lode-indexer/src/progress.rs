use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{bounded, Receiver, Sender};
use lode_core::{JobId, JobStatus};
use lode_storage::{now_epoch, JobRecord};
use serde::Serialize;

/// Point-in-time view of a job, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Completion fraction in [0, 1]; 0 while the total is unknown.
    pub progress: f32,
    pub processed_files: u32,
    pub total_files: u32,
    pub error_count: u32,
    pub timestamp: i64,
}

impl JobSnapshot {
    pub fn from_record(rec: &JobRecord) -> Self {
        let progress = if rec.total_files == 0 {
            match rec.status {
                JobStatus::Completed => 1.0,
                _ => 0.0,
            }
        } else {
            (rec.processed_files as f32 / rec.total_files as f32).clamp(0.0, 1.0)
        };
        Self {
            job_id: rec.id,
            status: rec.status,
            progress,
            processed_files: rec.processed_files,
            total_files: rec.total_files,
            error_count: rec.error_count,
            timestamp: now_epoch(),
        }
    }
}

/// A live subscription to one job's snapshots.
///
/// The channel keeps only the latest undelivered snapshot; a subscriber
/// that stops draining never blocks the publisher. After the terminal
/// snapshot the sender side is dropped, so `events` disconnects once
/// drained.
pub struct Subscription {
    pub job_id: JobId,
    pub events: Receiver<JobSnapshot>,
    id: u64,
}

struct Slot {
    id: u64,
    tx: Sender<JobSnapshot>,
    /// Hub-side clone used to displace a stale undelivered snapshot.
    rx: Receiver<JobSnapshot>,
}

/// Fan-out of job snapshots to subscribers, keep-latest-one semantics.
#[derive(Default)]
pub struct ProgressHub {
    subscribers: Mutex<HashMap<i64, Vec<Slot>>>,
    next_id: AtomicU64,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Vec<Slot>>> {
        match self.subscribers.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    pub fn subscribe(&self, job_id: JobId) -> Subscription {
        let (tx, rx) = bounded(1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .entry(job_id.0)
            .or_default()
            .push(Slot {
                id,
                tx,
                rx: rx.clone(),
            });
        Subscription {
            job_id,
            events: rx,
            id,
        }
    }

    pub fn unsubscribe(&self, sub: &Subscription) {
        let mut map = self.lock();
        if let Some(slots) = map.get_mut(&sub.job_id.0) {
            slots.retain(|s| s.id != sub.id);
            if slots.is_empty() {
                map.remove(&sub.job_id.0);
            }
        }
    }

    /// Deliver a snapshot to every subscriber of its job. Stale
    /// undelivered snapshots are displaced by newer ones. A terminal
    /// snapshot is delivered and then the job's subscriptions close.
    pub fn publish(&self, snapshot: &JobSnapshot) {
        let mut map = self.lock();
        let slots = match map.get_mut(&snapshot.job_id.0) {
            Some(s) => s,
            None => return,
        };
        slots.retain(|slot| {
            match slot.tx.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(crossbeam_channel::TrySendError::Full(rejected)) => {
                    // Displace the stale snapshot with the newer one.
                    let _ = slot.rx.try_recv();
                    match slot.tx.try_send(rejected) {
                        Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
                        _ => true,
                    }
                }
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
            }
        });
        if snapshot.status.is_terminal() {
            map.remove(&snapshot.job_id.0);
        }
    }

    /// Number of live subscriptions for a job (observability only).
    pub fn subscriber_count(&self, job_id: JobId) -> usize {
        self.lock().get(&job_id.0).map_or(0, |s| s.len())
    }
}
