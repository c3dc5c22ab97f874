//! The set of in-flight jobs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use cast_models::JobId;

use crate::job::Job;
use crate::metrics;

/// Mutex-guarded job map that publishes its size on every change.
///
/// The count is sent while the lock is held, so observers never see a
/// count that disagrees with the table's final state.
#[derive(Debug)]
pub struct JobTable {
    jobs: Mutex<HashMap<JobId, Arc<Job>>>,
    count: watch::Sender<usize>,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            jobs: Mutex::new(HashMap::new()),
            count,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Arc<Job>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, n: usize) {
        self.count.send_replace(n);
        metrics::set_jobs_active(n);
    }

    /// Insert a job and return the new count.
    pub fn insert(&self, job: Arc<Job>) -> usize {
        let mut jobs = self.lock();
        jobs.insert(job.id().clone(), job);
        let n = jobs.len();
        self.publish(n);
        n
    }

    /// Remove a job and return the removed entry.
    pub fn remove(&self, id: &JobId) -> Option<Arc<Job>> {
        let mut jobs = self.lock();
        let removed = jobs.remove(id);
        self.publish(jobs.len());
        removed
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<Job>> {
        self.lock().get(id).cloned()
    }

    /// Look a job up by job ID or by control-plane action ID.
    pub fn find(&self, id: &str) -> Option<Arc<Job>> {
        let jobs = self.lock();
        if let Some(job) = jobs.get(&JobId::from_string(id)) {
            return Some(Arc::clone(job));
        }
        jobs.values().find(|job| job.action_id() == Some(id)).cloned()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver for the published job count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }
}
