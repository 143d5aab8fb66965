use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use tracing::{error, info};

use crate::domain::{
    error::DomainError,
    jobs::{Job, JobId},
};

use super::notifier::JobNotifier;

/// In-memory job records. Every mutation is published to the notifier while
/// the write lock is still held, so snapshots of one job go out in order.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
    notifier: Arc<dyn JobNotifier>,
}

impl JobRegistry {
    pub fn new(notifier: Arc<dyn JobNotifier>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            notifier,
        }
    }

    pub fn create(&self, job: Job) -> Result<Job, DomainError> {
        let mut jobs = self.write();
        if jobs.contains_key(&job.id) {
            return Err(DomainError::validation(format!(
                "job `{}` already exists",
                job.id
            )));
        }
        jobs.insert(job.id, job.clone());
        self.announce(&job);
        Ok(job)
    }

    pub fn get(&self, id: JobId) -> Result<Job, DomainError> {
        self.read()
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("job"))
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.read().contains_key(&id)
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Remove a record; `false` when it did not exist.
    pub fn remove(&self, id: JobId) -> bool {
        self.write().remove(&id).is_some()
    }

    /// Apply `mutate` to the stored record and publish the result.
    ///
    /// The closure works on a copy; the stored record only changes when it
    /// returns `Ok`, so a rejected transition leaves no trace.
    pub fn update_and_notify<F>(&self, id: JobId, mutate: F) -> Result<Job, DomainError>
    where
        F: FnOnce(&mut Job) -> Result<(), DomainError>,
    {
        let mut jobs = self.write();
        let stored = jobs
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("job"))?;

        let mut next = stored.clone();
        mutate(&mut next)?;
        *stored = next.clone();

        self.announce(&next);
        Ok(next)
    }

    fn announce(&self, job: &Job) {
        info!(
            target = "mdpress::jobs",
            job_id = %job.id,
            status = job.status.as_str(),
            progress = job.progress.unwrap_or_default(),
            files = job.files.len(),
            "Job updated"
        );
        self.notifier.publish(job);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(|poisoned| {
            error!(target = "mdpress::jobs", "Job registry lock poisoned; recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(|poisoned| {
            error!(target = "mdpress::jobs", "Job registry lock poisoned; recovering");
            PoisonError::into_inner(poisoned)
        })
    }
}
