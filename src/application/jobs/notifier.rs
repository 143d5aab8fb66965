use tokio::sync::broadcast;

use crate::domain::jobs::Job;

/// Event name every job snapshot is published under.
pub const JOB_UPDATE_EVENT: &str = "job-update";

/// Receives a full job snapshot after every mutation.
pub trait JobNotifier: Send + Sync {
    fn publish(&self, job: &Job);
}

/// Fan-out to live subscribers. Subscribers that are not connected, or fall
/// behind the channel capacity, miss updates; nothing is replayed.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Job>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Job> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl JobNotifier for BroadcastNotifier {
    fn publish(&self, job: &Job) {
        // No subscribers is fine.
        let _ = self.sender.send(job.clone());
    }
}
