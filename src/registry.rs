//! Progress channels keyed by movie id.
//!
//! Delivery is best effort: a channel whose receiving side is gone is treated
//! as a disconnect and dropped from the registry. Notification never fails
//! the caller.

use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};

use crate::model::ProgressEvent;

/// Sender half of a job's progress channel.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Receiver half, drained by whoever is watching the job.
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Create a fresh progress channel.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Thread-safe registry of live progress channels.
///
/// Wrap in `Arc` and share between the job tasks and the WebSocket handler.
pub struct ConnectionRegistry {
    channels: RwLock<HashMap<String, ProgressSender>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Bind `sender` to `job_id`, replacing any earlier binding.
    pub async fn register(&self, job_id: impl Into<String>, sender: ProgressSender) {
        let job_id = job_id.into();
        let replaced = self
            .channels
            .write()
            .await
            .insert(job_id.clone(), sender)
            .is_some();
        tracing::debug!(job_id = %job_id, replaced, "progress channel registered");
    }

    /// Create a channel, register it and hand back the receiving side.
    pub async fn subscribe(&self, job_id: impl Into<String>) -> ProgressReceiver {
        let (tx, rx) = progress_channel();
        self.register(job_id, tx).await;
        rx
    }

    /// Remove the binding for `job_id`. Unknown ids are ignored.
    pub async fn unregister(&self, job_id: &str) {
        self.channels.write().await.remove(job_id);
    }

    /// Remove the binding only if it is still `sender`, so a stale connection
    /// closing does not drop its replacement.
    pub async fn release(&self, job_id: &str, sender: &ProgressSender) {
        let mut channels = self.channels.write().await;
        if channels
            .get(job_id)
            .is_some_and(|current| current.same_channel(sender))
        {
            channels.remove(job_id);
        }
    }

    /// Deliver `event` to the channel bound to `job_id`, if any.
    pub async fn notify(&self, job_id: &str, event: ProgressEvent) {
        let failed = {
            let channels = self.channels.read().await;
            let Some(sender) = channels.get(job_id) else {
                return;
            };
            match sender.send(event) {
                Ok(()) => None,
                Err(_) => Some(sender.clone()),
            }
        };

        if let Some(sender) = failed {
            tracing::debug!(job_id = %job_id, "progress channel closed, unregistering");
            self.release(job_id, &sender).await;
        }
    }

    pub async fn is_registered(&self, job_id: &str) -> bool {
        self.channels.read().await.contains_key(job_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
