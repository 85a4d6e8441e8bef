//! Cross-Tab Synchronization
//!
//! Watches the backend's storage notifications for removal of the persisted
//! session entry by another tab and turns it into a `StorageCleared` command.
//! The reconciler then forces a local sign-out without another backend
//! `sign_out` call, so no sibling tab keeps showing stale authenticated UI.

use super::reconciler::LifecycleCommand;
use crate::backend::StorageEvent;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) struct CrossTabSynchronizer {
    task: Option<JoinHandle<()>>,
}

impl CrossTabSynchronizer {
    /// Start forwarding session-key removals into the command queue
    pub(crate) fn start(
        mut events: broadcast::Receiver<StorageEvent>,
        session_key: String,
        commands: mpsc::Sender<LifecycleCommand>,
    ) -> Self {
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if event.key != session_key || event.new_value.is_some() {
                            debug!(key = %event.key, "ignoring unrelated storage event");
                            continue;
                        }
                        info!(key = %event.key, "session storage cleared by another tab");
                        if commands
                            .send(LifecycleCommand::StorageCleared)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "storage event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { task: Some(task) }
    }

    /// Cancel the forwarder; idempotent
    pub(crate) fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for CrossTabSynchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn forwards_only_session_key_removal() {
        let (storage_tx, storage_rx) = broadcast::channel(8);
        let (tx, mut rx) = mpsc::channel(8);
        let mut sync = CrossTabSynchronizer::start(storage_rx, "desk.session".to_string(), tx);

        storage_tx
            .send(StorageEvent {
                key: "desk.theme".to_string(),
                new_value: None,
            })
            .unwrap();
        storage_tx
            .send(StorageEvent {
                key: "desk.session".to_string(),
                new_value: Some("{}".to_string()),
            })
            .unwrap();
        storage_tx
            .send(StorageEvent {
                key: "desk.session".to_string(),
                new_value: None,
            })
            .unwrap();

        let command = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("forwarder should react to the removal");
        assert!(matches!(command, Some(LifecycleCommand::StorageCleared)));
        // The two unrelated events must not have produced commands
        assert!(rx.try_recv().is_err());

        sync.stop();
        sync.stop();
    }
}
