// Permission coordinator
//
// Asks the synchronization authority before a local playback path is torn
// down and keeps the FIFO of teardowns it refused. The socket listener never
// touches routing state: it only enqueues notifications here, and the manager
// applies them under its own lock.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};

use crate::routing_debug;
use crate::stream::StreamId;
use crate::swisync::protocol::{SyncNotification, SyncOperation, SyncRequest};

/// The external peer with advisory veto power over local playback teardown
#[cfg_attr(test, mockall::automock)]
pub trait SyncAuthority: Send {
    /// Synchronous request; `Ok(true)` means allowed
    fn request(&self, request: &SyncRequest) -> anyhow::Result<bool>;

    /// Tell the authority where to push notifications
    fn register(&self, notify_socket: &str) -> anyhow::Result<()>;
}

/// Stand-in used when swisync is disabled in the config
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAllow;

impl SyncAuthority for AlwaysAllow {
    fn request(&self, _request: &SyncRequest) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn register(&self, _notify_socket: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A teardown postponed because the authority refused it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredRelease {
    pub input: StreamId,
    pub output: StreamId,
    pub queued_at: DateTime<Utc>,
}

pub struct PermissionCoordinator {
    authority: Box<dyn SyncAuthority>,
    deferred: VecDeque<DeferredRelease>,
    notifications_rx: mpsc::UnboundedReceiver<SyncNotification>,
    notifications_tx: mpsc::UnboundedSender<SyncNotification>,
    notify: Arc<Notify>,
}

impl PermissionCoordinator {
    pub fn new(authority: Box<dyn SyncAuthority>) -> Self {
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
        Self {
            authority,
            deferred: VecDeque::new(),
            notifications_rx,
            notifications_tx,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Sender handed to the socket listener
    pub fn notification_sender(&self) -> mpsc::UnboundedSender<SyncNotification> {
        self.notifications_tx.clone()
    }

    /// Woken whenever a notification has been enqueued
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    pub fn register(&self, notify_socket: &str) -> anyhow::Result<()> {
        self.authority.register(notify_socket)
    }

    /// Ask the authority. A communication error counts as allowed.
    fn ask(&self, operation: SyncOperation) -> bool {
        match self.authority.request(&SyncRequest::local_play(operation)) {
            Ok(allowed) => {
                routing_debug!("swisync answered {:?} -> allowed={}", operation, allowed);
                allowed
            }
            Err(e) => {
                warn!(
                    "{} swisync request {:?} failed, treating as allowed: {:#}",
                    "SWISYNC_WARNING".yellow(),
                    operation,
                    e
                );
                true
            }
        }
    }

    /// Announce a new local playback
    pub fn announce_activation(&self) -> bool {
        self.ask(SyncOperation::Activated)
    }

    /// Ask whether a local playback path may be deactivated. While another
    /// local playback still holds a slot the answer is no, without asking.
    pub fn request_deactivation(&self, other_playback_active: bool) -> bool {
        if other_playback_active {
            routing_debug!("another playback is active, deactivation refused locally");
            return false;
        }
        self.ask(SyncOperation::Deactivated)
    }

    pub fn defer(&mut self, input: StreamId, output: StreamId) {
        self.deferred.push_back(DeferredRelease {
            input,
            output,
            queued_at: Utc::now(),
        });
        info!(
            "{} {} -> {} queued for release ({} pending)",
            "PATH_DEFERRED".yellow(),
            input,
            output,
            self.deferred.len()
        );
    }

    /// Put back entries whose replay failed, ahead of anything queued since
    pub fn requeue_front(&mut self, entries: Vec<DeferredRelease>) {
        for entry in entries.into_iter().rev() {
            self.deferred.push_front(entry);
        }
    }

    pub fn remove_deferred(&mut self, input: StreamId, output: StreamId) -> bool {
        let before = self.deferred.len();
        self.deferred
            .retain(|entry| !(entry.input == input && entry.output == output));
        before != self.deferred.len()
    }

    pub fn is_deferred(&self, input: StreamId, output: StreamId) -> bool {
        self.deferred
            .iter()
            .any(|entry| entry.input == input && entry.output == output)
    }

    /// Take every deferred entry, oldest first
    pub fn take_deferred(&mut self) -> Vec<DeferredRelease> {
        self.deferred.drain(..).collect()
    }

    pub fn deferred(&self) -> impl Iterator<Item = &DeferredRelease> {
        self.deferred.iter()
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Next queued notification, if any
    pub fn poll_notification(&mut self) -> Option<SyncNotification> {
        self.notifications_rx.try_recv().ok()
    }
}

impl std::fmt::Debug for PermissionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCoordinator")
            .field("deferred", &self.deferred)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    #[test]
    fn test_communication_error_counts_as_allowed() {
        let mut authority = MockSyncAuthority::new();
        authority
            .expect_request()
            .with(eq(SyncRequest::local_play(SyncOperation::Deactivated)))
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let coordinator = PermissionCoordinator::new(Box::new(authority));
        assert!(coordinator.request_deactivation(false));
    }

    #[test]
    fn test_other_playback_skips_authority() {
        let mut authority = MockSyncAuthority::new();
        authority.expect_request().never();

        let coordinator = PermissionCoordinator::new(Box::new(authority));
        assert!(!coordinator.request_deactivation(true));
    }

    #[test]
    fn test_refusal_and_activation() {
        let mut authority = MockSyncAuthority::new();
        authority
            .expect_request()
            .with(eq(SyncRequest::local_play(SyncOperation::Activated)))
            .returning(|_| Ok(false));

        let coordinator = PermissionCoordinator::new(Box::new(authority));
        assert!(!coordinator.announce_activation());
    }

    #[test]
    fn test_deferred_queue_is_fifo() {
        let mut coordinator = PermissionCoordinator::new(Box::new(AlwaysAllow));
        coordinator.defer(StreamId(1), StreamId(2));
        coordinator.defer(StreamId(3), StreamId(4));
        coordinator.defer(StreamId(5), StreamId(6));
        assert!(coordinator.is_deferred(StreamId(3), StreamId(4)));

        assert!(coordinator.remove_deferred(StreamId(3), StreamId(4)));
        assert!(!coordinator.remove_deferred(StreamId(3), StreamId(4)));

        let drained = coordinator.take_deferred();
        let pairs: Vec<_> = drained.iter().map(|e| (e.input.0, e.output.0)).collect();
        assert_eq!(pairs, vec![(1, 2), (5, 6)]);
        assert_eq!(coordinator.deferred_len(), 0);

        coordinator.defer(StreamId(7), StreamId(8));
        coordinator.requeue_front(drained);
        let order: Vec<_> = coordinator.deferred().map(|e| e.input.0).collect();
        assert_eq!(order, vec![1, 5, 7]);
    }

    #[test]
    fn test_notifications_are_queued() {
        let mut coordinator = PermissionCoordinator::new(Box::new(AlwaysAllow));
        let tx = coordinator.notification_sender();
        assert!(coordinator.poll_notification().is_none());

        tx.send(SyncNotification::deactivate_now()).unwrap();
        assert_eq!(
            coordinator.poll_notification(),
            Some(SyncNotification::deactivate_now())
        );
        assert!(coordinator.poll_notification().is_none());
    }
}
