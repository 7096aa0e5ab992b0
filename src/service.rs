// Async routing service
//
// Wraps the manager in the single lock that guards all routing state. Stream
// manager calls and the notification loop both go through it, so a swisync
// push can never interleave with a path transition. Calls that reach the
// driver, QMI or swisync run on the blocking pool.

use std::sync::Arc;

use colored::*;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tracing::{info, warn};

use crate::error::{Result, RoutingError};
use crate::routing::{RoutingManager, RoutingSnapshot};
use crate::routing_debug;
use crate::stream::{AudioInterface, StreamId};
use crate::swisync::protocol::SyncNotification;

#[derive(Clone)]
pub struct RoutingService {
    manager: Arc<Mutex<RoutingManager>>,
    notify: Arc<Notify>,
    notifications: mpsc::UnboundedSender<SyncNotification>,
}

impl RoutingService {
    pub fn new(manager: RoutingManager) -> Self {
        let notify = manager.notifier();
        let notifications = manager.notification_sender();
        Self {
            manager: Arc::new(Mutex::new(manager)),
            notify,
            notifications,
        }
    }

    pub fn manager(&self) -> Arc<Mutex<RoutingManager>> {
        self.manager.clone()
    }

    /// Sender and wake-up handle for the notification listener
    pub fn notification_channel(&self) -> (mpsc::UnboundedSender<SyncNotification>, Arc<Notify>) {
        (self.notifications.clone(), self.notify.clone())
    }

    /// Run `f` against the manager on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RoutingManager) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let manager = self.manager.clone();
        tokio::task::spawn_blocking(move || f(&mut manager.blocking_lock()))
            .await
            .map_err(|e| RoutingError::fault(format!("Routing task failed: {}", e)))?
    }

    pub async fn initialize(&self) -> Result<()> {
        self.blocking(|m| m.initialize()).await
    }

    pub async fn open_stream(&self, interface: AudioInterface) -> StreamId {
        self.manager.lock().await.open_stream(interface)
    }

    pub async fn close_stream(&self, id: StreamId) -> Result<()> {
        self.blocking(move |m| m.close_stream(id)).await
    }

    pub async fn set_path(&self, input: StreamId, output: StreamId) -> Result<()> {
        self.blocking(move |m| m.set_path(input, output)).await
    }

    pub async fn reset_path(&self, input: StreamId, output: StreamId) -> Result<()> {
        self.blocking(move |m| m.reset_path(input, output)).await
    }

    pub async fn mute(&self, id: StreamId, on: bool) -> Result<()> {
        self.blocking(move |m| m.mute(id, on)).await
    }

    pub async fn set_gain(&self, id: StreamId, gain: i32) -> Result<()> {
        self.blocking(move |m| m.set_gain(id, gain)).await
    }

    pub async fn get_gain(&self, id: StreamId) -> Result<i32> {
        self.blocking(move |m| m.get_gain(id)).await
    }

    pub async fn snapshot(&self) -> RoutingSnapshot {
        self.manager.lock().await.snapshot()
    }

    /// Apply swisync notifications as they arrive, until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("{} notification loop started", "ROUTING_SERVICE".bright_blue());
        loop {
            tokio::select! {
                _ = self.notify.notified() => {
                    match self.blocking(|m| Ok(m.process_notifications())).await {
                        Ok(drained) => {
                            routing_debug!("notification batch applied, {} release(s) completed", drained);
                        }
                        Err(e) => warn!("{} {}", "ROUTING_SERVICE".yellow(), e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("{} notification loop stopped", "ROUTING_SERVICE".bright_blue());
    }
}

impl std::fmt::Debug for RoutingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingService").finish_non_exhaustive()
    }
}
