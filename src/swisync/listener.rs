// Swisync notification listener
//
// Accepts the authority's pushes on the notify socket. It never touches the
// routing state: decoded audio notifications are only enqueued and the
// service loop is woken to apply them under the manager lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::*;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Notify};
use tracing::{error, info, warn};

use crate::routing_debug;

use super::protocol::{decode, Frame, SyncNotification, FRAME_LEN};

pub struct NotificationListener {
    listener: UnixListener,
    path: PathBuf,
}

impl NotificationListener {
    /// Bind the notify socket, replacing a stale socket file
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
        }

        let listener = UnixListener::bind(&path)
            .with_context(|| format!("Failed to bind notify socket {}", path.display()))?;
        info!("{} {}", "SWISYNC_LISTEN".green(), path.display());
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until the notification receiver is dropped
    pub async fn run(self, tx: mpsc::UnboundedSender<SyncNotification>, notify: Arc<Notify>) {
        loop {
            if tx.is_closed() {
                break;
            }
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let tx = tx.clone();
                    let notify = notify.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, tx, notify).await {
                            warn!("{} {:#}", "SWISYNC_WARNING".yellow(), e);
                        }
                    });
                }
                Err(e) => {
                    error!("{} accept failed: {}", "SWISYNC_ERROR".red(), e);
                    break;
                }
            }
        }
        info!("{} {}", "SWISYNC_STOPPED".yellow(), self.path.display());
    }
}

impl Drop for NotificationListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    tx: mpsc::UnboundedSender<SyncNotification>,
    notify: Arc<Notify>,
) -> Result<()> {
    loop {
        let mut frame = [0u8; FRAME_LEN];
        match stream.read_exact(&mut frame).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e).context("Failed to read swisync notification"),
        }

        match decode(&frame)? {
            Frame::Audio { pid, notification } => {
                routing_debug!("swisync notification from pid {}: {:?}", pid, notification);
                tx.send(notification)
                    .map_err(|_| anyhow::anyhow!("Routing manager is gone"))?;
                notify.notify_one();
            }
            Frame::Register { socket_name, .. } => {
                warn!("{} unexpected registration for {}", "SWISYNC_WARNING".yellow(), socket_name);
            }
        }
    }
}
