use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;
use tracing::info;

use crate::config::SwisyncConfig;
use crate::routing::permission::SyncAuthority;
use crate::routing_debug;

use super::protocol::{decode_answer, encode_audio, encode_register, SyncRequest};

const SOCKET_PATH: &str = "/tmp/swisync/swisync";
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking client of the synchronization authority. One connection per request.
pub struct SwisyncClient {
    socket_path: String,
    timeout: Duration,
    pid: i32,
}

impl SwisyncClient {
    pub fn new() -> Self {
        Self::with_socket_path(SOCKET_PATH.to_string())
    }

    pub fn with_socket_path(socket_path: String) -> Self {
        Self {
            socket_path,
            timeout: SOCKET_TIMEOUT,
            pid: std::process::id() as i32,
        }
    }

    pub fn from_config(config: &SwisyncConfig) -> Self {
        Self {
            timeout: config.timeout(),
            ..Self::with_socket_path(config.authority_socket.clone())
        }
    }

    fn connect(&self) -> Result<UnixStream> {
        let stream = UnixStream::connect(&self.socket_path)
            .context(format!("Failed to connect to swisync at {}", self.socket_path))?;

        stream
            .set_read_timeout(Some(self.timeout))
            .context("Failed to set read timeout")?;

        stream
            .set_write_timeout(Some(self.timeout))
            .context("Failed to set write timeout")?;

        Ok(stream)
    }

    pub fn is_authority_running(&self) -> bool {
        UnixStream::connect(&self.socket_path).is_ok()
    }
}

impl SyncAuthority for SwisyncClient {
    fn request(&self, request: &SyncRequest) -> Result<bool> {
        let mut stream = self.connect()?;

        let frame = encode_audio(self.pid, request);
        stream
            .write_all(&frame)
            .context("Failed to write swisync request")?;

        let mut answer = [0u8; 4];
        stream
            .read_exact(&mut answer)
            .context("Failed to read swisync answer")?;

        let allowed = decode_answer(answer);
        routing_debug!(
            "swisync {:#x} {:?} -> {}",
            request.msg_id,
            request.operation,
            allowed
        );
        Ok(allowed)
    }

    fn register(&self, notify_socket: &str) -> Result<()> {
        let mut stream = self.connect()?;
        let frame = encode_register(self.pid, notify_socket)?;
        stream
            .write_all(&frame)
            .context("Failed to write swisync registration")?;

        info!("{} {}", "SWISYNC_REGISTER".green(), notify_socket);
        Ok(())
    }
}

impl Default for SwisyncClient {
    fn default() -> Self {
        Self::new()
    }
}
