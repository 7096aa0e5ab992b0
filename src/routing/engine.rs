// Path set/reset engine
//
// `RoutingManager` owns every piece of routing state: the stream registry,
// the connection matrix, the device pool, the permission coordinator, the
// deferred releases and the mute table. Callers hold it behind one lock, so
// every state transition below runs to completion without interleaving.
//
// Per (input, output) pair: Unrouted -> Routed -> (PendingRelease) -> Unrouted

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use tracing::{error, info, warn};

use crate::backend::qmi::{AvConfigRequest, QmiAudioService};
use crate::config::RoutingConfig;
use crate::error::{Result, RoutingError};
use crate::routing_debug;
use crate::stream::{AudioInterface, InterfaceFamily, Stream, StreamId, StreamRegistry};
use crate::swisync::protocol::{SyncNotification, SyncOperation, SYNC_AUDIO_LOCAL_PLAY};

use super::driver::{PathDriver, Route, RouteKind};
use super::matrix::{ConnectionMatrix, PhysicalInterface};
use super::pcm::PcmSettings;
use super::permission::{DeferredRelease, PermissionCoordinator, SyncAuthority};
use super::pool::{DevicePool, MultimediaDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathState {
    Routed,
    /// Teardown refused by the authority, hardware left as is
    PendingRelease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct PathEntry {
    pub state: PathState,
    pub kind: RouteKind,
    pub physical: PhysicalInterface,
    /// False when programming the hardware failed; teardown then skips the
    /// inverse command
    pub programmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSnapshot {
    pub input: StreamId,
    pub output: StreamId,
    pub kind: RouteKind,
    pub physical: PhysicalInterface,
    pub state: PathState,
    pub programmed: bool,
}

/// Diagnostic view of the routing state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingSnapshot {
    pub taken_at: DateTime<Utc>,
    pub available: bool,
    pub backend: String,
    pub profile: u8,
    pub slots: Vec<MultimediaDevice>,
    pub deferred: Vec<DeferredRelease>,
    pub paths: Vec<PathSnapshot>,
    pub iface_in_use: Option<PhysicalInterface>,
}

type PairKey = (StreamId, StreamId);

pub struct RoutingManager {
    pub(super) streams: StreamRegistry,
    pub(super) matrix: ConnectionMatrix,
    pub(super) pool: DevicePool,
    pub(super) permission: PermissionCoordinator,
    pub(super) driver: Box<dyn PathDriver>,
    pub(super) audio: Arc<dyn QmiAudioService>,
    pub(super) paths: BTreeMap<PairKey, PathEntry>,
    /// Physical interface currently carrying the voice call
    pub(super) iface_in_use: Option<PhysicalInterface>,
    pub(super) ear_mute: [bool; InterfaceFamily::COUNT],
    pub(super) mic_mute: [bool; InterfaceFamily::COUNT],
    pub(super) pcm: PcmSettings,
    pub(super) profile: u8,
    pub(super) acdb_device: u8,
    pub(super) available: bool,
    default_profile: u8,
    ready_timeout: std::time::Duration,
    notify_socket: Option<String>,
}

impl RoutingManager {
    pub fn new(
        config: &RoutingConfig,
        driver: Box<dyn PathDriver>,
        audio: Arc<dyn QmiAudioService>,
        authority: Box<dyn SyncAuthority>,
    ) -> Self {
        let notify_socket = config
            .swisync
            .enabled
            .then(|| config.swisync.notify_socket.clone());

        Self {
            streams: StreamRegistry::new(),
            matrix: ConnectionMatrix::new(),
            pool: DevicePool::new(&config.slots),
            permission: PermissionCoordinator::new(authority),
            driver,
            audio,
            paths: BTreeMap::new(),
            iface_in_use: None,
            ear_mute: [false; InterfaceFamily::COUNT],
            mic_mute: [false; InterfaceFamily::COUNT],
            pcm: PcmSettings::default(),
            profile: config.default_profile,
            acdb_device: 0,
            available: false,
            default_profile: config.default_profile,
            ready_timeout: config.ready_timeout(),
            notify_socket,
        }
    }

    /// Startup handshake with the audio service and the hardware.
    ///
    /// Until this succeeds every routing operation reports `Unavailable`.
    pub fn initialize(&mut self) -> Result<()> {
        if let Err(e) = self.audio.wait_ready(self.ready_timeout) {
            error!("{} audio service not ready: {:#}", "QMI_ERROR".red(), e);
            self.available = false;
            return Err(RoutingError::Unavailable);
        }

        self.profile = match self.audio.get_profile() {
            Ok(profile) => profile,
            Err(e) => {
                warn!(
                    "{} cannot read profile, using default {}: {:#}",
                    "QMI_WARNING".yellow(),
                    self.default_profile,
                    e
                );
                if let Err(e) = self.audio.set_profile(self.default_profile) {
                    warn!("{} cannot set default profile: {:#}", "QMI_WARNING".yellow(), e);
                }
                self.default_profile
            }
        };

        self.acdb_device = self
            .audio
            .get_av_config_device(self.profile)
            .unwrap_or_else(|e| {
                warn!("{} no ACDB device for profile {}: {:#}", "QMI_WARNING".yellow(), self.profile, e);
                0
            });

        self.iface_in_use = None;
        self.pcm = PcmSettings::default();

        self.driver.initialize().map_err(|e| {
            error!("{} {} driver init failed: {:#}", "DRIVER_ERROR".bright_red(), self.driver.name(), e);
            RoutingError::from(e)
        })?;

        if let Some(socket) = &self.notify_socket {
            match self.permission.register(socket) {
                Ok(()) => info!("{} notifications on {}", "SWISYNC_REGISTERED".green(), socket),
                Err(e) => warn!("{} registration failed: {:#}", "SWISYNC_WARNING".yellow(), e),
            }
        }

        self.available = true;
        info!(
            "{} backend {} profile {} device {}",
            "ROUTING_READY".green(),
            self.driver.name(),
            self.profile,
            self.acdb_device
        );
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub(super) fn ensure_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(RoutingError::Unavailable)
        }
    }

    // Streams

    pub fn open_stream(&mut self, interface: AudioInterface) -> StreamId {
        let id = self.streams.open_stream(interface);
        routing_debug!("opened {} ({})", id, interface);
        id
    }

    /// Destroy a stream. Streams still part of a routed or pending path are `Busy`.
    pub fn close_stream(&mut self, id: StreamId) -> Result<()> {
        self.process_notifications();
        if let Some(((input, output), _)) = self
            .paths
            .iter()
            .find(|((input, output), _)| *input == id || *output == id)
        {
            return Err(RoutingError::busy(format!(
                "{} is part of path {} -> {}",
                id, input, output
            )));
        }
        self.streams.close_stream(id)?;
        Ok(())
    }

    pub fn stream(&self, id: StreamId) -> Result<&Stream> {
        self.streams.get(id)
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    pub fn pool(&self) -> &DevicePool {
        &self.pool
    }

    pub fn path_state(&self, input: StreamId, output: StreamId) -> Option<PathState> {
        self.paths.get(&(input, output)).map(|entry| entry.state)
    }

    pub fn deferred_len(&self) -> usize {
        self.permission.deferred_len()
    }

    pub fn iface_in_use(&self) -> Option<PhysicalInterface> {
        self.iface_in_use
    }

    pub fn notification_sender(&self) -> mpsc::UnboundedSender<SyncNotification> {
        self.permission.notification_sender()
    }

    pub fn notifier(&self) -> Arc<Notify> {
        self.permission.notifier()
    }

    // Path set/reset

    fn resolve(&self, input: StreamId, output: StreamId) -> Result<(RouteKind, PhysicalInterface)> {
        let input_if = self.streams.get(input)?.interface;
        let output_if = self.streams.get(output)?.interface;
        let physical = self.matrix.lookup(input_if, output_if).ok_or_else(|| {
            RoutingError::fault(format!("Route {} -> {} is not supported", input_if, output_if))
        })?;
        Ok((RouteKind::classify(input_if, output_if), physical))
    }

    /// (governing, endpoint) streams of a multimedia pair
    fn governing(kind: RouteKind, input: StreamId, output: StreamId) -> (StreamId, StreamId) {
        if kind.is_capture() {
            (output, input)
        } else {
            (input, output)
        }
    }

    /// Connect `input` to `output`
    pub fn set_path(&mut self, input: StreamId, output: StreamId) -> Result<()> {
        self.process_notifications();
        self.ensure_available()?;
        let (kind, physical) = self.resolve(input, output)?;
        let key = (input, output);

        if let Some(entry) = self.paths.get_mut(&key) {
            match entry.state {
                PathState::Routed => {
                    routing_debug!("{} -> {} already routed", input, output);
                    return Ok(());
                }
                PathState::PendingRelease => {
                    entry.state = PathState::Routed;
                    self.permission.remove_deferred(input, output);
                    let (governing, _) = Self::governing(kind, input, output);
                    let sibling_pending = self.paths.iter().any(|((i, o), e)| {
                        e.state == PathState::PendingRelease && Self::governing(e.kind, *i, *o).0 == governing
                    });
                    self.streams.get_mut(governing)?.params.routing.close_allowed = !sibling_pending;
                    info!("{} {} -> {} kept", "PATH_REVIVED".green(), input, output);
                    return Ok(());
                }
            }
        }

        if kind.is_multimedia() {
            self.set_multimedia_path(input, output, kind, physical)
        } else {
            self.set_voice_path(input, output, physical)
        }
    }

    fn set_multimedia_path(
        &mut self,
        input: StreamId,
        output: StreamId,
        kind: RouteKind,
        physical: PhysicalInterface,
    ) -> Result<()> {
        let (governing, endpoint) = Self::governing(kind, input, output);

        if kind == RouteKind::LocalPlay {
            if self.permission.deferred_len() > 0 && self.permission.request_deactivation(false) {
                self.drain_deferred();
            }
            if !self.permission.announce_activation() {
                error!("{} swisync discards the playback", "SWISYNC_ERROR".red());
                return Err(RoutingError::fault("Playback refused by the synchronization authority"));
            }
        }

        let slot = self.pool.acquire(&mut self.streams, governing)?;
        self.streams.get_mut(endpoint)?.params.routing.endpoint_users += 1;

        let route = self.build_route(input, output, kind, physical, false)?;
        let programmed = self.driver.program(&route);

        let entry = PathEntry {
            state: PathState::Routed,
            kind,
            physical,
            programmed: programmed.is_ok(),
        };
        self.paths.insert((input, output), entry);

        match programmed {
            Ok(programmed) => {
                let stream = self.streams.get_mut(governing)?;
                if programmed.hw_device_id.is_some() {
                    stream.hw_device_id = programmed.hw_device_id;
                }
                if programmed.front_end_hw_id.is_some() {
                    stream.params.routing.front_end_hw_id = programmed.front_end_hw_id;
                }
                info!(
                    "{} {} -> {} ({:?} on slot {})",
                    "PATH_SET".green(),
                    input,
                    output,
                    kind,
                    slot
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "{} {} -> {} not programmed, slot {} kept until reset: {:#}",
                    "DRIVER_ERROR".bright_red(),
                    input,
                    output,
                    slot,
                    e
                );
                Err(e.into())
            }
        }
    }

    fn set_voice_path(
        &mut self,
        input: StreamId,
        output: StreamId,
        physical: PhysicalInterface,
    ) -> Result<()> {
        let entry = PathEntry {
            state: PathState::Routed,
            kind: RouteKind::Voice,
            physical,
            programmed: true,
        };

        if self.iface_in_use == Some(physical) {
            routing_debug!("{:?} already carries the voice call", physical);
            self.paths.insert((input, output), entry);
            return Ok(());
        }

        let table = |iface: PhysicalInterface| (iface == PhysicalInterface::Pcm).then(|| self.pcm.table());
        let mut request = AvConfigRequest {
            profile: self.profile,
            device: self.acdb_device,
            piface: physical.qmi_id(),
            iface_table: table(physical),
            tx_piface: None,
            tx_iface_table: None,
        };

        if let Some(current) = self.iface_in_use {
            let uplink = self.streams.get(output)?.interface == AudioInterface::ModemVoiceTx;
            if uplink {
                request.piface = current.qmi_id();
                request.iface_table = table(current);
                request.tx_piface = Some(physical.qmi_id());
                request.tx_iface_table = table(physical);
            } else {
                request.tx_piface = Some(current.qmi_id());
                request.tx_iface_table = table(current);
            }
        }

        self.audio.set_av_config(&request).map_err(|e| {
            error!("{} SET_AVCFG {:?}: {:#}", "QMI_ERROR".red(), physical, e);
            RoutingError::from(e)
        })?;

        self.iface_in_use = Some(physical);
        self.paths.insert((input, output), entry);
        info!("{} {} -> {} over {:?}", "VOICE_SET".green(), input, output, physical);
        Ok(())
    }

    /// Disconnect `input` from `output`. A refused local playback teardown
    /// is deferred and still reported as success.
    pub fn reset_path(&mut self, input: StreamId, output: StreamId) -> Result<()> {
        self.process_notifications();
        self.ensure_available()?;
        let (kind, _) = self.resolve(input, output)?;
        let key = (input, output);

        let Some(entry) = self.paths.get(&key).copied() else {
            if kind.is_multimedia() {
                routing_debug!("{} -> {} not routed, nothing to reset", input, output);
                return Ok(());
            }
            return Err(RoutingError::fault(format!(
                "Voice path {} -> {} was never set",
                input, output
            )));
        };

        if entry.state == PathState::PendingRelease {
            routing_debug!("{} -> {} already deferred", input, output);
            return Ok(());
        }

        match kind {
            RouteKind::Voice => self.reset_voice_path(key, entry),
            RouteKind::LocalPlay => {
                let other_playback = self
                    .pool
                    .other_playback_active(&self.streams, input, |id| self.has_routed_path(id));
                if !self.permission.request_deactivation(other_playback) {
                    self.streams.get_mut(input)?.params.routing.close_allowed = false;
                    self.permission.defer(input, output);
                    if let Some(entry) = self.paths.get_mut(&key) {
                        entry.state = PathState::PendingRelease;
                    }
                    return Ok(());
                }
                self.streams.get_mut(input)?.params.routing.close_allowed = true;
                let result = self.teardown(key);
                self.drain_deferred();
                result
            }
            _ => self.teardown(key),
        }
    }

    fn reset_voice_path(&mut self, key: PairKey, entry: PathEntry) -> Result<()> {
        self.paths.remove(&key);
        let still_used = self
            .paths
            .values()
            .any(|e| e.kind == RouteKind::Voice && Some(e.physical) == self.iface_in_use);
        if !still_used && self.iface_in_use == Some(entry.physical) {
            self.iface_in_use = None;
        }
        info!("{} {} -> {}", "VOICE_RESET".green(), key.0, key.1);
        Ok(())
    }

    /// Shared-control release flags for the route being torn down
    fn release_flags(&self, key: PairKey, kind: RouteKind, physical: PhysicalInterface) -> Result<(bool, bool)> {
        let (governing, endpoint) = Self::governing(kind, key.0, key.1);
        // Governing streams of the other paths driving the same controls
        let others: Vec<StreamId> = self
            .paths
            .iter()
            .filter(|(k, e)| **k != key && e.kind == kind && e.physical == physical)
            .map(|(k, _)| Self::governing(kind, k.0, k.1).0)
            .collect();
        let slot_shared = others.contains(&governing);
        let endpoint_shared = !others.is_empty();

        let governing_allowed = self.streams.get(governing)?.params.routing.close_allowed;
        let endpoint_allowed = self.streams.get(endpoint)?.params.routing.close_allowed;
        Ok((
            governing_allowed && !slot_shared,
            endpoint_allowed && !endpoint_shared,
        ))
    }

    fn build_route(
        &self,
        input: StreamId,
        output: StreamId,
        kind: RouteKind,
        physical: PhysicalInterface,
        releasing: bool,
    ) -> Result<Route> {
        let (governing, _) = Self::governing(kind, input, output);
        let stream = self.streams.get(governing)?;
        let binding = stream
            .device_identifier
            .and_then(|index| self.pool.slot(index))
            .map(|slot| slot.binding.clone());

        let (release_slot_controls, release_endpoint_controls) = if releasing {
            self.release_flags((input, output), kind, physical)?
        } else {
            (false, false)
        };

        Ok(Route {
            input: self.streams.get(input)?.interface,
            output: self.streams.get(output)?.interface,
            kind,
            physical,
            binding,
            front_end_hw_id: stream.params.routing.front_end_hw_id,
            release_slot_controls,
            release_endpoint_controls,
        })
    }

    /// True while `id` governs at least one routed multimedia pair
    fn has_routed_path(&self, id: StreamId) -> bool {
        self.paths.iter().any(|((input, output), entry)| {
            entry.state == PathState::Routed
                && entry.kind.is_multimedia()
                && Self::governing(entry.kind, *input, *output).0 == id
        })
    }

    /// Unprogram a multimedia pair and give its slot back
    fn teardown(&mut self, key: PairKey) -> Result<()> {
        let entry = self
            .paths
            .get(&key)
            .copied()
            .ok_or_else(|| RoutingError::fault(format!("No path {} -> {}", key.0, key.1)))?;
        let (governing, endpoint) = Self::governing(entry.kind, key.0, key.1);

        if entry.programmed {
            let route = self.build_route(key.0, key.1, entry.kind, entry.physical, true)?;
            self.driver.unprogram(&route).map_err(|e| {
                error!(
                    "{} {} -> {} reset failed: {:#}",
                    "DRIVER_ERROR".bright_red(),
                    key.0,
                    key.1,
                    e
                );
                RoutingError::from(e)
            })?;
        }

        self.pool.release(&mut self.streams, governing)?;
        let stream = self.streams.get_mut(governing)?;
        if stream.params.routing.usage_count == 0 {
            stream.params.routing.front_end_hw_id = None;
        }
        let endpoint = self.streams.get_mut(endpoint)?;
        endpoint.params.routing.endpoint_users = endpoint.params.routing.endpoint_users.saturating_sub(1);

        self.paths.remove(&key);
        info!("{} {} -> {}", "PATH_RESET".green(), key.0, key.1);
        Ok(())
    }

    /// Replay every deferred release, oldest first. Entries whose teardown
    /// fails go back to the front of the queue.
    fn drain_deferred(&mut self) -> usize {
        let entries = self.permission.take_deferred();
        if entries.is_empty() {
            return 0;
        }

        let mut failed = Vec::new();
        let mut drained = 0;
        for entry in entries {
            let key = (entry.input, entry.output);
            match self.paths.get(&key).map(|e| e.state) {
                Some(PathState::PendingRelease) => {}
                _ => {
                    routing_debug!("dropping stale deferred entry {} -> {}", key.0, key.1);
                    continue;
                }
            }

            if let Ok(stream) = self.streams.get_mut(entry.input) {
                stream.params.routing.close_allowed = true;
            }
            match self.teardown(key) {
                Ok(()) => drained += 1,
                Err(e) => {
                    warn!(
                        "{} deferred {} -> {} kept: {}",
                        "DRAIN_WARNING".yellow(),
                        key.0,
                        key.1,
                        e
                    );
                    failed.push(entry);
                }
            }
        }

        self.permission.requeue_front(failed);
        info!(
            "{} {} deferred release(s) completed, {} left",
            "DEFERRED_DRAIN".green(),
            drained,
            self.permission.deferred_len()
        );
        drained
    }

    /// Apply queued swisync notifications; returns the number of deferred
    /// releases completed.
    pub fn process_notifications(&mut self) -> usize {
        let mut drained = 0;
        while let Some(notification) = self.permission.poll_notification() {
            if notification.msg_id != SYNC_AUDIO_LOCAL_PLAY {
                warn!(
                    "{} ignoring notification {:#x}",
                    "SWISYNC_WARNING".yellow(),
                    notification.msg_id
                );
                continue;
            }
            match notification.operation {
                SyncOperation::Activated => {
                    error!("{} swisync postponed a playback", "SWISYNC_ERROR".red());
                }
                SyncOperation::Deactivated => {
                    drained += self.drain_deferred();
                }
            }
        }
        drained
    }

    pub fn snapshot(&self) -> RoutingSnapshot {
        RoutingSnapshot {
            taken_at: Utc::now(),
            available: self.available,
            backend: self.driver.name().to_string(),
            profile: self.profile,
            slots: self.pool.slots().to_vec(),
            deferred: self.permission.deferred().cloned().collect(),
            paths: self
                .paths
                .iter()
                .map(|((input, output), entry)| PathSnapshot {
                    input: *input,
                    output: *output,
                    kind: entry.kind,
                    physical: entry.physical,
                    state: entry.state,
                    programmed: entry.programmed,
                })
                .collect(),
            iface_in_use: self.iface_in_use,
        }
    }
}

impl std::fmt::Debug for RoutingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingManager")
            .field("driver", &self.driver.name())
            .field("available", &self.available)
            .field("slots_in_use", &self.pool.in_use_count())
            .field("paths", &self.paths.len())
            .field("deferred", &self.permission.deferred_len())
            .finish()
    }
}
