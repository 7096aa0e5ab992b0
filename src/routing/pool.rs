// Multimedia device pool
//
// A fixed set of shared DSP channels. Slots are reference counted through the
// routing usage count of the stream that holds them; the pool itself performs
// no hardware I/O.

use colored::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SlotConfig;
use crate::error::{Result, RoutingError};
use crate::routing_debug;
use crate::stream::{AudioInterface, StreamId, StreamRegistry};

/// Direction a stream role scans the pool in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRole {
    Playback,
    Capture,
}

impl ScanRole {
    pub fn of(interface: AudioInterface) -> Option<Self> {
        match interface {
            AudioInterface::FilePlay => Some(ScanRole::Playback),
            AudioInterface::FileCapture => Some(ScanRole::Capture),
            _ => None,
        }
    }
}

/// Slot scan policy: playback takes slots from the top of the pool, capture
/// from the bottom, so one of each lands on different slots.
pub fn scan_order(role: ScanRole, capacity: usize) -> Vec<usize> {
    match role {
        ScanRole::Playback => (0..capacity).rev().collect(),
        ScanRole::Capture => (0..capacity).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultimediaDevice {
    pub in_use: bool,
    /// Stream currently holding the slot. The slot does not own the stream.
    pub holder: Option<StreamId>,
    pub binding: SlotConfig,
}

#[derive(Debug, Clone)]
pub struct DevicePool {
    slots: Vec<MultimediaDevice>,
}

impl DevicePool {
    pub fn new(bindings: &[SlotConfig]) -> Self {
        let slots = bindings
            .iter()
            .map(|binding| MultimediaDevice {
                in_use: false,
                holder: None,
                binding: binding.clone(),
            })
            .collect();
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[MultimediaDevice] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&MultimediaDevice> {
        self.slots.get(index)
    }

    pub fn in_use_count(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }

    /// Bind `id` to a slot, or bump its usage when it already holds one.
    pub fn acquire(&mut self, streams: &mut StreamRegistry, id: StreamId) -> Result<usize> {
        let stream = streams.get_mut(id)?;
        let role = ScanRole::of(stream.interface).ok_or_else(|| {
            RoutingError::bad_parameter(format!(
                "{} ({}) cannot hold a multimedia slot",
                id, stream.interface
            ))
        })?;

        if let Some(index) = stream.device_identifier {
            if self.slots.get(index).and_then(|s| s.holder) == Some(id) {
                stream.params.routing.usage_count += 1;
                routing_debug!(
                    "{} slot {} reused by {} (usage {})",
                    "SLOT_REUSE".cyan(),
                    index,
                    id,
                    stream.params.routing.usage_count
                );
                return Ok(index);
            }
        }

        let free = scan_order(role, self.slots.len())
            .into_iter()
            .find(|&i| !self.slots[i].in_use);

        let Some(index) = free else {
            warn!("{} no free slot for {} ({:?})", "POOL_EXHAUSTED".yellow(), id, role);
            return Err(RoutingError::fault(format!(
                "No free multimedia device for {}",
                id
            )));
        };

        let slot = &mut self.slots[index];
        slot.in_use = true;
        slot.holder = Some(id);
        stream.device_identifier = Some(index);
        stream.params.routing.usage_count += 1;

        info!(
            "{} slot {} ({}) -> {}",
            "SLOT_ACQUIRE".green(),
            index,
            slot.binding.mixer_ctrl,
            id
        );
        Ok(index)
    }

    /// Drop one use of `id`'s slot, freeing it at zero.
    pub fn release(&mut self, streams: &mut StreamRegistry, id: StreamId) -> Result<()> {
        let stream = streams.get_mut(id)?;
        let Some(index) = stream.device_identifier else {
            return Err(RoutingError::fault(format!("{} does not hold a slot", id)));
        };
        if stream.params.routing.usage_count == 0 {
            return Err(RoutingError::fault(format!("{} has no usage left to release", id)));
        }

        stream.params.routing.usage_count -= 1;
        if stream.params.routing.usage_count > 0 {
            routing_debug!(
                "{} slot {} still used by {} (usage {})",
                "SLOT_KEEP".cyan(),
                index,
                id,
                stream.params.routing.usage_count
            );
            return Ok(());
        }

        if let Some(slot) = self.slots.get_mut(index) {
            slot.in_use = false;
            slot.holder = None;
        }
        stream.device_identifier = None;
        stream.hw_device_id = None;

        info!("{} slot {} released by {}", "SLOT_RELEASE".green(), index, id);
        Ok(())
    }

    /// True when a file playback stream other than `except` holds a slot
    /// and `playing` reports it as still playing
    pub fn other_playback_active<F>(&self, streams: &StreamRegistry, except: StreamId, playing: F) -> bool
    where
        F: Fn(StreamId) -> bool,
    {
        self.slots.iter().any(|slot| match slot.holder {
            Some(holder) if slot.in_use && holder != except => {
                streams
                    .get(holder)
                    .map(|s| s.interface == AudioInterface::FilePlay)
                    .unwrap_or(false)
                    && playing(holder)
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> DevicePool {
        DevicePool::new(&[SlotConfig::new("MultiMedia1", 0), SlotConfig::new("MultiMedia2", 1)])
    }

    #[test]
    fn test_scan_order_policy() {
        assert_eq!(scan_order(ScanRole::Playback, 3), vec![2, 1, 0]);
        assert_eq!(scan_order(ScanRole::Capture, 3), vec![0, 1, 2]);
    }

    #[test]
    fn test_play_and_capture_take_opposite_ends() {
        let mut streams = StreamRegistry::new();
        let mut pool = pool();
        let play = streams.open_stream(AudioInterface::FilePlay);
        let capture = streams.open_stream(AudioInterface::FileCapture);

        assert_eq!(pool.acquire(&mut streams, play).unwrap(), 1);
        assert_eq!(pool.acquire(&mut streams, capture).unwrap(), 0);
        assert_eq!(pool.in_use_count(), 2);
    }

    #[test]
    fn test_reuse_counts_usage() {
        let mut streams = StreamRegistry::new();
        let mut pool = pool();
        let play = streams.open_stream(AudioInterface::FilePlay);

        assert_eq!(pool.acquire(&mut streams, play).unwrap(), 1);
        assert_eq!(pool.acquire(&mut streams, play).unwrap(), 1);
        assert_eq!(streams.get(play).unwrap().params.routing.usage_count, 2);
        assert_eq!(pool.in_use_count(), 1);

        pool.release(&mut streams, play).unwrap();
        assert!(pool.slot(1).unwrap().in_use, "Slot should stay bound while usage remains");
        pool.release(&mut streams, play).unwrap();
        assert!(!pool.slot(1).unwrap().in_use);
        assert_eq!(streams.get(play).unwrap().device_identifier, None);

        assert!(pool.release(&mut streams, play).is_err(), "Usage should never go negative");
    }

    #[test]
    fn test_exhaustion_and_bad_role() {
        let mut streams = StreamRegistry::new();
        let mut pool = pool();
        let a = streams.open_stream(AudioInterface::FilePlay);
        let b = streams.open_stream(AudioInterface::FilePlay);
        let c = streams.open_stream(AudioInterface::FilePlay);
        let speaker = streams.open_stream(AudioInterface::CodecSpeaker);

        pool.acquire(&mut streams, a).unwrap();
        pool.acquire(&mut streams, b).unwrap();
        let before = pool.slots().to_vec();
        assert!(matches!(pool.acquire(&mut streams, c), Err(RoutingError::Fault(_))));
        assert_eq!(pool.slots(), &before[..]);

        assert!(matches!(
            pool.acquire(&mut streams, speaker),
            Err(RoutingError::BadParameter(_))
        ));
        assert!(pool.other_playback_active(&streams, a, |_| true));
        assert!(!pool.other_playback_active(&streams, a, |id| id != b));
    }
}
