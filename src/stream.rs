// Logical audio streams and their private parameter blocks
//
// Streams are opened and closed on behalf of the external stream manager. The
// routing engine only touches the device identifier, the hardware device id
// and the routing sub-struct of each stream's parameter block.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoutingError};

/// The fixed set of audio interfaces a stream can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AudioInterface {
    CodecMic,
    CodecSpeaker,
    UsbRx,
    UsbTx,
    ModemVoiceRx,
    ModemVoiceTx,
    PcmRx,
    PcmTx,
    I2sRx,
    I2sTx,
    FilePlay,
    FileCapture,
}

impl AudioInterface {
    pub const COUNT: usize = 12;

    pub const ALL: [AudioInterface; Self::COUNT] = [
        AudioInterface::CodecMic,
        AudioInterface::CodecSpeaker,
        AudioInterface::UsbRx,
        AudioInterface::UsbTx,
        AudioInterface::ModemVoiceRx,
        AudioInterface::ModemVoiceTx,
        AudioInterface::PcmRx,
        AudioInterface::PcmTx,
        AudioInterface::I2sRx,
        AudioInterface::I2sTx,
        AudioInterface::FilePlay,
        AudioInterface::FileCapture,
    ];

    /// Position in `ALL`, used to index the connection matrix
    pub fn index(self) -> usize {
        self as usize
    }

    /// Physical interface family for mute bookkeeping; file front-ends have none
    pub fn family(self) -> Option<InterfaceFamily> {
        match self {
            AudioInterface::CodecMic | AudioInterface::CodecSpeaker => Some(InterfaceFamily::Analog),
            AudioInterface::UsbRx | AudioInterface::UsbTx => Some(InterfaceFamily::Usb),
            AudioInterface::ModemVoiceRx | AudioInterface::ModemVoiceTx => Some(InterfaceFamily::Modem),
            AudioInterface::PcmRx | AudioInterface::PcmTx => Some(InterfaceFamily::Pcm),
            AudioInterface::I2sRx | AudioInterface::I2sTx => Some(InterfaceFamily::I2s),
            AudioInterface::FilePlay | AudioInterface::FileCapture => None,
        }
    }

    /// Which mute half the interface belongs to.
    ///
    /// The mic group gathers everything feeding the uplink, the ear group
    /// everything feeding a listener.
    pub fn half(self) -> Half {
        match self {
            AudioInterface::CodecMic
            | AudioInterface::ModemVoiceTx
            | AudioInterface::UsbTx
            | AudioInterface::PcmTx
            | AudioInterface::I2sTx
            | AudioInterface::FileCapture => Half::Tx,
            AudioInterface::CodecSpeaker
            | AudioInterface::ModemVoiceRx
            | AudioInterface::UsbRx
            | AudioInterface::PcmRx
            | AudioInterface::I2sRx
            | AudioInterface::FilePlay => Half::Rx,
        }
    }

    /// File playback and file capture are the only streams that bind a pool slot
    pub fn is_multimedia(self) -> bool {
        matches!(self, AudioInterface::FilePlay | AudioInterface::FileCapture)
    }

    pub fn is_pcm(self) -> bool {
        matches!(self, AudioInterface::PcmRx | AudioInterface::PcmTx)
    }
}

impl fmt::Display for AudioInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceFamily {
    Analog,
    Usb,
    Modem,
    Pcm,
    I2s,
}

impl InterfaceFamily {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Half {
    Rx,
    Tx,
}

/// Handle of an open stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub u32);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// Routing sub-struct of the private parameter block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingParameters {
    /// Open (input, output) pairs sharing the slot this stream governs
    pub usage_count: u32,
    /// Multimedia paths using this stream as their non-governing endpoint
    pub endpoint_users: u32,
    pub close_allowed: bool,
    pub front_end_hw_id: Option<u8>,
}

impl Default for RoutingParameters {
    fn default() -> Self {
        Self {
            usage_count: 0,
            endpoint_users: 0,
            close_allowed: true,
            front_end_hw_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaParameters {
    /// Last gain written to or read from the hardware
    pub gain: Option<i32>,
    pub routing: RoutingParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub interface: AudioInterface,
    /// Pool slot index, `None` while unbound
    pub device_identifier: Option<usize>,
    pub hw_device_id: Option<u32>,
    pub params: PaParameters,
}

impl Stream {
    fn new(interface: AudioInterface) -> Self {
        Self {
            interface,
            device_identifier: None,
            hw_device_id: None,
            params: PaParameters::default(),
        }
    }
}

/// Owns every open stream and hands out their ids
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: BTreeMap<StreamId, Stream>,
    next_id: u32,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_stream(&mut self, interface: AudioInterface) -> StreamId {
        let id = StreamId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.streams.insert(id, Stream::new(interface));
        id
    }

    /// Drop a stream and its parameter block. Streams still carrying routing
    /// usage cannot be closed.
    pub fn close_stream(&mut self, id: StreamId) -> Result<Stream> {
        let stream = self.get(id)?;
        let routing = &stream.params.routing;
        if routing.usage_count > 0 || routing.endpoint_users > 0 {
            return Err(RoutingError::busy(format!(
                "{} is still routed (usage {}, endpoint users {})",
                id, routing.usage_count, routing.endpoint_users
            )));
        }
        self.streams
            .remove(&id)
            .ok_or_else(|| RoutingError::bad_parameter(format!("Unknown {}", id)))
    }

    pub fn get(&self, id: StreamId) -> Result<&Stream> {
        self.streams
            .get(&id)
            .ok_or_else(|| RoutingError::bad_parameter(format!("Unknown {}", id)))
    }

    pub fn get_mut(&mut self, id: StreamId) -> Result<&mut Stream> {
        self.streams
            .get_mut(&id)
            .ok_or_else(|| RoutingError::bad_parameter(format!("Unknown {}", id)))
    }

    pub fn contains(&self, id: StreamId) -> bool {
        self.streams.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StreamId, &Stream)> {
        self.streams.iter().map(|(id, stream)| (*id, stream))
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mute_halves_match_groups() {
        let tx = [
            AudioInterface::CodecMic,
            AudioInterface::ModemVoiceTx,
            AudioInterface::UsbTx,
            AudioInterface::PcmTx,
            AudioInterface::I2sTx,
        ];
        for iface in AudioInterface::ALL {
            if iface.is_multimedia() {
                assert!(iface.family().is_none());
                continue;
            }
            let expected = if tx.contains(&iface) { Half::Tx } else { Half::Rx };
            assert_eq!(iface.half(), expected, "{} is in the wrong mute half", iface);
        }
    }

    #[test]
    fn test_indexes_follow_all_order() {
        for (i, iface) in AudioInterface::ALL.iter().enumerate() {
            assert_eq!(iface.index(), i);
        }
    }

    #[test]
    fn test_open_and_close() {
        let mut registry = StreamRegistry::new();
        let play = registry.open_stream(AudioInterface::FilePlay);
        let speaker = registry.open_stream(AudioInterface::CodecSpeaker);
        assert_ne!(play, speaker);
        assert_eq!(registry.len(), 2);

        let stream = registry.get(play).unwrap();
        assert_eq!(stream.device_identifier, None);
        assert!(stream.params.routing.close_allowed);

        registry.get_mut(play).unwrap().params.routing.usage_count = 1;
        assert_eq!(
            registry.close_stream(play).unwrap_err(),
            RoutingError::busy(format!("{} is still routed (usage 1, endpoint users 0)", play))
        );

        registry.get_mut(play).unwrap().params.routing.usage_count = 0;
        assert!(registry.close_stream(play).is_ok());
        assert!(matches!(
            registry.close_stream(play),
            Err(RoutingError::BadParameter(_))
        ));
    }
}
