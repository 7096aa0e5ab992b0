// Hardware path driver capability
//
// One allocation/permission core drives several backends. Each backend only
// has to know how to program and unprogram a fully resolved `Route`.

use serde::{Deserialize, Serialize};

use crate::config::SlotConfig;
use crate::routing::matrix::PhysicalInterface;
use crate::stream::AudioInterface;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteKind {
    /// Modem voice leg to or from a physical interface
    Voice,
    /// File playback to a local endpoint
    LocalPlay,
    /// File playback injected into the voice uplink
    RemotePlay,
    /// Local endpoint recorded to file
    LocalCapture,
    /// Voice downlink recorded to file
    RemoteCapture,
}

impl RouteKind {
    /// Classify a legal route
    pub fn classify(input: AudioInterface, output: AudioInterface) -> Self {
        match (input, output) {
            (AudioInterface::FilePlay, AudioInterface::ModemVoiceTx) => RouteKind::RemotePlay,
            (AudioInterface::FilePlay, _) => RouteKind::LocalPlay,
            (AudioInterface::ModemVoiceRx, AudioInterface::FileCapture) => RouteKind::RemoteCapture,
            (_, AudioInterface::FileCapture) => RouteKind::LocalCapture,
            _ => RouteKind::Voice,
        }
    }

    pub fn is_multimedia(self) -> bool {
        self != RouteKind::Voice
    }

    pub fn is_playback(self) -> bool {
        matches!(self, RouteKind::LocalPlay | RouteKind::RemotePlay)
    }

    pub fn is_capture(self) -> bool {
        matches!(self, RouteKind::LocalCapture | RouteKind::RemoteCapture)
    }
}

/// Everything a backend needs to program one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub input: AudioInterface,
    pub output: AudioInterface,
    pub kind: RouteKind,
    pub physical: PhysicalInterface,
    /// Slot binding of the governing stream; `None` for voice routes
    pub binding: Option<SlotConfig>,
    pub front_end_hw_id: Option<u8>,
    /// Governing stream is on its last use and may close its slot controls
    pub release_slot_controls: bool,
    /// Endpoint stream is on its last use and may close shared codec controls
    pub release_endpoint_controls: bool,
}

impl Route {
    pub fn mixer_ctrl(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.mixer_ctrl.as_str())
    }
}

/// Result of programming a path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Programmed {
    pub hw_device_id: Option<u32>,
    /// Front end allocated by the DSP on first use of a slot
    pub front_end_hw_id: Option<u8>,
}

pub trait PathDriver: Send {
    fn name(&self) -> &'static str;

    /// Bring the hardware to a known state
    fn initialize(&mut self) -> anyhow::Result<()>;

    fn program(&mut self, route: &Route) -> anyhow::Result<Programmed>;

    fn unprogram(&mut self, route: &Route) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use AudioInterface::*;

    #[test]
    fn test_classification() {
        assert_eq!(RouteKind::classify(FilePlay, CodecSpeaker), RouteKind::LocalPlay);
        assert_eq!(RouteKind::classify(FilePlay, ModemVoiceTx), RouteKind::RemotePlay);
        assert_eq!(RouteKind::classify(CodecMic, FileCapture), RouteKind::LocalCapture);
        assert_eq!(RouteKind::classify(ModemVoiceRx, FileCapture), RouteKind::RemoteCapture);
        assert_eq!(RouteKind::classify(ModemVoiceRx, CodecSpeaker), RouteKind::Voice);
        assert!(!RouteKind::Voice.is_multimedia());
        assert!(RouteKind::RemotePlay.is_playback());
        assert!(RouteKind::LocalCapture.is_capture());
    }
}
