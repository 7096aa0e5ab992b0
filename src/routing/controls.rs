// Mute, gain and PCM settings
//
// Hardware mute is per physical interface, so the Rx and Tx halves of one
// interface keep separate intents but are always written together.

use colored::*;
use tracing::{error, info};

use crate::error::{Result, RoutingError};
use crate::stream::{AudioInterface, Half, StreamId};

use super::engine::RoutingManager;
use super::matrix::PhysicalInterface;
use super::pcm::{Companding, PcmMode};

const MAX_MIC_GAIN: u32 = 0xFFFF;
const MAX_VOICE_VOLUME: u32 = 8;
const MAX_TX_VOLUME: u32 = 0xFFFF;
const MAX_AUDIO_VOLUME: u32 = 0xFFFF;

fn gain_limit(interface: AudioInterface) -> Option<u32> {
    match interface {
        AudioInterface::CodecMic => Some(MAX_MIC_GAIN),
        AudioInterface::ModemVoiceRx => Some(MAX_VOICE_VOLUME),
        AudioInterface::ModemVoiceTx => Some(MAX_TX_VOLUME),
        AudioInterface::FilePlay => Some(MAX_AUDIO_VOLUME),
        _ => None,
    }
}

fn qmi_fault(what: &str, err: anyhow::Error) -> RoutingError {
    error!("{} {}: {:#}", "QMI_ERROR".red(), what, err);
    RoutingError::from(err.context(what.to_string()))
}

impl RoutingManager {
    /// Mute or unmute the half of the physical interface `id` represents
    pub fn mute(&mut self, id: StreamId, on: bool) -> Result<()> {
        self.process_notifications();
        self.ensure_available()?;
        let interface = self.streams.get(id)?.interface;

        match interface {
            AudioInterface::FilePlay => {
                let current = self
                    .audio
                    .get_multimedia_mute(self.profile)
                    .map_err(|e| qmi_fault("GET_AVMMUTE", e))?;
                if current != on {
                    self.audio
                        .set_multimedia_mute(self.profile, on)
                        .map_err(|e| qmi_fault("SET_AVMMUTE", e))?;
                }
                Ok(())
            }
            AudioInterface::FileCapture => Err(RoutingError::fault("File capture cannot be muted")),
            _ => {
                let family = interface
                    .family()
                    .ok_or_else(|| RoutingError::bad_parameter(format!("{} has no mute control", interface)))?;
                let index = family.index();
                let (mut ear, mut mic) = (self.ear_mute[index], self.mic_mute[index]);
                match interface.half() {
                    Half::Rx => ear = on,
                    Half::Tx => mic = on,
                }

                self.audio
                    .set_av_mute(self.profile, ear, mic)
                    .map_err(|e| qmi_fault("SET_AVMUTE", e))?;
                self.ear_mute[index] = ear;
                self.mic_mute[index] = mic;
                info!("{} {:?} ear={} mic={}", "MUTE".cyan(), family, ear, mic);
                Ok(())
            }
        }
    }

    pub fn mute_call_waiting_tone(&mut self, on: bool) -> Result<()> {
        self.process_notifications();
        self.ensure_available()?;
        self.audio
            .set_call_waiting_tone_mute(self.profile, on)
            .map_err(|e| qmi_fault("SET_AVMUTE cwt", e))
    }

    /// Whether the given half of an interface family is muted
    pub fn is_muted(&self, interface: AudioInterface) -> bool {
        match interface.family() {
            Some(family) => match interface.half() {
                Half::Rx => self.ear_mute[family.index()],
                Half::Tx => self.mic_mute[family.index()],
            },
            None => false,
        }
    }

    pub fn set_gain(&mut self, id: StreamId, gain: i32) -> Result<()> {
        self.process_notifications();
        self.ensure_available()?;
        let interface = self.streams.get(id)?.interface;
        let limit = gain_limit(interface)
            .ok_or_else(|| RoutingError::fault(format!("{} has no gain control", interface)))?;
        if gain < 0 || gain as u32 > limit {
            return Err(RoutingError::bad_parameter(format!(
                "Gain {} out of range for {} (0-{})",
                gain, interface, limit
            )));
        }

        let profile = self.profile;
        let value = gain as u32;
        let result = match interface {
            AudioInterface::CodecMic => self.audio.set_mic_gain(profile, value),
            AudioInterface::ModemVoiceRx => self.audio.set_voice_volume(profile, value),
            AudioInterface::ModemVoiceTx => self.audio.set_tx_volume(profile, value),
            _ => self.audio.set_audio_volume(profile, value),
        };
        result.map_err(|e| qmi_fault("set gain", e))?;

        self.streams.get_mut(id)?.params.gain = Some(gain);
        Ok(())
    }

    pub fn get_gain(&mut self, id: StreamId) -> Result<i32> {
        self.process_notifications();
        self.ensure_available()?;
        let interface = self.streams.get(id)?.interface;
        if gain_limit(interface).is_none() {
            return Err(RoutingError::fault(format!("{} has no gain control", interface)));
        }

        let profile = self.profile;
        let result = match interface {
            AudioInterface::CodecMic => self.audio.get_mic_gain(profile),
            AudioInterface::ModemVoiceRx => self.audio.get_voice_volume(profile),
            AudioInterface::ModemVoiceTx => self.audio.get_tx_volume(profile),
            _ => self.audio.get_audio_volume(profile),
        };
        let value = result.map_err(|e| qmi_fault("get gain", e))?;
        let gain = i32::try_from(value)
            .map_err(|_| RoutingError::fault(format!("Gain {} reported for {} is out of range", value, interface)))?;

        self.streams.get_mut(id)?.params.gain = Some(gain);
        Ok(gain)
    }

    /// Last gain set or read on the stream
    pub fn cached_gain(&self, id: StreamId) -> Result<Option<i32>> {
        Ok(self.streams.get(id)?.params.gain)
    }

    fn ensure_pcm_idle(&mut self) -> Result<()> {
        self.process_notifications();
        self.ensure_available()?;
        if self.iface_in_use == Some(PhysicalInterface::Pcm) {
            return Err(RoutingError::busy("PCM interface is carrying the voice call"));
        }
        Ok(())
    }

    pub fn set_pcm_sampling_rate(&mut self, rate: u32) -> Result<()> {
        self.ensure_pcm_idle()?;
        self.pcm.set_rate(rate)
    }

    pub fn pcm_sampling_rate(&self) -> u32 {
        self.pcm.rate
    }

    pub fn set_pcm_sampling_resolution(&mut self, bits_frame: u32) -> Result<()> {
        self.ensure_pcm_idle()?;
        self.pcm.set_bits_frame(bits_frame)
    }

    pub fn pcm_sampling_resolution(&self) -> u32 {
        self.pcm.bits_frame
    }

    pub fn set_pcm_companding(&mut self, companding: Companding) -> Result<()> {
        self.ensure_pcm_idle()?;
        self.pcm.companding = companding;
        Ok(())
    }

    pub fn pcm_companding(&self) -> Companding {
        self.pcm.companding
    }

    pub fn set_master_mode(&mut self, id: StreamId) -> Result<()> {
        self.set_pcm_mode(id, PcmMode::Master)
    }

    pub fn set_slave_mode(&mut self, id: StreamId) -> Result<()> {
        self.set_pcm_mode(id, PcmMode::Slave)
    }

    pub fn pcm_mode(&self) -> PcmMode {
        self.pcm.mode
    }

    fn set_pcm_mode(&mut self, id: StreamId, mode: PcmMode) -> Result<()> {
        self.ensure_pcm_idle()?;
        let interface = self.streams.get(id)?.interface;
        if !interface.is_pcm() {
            return Err(RoutingError::fault(format!("{} is not a PCM interface", interface)));
        }
        self.pcm.mode = mode;
        info!("{} {:?}", "PCM_MODE".cyan(), mode);
        Ok(())
    }
}
