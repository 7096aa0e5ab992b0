// QMI audio service boundary and the QMI media path driver
//
// The byte-level QMI transport lives elsewhere. `QmiAudioService` is the
// request/response surface the routing engine needs from it, and
// `LoopbackQmiService` is an in-memory implementation used by the daemon when
// no transport is wired in.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use colored::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::routing::driver::{PathDriver, Programmed, Route, RouteKind};

/// DAI operation type for SET MEDIA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperateType {
    Playback,
    Record,
}

impl OperateType {
    pub fn code(self) -> u8 {
        match self {
            OperateType::Playback => 0,
            OperateType::Record => 1,
        }
    }
}

/// Audio/voice configuration request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvConfigRequest {
    pub profile: u8,
    pub device: u8,
    pub piface: u8,
    pub iface_table: Option<[u8; 5]>,
    /// Uplink interface when rx and tx use different interfaces
    pub tx_piface: Option<u8>,
    pub tx_iface_table: Option<[u8; 5]>,
}

#[cfg_attr(test, mockall::automock)]
pub trait QmiAudioService: Send + Sync {
    fn wait_ready(&self, timeout: Duration) -> Result<()>;

    fn get_profile(&self) -> Result<u8>;
    fn set_profile(&self, profile: u8) -> Result<()>;
    /// ACDB device bound to `profile`
    fn get_av_config_device(&self, profile: u8) -> Result<u8>;
    fn set_av_config(&self, request: &AvConfigRequest) -> Result<()>;

    fn set_av_mute(&self, profile: u8, ear_mute: bool, mic_mute: bool) -> Result<()>;
    fn get_multimedia_mute(&self, profile: u8) -> Result<bool>;
    fn set_multimedia_mute(&self, profile: u8, mute: bool) -> Result<()>;
    fn set_call_waiting_tone_mute(&self, profile: u8, mute: bool) -> Result<()>;

    fn set_mic_gain(&self, profile: u8, gain: u32) -> Result<()>;
    fn get_mic_gain(&self, profile: u8) -> Result<u32>;
    fn set_voice_volume(&self, profile: u8, level: u32) -> Result<()>;
    fn get_voice_volume(&self, profile: u8) -> Result<u32>;
    fn set_tx_volume(&self, profile: u8, volume: u32) -> Result<()>;
    fn get_tx_volume(&self, profile: u8) -> Result<u32>;
    fn set_audio_volume(&self, profile: u8, volume: u32) -> Result<()>;
    fn get_audio_volume(&self, profile: u8) -> Result<u32>;

    /// Open a front end on `backend_dai`; returns the front end hardware id
    fn set_media(&self, backend_dai: u8, operate_type: OperateType) -> Result<u8>;
    fn add_media(&self, backend_dai: u8, front_end: u8) -> Result<()>;
    fn reset_media(&self, backend_dai: u8, front_end: u8) -> Result<()>;
}

/// Requests seen by the loopback service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QmiRequest {
    SetProfile(u8),
    SetAvConfig(AvConfigRequest),
    SetAvMute { ear: bool, mic: bool },
    SetMultimediaMute(bool),
    SetCallWaitingToneMute(bool),
    SetMicGain(u32),
    SetVoiceVolume(u32),
    SetTxVolume(u32),
    SetAudioVolume(u32),
    SetMedia { backend_dai: u8, operate_type: u8 },
    AddMedia { backend_dai: u8, front_end: u8 },
    ResetMedia { backend_dai: u8, front_end: u8 },
}

/// Requests kept by the loopback service; older ones are dropped
pub const REQUEST_HISTORY: usize = 256;

#[derive(Debug, Default)]
struct LoopbackState {
    profile: u8,
    multimedia_mute: bool,
    mic_gain: u32,
    voice_volume: u32,
    tx_volume: u32,
    audio_volume: u32,
    next_front_end: u8,
    requests: VecDeque<QmiRequest>,
}

impl LoopbackState {
    fn push(&mut self, request: QmiRequest) {
        if self.requests.len() == REQUEST_HISTORY {
            self.requests.pop_front();
        }
        self.requests.push_back(request);
    }
}

/// In-memory QMI audio service. Every request succeeds and the most recent
/// `REQUEST_HISTORY` are recorded.
#[derive(Debug, Default)]
pub struct LoopbackQmiService {
    state: Mutex<LoopbackState>,
}

impl LoopbackQmiService {
    pub fn new(profile: u8) -> Self {
        Self {
            state: Mutex::new(LoopbackState {
                profile,
                ..LoopbackState::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LoopbackState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Loopback QMI state lock poisoned"))
    }

    fn record(&self, request: QmiRequest) -> Result<()> {
        self.lock()?.push(request);
        Ok(())
    }

    /// Recent state-changing requests, oldest first
    pub fn requests(&self) -> Vec<QmiRequest> {
        self.lock()
            .map(|s| s.requests.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl QmiAudioService for LoopbackQmiService {
    fn wait_ready(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn get_profile(&self) -> Result<u8> {
        Ok(self.lock()?.profile)
    }

    fn set_profile(&self, profile: u8) -> Result<()> {
        let mut state = self.lock()?;
        state.profile = profile;
        state.push(QmiRequest::SetProfile(profile));
        Ok(())
    }

    fn get_av_config_device(&self, _profile: u8) -> Result<u8> {
        Ok(0)
    }

    fn set_av_config(&self, request: &AvConfigRequest) -> Result<()> {
        self.record(QmiRequest::SetAvConfig(request.clone()))
    }

    fn set_av_mute(&self, _profile: u8, ear_mute: bool, mic_mute: bool) -> Result<()> {
        self.record(QmiRequest::SetAvMute {
            ear: ear_mute,
            mic: mic_mute,
        })
    }

    fn get_multimedia_mute(&self, _profile: u8) -> Result<bool> {
        Ok(self.lock()?.multimedia_mute)
    }

    fn set_multimedia_mute(&self, _profile: u8, mute: bool) -> Result<()> {
        let mut state = self.lock()?;
        state.multimedia_mute = mute;
        state.push(QmiRequest::SetMultimediaMute(mute));
        Ok(())
    }

    fn set_call_waiting_tone_mute(&self, _profile: u8, mute: bool) -> Result<()> {
        self.record(QmiRequest::SetCallWaitingToneMute(mute))
    }

    fn set_mic_gain(&self, _profile: u8, gain: u32) -> Result<()> {
        let mut state = self.lock()?;
        state.mic_gain = gain;
        state.push(QmiRequest::SetMicGain(gain));
        Ok(())
    }

    fn get_mic_gain(&self, _profile: u8) -> Result<u32> {
        Ok(self.lock()?.mic_gain)
    }

    fn set_voice_volume(&self, _profile: u8, level: u32) -> Result<()> {
        let mut state = self.lock()?;
        state.voice_volume = level;
        state.push(QmiRequest::SetVoiceVolume(level));
        Ok(())
    }

    fn get_voice_volume(&self, _profile: u8) -> Result<u32> {
        Ok(self.lock()?.voice_volume)
    }

    fn set_tx_volume(&self, _profile: u8, volume: u32) -> Result<()> {
        let mut state = self.lock()?;
        state.tx_volume = volume;
        state.push(QmiRequest::SetTxVolume(volume));
        Ok(())
    }

    fn get_tx_volume(&self, _profile: u8) -> Result<u32> {
        Ok(self.lock()?.tx_volume)
    }

    fn set_audio_volume(&self, _profile: u8, volume: u32) -> Result<()> {
        let mut state = self.lock()?;
        state.audio_volume = volume;
        state.push(QmiRequest::SetAudioVolume(volume));
        Ok(())
    }

    fn get_audio_volume(&self, _profile: u8) -> Result<u32> {
        Ok(self.lock()?.audio_volume)
    }

    fn set_media(&self, backend_dai: u8, operate_type: OperateType) -> Result<u8> {
        let mut state = self.lock()?;
        let front_end = state.next_front_end;
        state.next_front_end = state.next_front_end.wrapping_add(1);
        state.push(QmiRequest::SetMedia {
            backend_dai,
            operate_type: operate_type.code(),
        });
        Ok(front_end)
    }

    fn add_media(&self, backend_dai: u8, front_end: u8) -> Result<()> {
        self.record(QmiRequest::AddMedia {
            backend_dai,
            front_end,
        })
    }

    fn reset_media(&self, backend_dai: u8, front_end: u8) -> Result<()> {
        self.record(QmiRequest::ResetMedia {
            backend_dai,
            front_end,
        })
    }
}

/// Path driver issuing QMI SET/ADD/RESET MEDIA
pub struct QmiPathDriver {
    service: Arc<dyn QmiAudioService>,
}

impl QmiPathDriver {
    pub fn new(service: Arc<dyn QmiAudioService>) -> Self {
        Self { service }
    }

    fn operate_type(kind: RouteKind) -> Result<OperateType> {
        if kind.is_playback() {
            Ok(OperateType::Playback)
        } else if kind.is_capture() {
            Ok(OperateType::Record)
        } else {
            bail!("Voice routes are not programmed through QMI media messages")
        }
    }
}

impl PathDriver for QmiPathDriver {
    fn name(&self) -> &'static str {
        "qmi"
    }

    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn program(&mut self, route: &Route) -> Result<Programmed> {
        let operate_type = Self::operate_type(route.kind)?;
        let dai = route.physical.qmi_id();

        let front_end = match route.front_end_hw_id {
            Some(front_end) => {
                self.service.add_media(dai, front_end).map_err(|e| {
                    error!("{} ADD_MEDIA dai {} fe {}: {:#}", "QMI_ERROR".red(), dai, front_end, e);
                    e
                })?;
                front_end
            }
            None => self.service.set_media(dai, operate_type).map_err(|e| {
                error!("{} SET_MEDIA dai {}: {:#}", "QMI_ERROR".red(), dai, e);
                e
            })?,
        };

        info!(
            "{} {} -> {} on dai {} fe {}",
            "QMI_MEDIA".green(),
            route.input,
            route.output,
            dai,
            front_end
        );
        Ok(Programmed {
            hw_device_id: None,
            front_end_hw_id: Some(front_end),
        })
    }

    fn unprogram(&mut self, route: &Route) -> Result<()> {
        Self::operate_type(route.kind)?;
        let dai = route.physical.qmi_id();
        let front_end = route
            .front_end_hw_id
            .ok_or_else(|| anyhow!("No front end allocated for {} -> {}", route.input, route.output))?;

        self.service.reset_media(dai, front_end).map_err(|e| {
            error!("{} RESET_MEDIA dai {} fe {}: {:#}", "QMI_ERROR".red(), dai, front_end, e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::matrix::PhysicalInterface;
    use crate::stream::AudioInterface;
    use mockall::predicate::*;

    fn route(front_end: Option<u8>) -> Route {
        Route {
            input: AudioInterface::FilePlay,
            output: AudioInterface::UsbTx,
            kind: RouteKind::LocalPlay,
            physical: PhysicalInterface::Usb,
            binding: None,
            front_end_hw_id: front_end,
            release_slot_controls: true,
            release_endpoint_controls: true,
        }
    }

    #[test]
    fn test_first_use_sets_media() {
        let mut service = MockQmiAudioService::new();
        service
            .expect_set_media()
            .with(eq(3), eq(OperateType::Playback))
            .times(1)
            .returning(|_, _| Ok(4));
        service.expect_add_media().never();

        let mut driver = QmiPathDriver::new(Arc::new(service));
        let programmed = driver.program(&route(None)).unwrap();
        assert_eq!(programmed.front_end_hw_id, Some(4));
        assert_eq!(programmed.hw_device_id, None);
    }

    #[test]
    fn test_later_use_adds_media() {
        let mut service = MockQmiAudioService::new();
        service.expect_set_media().never();
        service
            .expect_add_media()
            .with(eq(3), eq(4))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut driver = QmiPathDriver::new(Arc::new(service));
        assert!(driver.program(&route(Some(4))).is_ok());
    }

    #[test]
    fn test_reset_needs_front_end() {
        let mut service = MockQmiAudioService::new();
        service
            .expect_reset_media()
            .with(eq(3), eq(4))
            .times(1)
            .returning(|_, _| Err(anyhow!("QMI timeout")));

        let mut driver = QmiPathDriver::new(Arc::new(service));
        assert!(driver.unprogram(&route(None)).is_err());
        assert!(driver.unprogram(&route(Some(4))).is_err(), "QMI failure should surface");
    }

    #[test]
    fn test_loopback_records_requests() {
        let service = LoopbackQmiService::new(1);
        assert_eq!(service.get_profile().unwrap(), 1);
        let fe = service.set_media(0, OperateType::Record).unwrap();
        service.reset_media(0, fe).unwrap();
        service.set_multimedia_mute(1, true).unwrap();
        assert!(service.get_multimedia_mute(1).unwrap());
        assert_eq!(
            service.requests(),
            vec![
                QmiRequest::SetMedia { backend_dai: 0, operate_type: 1 },
                QmiRequest::ResetMedia { backend_dai: 0, front_end: fe },
                QmiRequest::SetMultimediaMute(true),
            ]
        );
    }

    #[test]
    fn test_loopback_history_is_bounded() {
        let service = LoopbackQmiService::new(1);
        for volume in 0..(REQUEST_HISTORY as u32 + 44) {
            service.set_audio_volume(1, volume).unwrap();
        }
        let requests = service.requests();
        assert_eq!(requests.len(), REQUEST_HISTORY);
        assert_eq!(requests.first(), Some(&QmiRequest::SetAudioVolume(44)));
        assert_eq!(
            requests.last(),
            Some(&QmiRequest::SetAudioVolume(REQUEST_HISTORY as u32 + 43))
        );
    }
}
