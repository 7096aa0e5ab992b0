// ALSA mixer path driver
//
// Programs multimedia routes by switching the DSP mixer controls that connect
// a slot front end (MultiMediaN) to a backend interface. The analog codec
// additionally needs its own enable/disable sequence, which depends on how
// the codec is wired.

use anyhow::{anyhow, bail, Result};
use colored::*;
use tracing::info;

use crate::config::{BackhaulNames, CodecWiring, SlotConfig};
use crate::routing::driver::{PathDriver, Programmed, Route, RouteKind};
use crate::routing::matrix::PhysicalInterface;
use crate::routing_debug;

use super::mixer::MixerGateway;

const SLIMBUS_0: &str = "SLIMBUS_0";

const SLIMBUS_SPEAKER_ON: &[(&str, &str)] = &[
    ("SLIM_0_RX Channels", "One"),
    ("DAC3 MUX", "INV_RX1"),
    ("DAC2 MUX", "RX1"),
    ("RX1 MIX1 INP1", "RX1"),
    ("RX1 Digital Volume", "100"),
    ("Speaker Function", "On"),
];

const SLIMBUS_SPEAKER_OFF: &[(&str, &str)] = &[
    ("DAC3 MUX", "ZERO"),
    ("DAC2 MUX", "ZERO"),
    ("RX1 MIX1 INP1", "ZERO"),
    ("RX1 Digital Volume", "0"),
    ("Speaker Function", "Off"),
];

const CODEC_SPEAKER_ON: &[(&str, &str)] = &[
    ("SPKOUTP Mixer Speak PGA to Speaker P Switch", "1"),
    ("SPKOUTN Mixer Speak PGA to Speaker N Switch", "1"),
    ("Speaker Mixer DAC to Speak PGA Switch", "1"),
    ("Digital Playback Volume", "192"),
    ("Speaker Function", "On"),
];

const CODEC_SPEAKER_OFF: &[(&str, &str)] = &[
    ("SPKOUTP Mixer Speak PGA to Speaker P Switch", "0"),
    ("SPKOUTN Mixer Speak PGA to Speaker N Switch", "0"),
    ("Speaker Mixer DAC to Speak PGA Switch", "0"),
    ("Digital Playback Volume", "0"),
    ("Speaker Function", "Off"),
];

const SLIMBUS_MIC_ON: &[(&str, &str)] = &[
    ("SLIM_0_TX Channels", "One"),
    ("SLIM TX1 MUX", "DEC1"),
    ("DEC1 MUX", "ADC1"),
];

const SLIMBUS_MIC_OFF: &[(&str, &str)] = &[("SLIM TX1 MUX", "ZERO"), ("DEC1 MUX", "ZERO")];

const CODEC_MIC_ON: &[(&str, &str)] = &[
    ("Input PGA IN1 to InPGA Switch", "1"),
    ("Input PGA AUX to Invert InPGA Switch", "1"),
    ("Capture PGA Mute Switch", "1"),
    ("ADC Mute All Switch", "1"),
];

const CODEC_MIC_OFF: &[(&str, &str)] = &[
    ("Input PGA IN1 to InPGA Switch", "0"),
    ("Input PGA AUX to Invert InPGA Switch", "0"),
    ("Capture PGA Mute Switch", "0"),
    ("ADC Mute All Switch", "0"),
];

pub struct AmixPathDriver {
    gateway: Box<dyn MixerGateway>,
    codec: CodecWiring,
    backhaul: BackhaulNames,
    slots: Vec<SlotConfig>,
}

impl AmixPathDriver {
    pub fn new(
        gateway: Box<dyn MixerGateway>,
        codec: CodecWiring,
        backhaul: BackhaulNames,
        slots: Vec<SlotConfig>,
    ) -> Self {
        Self {
            gateway,
            codec,
            backhaul,
            slots,
        }
    }

    fn apply(&mut self, control: &str, value: &str) -> Result<()> {
        self.gateway.apply(control, value)
    }

    fn apply_sequence(&mut self, sequence: &[(&str, &str)]) -> Result<()> {
        for (control, value) in sequence {
            self.apply(control, value)?;
        }
        Ok(())
    }

    /// Backend name of the analog codec
    fn codec_backend(&self) -> Result<&str> {
        match &self.codec {
            CodecWiring::Slimbus0 => Ok(SLIMBUS_0),
            CodecWiring::Named(name) => Ok(name.as_str()),
            CodecWiring::Absent => bail!("No analog codec is wired on this platform"),
        }
    }

    fn speaker_sequence(&self, on: bool) -> &'static [(&'static str, &'static str)] {
        match (&self.codec, on) {
            (CodecWiring::Slimbus0, true) => SLIMBUS_SPEAKER_ON,
            (CodecWiring::Slimbus0, false) => SLIMBUS_SPEAKER_OFF,
            (_, true) => CODEC_SPEAKER_ON,
            (_, false) => CODEC_SPEAKER_OFF,
        }
    }

    fn mic_sequence(&self, on: bool) -> &'static [(&'static str, &'static str)] {
        match (&self.codec, on) {
            (CodecWiring::Slimbus0, true) => SLIMBUS_MIC_ON,
            (CodecWiring::Slimbus0, false) => SLIMBUS_MIC_OFF,
            (_, true) => CODEC_MIC_ON,
            (_, false) => CODEC_MIC_OFF,
        }
    }

    /// Mixer control connecting the slot to the route's backend
    fn slot_control(&self, kind: RouteKind, physical: PhysicalInterface, mm: &str) -> Result<String> {
        let control = match (kind, physical) {
            (RouteKind::LocalPlay, PhysicalInterface::Pcm) => {
                format!("{}_PCM_RX Audio Mixer {}", self.backhaul.pcm, mm)
            }
            (RouteKind::LocalPlay, PhysicalInterface::I2s) => {
                format!("{}_RX Audio Mixer {}", self.backhaul.i2s, mm)
            }
            (RouteKind::LocalPlay, PhysicalInterface::Usb) => {
                format!("{}_RX Audio Mixer {}", self.backhaul.usb, mm)
            }
            (RouteKind::LocalPlay, PhysicalInterface::Analog) => {
                format!("{}_RX Audio Mixer {}", self.codec_backend()?, mm)
            }
            (RouteKind::LocalCapture, PhysicalInterface::Pcm) => {
                format!("{} Mixer {}_PCM_UL_TX", mm, self.backhaul.pcm)
            }
            (RouteKind::LocalCapture, PhysicalInterface::I2s) => {
                format!("{} Mixer {}_TX", mm, self.backhaul.i2s)
            }
            (RouteKind::LocalCapture, PhysicalInterface::Usb) => {
                format!("{} Mixer {}_TX", mm, self.backhaul.usb)
            }
            (RouteKind::LocalCapture, PhysicalInterface::Analog) => {
                let codec = match &self.codec {
                    CodecWiring::Slimbus0 => "SLIM_0",
                    _ => self.codec_backend()?,
                };
                format!("{} Mixer {}_TX", mm, codec)
            }
            (RouteKind::RemotePlay, _) => format!("Incall_Music Audio Mixer {}", mm),
            (RouteKind::RemoteCapture, _) => format!("{} Mixer VOC_REC_DL", mm),
            (kind, physical) => bail!("No mixer path for {:?} over {:?}", kind, physical),
        };
        Ok(control)
    }

    /// Whether the route's endpoint is the analog codec
    fn uses_codec(route: &Route) -> bool {
        route.physical == PhysicalInterface::Analog
            && matches!(route.kind, RouteKind::LocalPlay | RouteKind::LocalCapture)
    }

    fn endpoint_sequence(&self, kind: RouteKind, on: bool) -> &'static [(&'static str, &'static str)] {
        if kind == RouteKind::LocalPlay {
            self.speaker_sequence(on)
        } else {
            self.mic_sequence(on)
        }
    }
}

impl PathDriver for AmixPathDriver {
    fn name(&self) -> &'static str {
        "amix"
    }

    /// Switch every slot off every backend so the mixer starts clean
    fn initialize(&mut self) -> Result<()> {
        let kinds = [
            (RouteKind::LocalPlay, PhysicalInterface::Pcm),
            (RouteKind::LocalPlay, PhysicalInterface::I2s),
            (RouteKind::LocalPlay, PhysicalInterface::Usb),
            (RouteKind::LocalPlay, PhysicalInterface::Analog),
            (RouteKind::LocalCapture, PhysicalInterface::Pcm),
            (RouteKind::LocalCapture, PhysicalInterface::I2s),
            (RouteKind::LocalCapture, PhysicalInterface::Usb),
            (RouteKind::LocalCapture, PhysicalInterface::Analog),
            (RouteKind::RemotePlay, PhysicalInterface::Modem),
            (RouteKind::RemoteCapture, PhysicalInterface::Modem),
        ];

        let slots: Vec<String> = self.slots.iter().map(|s| s.mixer_ctrl.clone()).collect();
        let has_codec = self.codec != CodecWiring::Absent;
        for mm in &slots {
            for (kind, physical) in kinds {
                if physical == PhysicalInterface::Analog && !has_codec {
                    continue;
                }
                let control = self.slot_control(kind, physical, mm)?;
                self.apply(&control, "0")?;
            }
        }

        info!(
            "{} reset {} multimedia slot(s)",
            "AMIX_INIT".bright_blue(),
            slots.len()
        );
        Ok(())
    }

    fn program(&mut self, route: &Route) -> Result<Programmed> {
        let binding = route
            .binding
            .clone()
            .ok_or_else(|| anyhow!("{} -> {} has no slot binding", route.input, route.output))?;
        let control = self.slot_control(route.kind, route.physical, &binding.mixer_ctrl)?;

        if Self::uses_codec(route) {
            let sequence = self.endpoint_sequence(route.kind, true);
            self.apply_sequence(sequence)?;
        }
        self.apply(&control, "1")?;

        info!(
            "{} {} -> {} via '{}'",
            "AMIX_SET".green(),
            route.input,
            route.output,
            control
        );
        Ok(Programmed {
            hw_device_id: Some(binding.pcm_device as u32),
            front_end_hw_id: None,
        })
    }

    fn unprogram(&mut self, route: &Route) -> Result<()> {
        let binding = route
            .binding
            .clone()
            .ok_or_else(|| anyhow!("{} -> {} has no slot binding", route.input, route.output))?;
        let control = self.slot_control(route.kind, route.physical, &binding.mixer_ctrl)?;

        if Self::uses_codec(route) {
            if route.release_endpoint_controls {
                let sequence = self.endpoint_sequence(route.kind, false);
                self.apply_sequence(sequence)?;
            } else {
                routing_debug!("codec closure postponed, endpoint still in use");
            }
        }

        if route.release_slot_controls {
            self.apply(&control, "0")?;
            info!(
                "{} {} -> {} via '{}'",
                "AMIX_RESET".green(),
                route.input,
                route.output,
                control
            );
        } else {
            routing_debug!("'{}' kept, slot still in use", control);
        }
        Ok(())
    }
}
