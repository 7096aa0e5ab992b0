// PCM interface settings
//
// Pushed to the DSP as a five entry interface table whenever a voice route is
// placed on the PCM backhaul.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoutingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcmMode {
    Master,
    Slave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Companding {
    None,
    ULaw,
    ALaw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmSettings {
    pub mode: PcmMode,
    /// Sampling rate in Hz
    pub rate: u32,
    /// Bits per frame
    pub bits_frame: u32,
    pub companding: Companding,
    pub padding: bool,
}

impl Default for PcmSettings {
    fn default() -> Self {
        Self {
            mode: PcmMode::Master,
            rate: 8000,
            bits_frame: 256,
            companding: Companding::None,
            padding: false,
        }
    }
}

const RATES: [u32; 2] = [8000, 16000];
const BITS_FRAME: [u32; 6] = [8, 16, 32, 64, 128, 256];

impl PcmSettings {
    pub fn set_rate(&mut self, rate: u32) -> Result<()> {
        if !RATES.contains(&rate) {
            return Err(RoutingError::bad_parameter(format!(
                "Unsupported PCM sampling rate {} Hz",
                rate
            )));
        }
        self.rate = rate;
        Ok(())
    }

    pub fn set_bits_frame(&mut self, bits_frame: u32) -> Result<()> {
        if !BITS_FRAME.contains(&bits_frame) {
            return Err(RoutingError::bad_parameter(format!(
                "Unsupported PCM sampling resolution {} bits/frame",
                bits_frame
            )));
        }
        self.bits_frame = bits_frame;
        Ok(())
    }

    /// Encode as the QMI interface table `[mode, rate, bits_frame, companding, padding]`
    pub fn table(&self) -> [u8; 5] {
        let mode = match self.mode {
            PcmMode::Master => 1,
            PcmMode::Slave => 0,
        };
        let rate = RATES.iter().position(|&r| r == self.rate).unwrap_or(0) as u8;
        let bits = BITS_FRAME
            .iter()
            .position(|&b| b == self.bits_frame)
            .unwrap_or(BITS_FRAME.len() - 1) as u8;
        let companding = match self.companding {
            Companding::None => 0,
            Companding::ULaw => 1,
            Companding::ALaw => 2,
        };
        [mode, rate, bits, companding, self.padding as u8]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        assert_eq!(PcmSettings::default().table(), [1, 0, 5, 0, 0]);
    }

    #[test]
    fn test_setters_validate() {
        let mut settings = PcmSettings::default();
        settings.set_rate(16000).unwrap();
        settings.set_bits_frame(32).unwrap();
        settings.companding = Companding::ALaw;
        settings.mode = PcmMode::Slave;
        assert_eq!(settings.table(), [0, 1, 2, 2, 0]);

        assert!(settings.set_rate(44100).is_err());
        assert!(settings.set_bits_frame(24).is_err());
        assert_eq!(settings.rate, 16000, "Rejected values should not be stored");
    }
}
