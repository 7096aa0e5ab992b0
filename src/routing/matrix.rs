// Connection matrix
//
// Static (input, output) -> physical interface table. Built once when the
// manager is created and never mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::stream::AudioInterface;

/// Hardware-level audio backend endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalInterface {
    Pcm,
    I2s,
    Analog,
    Usb,
    /// Over-the-air modem leg, only reachable from the multimedia slots
    Modem,
}

impl PhysicalInterface {
    /// Identifier used by the QMI avcfg and media messages
    pub fn qmi_id(self) -> u8 {
        match self {
            PhysicalInterface::Pcm => 0,
            PhysicalInterface::I2s => 1,
            PhysicalInterface::Analog => 2,
            PhysicalInterface::Usb => 3,
            PhysicalInterface::Modem => 7,
        }
    }
}

const N: usize = AudioInterface::COUNT;

#[derive(Debug, Clone)]
pub struct ConnectionMatrix {
    table: [[Option<PhysicalInterface>; N]; N],
}

impl ConnectionMatrix {
    pub fn new() -> Self {
        use AudioInterface::*;
        use PhysicalInterface::*;

        let routes = [
            // Voice downlink
            (ModemVoiceRx, CodecSpeaker, Analog),
            (ModemVoiceRx, UsbTx, Usb),
            (ModemVoiceRx, PcmTx, Pcm),
            (ModemVoiceRx, I2sTx, I2s),
            // Voice uplink
            (CodecMic, ModemVoiceTx, Analog),
            (UsbRx, ModemVoiceTx, Usb),
            (PcmRx, ModemVoiceTx, Pcm),
            (I2sRx, ModemVoiceTx, I2s),
            // File playback
            (FilePlay, CodecSpeaker, Analog),
            (FilePlay, UsbTx, Usb),
            (FilePlay, PcmTx, Pcm),
            (FilePlay, I2sTx, I2s),
            (FilePlay, ModemVoiceTx, Modem),
            // File capture
            (CodecMic, FileCapture, Analog),
            (UsbRx, FileCapture, Usb),
            (PcmRx, FileCapture, Pcm),
            (I2sRx, FileCapture, I2s),
            (ModemVoiceRx, FileCapture, Modem),
        ];

        let mut table = [[None; N]; N];
        for (input, output, physical) in routes {
            table[input.index()][output.index()] = Some(physical);
        }
        Self { table }
    }

    /// Physical interface for the pair, `None` when the route is unsupported
    pub fn lookup(&self, input: AudioInterface, output: AudioInterface) -> Option<PhysicalInterface> {
        self.table[input.index()][output.index()]
    }

    /// All legal (input, output, physical) triples
    pub fn legal_routes(&self) -> impl Iterator<Item = (AudioInterface, AudioInterface, PhysicalInterface)> + '_ {
        AudioInterface::ALL.into_iter().flat_map(move |input| {
            AudioInterface::ALL
                .into_iter()
                .filter_map(move |output| self.lookup(input, output).map(|p| (input, output, p)))
        })
    }
}

impl Default for ConnectionMatrix {
    fn default() -> Self {
        Self::new()
    }
}
