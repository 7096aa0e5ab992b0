// Mixer control gateway
//
// Applies one named control of the ALSA mixer. Numeric values are written as
// is, anything else is an enumerated item name understood by the driver.

use std::process::Command;

use anyhow::{Context, Result};
use colored::*;
use tracing::error;

use crate::routing_debug;

#[cfg_attr(test, mockall::automock)]
pub trait MixerGateway: Send {
    fn apply(&mut self, control: &str, value: &str) -> Result<()>;
}

/// Gateway backed by the `amixer` utility
#[derive(Debug, Clone)]
pub struct AmixerGateway {
    card: u32,
    program: String,
}

impl AmixerGateway {
    pub fn new(card: u32) -> Self {
        Self {
            card,
            program: "amixer".to_string(),
        }
    }

    /// Use another binary with the same command line, e.g. a wrapper script
    pub fn with_program(card: u32, program: &str) -> Self {
        Self {
            card,
            program: program.to_string(),
        }
    }

    fn args(&self, control: &str, value: &str) -> Vec<String> {
        vec![
            "-q".to_string(),
            "-c".to_string(),
            self.card.to_string(),
            "cset".to_string(),
            format!("name={}", control),
            value.to_string(),
        ]
    }
}

impl MixerGateway for AmixerGateway {
    fn apply(&mut self, control: &str, value: &str) -> Result<()> {
        routing_debug!("amixer card {} '{}' = {}", self.card, control, value);

        let output = Command::new(&self.program)
            .args(self.args(control, value))
            .output()
            .with_context(|| format!("Failed to run {} for control '{}'", self.program, control))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                "{} '{}' = {} rejected: {}",
                "MIXER_ERROR".red(),
                control,
                value,
                stderr.trim()
            );
            return Err(anyhow::anyhow!(
                "Mixer control '{}' could not be set to '{}' ({})",
                control,
                value,
                output.status
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let gateway = AmixerGateway::new(1);
        assert_eq!(
            gateway.args("SLIM_0_RX Channels", "One"),
            vec!["-q", "-c", "1", "cset", "name=SLIM_0_RX Channels", "One"]
        );
    }

    #[test]
    fn test_missing_binary_is_an_error() {
        let mut gateway = AmixerGateway::with_program(0, "/nonexistent/amixer");
        assert!(gateway.apply("Speaker Function", "On").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_is_checked() {
        let mut ok = AmixerGateway::with_program(0, "true");
        assert!(ok.apply("Speaker Function", "On").is_ok());

        let mut failing = AmixerGateway::with_program(0, "false");
        assert!(failing.apply("Speaker Function", "On").is_err());
    }
}
