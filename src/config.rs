// Routing configuration and validation
//
// The pool bindings, backhaul interface names and the codec wiring differ per
// modem platform. Everything else has sensible defaults so the daemon can run
// without a config file.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Longest mixer control name the ALSA backend accepts for a slot
pub const MAX_MIXER_CTRL_LEN: usize = 20;
/// Upper bound on the pool size
pub const MAX_SLOTS: usize = 8;
/// Upper bound on the swisync round-trip timeout
pub const MAX_SWISYNC_TIMEOUT_MS: u64 = 30_000;

/// Which hardware path driver programs the routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// ALSA mixer control strings
    Amix,
    /// QMI SET/ADD/RESET MEDIA messages
    Qmi,
}

/// Immutable hardware binding of one multimedia slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub mixer_ctrl: String,
    pub pcm_device: u8,
}

impl SlotConfig {
    pub fn new(mixer_ctrl: &str, pcm_device: u8) -> Self {
        Self {
            mixer_ctrl: mixer_ctrl.to_string(),
            pcm_device,
        }
    }
}

/// How the analog codec is wired to the DSP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecWiring {
    /// Internal codec on SLIMBUS_0
    Slimbus0,
    /// External codec reached through a named backend, e.g. `SEC_AUX_PCM`
    Named(String),
    /// No analog codec on this board
    Absent,
}

/// ALSA names of the backhaul interfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackhaulNames {
    pub pcm: String,
    pub i2s: String,
    pub usb: String,
}

impl Default for BackhaulNames {
    fn default() -> Self {
        Self {
            pcm: "SEC_AUX".to_string(),
            i2s: "MI2S".to_string(),
            usb: "AFE_PCM".to_string(),
        }
    }
}

/// Synchronization authority endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwisyncConfig {
    pub enabled: bool,
    /// Socket the authority listens on for requests
    pub authority_socket: String,
    /// Socket we listen on for notifications
    pub notify_socket: String,
    pub timeout_ms: u64,
}

impl Default for SwisyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authority_socket: "/tmp/swisync/swisync".to_string(),
            notify_socket: "/tmp/swisync/legato".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl SwisyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub backend: BackendKind,
    pub slots: Vec<SlotConfig>,
    pub codec: CodecWiring,
    pub backhaul: BackhaulNames,
    pub mixer_card: u32,
    pub default_profile: u8,
    pub ready_timeout_ms: u64,
    pub swisync: SwisyncConfig,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Amix,
            slots: vec![
                SlotConfig::new("MultiMedia1", 0),
                SlotConfig::new("MultiMedia2", 1),
            ],
            codec: CodecWiring::Slimbus0,
            backhaul: BackhaulNames::default(),
            mixer_card: 0,
            default_profile: 1,
            ready_timeout_ms: 60_000,
            swisync: SwisyncConfig::default(),
        }
    }
}

impl RoutingConfig {
    /// ALSA mixer backend with the internal codec on SLIMBUS_0
    pub fn amix_default() -> Self {
        Self::default()
    }

    /// QMI media backend; the DSP owns the codec so no mixer wiring is needed
    pub fn qmi_default() -> Self {
        Self {
            backend: BackendKind::Qmi,
            codec: CodecWiring::Absent,
            ..Self::default()
        }
    }

    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read routing config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse routing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_config(self)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

/// Validate a routing configuration before the pool is built from it
pub fn validate_config(config: &RoutingConfig) -> Result<()> {
    if config.slots.is_empty() || config.slots.len() > MAX_SLOTS {
        return Err(anyhow::anyhow!(
            "Invalid pool size: {} (must be 1-{} slots)",
            config.slots.len(),
            MAX_SLOTS
        ));
    }

    let mut devices = HashSet::new();
    for slot in &config.slots {
        validate_mixer_ctrl(&slot.mixer_ctrl)?;
        if !devices.insert(slot.pcm_device) {
            return Err(anyhow::anyhow!(
                "PCM device {} is bound to more than one slot",
                slot.pcm_device
            ));
        }
    }

    if let CodecWiring::Named(name) = &config.codec {
        if name.is_empty() {
            return Err(anyhow::anyhow!("Named codec wiring needs a backend name"));
        }
    }

    for (label, name) in [
        ("pcm", &config.backhaul.pcm),
        ("i2s", &config.backhaul.i2s),
        ("usb", &config.backhaul.usb),
    ] {
        if name.is_empty() {
            return Err(anyhow::anyhow!("Backhaul name for {} cannot be empty", label));
        }
    }

    let swisync = &config.swisync;
    for socket in [&swisync.authority_socket, &swisync.notify_socket] {
        if !Path::new(socket).is_absolute() {
            return Err(anyhow::anyhow!("Swisync socket path must be absolute: '{}'", socket));
        }
    }
    if swisync.timeout_ms == 0 || swisync.timeout_ms > MAX_SWISYNC_TIMEOUT_MS {
        return Err(anyhow::anyhow!(
            "Invalid swisync timeout: {} ms (must be 1-{} ms)",
            swisync.timeout_ms,
            MAX_SWISYNC_TIMEOUT_MS
        ));
    }

    Ok(())
}

fn validate_mixer_ctrl(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow::anyhow!("Mixer control name cannot be empty"));
    }
    if name.len() > MAX_MIXER_CTRL_LEN {
        return Err(anyhow::anyhow!(
            "Mixer control name too long: maximum {} characters allowed, got {}",
            MAX_MIXER_CTRL_LEN,
            name.len()
        ));
    }
    Ok(())
}
