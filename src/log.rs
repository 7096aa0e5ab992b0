use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

/// Global flag to control routing debug logging
pub static ROUTING_DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Set routing debug logging on/off
pub fn set_routing_debug(enabled: bool) {
    ROUTING_DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
    tracing::info!(
        "🔧 Routing debug logging {}",
        if enabled { "ENABLED" } else { "DISABLED" }
    );
}

/// Check if routing debug logging is enabled
pub fn is_routing_debug_enabled() -> bool {
    ROUTING_DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Routing debug macro - only emits if routing debug is enabled
#[macro_export]
macro_rules! routing_debug {
    ($($arg:tt)*) => {
        if $crate::log::ROUTING_DEBUG_ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            tracing::debug!($($arg)*);
        }
    };
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Returns false when a subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_switch_round_trip() {
        set_routing_debug(true);
        assert!(is_routing_debug_enabled());
        set_routing_debug(false);
        assert!(!is_routing_debug_enabled());
    }

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init_tracing("info");
        assert!(!init_tracing("debug"));
    }
}
