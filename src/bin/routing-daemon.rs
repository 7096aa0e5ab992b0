// Routing daemon
//
// Wires the routing library to real sockets: loads the config, builds the
// configured path driver, listens for swisync notifications and serves until
// ctrl-c.

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::*;
use tokio::sync::watch;
use tracing::{error, info, warn};

use pa_audio_routing::backend::{
    AmixPathDriver, AmixerGateway, LoopbackQmiService, QmiAudioService, QmiPathDriver,
};
use pa_audio_routing::log::{init_tracing, set_routing_debug};
use pa_audio_routing::routing::{AlwaysAllow, PathDriver, SyncAuthority};
use pa_audio_routing::swisync::{NotificationListener, SwisyncClient};
use pa_audio_routing::{BackendKind, RoutingConfig, RoutingManager, RoutingService};

fn load_config() -> Result<RoutingConfig> {
    match std::env::args().nth(1) {
        Some(path) => RoutingConfig::load(&path),
        None => {
            let config = RoutingConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// What the loopback QMI service stands in for with the given backend
fn loopback_notice(backend: BackendKind) -> &'static str {
    match backend {
        BackendKind::Amix => "no QMI transport wired in, voice routing, mute and gain only reach the loopback service",
        BackendKind::Qmi => "no QMI transport wired in, every QMI request only reaches the loopback service",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");
    if std::env::var_os("ROUTING_DEBUG").is_some() {
        set_routing_debug(true);
    }

    let config = load_config().context("Invalid routing configuration")?;
    info!(
        "{} backend {:?}, {} slot(s)",
        "ROUTING_DAEMON".bright_blue(),
        config.backend,
        config.slots.len()
    );

    warn!("{} {}", "QMI_WARNING".yellow(), loopback_notice(config.backend));
    let audio: Arc<dyn QmiAudioService> = Arc::new(LoopbackQmiService::new(config.default_profile));
    let driver: Box<dyn PathDriver> = match config.backend {
        BackendKind::Amix => Box::new(AmixPathDriver::new(
            Box::new(AmixerGateway::new(config.mixer_card)),
            config.codec.clone(),
            config.backhaul.clone(),
            config.slots.clone(),
        )),
        BackendKind::Qmi => Box::new(QmiPathDriver::new(audio.clone())),
    };
    let authority: Box<dyn SyncAuthority> = if config.swisync.enabled {
        Box::new(SwisyncClient::from_config(&config.swisync))
    } else {
        Box::new(AlwaysAllow)
    };

    let service = RoutingService::new(RoutingManager::new(&config, driver, audio, authority));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener_task = if config.swisync.enabled {
        let listener = NotificationListener::bind(&config.swisync.notify_socket)?;
        let (tx, notify) = service.notification_channel();
        Some(tokio::spawn(listener.run(tx, notify)))
    } else {
        None
    };

    if let Err(e) = service.initialize().await {
        error!("{} routing unavailable: {}", "ROUTING_DAEMON".red(), e);
    }

    let loop_service = service.clone();
    let service_task = tokio::spawn(async move { loop_service.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for ctrl-c")?;
    info!("{} shutting down", "ROUTING_DAEMON".bright_blue());

    let _ = shutdown_tx.send(true);
    if let Err(e) = service_task.await {
        warn!("{} service task ended abnormally: {}", "ROUTING_DAEMON".yellow(), e);
    }
    if let Some(task) = listener_task {
        task.abort();
    }

    let snapshot = service.snapshot().await;
    match serde_json::to_string(&snapshot) {
        Ok(json) => info!("{} final state {}", "ROUTING_DAEMON".bright_blue(), json),
        Err(e) => warn!("{} cannot serialize final state: {}", "ROUTING_DAEMON".yellow(), e),
    }
    Ok(())
}
