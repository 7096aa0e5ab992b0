mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{RecordingDriver, ScriptedAuthority};
use pa_audio_routing::backend::{LoopbackQmiService, QmiAudioService};
use pa_audio_routing::swisync::protocol::encode_audio;
use pa_audio_routing::routing::SyncAuthority;
use pa_audio_routing::swisync::{NotificationListener, SyncOperation, SyncRequest};
use pa_audio_routing::{AudioInterface, PathState, RoutingConfig, RoutingManager, RoutingService};
use serial_test::serial;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::watch;
use tokio_test::{assert_err, assert_ok};

fn service_with(config: &RoutingConfig, authority: &ScriptedAuthority) -> RoutingService {
    let audio: Arc<dyn QmiAudioService> = Arc::new(LoopbackQmiService::new(config.default_profile));
    RoutingService::new(RoutingManager::new(
        config,
        Box::new(RecordingDriver::default()),
        audio,
        Box::new(authority.clone()),
    ))
}

/// Authority that holds the calling thread before allowing
struct SlowAuthority(Duration);

impl SyncAuthority for SlowAuthority {
    fn request(&self, _request: &SyncRequest) -> anyhow::Result<bool> {
        std::thread::sleep(self.0);
        Ok(true)
    }

    fn register(&self, _notify_socket: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod service_loop_tests {
    use super::*;

    #[tokio::test]
    #[serial]
    async fn test_pushed_deactivation_completes_deferred_release() {
        let dir = tempfile::tempdir().unwrap();
        let notify_path = dir.path().join("legato");
        let mut config = RoutingConfig::default();
        config.swisync.notify_socket = notify_path.to_string_lossy().into_owned();

        let authority = ScriptedAuthority::default();
        authority.answer(true).answer(false);
        let service = service_with(&config, &authority);

        let listener = NotificationListener::bind(&notify_path).unwrap();
        let (tx, notify) = service.notification_channel();
        let listener_task = tokio::spawn(listener.run(tx, notify));

        assert_ok!(service.initialize().await);
        assert_eq!(authority.registrations(), vec![config.swisync.notify_socket.clone()]);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loop_service = service.clone();
        let loop_task = tokio::spawn(async move { loop_service.run(shutdown_rx).await });

        let play = service.open_stream(AudioInterface::FilePlay).await;
        let speaker = service.open_stream(AudioInterface::CodecSpeaker).await;
        assert_ok!(service.set_path(play, speaker).await);
        assert_ok!(service.reset_path(play, speaker).await);
        {
            let manager = service.manager();
            let manager = manager.lock().await;
            assert_eq!(manager.path_state(play, speaker), Some(PathState::PendingRelease));
        }

        let mut conn = UnixStream::connect(&notify_path).await.unwrap();
        let frame = encode_audio(42, &SyncRequest::local_play(SyncOperation::Deactivated));
        conn.write_all(&frame).await.unwrap();

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if service.snapshot().await.paths.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(drained.is_ok(), "Deferred release should complete without a manager call");

        let snapshot = service.snapshot().await;
        assert!(snapshot.deferred.is_empty());
        assert!(snapshot.slots.iter().all(|s| !s.in_use));
        assert_ok!(service.close_stream(play).await);

        shutdown_tx.send(true).unwrap();
        let joined = assert_ok!(tokio::time::timeout(Duration::from_secs(5), loop_task).await);
        assert_ok!(joined);
        listener_task.abort();
    }

    #[tokio::test]
    async fn test_run_stops_when_shutdown_sender_dropped() {
        let mut config = RoutingConfig::default();
        config.swisync.enabled = false;
        let service = service_with(&config, &ScriptedAuthority::default());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loop_service = service.clone();
        let loop_task = tokio::spawn(async move { loop_service.run(shutdown_rx).await });

        drop(shutdown_tx);
        let joined = assert_ok!(tokio::time::timeout(Duration::from_secs(5), loop_task).await);
        assert_ok!(joined);
    }

    #[tokio::test]
    async fn test_calls_before_initialize_are_unavailable() {
        let mut config = RoutingConfig::default();
        config.swisync.enabled = false;
        let service = service_with(&config, &ScriptedAuthority::default());

        let play = service.open_stream(AudioInterface::FilePlay).await;
        let speaker = service.open_stream(AudioInterface::CodecSpeaker).await;
        assert_err!(service.set_path(play, speaker).await);
        assert_err!(service.get_gain(play).await);

        assert_ok!(service.initialize().await);
        assert_ok!(service.set_gain(play, 100).await);
        assert_eq!(assert_ok!(service.get_gain(play).await), 100);
        assert_ok!(service.mute(play, true).await);
        assert!(service.snapshot().await.available);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_slow_authority_does_not_stall_other_tasks() {
        let config = RoutingConfig::default();
        let audio: Arc<dyn QmiAudioService> = Arc::new(LoopbackQmiService::new(config.default_profile));
        let service = RoutingService::new(RoutingManager::new(
            &config,
            Box::new(RecordingDriver::default()),
            audio,
            Box::new(SlowAuthority(Duration::from_millis(500))),
        ));
        assert_ok!(service.initialize().await);

        let play = service.open_stream(AudioInterface::FilePlay).await;
        let speaker = service.open_stream(AudioInterface::CodecSpeaker).await;

        // Both tasks share the single worker thread
        let started = std::time::Instant::now();
        let ticker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            started.elapsed()
        });
        let routing = service.clone();
        let route_task = tokio::spawn(async move { routing.set_path(play, speaker).await });

        let routed = assert_ok!(route_task.await);
        assert_ok!(routed);

        let waited = assert_ok!(ticker.await);
        assert!(
            waited < Duration::from_millis(250),
            "Timer task was held up for {:?}",
            waited
        );
    }
}
