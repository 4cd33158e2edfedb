/// Integration tests for the session lifecycle controller
///
/// Drives whole sessions over scripted capture sources and the scripted
/// transport: wake detection through utterance finalization, mute gating,
/// terminal transport failures and idempotent teardown.

use audio_ingest::{MockTranscriptionTransport, TranscriptEvent};
use std::sync::Arc;
use std::time::Duration;
use voice_session::{
    PlaybackGate, ScriptedSource, SessionConfig, SessionController, SessionEvent, SessionStore,
    StopReason,
};

/// Generate 48kHz capture frames carrying a quiet tone
fn capture_frames(count: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|n| {
            (0..1024)
                .map(|i| {
                    let t = (n * 1024 + i) as f32 / 48000.0;
                    (2.0 * std::f32::consts::PI * 330.0 * t).sin() * 0.3
                })
                .collect()
        })
        .collect()
}

fn partial(text: &str) -> TranscriptEvent {
    TranscriptEvent::Partial {
        text: text.to_string(),
        confidence: Some(0.9),
    }
}

fn final_event(text: &str) -> TranscriptEvent {
    TranscriptEvent::Final {
        text: text.to_string(),
        confidence: Some(0.95),
    }
}

fn short_config() -> SessionConfig {
    SessionConfig {
        silence_timeout: Duration::from_millis(40),
        ..Default::default()
    }
}

fn test_store() -> Arc<SessionStore> {
    Arc::new(SessionStore::new(Duration::from_secs(60)))
}

async fn recv_timeout(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed early")
}

#[tokio::test]
async fn test_wake_to_utterance_end_to_end() {
    let transport = Arc::new(MockTranscriptionTransport::new());
    transport.push_send_response(vec![partial("hey johnny")]);
    transport.push_send_response(vec![partial("how many blue mugs")]);
    transport.push_send_response(vec![final_event("how many blue mugs are left")]);

    let store = test_store();
    let source = ScriptedSource::new(48000, capture_frames(8));

    let (controller, mut events) = SessionController::start(
        short_config(),
        source,
        transport.clone(),
        PlaybackGate::new(),
        store.clone(),
    )
    .await
    .unwrap();

    assert!(store.contains(controller.id()));

    assert_eq!(
        recv_timeout(&mut events).await,
        SessionEvent::WakeDetected {
            session: controller.id()
        }
    );

    assert_eq!(
        recv_timeout(&mut events).await,
        SessionEvent::UtteranceFinalized {
            session: controller.id(),
            text: "how many blue mugs are left".to_string(),
        }
    );

    controller.stop().await;

    assert_eq!(
        recv_timeout(&mut events).await,
        SessionEvent::Stopped {
            session: controller.id(),
            reason: StopReason::Requested,
        }
    );
    assert!(events.recv().await.is_none());
    assert!(store.is_empty());

    // Every delivered chunk respected the transport's size contract
    let sent = transport.sent_chunks();
    assert!(!sent.is_empty());
    for payload in &sent {
        assert!(payload.len() / 2 <= 16000);
    }
}

#[tokio::test]
async fn test_muted_gate_forwards_no_audio() {
    let transport = Arc::new(MockTranscriptionTransport::new());
    let gate = PlaybackGate::new();
    gate.mute();

    let source = ScriptedSource::new(48000, capture_frames(8));
    let (controller, mut events) = SessionController::start(
        short_config(),
        source,
        transport.clone(),
        gate,
        test_store(),
    )
    .await
    .unwrap();

    // Let the source drain completely while muted
    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.stop().await;

    assert_eq!(
        recv_timeout(&mut events).await,
        SessionEvent::Stopped {
            session: controller.id(),
            reason: StopReason::Requested,
        }
    );

    // Frames were dropped, never buffered or dispatched
    assert!(transport.sent_chunks().is_empty());
}

#[tokio::test]
async fn test_transport_expiry_stops_session() {
    let transport = Arc::new(MockTranscriptionTransport::new());
    transport.expire_after(0);

    let store = test_store();
    let source = ScriptedSource::new(48000, capture_frames(8));

    let (controller, mut events) = SessionController::start(
        short_config(),
        source,
        transport,
        PlaybackGate::new(),
        store.clone(),
    )
    .await
    .unwrap();

    match recv_timeout(&mut events).await {
        SessionEvent::Stopped { session, reason } => {
            assert_eq!(session, controller.id());
            assert!(matches!(reason, StopReason::TransportFailed(_)));
        }
        other => panic!("expected stopped event, got {:?}", other),
    }

    // The registry no longer holds the dead session, and an explicit stop
    // afterwards is still safe and emits nothing further
    assert!(store.is_empty());
    controller.stop().await;
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn test_unmuting_resumes_with_clean_buffer() {
    let transport = Arc::new(MockTranscriptionTransport::new());
    let gate = PlaybackGate::new();

    // Pace frames so the gate can flip mid-stream
    let source = ScriptedSource::with_interval(
        48000,
        capture_frames(12),
        Duration::from_millis(5),
    );

    let (controller, mut events) = SessionController::start(
        short_config(),
        source,
        transport.clone(),
        gate.clone(),
        test_store(),
    )
    .await
    .unwrap();

    gate.mute();
    tokio::time::sleep(Duration::from_millis(30)).await;
    gate.unmute();
    tokio::time::sleep(Duration::from_millis(60)).await;

    controller.stop().await;
    assert_eq!(
        recv_timeout(&mut events).await,
        SessionEvent::Stopped {
            session: controller.id(),
            reason: StopReason::Requested,
        }
    );

    // Audio captured after the unmute still flowed to the transport
    assert!(!transport.sent_chunks().is_empty());
}
