/// Integration tests for the audio ingest pipeline
///
/// Drives capture frames through resampling, chunk assembly and dispatch
/// against the scripted transport.

use audio_ingest::{
    ChunkAssembler, ChunkDispatcher, DispatchError, DispatcherConfig, LinearResampler,
    MockTranscriptionTransport, TranscriptEvent, MAX_CHUNK_SAMPLES, MIN_CHUNK_SAMPLES,
};
use std::sync::Arc;
use std::time::Duration;

/// Generate a burst of capture frames at the device rate
fn generate_frames(sample_rate: u32, frame_len: usize, count: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|n| {
            (0..frame_len)
                .map(|i| {
                    let t = (n * frame_len + i) as f32 / sample_rate as f32;
                    (2.0 * std::f32::consts::PI * 220.0 * t).sin() * 0.4
                })
                .collect()
        })
        .collect()
}

fn partial(text: &str) -> TranscriptEvent {
    TranscriptEvent::Partial {
        text: text.to_string(),
        confidence: None,
    }
}

fn final_event(text: &str) -> TranscriptEvent {
    TranscriptEvent::Final {
        text: text.to_string(),
        confidence: Some(0.9),
    }
}

#[tokio::test]
async fn test_chunk_bounds_hold_end_to_end() {
    let transport = Arc::new(MockTranscriptionTransport::new());
    let (dispatcher, _events) =
        ChunkDispatcher::new(transport.clone(), DispatcherConfig::default()).unwrap();

    let resampler = LinearResampler::new(48000).unwrap();
    let mut assembler = ChunkAssembler::new();

    // ~2.5 seconds of 48kHz audio in 1024-sample device frames
    for frame in generate_frames(48000, 1024, 120) {
        assembler.push(&resampler.resample(&frame));
        while let Some(chunk) = assembler.next_chunk() {
            dispatcher.dispatch(&chunk).await.unwrap();
        }
    }

    // Final flush is the only place a short chunk may appear
    if let Some(tail) = assembler.flush() {
        dispatcher.dispatch(&tail).await.unwrap();
    }

    let sent = transport.sent_chunks();
    assert!(!sent.is_empty());

    for (i, payload) in sent.iter().enumerate() {
        let samples = payload.len() / 2;
        assert!(
            samples <= MAX_CHUNK_SAMPLES,
            "chunk {} has {} samples, above the maximum",
            i,
            samples
        );
        if i + 1 < sent.len() {
            assert!(
                samples >= MIN_CHUNK_SAMPLES,
                "chunk {} has {} samples, below the minimum",
                i,
                samples
            );
        }
    }

    dispatcher.close().await;
}

#[tokio::test]
async fn test_events_arrive_in_service_order() {
    let transport = Arc::new(MockTranscriptionTransport::new());
    transport.push_send_response(vec![partial("hey"), partial("hey jo")]);
    transport.push_send_response(vec![partial("hey johnny"), final_event("hey johnny")]);

    let (dispatcher, mut events) =
        ChunkDispatcher::new(transport, DispatcherConfig::default()).unwrap();

    dispatcher.dispatch(&vec![0i16; MIN_CHUNK_SAMPLES]).await.unwrap();
    dispatcher.dispatch(&vec![0i16; MIN_CHUNK_SAMPLES]).await.unwrap();

    let mut received = Vec::new();
    for _ in 0..4 {
        received.push(events.recv().await.unwrap());
    }

    assert_eq!(
        received,
        vec![
            partial("hey"),
            partial("hey jo"),
            partial("hey johnny"),
            final_event("hey johnny"),
        ]
    );

    dispatcher.close().await;
}

#[tokio::test]
async fn test_polled_and_sent_events_share_one_channel() {
    let transport = Arc::new(MockTranscriptionTransport::new());
    transport.push_poll_response(vec![final_event("from poll")]);

    let config = DispatcherConfig {
        poll_interval: Duration::from_millis(10),
    };
    let (dispatcher, mut events) = ChunkDispatcher::new(transport, config).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("poll did not deliver")
        .unwrap();
    assert_eq!(event, final_event("from poll"));

    dispatcher.close().await;
}

#[tokio::test]
async fn test_session_expiry_terminates_pipeline() {
    let transport = Arc::new(MockTranscriptionTransport::new());
    transport.expire_after(2);

    let (dispatcher, _events) =
        ChunkDispatcher::new(transport.clone(), DispatcherConfig::default()).unwrap();

    dispatcher.dispatch(&vec![0i16; MIN_CHUNK_SAMPLES]).await.unwrap();
    dispatcher.dispatch(&vec![0i16; MIN_CHUNK_SAMPLES]).await.unwrap();

    let failed = dispatcher.dispatch(&vec![0i16; MIN_CHUNK_SAMPLES]).await;
    assert!(matches!(failed, Err(DispatchError::Transport(_))));

    // The dispatcher refuses further work instead of dropping audio silently
    let after = dispatcher.dispatch(&vec![0i16; MIN_CHUNK_SAMPLES]).await;
    assert!(matches!(after, Err(DispatchError::SessionTerminated(_))));
    assert_eq!(transport.sent_chunks().len(), 2);

    // Teardown after a terminal error is still clean
    dispatcher.close().await;
    dispatcher.close().await;
}
