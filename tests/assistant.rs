//! Interaction loop integration tests
//!
//! Runs whole cycles against fake audio and speech services.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::LocalSet;

use hearth::assistant::{
    CycleSettings, CycleState, FALLBACK_PATTERN, InteractionLoop, PatternSet, Services,
    TriggerOutcome,
};
use hearth::voice::{CaptureBridge, FrameSource};
use hearth::{Device, DeviceRegistry, DeviceType, Error, SharedRegistry};

mod common;

use common::{
    FakeTranscriber, FaultySource, NullSpeaker, RecordingSynthesizer, ScriptedSource,
    SilentSource, numbered_frames,
};

const UTTERANCE_BYTES: usize = 64;
const STALL_TIMEOUT: Duration = Duration::from_millis(200);

struct Harness {
    interaction: InteractionLoop,
    trigger: hearth::assistant::TriggerHandle,
    transcriber: Arc<FakeTranscriber>,
    synthesizer: Arc<RecordingSynthesizer>,
    speaker: Arc<NullSpeaker>,
    registry: SharedRegistry,
}

fn harness(source: Box<dyn FrameSource>, transcriber: FakeTranscriber) -> Harness {
    let transcriber = Arc::new(transcriber);
    let synthesizer = Arc::new(RecordingSynthesizer::default());
    let speaker = Arc::new(NullSpeaker::default());
    let registry: SharedRegistry = Rc::new(RefCell::new(DeviceRegistry::new()));

    let services = Services {
        transcriber: transcriber.clone(),
        synthesizer: synthesizer.clone(),
        speaker: speaker.clone(),
    };
    let settings = CycleSettings {
        name: "Zhaoyuan".to_string(),
        sample_rate: 16_000,
        utterance_bytes: UTTERANCE_BYTES,
        language_code: "en-US".to_string(),
    };

    let (interaction, trigger) = InteractionLoop::new(
        CaptureBridge::new(4).with_stall_timeout(STALL_TIMEOUT),
        source,
        services,
        PatternSet::builtin(),
        settings,
        Rc::clone(&registry),
    );

    Harness {
        interaction: interaction.with_seed(42),
        trigger,
        transcriber,
        synthesizer,
        speaker,
        registry,
    }
}

fn talking_source() -> Box<dyn FrameSource> {
    Box::new(ScriptedSource::new(numbered_frames(4, 20)))
}

fn register_reading(registry: &SharedRegistry, device_type: DeviceType, value: f32) {
    let addr = SocketAddr::from(([192, 168, 0, 9], 4000));
    let mut registry = registry.borrow_mut();
    let device = Device::registered(1, device_type, addr, Utc::now());
    let key = device.key();
    registry.upsert(device);
    assert!(registry.update(&key, value, Utc::now()));
}

#[tokio::test]
async fn test_nothing_heard_selects_fallback() {
    let mut h = harness(talking_source(), FakeTranscriber::hearing(&[]));

    let report = h.interaction.run_cycle().await.unwrap();

    assert_eq!(report.pattern, FALLBACK_PATTERN);
    assert!(report.transcript.is_none());
    assert!(
        ["Sorry, can you say again?", "Could you try speaking loudly, please."]
            .contains(&report.response.as_str())
    );
    assert_eq!(h.synthesizer.spoken.lock().unwrap().as_slice(), &[report.response]);
    assert_eq!(h.speaker.played.load(Ordering::SeqCst), 1);
    assert_eq!(h.interaction.state(), CycleState::Idle);
}

#[tokio::test]
async fn test_request_carries_utterance_and_hints() {
    let mut h = harness(talking_source(), FakeTranscriber::hearing(&["hello"]));

    let report = h.interaction.run_cycle().await.unwrap();
    assert_eq!(report.pattern, 1);

    let requests = h.transcriber.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.audio.len(), UTTERANCE_BYTES);
    assert_eq!(request.sample_rate, 16_000);
    assert_eq!(request.language_code, "en-US");
    assert!(request.phrase_hints.iter().any(|h| h == "temperature"));
}

#[tokio::test]
async fn test_temperature_question_uses_live_reading() {
    let mut h = harness(
        talking_source(),
        FakeTranscriber::hearing(&["What is the temperature"]),
    );
    register_reading(&h.registry, DeviceType::Temperature, 21.5);

    let report = h.interaction.run_cycle().await.unwrap();

    assert_eq!(report.pattern, 3);
    assert_eq!(report.response, "The temperature is 21.5 centigrade");
}

#[tokio::test]
async fn test_missing_reading_speaks_error_template() {
    let mut h = harness(
        talking_source(),
        FakeTranscriber::hearing(&["what's the humidity"]),
    );

    let report = h.interaction.run_cycle().await.unwrap();

    assert_eq!(report.pattern, 4);
    assert_eq!(
        report.response,
        "Sorry, humidity information is not available now"
    );
}

#[tokio::test]
async fn test_name_question() {
    let mut h = harness(
        talking_source(),
        FakeTranscriber::hearing(&["what is your name"]),
    );

    let report = h.interaction.run_cycle().await.unwrap();

    assert_eq!(report.pattern, 2);
    assert!(report.response.ends_with("Zhaoyuan"));
}

#[tokio::test]
async fn test_service_failure_returns_to_idle() {
    let mut h = harness(talking_source(), FakeTranscriber::failing());

    let result = h.interaction.run_cycle().await;

    assert!(matches!(result, Err(Error::Stt(_))));
    assert_eq!(h.interaction.state(), CycleState::Idle);
    assert!(h.synthesizer.spoken.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_second_trigger_while_busy_is_ignored() {
    let source = SilentSource::new();
    let stats = source.stats();
    let h = harness(Box::new(source), FakeTranscriber::hearing(&["hello"]));
    let trigger = h.trigger.clone();

    let local = LocalSet::new();
    local
        .run_until(async move {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let task = tokio::task::spawn_local(h.interaction.run(shutdown_rx));

            assert_eq!(trigger.trigger(), TriggerOutcome::Started);
            assert_eq!(trigger.trigger(), TriggerOutcome::Busy);

            // Let the loop start capturing from the silent microphone; the
            // stall timeout is far off
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(trigger.state(), CycleState::Capturing);
            assert_eq!(trigger.trigger(), TriggerOutcome::Busy);
            assert_eq!(stats.starts(), 1);

            // Shutdown abandons the cycle and releases the microphone
            shutdown_tx.send(true).unwrap();
            task.await.unwrap();

            assert_eq!(stats.stops(), 1);
            assert_eq!(trigger.state(), CycleState::Idle);
            assert_eq!(trigger.trigger(), TriggerOutcome::Closed);
        })
        .await;
}

#[tokio::test]
async fn test_loop_serves_consecutive_triggers() {
    let h = harness(talking_source(), FakeTranscriber::hearing(&["hi"]));
    let trigger = h.trigger.clone();
    let synthesizer = Arc::clone(&h.synthesizer);

    let local = LocalSet::new();
    local
        .run_until(async move {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let task = tokio::task::spawn_local(h.interaction.run(shutdown_rx));

            for expected in 1..=2 {
                assert_eq!(trigger.trigger(), TriggerOutcome::Started);
                while trigger.state() != CycleState::Idle {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                assert_eq!(synthesizer.spoken.lock().unwrap().len(), expected);
            }

            shutdown_tx.send(true).unwrap();
            task.await.unwrap();
        })
        .await;
}

#[tokio::test]
async fn test_stalled_microphone_ends_cycle() {
    let source = SilentSource::new();
    let stats = source.stats();
    let mut h = harness(Box::new(source), FakeTranscriber::hearing(&["hello"]));

    let result = tokio::time::timeout(STALL_TIMEOUT * 5, h.interaction.run_cycle())
        .await
        .expect("stalled capture must not hang the cycle");

    assert!(matches!(result, Err(Error::Audio(_))));
    assert_eq!(h.interaction.state(), CycleState::Idle);
    assert_eq!(stats.stops(), 1);
    assert!(h.transcriber.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stream_fault_ends_cycle() {
    let source = FaultySource::new();
    let stats = source.stats();
    let mut h = harness(Box::new(source), FakeTranscriber::hearing(&["hello"]));

    let result = h.interaction.run_cycle().await;

    match result {
        Err(Error::Audio(message)) => assert!(message.contains("device unplugged")),
        other => panic!("expected audio error, got {other:?}"),
    }
    assert_eq!(h.interaction.state(), CycleState::Idle);
    assert_eq!(stats.stops(), 1);
}

#[tokio::test]
async fn test_loop_accepts_triggers_after_stall() {
    let source = SilentSource::new();
    let stats = source.stats();
    let h = harness(Box::new(source), FakeTranscriber::hearing(&["hello"]));
    let trigger = h.trigger.clone();

    let local = LocalSet::new();
    local
        .run_until(async move {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let task = tokio::task::spawn_local(h.interaction.run(shutdown_rx));

            assert_eq!(trigger.trigger(), TriggerOutcome::Started);
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(trigger.state(), CycleState::Capturing);

            let deadline = tokio::time::Instant::now() + STALL_TIMEOUT * 5;
            while trigger.state() != CycleState::Idle {
                assert!(tokio::time::Instant::now() < deadline, "cycle never ended");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            assert_eq!(stats.stops(), 1);
            assert_eq!(trigger.trigger(), TriggerOutcome::Started);
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(stats.starts(), 2);

            shutdown_tx.send(true).unwrap();
            task.await.unwrap();
            assert_eq!(stats.stops(), 2);
        })
        .await;
}

#[tokio::test]
async fn test_shutdown_with_pending_trigger_reports_closed() {
    let h = harness(talking_source(), FakeTranscriber::hearing(&["hi"]));
    let trigger = h.trigger.clone();

    assert_eq!(trigger.trigger(), TriggerOutcome::Started);
    assert_eq!(trigger.state(), CycleState::Capturing);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();
    h.interaction.run(shutdown_rx).await;

    assert_eq!(trigger.state(), CycleState::Idle);
    assert_eq!(trigger.trigger(), TriggerOutcome::Closed);
    assert!(h.synthesizer.spoken.lock().unwrap().is_empty());
}
