//! Capture bridge integration tests
//!
//! Frames come from a fake source running on its own thread, the way the
//! audio callback does.

use std::time::Duration;

use hearth::Error;
use hearth::voice::{CaptureBridge, PushOutcome, utterance_capacity};

mod common;

use common::{ScriptedSource, SilentSource, numbered_frames};

#[tokio::test]
async fn test_utterance_is_concatenation_of_frames() {
    let frames = numbered_frames(8, 100);
    let mut source = ScriptedSource::new(frames.clone());
    let stats = source.stats();
    let bridge = CaptureBridge::new(2);

    let utterance = bridge.capture_utterance(&mut source, 750).await.unwrap();

    let expected: Vec<u8> = frames.concat().into_iter().take(750).collect();
    assert_eq!(utterance.len(), 750);
    assert_eq!(utterance.as_bytes(), expected.as_slice());
    assert_eq!(stats.starts(), 1);
    assert_eq!(stats.stops(), 1);
}

#[tokio::test]
async fn test_exact_capacity_needs_no_truncation() {
    let mut source = ScriptedSource::new(numbered_frames(4, 64));
    let bridge = CaptureBridge::default();

    let utterance = bridge.capture_utterance(&mut source, 256).await.unwrap();
    assert_eq!(utterance.len(), 256);
}

#[tokio::test]
async fn test_source_ending_early_fails_capture() {
    let mut source = ScriptedSource::new(numbered_frames(2, 10));
    let stats = source.stats();
    let bridge = CaptureBridge::default();

    let result = bridge.capture_utterance(&mut source, 100).await;

    assert!(matches!(result, Err(Error::Audio(_))));
    assert_eq!(stats.stops(), 1, "source must be stopped on failure");
}

#[tokio::test]
async fn test_cancelled_capture_stops_source() {
    let mut source = SilentSource::new();
    let stats = source.stats();
    let bridge = CaptureBridge::default();

    let capture = bridge.capture_utterance(&mut source, 1024);
    let timed_out = tokio::time::timeout(Duration::from_millis(20), capture).await;

    assert!(timed_out.is_err());
    assert_eq!(stats.starts(), 1);
    assert_eq!(stats.stops(), 1);
}

#[tokio::test]
async fn test_stalled_source_fails_capture() {
    let mut source = SilentSource::new();
    let stats = source.stats();
    let bridge = CaptureBridge::default().with_stall_timeout(Duration::from_millis(30));

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        bridge.capture_utterance(&mut source, 1024),
    )
    .await
    .expect("stall timeout must end the capture");

    assert!(matches!(result, Err(Error::Audio(_))));
    assert_eq!(stats.stops(), 1);
}

#[tokio::test]
async fn test_frames_keep_stall_timer_alive() {
    // 20 frames spaced well inside the stall timeout take longer than it overall
    let mut source =
        ScriptedSource::new(numbered_frames(20, 8)).with_interval(Duration::from_millis(10));
    let bridge = CaptureBridge::default().with_stall_timeout(Duration::from_millis(100));

    let utterance = bridge.capture_utterance(&mut source, 160).await.unwrap();
    assert_eq!(utterance.len(), 160);
}

#[tokio::test]
async fn test_each_capture_gets_a_fresh_queue() {
    let bridge = CaptureBridge::new(4);

    // Frames pushed into a previous queue are gone with it
    let (stale, rx) = bridge.channel();
    assert_eq!(stale.push(vec![0xEE; 4]), PushOutcome::Queued);
    drop(rx);

    let mut source = ScriptedSource::new(vec![vec![1, 2], vec![3, 4]]);
    let utterance = bridge.capture_utterance(&mut source, 4).await.unwrap();
    assert_eq!(utterance.as_bytes(), &[1, 2, 3, 4]);
}

#[test]
fn test_saturated_queue_never_blocks_and_drops_newest() {
    let bridge = CaptureBridge::new(10);
    let (sender, mut rx) = bridge.channel();

    // No consumer running: everything past the bound is dropped at once
    let outcomes: Vec<PushOutcome> = (0..25u8).map(|i| sender.push(vec![i])).collect();

    assert_eq!(
        outcomes.iter().filter(|o| **o == PushOutcome::Queued).count(),
        10
    );
    assert_eq!(bridge.dropped_frames(), 15);

    // The oldest frames survive, in order
    for i in 0..10u8 {
        assert_eq!(rx.try_recv().unwrap(), vec![i]);
    }
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_default_utterance_size() {
    // 2.5 s of 16-bit mono at 44.1 kHz
    assert_eq!(utterance_capacity(44_100, 2_500), 44_100 * 5);
}
