//! Producer/consumer pipeline behaviour: backpressure, timeouts, release.

mod common;

use common::SyntheticSource;
use seekless::{LoaderOptions, SeeklessError, VideoLoader};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

// ── backpressure ───────────────────────────────────────────────────

#[test]
fn producer_respects_the_queue_bound() {
    let source = SyntheticSource::new(100);
    let reads = source.reads();
    let loader = VideoLoader::from_source(
        Box::new(source),
        LoaderOptions::new().with_max_queue_size(3),
    )
    .expect("failed to build loader");

    // With no consumption the producer can hold at most the queue capacity
    // plus the one frame it is blocked trying to push.
    thread::sleep(Duration::from_millis(300));
    let unconsumed = reads.load(Ordering::SeqCst);
    assert!(
        unconsumed <= 4,
        "producer ran ahead of the bounded queue: {unconsumed} reads"
    );
    drop(loader);
}

#[test]
fn slow_consumer_keeps_the_bound() {
    let source = SyntheticSource::new(100);
    let reads = source.reads();
    let mut loader = VideoLoader::from_source(
        Box::new(source),
        LoaderOptions::new().with_max_queue_size(3),
    )
    .expect("failed to build loader");

    for i in 0..5 {
        loader.get(i).expect("get failed");
        thread::sleep(Duration::from_millis(40));
    }
    let consumed = 5;
    let produced = reads.load(Ordering::SeqCst);
    assert!(
        produced <= consumed + 3 + 1,
        "producer held more than the queue bound: {produced} reads for {consumed} consumed"
    );
}

// ── timeouts ───────────────────────────────────────────────────────

#[test]
fn blocked_reads_time_out_without_tearing_down() {
    let mut loader = VideoLoader::from_source(
        Box::new(SyntheticSource::new(5).with_delay(Duration::from_millis(250))),
        LoaderOptions::new().with_read_timeout(Some(Duration::from_millis(40))),
    )
    .expect("failed to build loader");

    match loader.get(0) {
        Err(SeeklessError::Timeout { waited }) => {
            assert_eq!(waited, Duration::from_millis(40));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }

    // The pipeline is still alive: once the slow frame lands, the same
    // call succeeds.
    thread::sleep(Duration::from_millis(400));
    let frame = loader.get(0).expect("get after timeout failed");
    assert_eq!(frame.index(), 0);
}

// ── release ────────────────────────────────────────────────────────

#[test]
fn release_wakes_a_blocked_consumer() {
    let mut loader = VideoLoader::from_source(
        Box::new(SyntheticSource::new(1000).with_delay(Duration::from_millis(30))),
        LoaderOptions::new().with_read_timeout(None),
    )
    .expect("failed to build loader");
    let handle = loader.stop_handle();

    let consumer = thread::spawn(move || {
        let started = Instant::now();
        let result = loader.get(900);
        (result, started.elapsed())
    });

    thread::sleep(Duration::from_millis(150));
    handle.release();
    assert!(handle.is_released());

    let (result, elapsed) = consumer.join().expect("consumer panicked");
    assert!(
        matches!(result, Err(SeeklessError::Released)),
        "blocked consumer must observe the release: {result:?}"
    );
    assert!(
        elapsed < Duration::from_secs(5),
        "release must wake the consumer in bounded time, took {elapsed:?}"
    );
}

#[test]
fn release_unblocks_a_full_queue_producer() {
    let mut loader = VideoLoader::from_source(
        Box::new(SyntheticSource::new(1000)),
        LoaderOptions::new().with_max_queue_size(2),
    )
    .expect("failed to build loader");

    // Give the producer time to fill the queue and block on push.
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    loader.release();
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "release (thread join) must not deadlock against a blocked push"
    );
}

#[test]
fn operations_after_release_fail() {
    let mut loader =
        VideoLoader::from_source(Box::new(SyntheticSource::new(10)), LoaderOptions::new())
            .expect("failed to build loader");

    loader.get(0).expect("get before release failed");
    loader.release();
    loader.release(); // idempotent

    assert!(matches!(loader.get(0), Err(SeeklessError::Released)));
    assert!(matches!(
        loader.slice(None, None, 1),
        Err(SeeklessError::Released)
    ));
    match loader.iter().next() {
        Some(Err(SeeklessError::Released)) => {}
        other => panic!("expected Released from iteration, got {other:?}"),
    }
}

#[test]
fn unthreaded_loaders_release_cleanly() {
    let mut loader = VideoLoader::from_source(
        Box::new(SyntheticSource::new(10)),
        LoaderOptions::new().with_threading(false),
    )
    .expect("failed to build loader");

    loader.get(3).expect("get failed");
    loader.release();
    assert!(matches!(loader.get(0), Err(SeeklessError::Released)));
}

// ── unthreaded parity ──────────────────────────────────────────────

#[test]
fn unthreaded_mode_delivers_the_same_frames() {
    let mut threaded =
        VideoLoader::from_source(Box::new(SyntheticSource::new(10)), LoaderOptions::new())
            .expect("failed to build loader");
    let mut direct = VideoLoader::from_source(
        Box::new(SyntheticSource::new(10)),
        LoaderOptions::new().with_threading(false),
    )
    .expect("failed to build loader");

    for i in 0..10 {
        let a = threaded.get(i).expect("threaded get failed");
        let b = direct.get(i).expect("direct get failed");
        assert_eq!(a.image().as_bytes(), b.image().as_bytes());
    }
}
