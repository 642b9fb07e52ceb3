//! Per-frame transform contract: applied exactly once, before caching.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::{SyntheticSource, synthetic_image};
use image::DynamicImage;
use seekless::{FrameTransform, LoaderOptions, VideoLoader};

fn inverted_bytes(index: u64) -> Vec<u8> {
    let mut image = synthetic_image(index, common::DEFAULT_WIDTH, common::DEFAULT_HEIGHT);
    image.invert();
    image.as_bytes().to_vec()
}

fn invert() -> FrameTransform {
    Arc::new(|mut image: DynamicImage| {
        image.invert();
        image
    })
}

#[test]
fn delivered_frames_are_transformed() {
    let mut loader = VideoLoader::from_source(
        Box::new(SyntheticSource::new(10)),
        LoaderOptions::new().with_transform(invert()),
    )
    .expect("failed to build loader");

    let frame = loader.get(4).expect("get failed");
    assert_eq!(frame.image().as_bytes(), inverted_bytes(4));
}

#[test]
fn transform_runs_exactly_once_per_frame() {
    let calls = Arc::new(AtomicU64::new(0));
    let transform: FrameTransform = {
        let calls = Arc::clone(&calls);
        Arc::new(move |mut image: DynamicImage| {
            calls.fetch_add(1, Ordering::SeqCst);
            image.invert();
            image
        })
    };

    let mut loader = VideoLoader::from_source(
        Box::new(SyntheticSource::new(10)),
        LoaderOptions::new()
            .with_threading(false)
            .with_transform(transform),
    )
    .expect("failed to build loader");

    loader.get(5).expect("get failed");
    assert_eq!(calls.load(Ordering::SeqCst), 6, "one call per produced frame");

    // Cache hits never re-apply the transform.
    loader.get(5).expect("repeat get failed");
    loader.get(2).expect("cached get failed");
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    let count = loader.iter().count();
    assert_eq!(count, 10);
    assert_eq!(calls.load(Ordering::SeqCst), 10, "iteration transforms only new frames");
}

#[test]
fn cached_slices_are_post_transform() {
    let mut loader = VideoLoader::from_source(
        Box::new(SyntheticSource::new(10)),
        LoaderOptions::new().with_transform(invert()),
    )
    .expect("failed to build loader");

    let frames = loader
        .slice(None, None, -1)
        .expect("slice failed")
        .collect_frames()
        .expect("collect failed");
    for (k, frame) in frames.iter().enumerate() {
        assert_eq!(frame.image().as_bytes(), inverted_bytes(9 - k as u64));
    }
}

// The worked example from the crate's design discussions: ten frames, a
// three-slot queue, and an invert transform, exercised through every
// access pattern.
#[test]
fn end_to_end_scenario() {
    let mut loader = VideoLoader::from_source(
        Box::new(SyntheticSource::new(10)),
        LoaderOptions::new()
            .with_max_queue_size(3)
            .with_transform(invert()),
    )
    .expect("failed to build loader");

    let first = loader.get(0).expect("get(0) failed");
    assert_eq!(first.image().as_bytes(), inverted_bytes(0));

    let stepped: Vec<u64> = loader
        .slice(Some(2), Some(8), 2)
        .expect("slice failed")
        .collect_frames()
        .expect("collect failed")
        .iter()
        .map(|frame| frame.index())
        .collect();
    assert_eq!(stepped, vec![2, 4, 6]);

    let reversed = loader
        .slice(None, None, -1)
        .expect("reverse slice failed")
        .collect_frames()
        .expect("collect failed");
    assert_eq!(reversed.len(), 10);
    let indices: Vec<u64> = reversed.iter().map(|frame| frame.index()).collect();
    assert_eq!(indices, (0..10).rev().collect::<Vec<u64>>());
    for frame in &reversed {
        assert_eq!(frame.image().as_bytes(), inverted_bytes(frame.index()));
    }
}
