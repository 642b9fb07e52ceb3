//! Shared test support: a deterministic, in-memory frame source.
//!
//! `SyntheticSource` produces solid-colour frames whose pixel values are a
//! function of the frame index, so tests can verify content, ordering, and
//! read counts without media fixtures or FFmpeg.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use image::{DynamicImage, Rgb, RgbImage};
use seekless::{FrameSource, SeeklessError, SourceInfo};

pub const DEFAULT_WIDTH: u32 = 8;
pub const DEFAULT_HEIGHT: u32 = 8;

/// The image `SyntheticSource` produces for `index`.
pub fn synthetic_image(index: u64, width: u32, height: u32) -> DynamicImage {
    let pixel = Rgb([
        (index % 251) as u8,
        (index * 2 % 251) as u8,
        (index * 3 % 251) as u8,
    ]);
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, pixel))
}

/// Raw bytes of the image `SyntheticSource` produces for `index`, for
/// content assertions.
pub fn synthetic_bytes(index: u64) -> Vec<u8> {
    synthetic_image(index, DEFAULT_WIDTH, DEFAULT_HEIGHT)
        .as_bytes()
        .to_vec()
}

/// A forward-only source of generated frames.
pub struct SyntheticSource {
    info: SourceInfo,
    total: u64,
    produced: u64,
    width: u32,
    height: u32,
    delay: Option<Duration>,
    fail_at: Option<u64>,
    fail_once_at: Option<u64>,
    reads: Arc<AtomicU64>,
}

impl SyntheticSource {
    /// A seekable source with `total` frames and a known frame count.
    pub fn new(total: u64) -> Self {
        Self {
            info: SourceInfo {
                fps: 10.0,
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
                frame_count: Some(total),
            },
            total,
            produced: 0,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            delay: None,
            fail_at: None,
            fail_once_at: None,
            reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Report an unknown frame count, like a live stream. The source still
    /// ends after `total` frames.
    pub fn live(mut self) -> Self {
        self.info.frame_count = None;
        self
    }

    /// Produce frames of the given size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self.info.width = width;
        self.info.height = height;
        self
    }

    /// Sleep this long inside every read, simulating a slow decoder.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every read of the given index (a permanently corrupt frame).
    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Fail the first read of the given index, then recover.
    pub fn failing_once_at(mut self, index: u64) -> Self {
        self.fail_once_at = Some(index);
        self
    }

    /// Counter of `read_next` calls, shared with the source after it moves
    /// into the loader.
    pub fn reads(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.reads)
    }
}

impl FrameSource for SyntheticSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_next(&mut self) -> Result<Option<DynamicImage>, SeeklessError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.fail_once_at == Some(self.produced) {
            self.fail_once_at = None;
            return Err(SeeklessError::Decode {
                index: self.produced,
                reason: "synthetic transient decode failure".to_string(),
            });
        }
        if self.fail_at == Some(self.produced) {
            return Err(SeeklessError::Decode {
                index: self.produced,
                reason: "synthetic decode failure".to_string(),
            });
        }
        if self.produced >= self.total {
            return Ok(None);
        }
        let image = synthetic_image(self.produced, self.width, self.height);
        self.produced += 1;
        Ok(Some(image))
    }
}
