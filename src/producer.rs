//! The background producer loop.
//!
//! When threading is enabled, one producer thread per loader owns the
//! [`FrameSource`] and drives it: read, transform, assign the next
//! sequential index, push into the bounded queue. The loop exits at end of
//! stream, on a terminal read failure, when the queue is closed from the
//! consumer side, or when the stop signal fires. Decoding is not
//! preemptible, so a stop signal takes effect before the *next* read —
//! in-flight reads complete.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::DynamicImage;

use crate::error::SeeklessError;
use crate::frame::Frame;
use crate::options::FrameTransform;
use crate::queue::FrameQueue;
use crate::source::FrameSource;

/// How many times a failed read is retried before the failure is terminal.
pub(crate) const DECODE_RETRY_LIMIT: u32 = 3;

/// Cloneable stop flag observed by the producer loop before each read.
///
/// All clones share one flag; triggering any clone stops the loop.
#[derive(Debug, Clone, Default)]
pub(crate) struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn trigger(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Read the next frame, retrying transient decode errors up to
/// [`DECODE_RETRY_LIMIT`] attempts.
///
/// Shared by the producer thread and the unthreaded direct path. The last
/// error is returned once the retry limit is exhausted.
pub(crate) fn read_with_retry(
    source: &mut dyn FrameSource,
    index: u64,
) -> Result<Option<DynamicImage>, SeeklessError> {
    let mut last_error = match source.read_next() {
        Ok(image) => return Ok(image),
        Err(error) => error,
    };
    for attempt in 2..=DECODE_RETRY_LIMIT {
        log::warn!(
            "read of frame {index} failed, retrying (attempt {attempt}/{DECODE_RETRY_LIMIT}): {last_error}"
        );
        match source.read_next() {
            Ok(image) => return Ok(image),
            Err(error) => last_error = error,
        }
    }
    log::error!("read of frame {index} failed after {DECODE_RETRY_LIMIT} attempts: {last_error}");
    Err(last_error)
}

/// Body of the producer thread.
///
/// Owns the source for the lifetime of the loop; dropping it on exit
/// releases the underlying capture handle.
pub(crate) fn run_producer(
    mut source: Box<dyn FrameSource>,
    queue: Arc<FrameQueue>,
    stop: StopSignal,
    transform: Option<FrameTransform>,
) {
    log::debug!("producer thread started");
    let mut cursor: u64 = 0;
    loop {
        if stop.is_triggered() {
            log::debug!("producer observed stop signal at frame {cursor}");
            break;
        }
        match read_with_retry(source.as_mut(), cursor) {
            Ok(Some(image)) => {
                let image = match &transform {
                    Some(transform) => transform(image),
                    None => image,
                };
                if !queue.push(Frame::new(cursor, image)) {
                    // Queue closed from the consumer side.
                    break;
                }
                cursor += 1;
            }
            Ok(None) => {
                log::debug!("source exhausted after {cursor} frames");
                queue.finish();
                break;
            }
            Err(error) => {
                queue.fail(error.to_string());
                break;
            }
        }
    }
    log::debug!("producer thread exiting");
}
