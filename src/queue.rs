//! Bounded, thread-safe frame queue with backpressure.
//!
//! [`FrameQueue`] is the only channel between the producer thread and
//! consumers. It is a fixed-capacity FIFO guarded by a mutex and two
//! condition variables: producers block while the queue is full, consumers
//! block while it is empty. Closing the queue — at end of stream, on a
//! terminal source failure, or on release — wakes everyone.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::SeeklessError;
use crate::frame::Frame;

/// Why the queue was closed.
#[derive(Debug, Clone)]
pub(crate) enum CloseReason {
    /// The source reached end of stream; buffered frames remain poppable.
    Finished,
    /// The producer hit a terminal failure; buffered frames drain first,
    /// then every pop reports the failure.
    Failed(String),
    /// The loader was released; pops fail immediately, without draining.
    Released,
}

struct QueueInner {
    buffer: VecDeque<Frame>,
    closed: Option<CloseReason>,
}

/// Bounded FIFO of decoded frames.
///
/// Invariant: `buffer.len() <= capacity` at all times. Frames enter and
/// leave in strictly increasing index order — there is one producer, and the
/// buffer is never reordered.
pub(crate) struct FrameQueue {
    inner: Mutex<QueueInner>,
    /// Signalled when a slot frees up or the queue closes; producers wait here.
    space: Condvar,
    /// Signalled when a frame arrives or the queue closes; consumers wait here.
    items: Condvar,
    capacity: usize,
}

impl FrameQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                buffer: VecDeque::with_capacity(capacity),
                closed: None,
            }),
            space: Condvar::new(),
            items: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a frame, blocking while the queue is full.
    ///
    /// Returns `false` once the queue has been closed for any reason — the
    /// producer should stop reading.
    pub(crate) fn push(&self, frame: Frame) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            if inner.closed.is_some() {
                return false;
            }
            if inner.buffer.len() < self.capacity {
                inner.buffer.push_back(frame);
                self.items.notify_one();
                return true;
            }
            inner = self
                .space
                .wait(inner)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Remove the oldest frame, blocking while the queue is empty.
    ///
    /// Outcomes:
    /// - `Ok(Some(frame))` — a frame was available.
    /// - `Ok(None)` — the stream finished and the buffer has drained.
    /// - `Err(SourceFailed)` — the producer failed terminally (buffered
    ///   frames drain first).
    /// - `Err(Released)` — the loader was released (no draining).
    /// - `Err(Timeout)` — `timeout` elapsed with nothing produced.
    pub(crate) fn pop(&self, timeout: Option<Duration>) -> Result<Option<Frame>, SeeklessError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            if matches!(inner.closed, Some(CloseReason::Released)) {
                return Err(SeeklessError::Released);
            }
            if let Some(frame) = inner.buffer.pop_front() {
                self.space.notify_one();
                return Ok(Some(frame));
            }
            match &inner.closed {
                Some(CloseReason::Finished) => return Ok(None),
                Some(CloseReason::Failed(reason)) => {
                    return Err(SeeklessError::SourceFailed {
                        reason: reason.clone(),
                    });
                }
                Some(CloseReason::Released) | None => {}
            }
            inner = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(SeeklessError::Timeout {
                            // timeout is Some whenever deadline is
                            waited: timeout.unwrap_or_default(),
                        });
                    }
                    let (guard, _) = self
                        .items
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    guard
                }
                None => self
                    .items
                    .wait(inner)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            };
        }
    }

    /// Close at end of stream. Buffered frames remain poppable.
    pub(crate) fn finish(&self) {
        self.close(CloseReason::Finished);
    }

    /// Close with a terminal failure delivered to all consumers.
    pub(crate) fn fail(&self, reason: String) {
        self.close(CloseReason::Failed(reason));
    }

    /// Close for release. Overrides any earlier close so that blocked and
    /// future pops fail with [`SeeklessError::Released`] immediately.
    pub(crate) fn release(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.closed = Some(CloseReason::Released);
        drop(inner);
        self.space.notify_all();
        self.items.notify_all();
    }

    fn close(&self, reason: CloseReason) {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.closed.is_none() {
            inner.closed = Some(reason);
        }
        drop(inner);
        self.space.notify_all();
        self.items.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use image::DynamicImage;

    use super::*;

    fn frame(index: u64) -> Frame {
        Frame::new(index, DynamicImage::new_rgb8(2, 2))
    }

    #[test]
    fn pop_returns_pushed_frames_in_order() {
        let queue = FrameQueue::new(4);
        assert!(queue.push(frame(0)));
        assert!(queue.push(frame(1)));

        let first = queue.pop(None).unwrap().unwrap();
        let second = queue.pop(None).unwrap().unwrap();
        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);
    }

    #[test]
    fn finish_drains_then_signals_end() {
        let queue = FrameQueue::new(4);
        assert!(queue.push(frame(0)));
        queue.finish();

        assert!(!queue.push(frame(1)), "push after close should be refused");
        assert_eq!(queue.pop(None).unwrap().unwrap().index(), 0);
        assert!(queue.pop(None).unwrap().is_none(), "drained queue should signal end");
        assert!(queue.pop(None).unwrap().is_none(), "end of stream is sticky");
    }

    #[test]
    fn fail_drains_then_reports_failure() {
        let queue = FrameQueue::new(4);
        assert!(queue.push(frame(0)));
        queue.fail("device unplugged".to_string());

        assert_eq!(queue.pop(None).unwrap().unwrap().index(), 0);
        match queue.pop(None) {
            Err(SeeklessError::SourceFailed { reason }) => {
                assert!(reason.contains("unplugged"));
            }
            other => panic!("expected SourceFailed, got {other:?}"),
        }
    }

    #[test]
    fn release_fails_pops_without_draining() {
        let queue = FrameQueue::new(4);
        assert!(queue.push(frame(0)));
        queue.release();

        assert!(matches!(queue.pop(None), Err(SeeklessError::Released)));
    }

    #[test]
    fn push_blocks_at_capacity_until_pop() {
        let queue = Arc::new(FrameQueue::new(1));
        assert!(queue.push(frame(0)));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(frame(1)))
        };

        // The producer should be blocked on the full queue.
        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished(), "push should block while full");

        assert_eq!(queue.pop(None).unwrap().unwrap().index(), 0);
        assert!(producer.join().unwrap());
        assert_eq!(queue.pop(None).unwrap().unwrap().index(), 1);
    }

    #[test]
    fn release_wakes_blocked_consumer() {
        let queue = Arc::new(FrameQueue::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop(None))
        };

        thread::sleep(Duration::from_millis(50));
        queue.release();

        match consumer.join().unwrap() {
            Err(SeeklessError::Released) => {}
            other => panic!("expected Released, got {other:?}"),
        }
    }

    #[test]
    fn pop_times_out_on_empty_queue() {
        let queue = FrameQueue::new(1);
        match queue.pop(Some(Duration::from_millis(20))) {
            Err(SeeklessError::Timeout { waited }) => {
                assert_eq!(waited, Duration::from_millis(20));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
