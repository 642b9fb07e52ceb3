//! Append-only frame cache.
//!
//! [`FrameCache`] is what makes a forward-only stream look random-access:
//! every frame that flows past the cursor is stored at its index, and
//! indices below the cursor are served from here without touching the
//! source again. While an index is cached, every read of it returns
//! identical content.
//!
//! By default the cache is unbounded and lives as long as the loader. An
//! optional limit evicts the lowest indices first; an evicted index cannot
//! be re-read (the source cannot rewind), so accessing one fails with
//! [`SeeklessError::Evicted`] rather than silently re-decoding.

use std::collections::VecDeque;

use crate::error::SeeklessError;
use crate::frame::Frame;

pub(crate) struct FrameCache {
    frames: VecDeque<Frame>,
    /// Index of `frames[0]`; greater than zero only after eviction.
    base: u64,
    limit: Option<usize>,
}

impl FrameCache {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            frames: VecDeque::new(),
            base: 0,
            limit,
        }
    }

    /// The next index to be appended — equivalently, how many frames have
    /// ever flowed through the cache. This is the consumer-side cursor.
    pub(crate) fn next_index(&self) -> u64 {
        self.base + self.frames.len() as u64
    }

    /// Append the next sequential frame, evicting the oldest entry when the
    /// configured limit is exceeded.
    pub(crate) fn insert(&mut self, frame: Frame) {
        debug_assert_eq!(
            frame.index(),
            self.next_index(),
            "cache inserts must be sequential"
        );
        self.frames.push_back(frame);
        if let Some(limit) = self.limit {
            while self.frames.len() > limit.max(1) {
                self.frames.pop_front();
                self.base += 1;
                log::trace!("evicted frame {} from cache", self.base - 1);
            }
        }
    }

    /// Fetch a cached frame. `index` must be below
    /// [`next_index`](FrameCache::next_index).
    pub(crate) fn get(&self, index: u64) -> Result<Frame, SeeklessError> {
        if index < self.base {
            return Err(SeeklessError::Evicted { index });
        }
        match self.frames.get((index - self.base) as usize) {
            Some(frame) => Ok(frame.clone()),
            None => Err(SeeklessError::OutOfRange {
                index: index as i64,
                length: self.next_index(),
            }),
        }
    }
}
