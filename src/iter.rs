//! Lazy forward iteration over the whole source.
//!
//! [`FrameIter`] replays the cached prefix first, then advances the
//! pipeline one frame per pull. Each iterator instance is single pass;
//! creating a new one restarts from frame 0 (the cached prefix replays
//! identically, then production continues where it left off).
//!
//! Iteration is the one access pattern that works on unseekable sources —
//! it never needs to know the frame count.
//!
//! # Example
//!
//! ```no_run
//! use seekless::{LoaderOptions, VideoLoader};
//!
//! let mut loader = VideoLoader::open("input.mp4", LoaderOptions::new())?;
//! for result in loader.iter() {
//!     let frame = result?;
//!     println!("frame {} is {}x{}", frame.index(), frame.width(), frame.height());
//! }
//! # Ok::<(), seekless::SeeklessError>(())
//! ```

use crate::error::SeeklessError;
use crate::frame::Frame;
use crate::loader::VideoLoader;

/// Iterator over every frame of a loader, in index order.
///
/// Created via [`VideoLoader::iter`]. Yields `Result<Frame, SeeklessError>`;
/// the first error ends the iteration permanently. Frames that pass through
/// are cached, so a later iterator (or [`VideoLoader::get`]) can revisit
/// them without re-decoding.
pub struct FrameIter<'a> {
    loader: &'a mut VideoLoader,
    next_index: u64,
    finished: bool,
}

impl<'a> FrameIter<'a> {
    pub(crate) fn new(loader: &'a mut VideoLoader) -> Self {
        Self {
            loader,
            next_index: 0,
            finished: false,
        }
    }
}

impl Iterator for FrameIter<'_> {
    type Item = Result<Frame, SeeklessError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Err(error) = self.loader.ensure_active() {
            self.finished = true;
            return Some(Err(error));
        }

        let result = if self.next_index < self.loader.cursor() {
            self.loader.cached(self.next_index)
        } else {
            match self.loader.advance_checked() {
                Ok(Some(frame)) => Ok(frame),
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(error) => Err(error),
            }
        };

        match result {
            Ok(frame) => {
                self.next_index += 1;
                Some(Ok(frame))
            }
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.loader.frame_count() {
            Some(total) => {
                let remaining = total.saturating_sub(self.next_index) as usize;
                (remaining, Some(remaining))
            }
            None => (0, None),
        }
    }
}
