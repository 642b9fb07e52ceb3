//! The [`VideoLoader`] facade.
//!
//! `VideoLoader` turns a strictly forward-only frame source into something
//! that behaves like a list of frames: it has a length, supports indexing
//! with negative indices, slicing with arbitrary steps, and plain
//! iteration. Under the hood a producer (a background thread by default)
//! reads the source forward through a bounded queue, and every frame that
//! flows past the cursor lands in an append-only cache that serves all
//! re-reads.
//!
//! # Example
//!
//! ```no_run
//! use seekless::{LoaderOptions, VideoLoader};
//!
//! let mut loader = VideoLoader::open("input.mp4", LoaderOptions::new())?;
//!
//! let last = loader.get(-1)?;            // negative indices count from the end
//! let every_tenth = loader.slice(None, None, 10)?.collect_frames()?;
//! for result in loader.iter() {
//!     let frame = result?;
//!     // ...
//! }
//! loader.release();
//! # Ok::<(), seekless::SeeklessError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cache::FrameCache;
use crate::capture::FfmpegCapture;
use crate::error::SeeklessError;
use crate::frame::Frame;
use crate::iter::FrameIter;
use crate::options::{FrameTransform, LoaderOptions};
use crate::producer::{StopSignal, read_with_retry, run_producer};
use crate::queue::FrameQueue;
use crate::slice::{LazySlice, NormalizedSlice, SliceFrames};
use crate::source::{FrameSource, SourceInfo};

/// How frames reach the consumer side.
enum Pipeline {
    /// A background thread owns the source and pushes through the queue.
    Threaded {
        queue: Arc<FrameQueue>,
        handle: JoinHandle<()>,
    },
    /// No thread: the source is read synchronously at the moment of request.
    Direct {
        source: Box<dyn FrameSource>,
        transform: Option<FrameTransform>,
        finished: bool,
    },
    /// The loader has been released; the source is gone.
    Released,
}

/// Buffered, randomly-addressable access to a sequential frame source.
///
/// Construct with [`open`](VideoLoader::open) for FFmpeg-backed sources or
/// [`from_source`](VideoLoader::from_source) for any [`FrameSource`]
/// implementation. Dropping the loader releases everything — the background
/// thread is joined and the capture handle closed on every exit path.
///
/// All methods take `&mut self`; to release from another thread while a
/// call is blocked, use a [`StopHandle`].
pub struct VideoLoader {
    info: SourceInfo,
    cache: FrameCache,
    pipeline: Pipeline,
    stop: StopSignal,
    released: bool,
    slices_as_iter: bool,
    read_timeout: Option<Duration>,
    location: String,
}

impl Debug for VideoLoader {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoLoader")
            .field("location", &self.location)
            .field("info", &self.info)
            .field("cursor", &self.cache.next_index())
            .field("threaded", &matches!(self.pipeline, Pipeline::Threaded { .. }))
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl VideoLoader {
    /// Open a video file or stream URL.
    ///
    /// # Errors
    ///
    /// - [`SeeklessError::SourceOpen`] if the source cannot be opened.
    /// - [`SeeklessError::NoVideoStream`] if it contains no video.
    /// - [`SeeklessError::NotSeekable`] if `precache` is requested for a
    ///   source with an unknown frame count.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use seekless::{LoaderOptions, VideoLoader};
    ///
    /// let loader = VideoLoader::open("input.mp4", LoaderOptions::new())?;
    /// println!("{} frames at {} fps", loader.len()?, loader.fps());
    /// # Ok::<(), seekless::SeeklessError>(())
    /// ```
    pub fn open(location: &str, options: LoaderOptions) -> Result<Self, SeeklessError> {
        let capture = FfmpegCapture::open(location, &options)?;
        Self::build(location.to_string(), Box::new(capture), options)
    }

    /// Build a loader over any [`FrameSource`] implementation.
    ///
    /// Useful for composing with custom capture layers, or for driving the
    /// pipeline from synthetic sources in tests.
    pub fn from_source(
        source: Box<dyn FrameSource>,
        options: LoaderOptions,
    ) -> Result<Self, SeeklessError> {
        Self::build("<custom source>".to_string(), source, options)
    }

    fn build(
        location: String,
        source: Box<dyn FrameSource>,
        options: LoaderOptions,
    ) -> Result<Self, SeeklessError> {
        let info = source.info().clone();
        let stop = StopSignal::new();

        let pipeline = if options.use_threading {
            let queue = Arc::new(FrameQueue::new(options.max_queue_size));
            let handle = {
                let queue = Arc::clone(&queue);
                let stop = stop.clone();
                let transform = options.transform.clone();
                thread::Builder::new()
                    .name("seekless-producer".to_string())
                    .spawn(move || run_producer(source, queue, stop, transform))?
            };
            Pipeline::Threaded { queue, handle }
        } else {
            Pipeline::Direct {
                source,
                transform: options.transform.clone(),
                finished: false,
            }
        };

        let mut loader = Self {
            info,
            cache: FrameCache::new(options.cache_limit),
            pipeline,
            stop,
            released: false,
            slices_as_iter: options.slices_as_iter,
            read_timeout: options.read_timeout,
            location,
        };
        log::info!(
            "opened {}: {}x{} @ {:.2} fps, {} frames, threading={}",
            loader.location,
            loader.info.width,
            loader.info.height,
            loader.info.fps,
            loader
                .info
                .frame_count
                .map_or_else(|| "unknown".to_string(), |n| n.to_string()),
            options.use_threading,
        );

        if options.precache {
            loader.precache_all()?;
        }
        Ok(loader)
    }

    /// Drain the entire source into the cache.
    fn precache_all(&mut self) -> Result<(), SeeklessError> {
        let expected = self.require_len("precaching")?;
        log::info!("precaching {expected} frames from {}", self.location);
        while self.cache.next_index() < expected {
            if self.advance()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    // ── metadata ───────────────────────────────────────────────────

    /// Frames per second reported by the source.
    pub fn fps(&self) -> f64 {
        self.info.fps
    }

    /// Width of delivered frames in pixels.
    pub fn width(&self) -> u32 {
        self.info.width
    }

    /// Height of delivered frames in pixels.
    pub fn height(&self) -> u32 {
        self.info.height
    }

    /// Total frame count, if known. `None` for live/unbounded sources.
    pub fn frame_count(&self) -> Option<u64> {
        self.info.frame_count
    }

    /// Whether indexing and slicing are possible over this source.
    pub fn is_seekable(&self) -> bool {
        self.info.is_seekable()
    }

    /// The source metadata captured at open time.
    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /// The path or URL this loader was opened with.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// One-line human-readable summary of the loader.
    pub fn describe(&self) -> String {
        format!(
            "VideoLoader({}: {}x{} @ {:.2} fps, frames: {}, cursor: {}, threaded: {})",
            self.location,
            self.info.width,
            self.info.height,
            self.info.fps,
            self.info
                .frame_count
                .map_or_else(|| "unknown".to_string(), |n| n.to_string()),
            self.cache.next_index(),
            matches!(self.pipeline, Pipeline::Threaded { .. }),
        )
    }

    /// The number of frames in the source.
    ///
    /// # Errors
    ///
    /// [`SeeklessError::NotSeekable`] when the frame count is unknown.
    pub fn len(&self) -> Result<u64, SeeklessError> {
        self.require_len("length query")
    }

    // ── random access ──────────────────────────────────────────────

    /// Fetch the frame at `index`. Negative indices count from the end.
    ///
    /// If the frame is not yet cached, the cursor is advanced synchronously
    /// — reading and caching every intervening frame — until the index is
    /// produced. Cached indices are never re-decoded.
    ///
    /// # Errors
    ///
    /// - [`SeeklessError::NotSeekable`] if the frame count is unknown.
    /// - [`SeeklessError::OutOfRange`] if the normalized index is outside
    ///   `[0, len)`.
    /// - [`SeeklessError::Evicted`] if a bounded cache dropped the index.
    /// - [`SeeklessError::Timeout`], [`SeeklessError::SourceFailed`],
    ///   [`SeeklessError::Released`] from the pipeline.
    pub fn get(&mut self, index: i64) -> Result<Frame, SeeklessError> {
        self.ensure_active()?;
        let length = self.require_len("indexing")?;
        let normalized = if index < 0 { index + length as i64 } else { index };
        if normalized < 0 || normalized as u64 >= length {
            return Err(SeeklessError::OutOfRange { index, length });
        }
        self.frame_at(normalized as u64)
    }

    /// Select a sub-sequence of frames.
    ///
    /// `start`/`stop`/`step` follow standard sequence-slicing rules:
    /// `None` endpoints default to the relevant end, negative values count
    /// from the end, out-of-bounds endpoints clamp, and a negative step
    /// walks backwards.
    ///
    /// Delivery is materialized by default. With
    /// [`slices_as_iter`](crate::LoaderOptions::slices_as_iter) set,
    /// positive-step slices are returned lazily and negative steps are
    /// rejected — a forward-only source cannot be read backwards without
    /// materializing.
    ///
    /// # Errors
    ///
    /// - [`SeeklessError::NotSeekable`] if the frame count is unknown.
    /// - [`SeeklessError::UnsupportedSlice`] for a zero step, or a negative
    ///   step in lazy mode.
    /// - Pipeline errors as for [`get`](VideoLoader::get).
    pub fn slice(
        &mut self,
        start: Option<i64>,
        stop: Option<i64>,
        step: i64,
    ) -> Result<SliceFrames<'_>, SeeklessError> {
        self.ensure_active()?;
        let length = self.require_len("slicing")?;
        let normalized = NormalizedSlice::new(start, stop, step, length)?;

        if self.slices_as_iter {
            if step < 0 {
                return Err(SeeklessError::UnsupportedSlice {
                    reason: "negative step cannot be delivered lazily over a forward-only source"
                        .to_string(),
                });
            }
            return Ok(SliceFrames::Lazy(LazySlice::new(self, normalized)));
        }

        // Materialize: advance to the highest needed index once, then
        // assemble from the cache in slice order.
        if let Some(highest) = normalized.highest() {
            self.frame_at(highest)?;
        }
        let mut frames = Vec::with_capacity(normalized.count() as usize);
        for k in 0..normalized.count() {
            frames.push(self.frame_at(normalized.nth(k))?);
        }
        Ok(SliceFrames::Materialized(frames))
    }

    /// Iterate over every frame in index order.
    ///
    /// Works on unseekable sources. Each iterator is single pass; a new
    /// iterator restarts from frame 0, replaying the cache.
    pub fn iter(&mut self) -> FrameIter<'_> {
        FrameIter::new(self)
    }

    // ── lifecycle ──────────────────────────────────────────────────

    /// A handle that can release this loader from another thread.
    ///
    /// Releasing through the handle wakes any consumer blocked on the
    /// pipeline with [`SeeklessError::Released`] and stops the producer
    /// before its next read.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: self.stop.clone(),
            queue: match &self.pipeline {
                Pipeline::Threaded { queue, .. } => Some(Arc::clone(queue)),
                _ => None,
            },
        }
    }

    /// Stop production and free the source.
    ///
    /// Sets the stop flag, wakes every blocked consumer, joins the producer
    /// thread (letting any in-flight read complete), and drops the capture
    /// handle. Idempotent; also runs on drop, so every exit path releases.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.stop.trigger();
        log::debug!("releasing loader for {}", self.location);
        match std::mem::replace(&mut self.pipeline, Pipeline::Released) {
            Pipeline::Threaded { queue, handle } => {
                queue.release();
                if handle.join().is_err() {
                    log::warn!("producer thread panicked during release");
                }
            }
            // Dropping the direct pipeline drops the source.
            Pipeline::Direct { .. } | Pipeline::Released => {}
        }
    }

    // ── internals shared with iterators, slices, and exporters ─────

    /// The consumer-side cursor: the next index to be consumed.
    pub(crate) fn cursor(&self) -> u64 {
        self.cache.next_index()
    }

    pub(crate) fn cached(&self, index: u64) -> Result<Frame, SeeklessError> {
        self.cache.get(index)
    }

    pub(crate) fn advance_checked(&mut self) -> Result<Option<Frame>, SeeklessError> {
        self.ensure_active()?;
        self.advance()
    }

    /// Fetch frame `index`, advancing the cursor as far as needed.
    pub(crate) fn frame_at(&mut self, index: u64) -> Result<Frame, SeeklessError> {
        self.ensure_active()?;
        if index < self.cache.next_index() {
            return self.cache.get(index);
        }
        loop {
            match self.advance()? {
                Some(frame) if frame.index() == index => return Ok(frame),
                Some(_) => {}
                None => {
                    return Err(SeeklessError::OutOfRange {
                        index: index as i64,
                        length: self.cache.next_index(),
                    });
                }
            }
        }
    }

    pub(crate) fn require_len(&self, operation: &'static str) -> Result<u64, SeeklessError> {
        self.info
            .frame_count
            .ok_or(SeeklessError::NotSeekable { operation })
    }

    pub(crate) fn ensure_active(&self) -> Result<(), SeeklessError> {
        if self.released || self.stop.is_triggered() {
            Err(SeeklessError::Released)
        } else {
            Ok(())
        }
    }

    /// Pull one frame through the pipeline and cache it.
    fn advance(&mut self) -> Result<Option<Frame>, SeeklessError> {
        // A release requested mid-loop (via a StopHandle) stops the next
        // pull in both pipeline modes.
        if self.stop.is_triggered() {
            return Err(SeeklessError::Released);
        }
        let produced = match &mut self.pipeline {
            Pipeline::Threaded { queue, .. } => queue.pop(self.read_timeout)?,
            Pipeline::Direct {
                source,
                transform,
                finished,
            } => {
                if *finished {
                    None
                } else {
                    let index = self.cache.next_index();
                    match read_with_retry(source.as_mut(), index)? {
                        Some(image) => {
                            let image = match transform {
                                Some(transform) => transform(image),
                                None => image,
                            };
                            Some(Frame::new(index, image))
                        }
                        None => {
                            *finished = true;
                            None
                        }
                    }
                }
            }
            Pipeline::Released => return Err(SeeklessError::Released),
        };

        match produced {
            Some(frame) => {
                self.cache.insert(frame.clone());
                Ok(Some(frame))
            }
            None => {
                self.note_end_of_stream();
                Ok(None)
            }
        }
    }

    /// Reconcile the advertised frame count with what the source actually
    /// produced. Container metadata is an estimate; the stream itself is
    /// the ground truth.
    fn note_end_of_stream(&mut self) {
        let produced = self.cache.next_index();
        if let Some(expected) = self.info.frame_count {
            if expected != produced {
                log::debug!(
                    "source ended after {produced} frames (metadata reported {expected})"
                );
                self.info.frame_count = Some(produced);
            }
        }
    }
}

impl Drop for VideoLoader {
    fn drop(&mut self) {
        self.release();
    }
}

/// Releases a [`VideoLoader`] from another thread.
///
/// Obtained via [`VideoLoader::stop_handle`]. Cloneable; all clones refer
/// to the same loader.
///
/// # Example
///
/// ```no_run
/// use seekless::{LoaderOptions, VideoLoader};
///
/// let mut loader = VideoLoader::open("rtsp://camera/stream", LoaderOptions::new())?;
/// let handle = loader.stop_handle();
///
/// std::thread::spawn(move || {
///     std::thread::sleep(std::time::Duration::from_secs(10));
///     handle.release();
/// });
///
/// for result in loader.iter() {
///     // ends with SeeklessError::Released once the handle fires
///     if result.is_err() {
///         break;
///     }
/// }
/// # Ok::<(), seekless::SeeklessError>(())
/// ```
#[derive(Clone)]
pub struct StopHandle {
    stop: StopSignal,
    queue: Option<Arc<FrameQueue>>,
}

impl Debug for StopHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StopHandle")
            .field("released", &self.stop.is_triggered())
            .finish_non_exhaustive()
    }
}

impl StopHandle {
    /// Request release: stop the producer before its next read and wake
    /// every blocked consumer with [`SeeklessError::Released`].
    ///
    /// The loader's own [`release`](VideoLoader::release) (or drop) still
    /// performs the thread join and handle close.
    pub fn release(&self) {
        self.stop.trigger();
        if let Some(queue) = &self.queue {
            queue.release();
        }
    }

    /// Whether release has been requested.
    pub fn is_released(&self) -> bool {
        self.stop.is_triggered()
    }
}
