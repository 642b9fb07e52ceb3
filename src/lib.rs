//! # seekless
//!
//! Random-access frame loading over forward-only video sources.
//!
//! Video decoders read forward, one frame at a time, and a live stream may
//! block for as long as it likes. `seekless` reconciles that with the
//! access patterns callers actually want — iteration, list-style indexing
//! with negative indices, and slicing with arbitrary steps — by combining
//! a background producer thread, a bounded frame queue with backpressure,
//! and an index-keyed frame cache. Decoding is powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate; frames are
//! delivered as [`image::DynamicImage`] values.
//!
//! ## Quick Start
//!
//! ```no_run
//! use seekless::{LoaderOptions, VideoLoader};
//!
//! let mut loader = VideoLoader::open("input.mp4", LoaderOptions::new())?;
//!
//! // List-style access.
//! let first = loader.get(0)?;
//! let last = loader.get(-1)?;
//!
//! // Slicing: frames 10..20, then the whole video reversed.
//! let middle = loader.slice(Some(10), Some(20), 1)?.collect_frames()?;
//! let reversed = loader.slice(None, None, -1)?.collect_frames()?;
//!
//! // Plain iteration, lazy and in order.
//! for result in loader.iter() {
//!     let frame = result?;
//!     println!("frame {}", frame.index());
//! }
//! # Ok::<(), seekless::SeeklessError>(())
//! ```
//!
//! ## Exporting
//!
//! ```no_run
//! use seekless::{ExportRange, LoaderOptions, VideoExporter, VideoExportOptions, VideoLoader};
//!
//! let mut loader = VideoLoader::open("input.mp4", LoaderOptions::new())?;
//! VideoExporter::new(VideoExportOptions::default())
//!     .export(&mut loader, ExportRange::all(), "copy.mp4", None)?;
//! # Ok::<(), seekless::SeeklessError>(())
//! ```
//!
//! ## How it works
//!
//! - **Producer/consumer pipeline** — a dedicated thread reads the source
//!   and pushes into a bounded queue (default 50 slots); the producer
//!   blocks when consumers fall behind, so memory stays bounded.
//! - **Frame cache** — every frame that flows past the cursor is stored at
//!   its index. Re-reads are cache hits; nothing is decoded twice.
//! - **Index translation** — `get(i)` that lands past the cursor advances
//!   the pipeline (caching everything on the way) until index `i` is
//!   produced. Negative steps materialize the forward span first, then
//!   replay it in reverse.
//! - **Lifecycle** — [`VideoLoader::release`] (also run on drop) stops the
//!   producer, wakes blocked consumers, joins the thread, and closes the
//!   capture handle; a [`StopHandle`] does the same from another thread.
//!
//! Live sources (unknown frame count) support iteration and forward
//! exports; length queries, indexing, and slicing fail with
//! [`SeeklessError::NotSeekable`].
//!
//! ## Features at a glance
//!
//! - Negative indices and full slice semantics (clamping, negative steps)
//! - Lazy or materialized slice delivery, selected by configuration
//! - Optional precache: drain the whole source up front for O(1) access
//! - Per-frame transform applied exactly once, before caching
//! - Optional unthreaded mode: frames pulled synchronously on request
//! - Read timeouts for stalling live sources
//! - Export to a video container or numbered image files, with an
//!   external start/stop gate
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod capture;
pub mod error;
pub mod export;
pub mod frame;
pub mod iter;
pub mod loader;
pub mod options;
pub mod slice;
pub mod source;

mod cache;
mod producer;
mod queue;

pub use capture::{DecoderLogLevel, FfmpegCapture, set_decoder_log_level};
pub use error::SeeklessError;
pub use export::{
    ExportRange, FrameExporter, RecordGate, VideoCodec, VideoExportOptions, VideoExporter,
};
pub use frame::Frame;
pub use iter::FrameIter;
pub use loader::{StopHandle, VideoLoader};
pub use options::{FrameTransform, LoaderOptions, PixelFormat};
pub use slice::{LazySlice, SliceFrames, SliceIter};
pub use source::{FrameSource, SourceInfo};
