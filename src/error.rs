//! Error types for the `seekless` crate.
//!
//! This module defines [`SeeklessError`], the unified error type returned by
//! all fallible operations in the crate. Variants carry enough context to
//! diagnose a failure without extra logging at the call site: source
//! locations, frame indices, and how far an export got before it failed.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `seekless` operations.
///
/// Every public method that can fail returns `Result<T, SeeklessError>`.
///
/// Failures fall into two families with different blast radii:
///
/// - **Producer-terminal** errors ([`SourceOpen`](SeeklessError::SourceOpen),
///   [`SourceFailed`](SeeklessError::SourceFailed)) close the frame pipeline
///   and are delivered to every currently- and subsequently-blocked consumer.
/// - **Consumer-local** errors ([`OutOfRange`](SeeklessError::OutOfRange),
///   [`NotSeekable`](SeeklessError::NotSeekable),
///   [`Timeout`](SeeklessError::Timeout), ...) fail only the call that
///   triggered them and never affect the producer or other consumers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SeeklessError {
    /// The video source could not be opened.
    #[error("Failed to open video source {location}: {reason}")]
    SourceOpen {
        /// The path or URL that was passed to [`crate::VideoLoader::open`].
        location: String,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The source does not contain a video stream.
    #[error("No video stream found in source")]
    NoVideoStream,

    /// A frame could not be decoded, after the bounded retry policy was
    /// exhausted.
    #[error("Failed to decode frame {index}: {reason}")]
    Decode {
        /// Sequential index of the frame that failed to decode.
        index: u64,
        /// Underlying decoder error.
        reason: String,
    },

    /// The producer hit a terminal failure (device disconnect, repeated
    /// decode errors). Delivered to every consumer blocked on the pipeline.
    #[error("Frame source failed: {reason}")]
    SourceFailed {
        /// Description of the terminal failure.
        reason: String,
    },

    /// The requested index lies outside `[0, length)` after negative-index
    /// normalization.
    #[error("Frame index {index} is out of range (source has {length} frames)")]
    OutOfRange {
        /// The index as requested by the caller (may be negative).
        index: i64,
        /// The number of frames the source holds.
        length: u64,
    },

    /// Length, indexing, or slicing was requested on a source with an
    /// unknown frame count (live/network streams).
    #[error("{operation} requires a seekable source with a known frame count")]
    NotSeekable {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The requested slice cannot be delivered in the configured mode.
    #[error("Unsupported slice: {reason}")]
    UnsupportedSlice {
        /// Why the slice was rejected.
        reason: String,
    },

    /// A blocking wait for the next frame exceeded the configured bound.
    /// Fails only the blocked call; the pipeline keeps running.
    #[error("Timed out after {waited:?} waiting for the next frame")]
    Timeout {
        /// How long the call waited before giving up.
        waited: Duration,
    },

    /// The loader has been released; no further operations are possible.
    #[error("Loader has been released")]
    Released,

    /// The frame was evicted by the bounded cache policy and the
    /// forward-only source cannot be rewound to re-decode it.
    #[error("Frame {index} was evicted from the cache and cannot be re-read")]
    Evicted {
        /// The evicted frame index.
        index: u64,
    },

    /// The export target could not be opened. Raised before any frame is
    /// consumed.
    #[error("Cannot open export target {path}: {reason}")]
    ExportOpen {
        /// The output path that failed to open.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// A write failed partway through an export.
    #[error("Export aborted after writing {written} frames: {reason}")]
    ExportWrite {
        /// How many frames were successfully written before the failure.
        written: u64,
        /// Underlying write failure.
        reason: String,
    },

    /// The video encoder could not be configured or run.
    #[error("Video encoding error: {0}")]
    VideoEncode(String),

    /// A frame-export name template is missing the `{index}` placeholder.
    #[error("Invalid name template {template:?}: missing {{index}} placeholder")]
    InvalidTemplate {
        /// The offending template.
        template: String,
    },

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate during frame conversion or saving.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl From<FfmpegError> for SeeklessError {
    fn from(error: FfmpegError) -> Self {
        SeeklessError::Ffmpeg(error.to_string())
    }
}
