//! The capture seam: a narrow trait over forward-only frame sources.
//!
//! [`FrameSource`] abstracts the decode layer so the pipeline can run over
//! anything that produces images in order — an FFmpeg demuxer/decoder
//! ([`FfmpegCapture`](crate::FfmpegCapture)), or a synthetic source in tests.
//! The contract is strictly sequential: one frame per call, no rewinding.

use image::DynamicImage;

use crate::error::SeeklessError;

/// Static metadata describing an opened source.
///
/// Captured once at open time. `frame_count` is `None` for live or network
/// streams whose length is unknown; such sources cannot be indexed or
/// sliced, only iterated.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    /// Frames per second as reported by the container.
    pub fps: f64,
    /// Width of delivered frames in pixels (after any configured scaling).
    pub width: u32,
    /// Height of delivered frames in pixels (after any configured scaling).
    pub height: u32,
    /// Total number of frames, if known.
    pub frame_count: Option<u64>,
}

impl SourceInfo {
    /// Whether random access is possible over this source.
    ///
    /// True iff the frame count is known. Live capture devices and network
    /// streams report an unknown count and are not seekable.
    pub fn is_seekable(&self) -> bool {
        self.frame_count.is_some()
    }
}

/// A strictly sequential producer of decoded frames.
///
/// Implementations only ever move forward: each [`read_next`](FrameSource::read_next)
/// call yields the next frame in stream order, `Ok(None)` at end of stream,
/// or an error for an undecodable frame. A read may block for an unbounded
/// time on live sources.
///
/// Implementations must be [`Send`] — when threading is enabled the producer
/// thread takes ownership of the source.
pub trait FrameSource: Send {
    /// Metadata captured when the source was opened.
    fn info(&self) -> &SourceInfo;

    /// Decode and return the next frame, or `Ok(None)` at end of stream.
    ///
    /// Errors are per-frame decode failures; the caller applies the bounded
    /// retry policy before treating them as terminal.
    fn read_next(&mut self) -> Result<Option<DynamicImage>, SeeklessError>;
}
