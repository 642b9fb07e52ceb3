//! FFmpeg-backed frame source.
//!
//! [`FfmpegCapture`] implements [`FrameSource`] over the FFmpeg demuxer and
//! decoder: it opens a file path or stream URL, locates the best video
//! stream, and decodes packets forward one frame at a time, scaling each
//! frame to the configured output shape. No seeking is ever attempted — the
//! pipeline above this layer is what makes random access work.

use std::path::Path;

use ffmpeg_next::{
    Error as FfmpegError, Packet,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::context::Input,
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::log::Level,
};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::error::SeeklessError;
use crate::options::{LoaderOptions, PixelFormat};
use crate::source::{FrameSource, SourceInfo};

/// Consecutive demuxer read errors tolerated before the source is declared
/// broken. Guards against spinning forever on a corrupt container.
const PACKET_ERROR_LIMIT: u32 = 64;

/// FFmpeg's `SwsContext` carries no thread affinity but is not marked Send
/// by `ffmpeg-next`. The capture owns exactly one and only touches it from
/// whichever thread currently owns the capture, so moving it with the
/// capture is sound.
struct Scaler(ScalingContext);

unsafe impl Send for Scaler {}

/// A forward-only decoder over a video file or network stream.
///
/// Created by [`VideoLoader::open`](crate::VideoLoader::open); construct it
/// directly only when composing with [`VideoLoader::from_source`](crate::VideoLoader::from_source).
pub struct FfmpegCapture {
    input: Input,
    decoder: VideoDecoder,
    scaler: Scaler,
    stream_index: usize,
    info: SourceInfo,
    pixel_format: PixelFormat,
    frames_read: u64,
    eof_sent: bool,
    finished: bool,
}

impl FfmpegCapture {
    /// Open a video source for sequential decoding.
    ///
    /// `location` is a file path or a URL FFmpeg understands (e.g. an RTSP
    /// stream). Output resolution and pixel format come from `options`;
    /// with only one dimension set, the other preserves the source aspect
    /// ratio.
    ///
    /// # Errors
    ///
    /// - [`SeeklessError::SourceOpen`] if the source cannot be opened.
    /// - [`SeeklessError::NoVideoStream`] if it has no video stream.
    pub fn open(location: &str, options: &LoaderOptions) -> Result<Self, SeeklessError> {
        let open_error = |reason: String| SeeklessError::SourceOpen {
            location: location.to_string(),
            reason,
        };

        // Idempotent.
        ffmpeg_next::init().map_err(|error| open_error(format!("FFmpeg init failed: {error}")))?;

        log::debug!("opening video source: {location}");
        let input = ffmpeg_next::format::input(&Path::new(location))
            .map_err(|error| open_error(error.to_string()))?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(SeeklessError::NoVideoStream)?;
        let stream_index = stream.index();

        let decoder = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| open_error(format!("bad video codec parameters: {error}")))?
            .decoder()
            .video()
            .map_err(|error| open_error(format!("cannot create video decoder: {error}")))?;

        // Average frame rate, falling back to the raw stream rate.
        let avg = stream.avg_frame_rate();
        let fps = if avg.denominator() != 0 {
            avg.numerator() as f64 / avg.denominator() as f64
        } else {
            let rate = stream.rate();
            if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            }
        };

        // A non-positive container duration means the length is unknown —
        // live capture, network stream — and the source is not seekable.
        let duration_us = input.duration();
        let frame_count = if duration_us > 0 && fps > 0.0 {
            Some((duration_us as f64 / 1_000_000.0 * fps) as u64)
        } else {
            None
        };

        let (width, height) =
            resolve_dimensions(options.width, options.height, decoder.width(), decoder.height());

        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            options.pixel_format.to_ffmpeg_pixel(),
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| open_error(format!("cannot create scaler: {error}")))?;

        let info = SourceInfo {
            fps,
            width,
            height,
            frame_count,
        };
        log::debug!(
            "source ready: {}x{} @ {:.2} fps, {} frames",
            info.width,
            info.height,
            info.fps,
            info.frame_count
                .map_or_else(|| "unknown".to_string(), |n| n.to_string()),
        );

        Ok(Self {
            input,
            decoder,
            scaler: Scaler(scaler),
            stream_index,
            info,
            pixel_format: options.pixel_format,
            frames_read: 0,
            eof_sent: false,
            finished: false,
        })
    }

    /// Scale the decoded frame and pack it into a [`DynamicImage`].
    fn convert(&mut self, decoded: &VideoFrame) -> Result<DynamicImage, SeeklessError> {
        let mut scaled = VideoFrame::empty();
        self.scaler
            .0
            .run(decoded, &mut scaled)
            .map_err(|error| SeeklessError::Decode {
                index: self.frames_read,
                reason: format!("scaling failed: {error}"),
            })?;

        let width = self.info.width;
        let height = self.info.height;
        let buffer = packed_plane(&scaled, width, height, self.pixel_format.bytes_per_pixel());

        let bad_buffer = || SeeklessError::Decode {
            index: self.frames_read,
            reason: "decoded frame data has unexpected size".to_string(),
        };
        match self.pixel_format {
            PixelFormat::Rgb8 => RgbImage::from_raw(width, height, buffer)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(bad_buffer),
            PixelFormat::Rgba8 => RgbaImage::from_raw(width, height, buffer)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(bad_buffer),
            PixelFormat::Gray8 => GrayImage::from_raw(width, height, buffer)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(bad_buffer),
        }
    }
}

impl FrameSource for FfmpegCapture {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_next(&mut self) -> Result<Option<DynamicImage>, SeeklessError> {
        if self.finished {
            return Ok(None);
        }

        let mut decoded = VideoFrame::empty();
        let mut packet_errors: u32 = 0;
        loop {
            // Drain any frame the decoder already holds.
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let image = self.convert(&decoded)?;
                self.frames_read += 1;
                return Ok(Some(image));
            }

            if self.eof_sent {
                self.finished = true;
                return Ok(None);
            }

            // Decoder is empty — feed it the next video packet.
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    packet_errors = 0;
                    if packet.stream() == self.stream_index {
                        self.decoder
                            .send_packet(&packet)
                            .map_err(|error| SeeklessError::Decode {
                                index: self.frames_read,
                                reason: error.to_string(),
                            })?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder
                        .send_eof()
                        .map_err(|error| SeeklessError::Decode {
                            index: self.frames_read,
                            reason: error.to_string(),
                        })?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    packet_errors += 1;
                    if packet_errors >= PACKET_ERROR_LIMIT {
                        return Err(SeeklessError::Decode {
                            index: self.frames_read,
                            reason: format!("demuxer read failed repeatedly: {error}"),
                        });
                    }
                }
            }
        }
    }
}

/// Resolve the output dimensions against the source size, preserving aspect
/// ratio when only one dimension is configured.
fn resolve_dimensions(
    width: Option<u32>,
    height: Option<u32>,
    source_width: u32,
    source_height: u32,
) -> (u32, u32) {
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) if source_width > 0 => {
            let ratio = w as f64 / source_width as f64;
            (w, ((source_height as f64 * ratio).round() as u32).max(1))
        }
        (Some(w), None) => (w, source_height),
        (None, Some(h)) if source_height > 0 => {
            let ratio = h as f64 / source_height as f64;
            (((source_width as f64 * ratio).round() as u32).max(1), h)
        }
        (None, Some(h)) => (source_width, h),
        (None, None) => (source_width, source_height),
    }
}

/// Copy one frame plane into a tightly-packed buffer, stripping the per-row
/// padding FFmpeg frames frequently carry (stride > width × bpp).
fn packed_plane(frame: &VideoFrame, width: u32, height: u32, bytes_per_pixel: usize) -> Vec<u8> {
    let stride = frame.stride(0);
    let row_len = width as usize * bytes_per_pixel;
    let data = frame.data(0);

    if stride == row_len {
        data[..row_len * height as usize].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            buffer.extend_from_slice(&data[start..start + row_len]);
        }
        buffer
    }
}

/// Verbosity of FFmpeg's internal stderr logging.
///
/// FFmpeg logs to stderr on its own, outside the Rust `log` facade. The
/// default is noisy for library use; [`set_decoder_log_level`] tunes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderLogLevel {
    /// No output at all.
    Quiet,
    /// Unrecoverable errors only.
    Error,
    /// Errors and warnings (FFmpeg's default).
    Warning,
    /// Informational messages and above.
    Info,
    /// Everything, including debug output.
    Debug,
}

/// Set the verbosity of FFmpeg's internal logging.
///
/// Affects only FFmpeg's own stderr output, not messages this crate emits
/// through the `log` crate.
pub fn set_decoder_log_level(level: DecoderLogLevel) {
    let level = match level {
        DecoderLogLevel::Quiet => Level::Quiet,
        DecoderLogLevel::Error => Level::Error,
        DecoderLogLevel::Warning => Level::Warning,
        DecoderLogLevel::Info => Level::Info,
        DecoderLogLevel::Debug => Level::Debug,
    };
    ffmpeg_next::util::log::set_level(level);
}

#[cfg(test)]
mod tests {
    use super::resolve_dimensions;

    #[test]
    fn resolve_dimensions_preserves_aspect_ratio() {
        assert_eq!(resolve_dimensions(None, None, 1920, 1080), (1920, 1080));
        assert_eq!(resolve_dimensions(Some(960), None, 1920, 1080), (960, 540));
        assert_eq!(resolve_dimensions(None, Some(540), 1920, 1080), (960, 540));
        assert_eq!(resolve_dimensions(Some(640), Some(480), 1920, 1080), (640, 480));
    }
}
