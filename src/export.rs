//! Exporting frame ranges — to a video container or to image files.
//!
//! [`VideoExporter`] encodes a range of frames into a container file (MP4,
//! MKV, AVI, ...) via FFmpeg; [`FrameExporter`] writes each frame as a
//! numbered image file. Both consume frames from a [`VideoLoader`] in index
//! order, and both accept an optional [`RecordGate`] — an external
//! start/stop trigger that pauses *writing* without stopping frame
//! production.
//!
//! Failure to open the output target aborts before any frame is consumed.
//! A failure partway through reports how many frames made it out via
//! [`SeeklessError::ExportWrite`].
//!
//! # Example
//!
//! ```no_run
//! use seekless::{ExportRange, FrameExporter, LoaderOptions, VideoExporter,
//!                VideoExportOptions, VideoLoader};
//!
//! let mut loader = VideoLoader::open("input.mp4", LoaderOptions::new())?;
//!
//! // Every third frame, re-encoded into a new container.
//! let written = VideoExporter::new(VideoExportOptions::default())
//!     .export(&mut loader, ExportRange::new(None, None, 3), "thirds.mp4", None)?;
//! println!("wrote {written} frames");
//!
//! // First ten frames as PNGs.
//! FrameExporter::new("stills", "frame_{index}.png")?
//!     .export(&mut loader, ExportRange::new(Some(0), Some(10), 1), None)?;
//! # Ok::<(), seekless::SeeklessError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel, context::Output};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Dictionary, Packet, Rational};
use image::DynamicImage;
use image::imageops::FilterType;

use crate::error::SeeklessError;
use crate::frame::Frame;
use crate::iter::FrameIter;
use crate::loader::VideoLoader;
use crate::slice::NormalizedSlice;

/// An external start/stop trigger for exports.
///
/// Cloneable and thread-safe: flip it from a signal handler, a hotkey
/// thread, or a motion detector. While paused, the exporter keeps
/// consuming frames in order but skips writing them.
///
/// # Example
///
/// ```
/// use seekless::RecordGate;
///
/// let gate = RecordGate::new();
/// assert!(gate.is_recording());
/// gate.pause();
/// assert!(!gate.is_recording());
/// gate.resume();
/// ```
#[derive(Debug, Clone)]
pub struct RecordGate {
    recording: Arc<AtomicBool>,
}

impl RecordGate {
    /// Create a gate that starts in the recording state.
    pub fn new() -> Self {
        Self {
            recording: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create a gate that starts paused.
    pub fn paused() -> Self {
        Self {
            recording: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop writing frames. Production continues.
    pub fn pause(&self) {
        self.recording.store(false, Ordering::Release);
    }

    /// Resume writing frames.
    pub fn resume(&self) {
        self.recording.store(true, Ordering::Release);
    }

    /// Whether frames are currently being written.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }
}

impl Default for RecordGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Which frames to export, as a `start`/`stop`/`step` range over the
/// source, following the same normalization rules as
/// [`VideoLoader::slice`].
///
/// On unseekable sources only plain forward ranges are allowed:
/// non-negative endpoints and a positive step ([`None`] endpoints mean
/// "from the start" / "until the stream ends").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportRange {
    /// First frame index, or `None` for the default end.
    pub start: Option<i64>,
    /// Stop index (exclusive), or `None` for the default end.
    pub stop: Option<i64>,
    /// Step between selected frames; negative walks backwards.
    pub step: i64,
}

impl ExportRange {
    /// A range selecting the requested frames.
    pub fn new(start: Option<i64>, stop: Option<i64>, step: i64) -> Self {
        Self { start, stop, step }
    }

    /// The whole source, in order.
    pub fn all() -> Self {
        Self::default()
    }
}

impl Default for ExportRange {
    fn default() -> Self {
        Self {
            start: None,
            stop: None,
            step: 1,
        }
    }
}

/// Frames of an export range, delivered in range order.
///
/// Seekable sources go through slice normalization and indexed fetches;
/// unseekable sources stream forward, filtering by position.
enum RangeFeed<'a> {
    Indexed {
        loader: &'a mut VideoLoader,
        slice: NormalizedSlice,
        next: u64,
    },
    Streaming {
        iter: FrameIter<'a>,
        start: u64,
        stop: Option<u64>,
        step: u64,
    },
}

fn range_feed<'a>(
    loader: &'a mut VideoLoader,
    range: &ExportRange,
) -> Result<RangeFeed<'a>, SeeklessError> {
    if loader.is_seekable() {
        let length = loader.require_len("export range normalization")?;
        let slice = NormalizedSlice::new(range.start, range.stop, range.step, length)?;
        Ok(RangeFeed::Indexed {
            loader,
            slice,
            next: 0,
        })
    } else {
        if range.step < 1
            || range.start.is_some_and(|s| s < 0)
            || range.stop.is_some_and(|s| s < 0)
        {
            return Err(SeeklessError::NotSeekable {
                operation: "exporting a reversed or end-relative range",
            });
        }
        Ok(RangeFeed::Streaming {
            start: range.start.unwrap_or(0) as u64,
            stop: range.stop.map(|s| s as u64),
            step: range.step as u64,
            iter: loader.iter(),
        })
    }
}

impl Iterator for RangeFeed<'_> {
    type Item = Result<Frame, SeeklessError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RangeFeed::Indexed { loader, slice, next } => {
                if *next >= slice.count() {
                    return None;
                }
                let index = slice.nth(*next);
                *next += 1;
                Some(loader.frame_at(index))
            }
            RangeFeed::Streaming {
                iter,
                start,
                stop,
                step,
            } => loop {
                let frame = match iter.next()? {
                    Ok(frame) => frame,
                    Err(error) => return Some(Err(error)),
                };
                let index = frame.index();
                if let Some(stop) = stop {
                    if index >= *stop {
                        return None;
                    }
                }
                if index >= *start && (index - *start) % *step == 0 {
                    return Some(Ok(frame));
                }
            },
        }
    }
}

fn gate_open(gate: Option<&RecordGate>) -> bool {
    gate.map_or(true, RecordGate::is_recording)
}

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    /// H.264 / AVC. This is the default.
    #[default]
    H264,
    /// H.265 / HEVC.
    H265,
    /// MPEG-4 Part 2. Always available in stock FFmpeg builds.
    Mpeg4,
}

impl VideoCodec {
    fn to_codec_id(self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::H265 => Id::HEVC,
            VideoCodec::Mpeg4 => Id::MPEG4,
        }
    }

    fn accepts_crf(self) -> bool {
        matches!(self, VideoCodec::H264 | VideoCodec::H265)
    }
}

/// Options for [`VideoExporter`].
#[derive(Debug, Clone)]
pub struct VideoExportOptions {
    /// Output frame rate. `None` preserves the source rate.
    pub fps: Option<f64>,
    /// Output codec.
    pub codec: VideoCodec,
    /// Constant Rate Factor (0-51, lower is better quality). Applied for
    /// codecs that support it. Default: 23.
    pub crf: Option<u32>,
    /// Target bitrate in bits per second. Overrides CRF when set.
    pub bitrate: Option<usize>,
}

impl Default for VideoExportOptions {
    fn default() -> Self {
        Self {
            fps: None,
            codec: VideoCodec::H264,
            crf: Some(23),
            bitrate: None,
        }
    }
}

impl VideoExportOptions {
    /// Override the output frame rate.
    #[must_use]
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Set the output codec.
    #[must_use]
    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the CRF quality value.
    #[must_use]
    pub fn with_crf(mut self, crf: u32) -> Self {
        self.crf = Some(crf);
        self
    }

    /// Set the target bitrate in bits per second.
    #[must_use]
    pub fn with_bitrate(mut self, bitrate: usize) -> Self {
        self.bitrate = Some(bitrate);
        self
    }
}

/// Encodes a range of frames into a video container.
///
/// The container format is inferred from the output file extension; fps
/// metadata carries over from the source unless overridden.
pub struct VideoExporter {
    options: VideoExportOptions,
}

impl VideoExporter {
    /// Create an exporter with the given options.
    pub fn new(options: VideoExportOptions) -> Self {
        Self { options }
    }

    /// Encode `range` from `loader` into the container at `path`.
    ///
    /// Returns the number of frames written. With a paused `gate`, frames
    /// are consumed but not written.
    ///
    /// # Errors
    ///
    /// - [`SeeklessError::ExportOpen`] / [`SeeklessError::VideoEncode`] if
    ///   the target or encoder cannot be set up (no frames consumed).
    /// - [`SeeklessError::ExportWrite`] if encoding fails mid-export; the
    ///   error reports how many frames were written.
    /// - Pipeline errors from the loader pass through unchanged.
    pub fn export<P: AsRef<Path>>(
        &self,
        loader: &mut VideoLoader,
        range: ExportRange,
        path: P,
        gate: Option<&RecordGate>,
    ) -> Result<u64, SeeklessError> {
        let path = path.as_ref();
        let fps = self.options.fps.unwrap_or_else(|| loader.fps());
        let fps = if fps > 0.0 { fps } else { 30.0 };

        let mut session = EncodeSession::begin(
            path,
            loader.width(),
            loader.height(),
            fps,
            &self.options,
        )?;
        log::info!(
            "exporting {:?} of {} to {} (codec={:?}, fps={:.2})",
            range,
            loader.location(),
            path.display(),
            self.options.codec,
            fps,
        );

        let mut written: u64 = 0;
        for result in range_feed(loader, &range)? {
            let frame = result?;
            if gate_open(gate) {
                session
                    .write_frame(frame.image())
                    .map_err(|error| SeeklessError::ExportWrite {
                        written,
                        reason: error.to_string(),
                    })?;
                written += 1;
            }
        }
        session
            .finish()
            .map_err(|error| SeeklessError::ExportWrite {
                written,
                reason: error.to_string(),
            })?;

        log::info!("wrote {written} frames to {}", path.display());
        Ok(written)
    }
}

/// One open encoding session: output container, encoder, and the RGB → YUV
/// conversion pipeline.
struct EncodeSession {
    output: Output,
    encoder: ffmpeg_next::encoder::video::Encoder,
    scaler: ScalingContext,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    width: u32,
    height: u32,
    pts: i64,
}

impl EncodeSession {
    fn begin(
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
        options: &VideoExportOptions,
    ) -> Result<Self, SeeklessError> {
        let encode_error = |reason: String| SeeklessError::VideoEncode(reason);

        ffmpeg_next::init().map_err(|error| encode_error(format!("FFmpeg init failed: {error}")))?;

        let mut output =
            ffmpeg_next::format::output(&path).map_err(|error| SeeklessError::ExportOpen {
                path: path.to_path_buf(),
                reason: error.to_string(),
            })?;

        // Fractional rates round-trip through a millihertz rational.
        let fps_num = (fps * 1000.0).round() as i32;
        let frame_rate = Rational::new(fps_num, 1000);
        let encoder_time_base = Rational::new(1000, fps_num);

        let codec_id = options.codec.to_codec_id();
        let codec = ffmpeg_next::encoder::find(codec_id)
            .ok_or_else(|| encode_error(format!("codec {codec_id:?} not available")))?;

        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let mut stream = output
            .add_stream(codec)
            .map_err(|error| encode_error(format!("cannot add stream: {error}")))?;
        let stream_index = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| encode_error(format!("cannot create codec context: {error}")))?
            .encoder()
            .video()
            .map_err(|error| encode_error(format!("cannot create video encoder: {error}")))?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(frame_rate));
        if let Some(bitrate) = options.bitrate {
            encoder.set_bit_rate(bitrate);
        }
        if needs_global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let opened = match options.crf {
            Some(crf) if options.bitrate.is_none() && options.codec.accepts_crf() => {
                let mut dict = Dictionary::new();
                dict.set("crf", &crf.to_string());
                encoder.open_as_with(codec, dict)
            }
            _ => encoder.open_as(codec),
        }
        .map_err(|error| encode_error(format!("cannot open encoder: {error}")))?;

        stream.set_parameters(&opened);

        output
            .write_header()
            .map_err(|error| encode_error(format!("cannot write container header: {error}")))?;

        // The muxer may adjust the stream time base when the header is
        // written; fetch the final value for packet rescaling.
        let stream_time_base = output
            .stream(stream_index)
            .ok_or_else(|| encode_error("output stream disappeared".to_string()))?
            .time_base();

        let scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| encode_error(format!("cannot create scaler: {error}")))?;

        Ok(Self {
            output,
            encoder: opened,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width,
            height,
            pts: 0,
        })
    }

    fn write_frame(&mut self, image: &DynamicImage) -> Result<(), SeeklessError> {
        let rgb = if image.width() != self.width || image.height() != self.height {
            image
                .resize_exact(self.width, self.height, FilterType::Lanczos3)
                .to_rgb8()
        } else {
            image.to_rgb8()
        };

        let mut source = VideoFrame::new(Pixel::RGB24, self.width, self.height);
        let stride = source.stride(0);
        let row_len = self.width as usize * 3;
        {
            let data = source.data_mut(0);
            let bytes = rgb.as_raw();
            for row in 0..self.height as usize {
                data[row * stride..row * stride + row_len]
                    .copy_from_slice(&bytes[row * row_len..(row + 1) * row_len]);
            }
        }

        let mut converted = VideoFrame::empty();
        self.scaler
            .run(&source, &mut converted)
            .map_err(|error| SeeklessError::VideoEncode(format!("scaling failed: {error}")))?;
        converted.set_pts(Some(self.pts));
        self.pts += 1;

        self.encoder
            .send_frame(&converted)
            .map_err(|error| SeeklessError::VideoEncode(format!("send_frame failed: {error}")))?;
        self.drain_packets()
    }

    fn drain_packets(&mut self) -> Result<(), SeeklessError> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|error| {
                    SeeklessError::VideoEncode(format!("packet write failed: {error}"))
                })?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(), SeeklessError> {
        self.encoder
            .send_eof()
            .map_err(|error| SeeklessError::VideoEncode(format!("send_eof failed: {error}")))?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .map_err(|error| {
                SeeklessError::VideoEncode(format!("cannot write container trailer: {error}"))
            })?;
        Ok(())
    }
}

/// Writes each frame of a range as a numbered image file.
///
/// The name template must contain an `{index}` placeholder, replaced with
/// the zero-padded frame index; the image format is inferred from the
/// template's extension.
pub struct FrameExporter {
    directory: PathBuf,
    template: String,
}

impl FrameExporter {
    /// Create an exporter writing into `directory` with the given name
    /// template, e.g. `"frame_{index}.png"`.
    ///
    /// # Errors
    ///
    /// [`SeeklessError::InvalidTemplate`] if the template has no `{index}`
    /// placeholder.
    pub fn new<P: AsRef<Path>>(directory: P, template: &str) -> Result<Self, SeeklessError> {
        if !template.contains("{index}") {
            return Err(SeeklessError::InvalidTemplate {
                template: template.to_string(),
            });
        }
        Ok(Self {
            directory: directory.as_ref().to_path_buf(),
            template: template.to_string(),
        })
    }

    /// Write `range` from `loader` as image files.
    ///
    /// Returns the number of files written. With a paused `gate`, frames
    /// are consumed but not written.
    ///
    /// # Errors
    ///
    /// - [`SeeklessError::ExportOpen`] if the directory cannot be created
    ///   (no frames consumed).
    /// - [`SeeklessError::ExportWrite`] if a file fails to save; reports
    ///   how many files were written.
    /// - Pipeline errors from the loader pass through unchanged.
    pub fn export(
        &self,
        loader: &mut VideoLoader,
        range: ExportRange,
        gate: Option<&RecordGate>,
    ) -> Result<u64, SeeklessError> {
        std::fs::create_dir_all(&self.directory).map_err(|error| SeeklessError::ExportOpen {
            path: self.directory.clone(),
            reason: error.to_string(),
        })?;
        log::info!(
            "exporting {:?} of {} as images under {}",
            range,
            loader.location(),
            self.directory.display(),
        );

        let mut written: u64 = 0;
        for result in range_feed(loader, &range)? {
            let frame = result?;
            if gate_open(gate) {
                let name = self
                    .template
                    .replace("{index}", &format!("{:06}", frame.index()));
                frame
                    .image()
                    .save(self.directory.join(name))
                    .map_err(|error| SeeklessError::ExportWrite {
                        written,
                        reason: error.to_string(),
                    })?;
                written += 1;
            }
        }
        Ok(written)
    }
}
