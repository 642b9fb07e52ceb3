//! Loader configuration.
//!
//! [`LoaderOptions`] is a builder that collects the optional features of a
//! loader — threading, queue capacity, precaching, a per-frame transform,
//! slice delivery mode, timeouts, output shape — validated once at
//! construction instead of being threaded through every call.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use seekless::{LoaderOptions, VideoLoader};
//!
//! let options = LoaderOptions::new()
//!     .with_max_queue_size(16)
//!     .with_read_timeout(Some(Duration::from_secs(5)))
//!     .with_transform(Arc::new(|mut image| {
//!         image.invert();
//!         image
//!     }));
//!
//! let loader = VideoLoader::open("input.mp4", options).unwrap();
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use ffmpeg_next::format::Pixel;
use image::DynamicImage;

/// A pure per-frame mapping applied exactly once to each produced frame,
/// before it is cached or delivered. Never re-applied on cache hits.
///
/// The function must be deterministic and side-effect-free with respect to
/// frame ordering; it runs on the producer thread when threading is enabled.
pub type FrameTransform = Arc<dyn Fn(DynamicImage) -> DynamicImage + Send + Sync>;

/// Output pixel format for delivered frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit RGB (24 bpp). This is the default.
    #[default]
    Rgb8,
    /// 8-bit RGBA with alpha set to 255 (32 bpp).
    Rgba8,
    /// 8-bit grayscale (8 bpp).
    Gray8,
}

impl PixelFormat {
    /// Map to the corresponding FFmpeg pixel format constant.
    pub(crate) fn to_ffmpeg_pixel(self) -> Pixel {
        match self {
            PixelFormat::Rgb8 => Pixel::RGB24,
            PixelFormat::Rgba8 => Pixel::RGBA,
            PixelFormat::Gray8 => Pixel::GRAY8,
        }
    }

    /// Bytes per pixel in the packed output buffer.
    pub(crate) fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Configuration for a [`VideoLoader`](crate::VideoLoader).
///
/// All fields have defaults matching the common case: background decoding
/// through a 50-slot queue, no precache, identity transform, materialized
/// slices, 30-second read timeout, unbounded cache, source resolution.
#[derive(Clone)]
pub struct LoaderOptions {
    /// Decode on a background thread (default `true`). When `false`, frames
    /// are pulled from the source synchronously at the moment of request.
    pub use_threading: bool,
    /// Capacity of the producer/consumer queue (default 50, minimum 1).
    /// Only used when threading is enabled.
    pub max_queue_size: usize,
    /// Drain the entire source into the cache before construction returns
    /// (default `false`). Fails for sources with an unknown frame count.
    pub precache: bool,
    /// Per-frame transform. `None` delivers frames as decoded.
    pub transform: Option<FrameTransform>,
    /// Deliver positive-step slices as lazy iterators instead of
    /// materialized vectors (default `false`). Negative-step slices cannot
    /// be delivered lazily and are rejected in this mode.
    pub slices_as_iter: bool,
    /// Maximum time a consumer waits for the next produced frame before the
    /// blocked call fails with a timeout (default 30 s). `None` waits
    /// forever. Only applies when threading is enabled.
    pub read_timeout: Option<Duration>,
    /// Bound on the number of cached frames (default `None` = unbounded).
    /// When set, the lowest indices are evicted first and cannot be
    /// re-read.
    pub cache_limit: Option<usize>,
    /// Target frame width. `None` keeps the source width. When only one
    /// dimension is given the other is computed to preserve aspect ratio.
    pub width: Option<u32>,
    /// Target frame height. `None` keeps the source height.
    pub height: Option<u32>,
    /// Pixel format of delivered frames.
    pub pixel_format: PixelFormat,
}

impl Debug for LoaderOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("LoaderOptions")
            .field("use_threading", &self.use_threading)
            .field("max_queue_size", &self.max_queue_size)
            .field("precache", &self.precache)
            .field("has_transform", &self.transform.is_some())
            .field("slices_as_iter", &self.slices_as_iter)
            .field("read_timeout", &self.read_timeout)
            .field("cache_limit", &self.cache_limit)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .finish()
    }
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderOptions {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            use_threading: true,
            max_queue_size: 50,
            precache: false,
            transform: None,
            slices_as_iter: false,
            read_timeout: Some(Duration::from_secs(30)),
            cache_limit: None,
            width: None,
            height: None,
            pixel_format: PixelFormat::Rgb8,
        }
    }

    /// Enable or disable the background producer thread.
    #[must_use]
    pub fn with_threading(mut self, use_threading: bool) -> Self {
        self.use_threading = use_threading;
        self
    }

    /// Set the producer/consumer queue capacity. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size.max(1);
        self
    }

    /// Read the whole source into the cache before construction returns.
    #[must_use]
    pub fn with_precache(mut self, precache: bool) -> Self {
        self.precache = precache;
        self
    }

    /// Apply a pure transform to every produced frame.
    #[must_use]
    pub fn with_transform(mut self, transform: FrameTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Deliver positive-step slices lazily instead of materialized.
    #[must_use]
    pub fn with_slices_as_iter(mut self, lazy: bool) -> Self {
        self.slices_as_iter = lazy;
        self
    }

    /// Bound blocking waits for the next frame. `None` waits forever.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Bound the cache, evicting the lowest indices first.
    #[must_use]
    pub fn with_cache_limit(mut self, limit: Option<usize>) -> Self {
        self.cache_limit = limit;
        self
    }

    /// Set a target output resolution. Pass `None` for a dimension to keep
    /// the source value; with one dimension given, the other preserves the
    /// source aspect ratio.
    #[must_use]
    pub fn with_resolution(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the output pixel format for delivered frames.
    #[must_use]
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }
}
