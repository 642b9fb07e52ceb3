//! The decoded frame type.

use std::sync::Arc;

use image::DynamicImage;

/// One decoded video frame plus its sequential index.
///
/// The index is 0-based and assigned at production time, in the order frames
/// come off the source. Pixel data is immutable and shared — cloning a
/// `Frame` is cheap, and a frame held by the cache and a frame returned to a
/// caller point at the same buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    index: u64,
    image: Arc<DynamicImage>,
}

impl Frame {
    pub(crate) fn new(index: u64, image: DynamicImage) -> Self {
        Self {
            index,
            image: Arc::new(image),
        }
    }

    /// The frame's sequential index in the source.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The decoded image.
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Consume the frame, returning the image without copying when this is
    /// the last reference to it.
    pub fn into_image(self) -> DynamicImage {
        Arc::try_unwrap(self.image).unwrap_or_else(|shared| (*shared).clone())
    }
}
