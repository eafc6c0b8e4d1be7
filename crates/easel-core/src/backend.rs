//! Collaborator traits: the drawing surface and the image decode subsystem.
//!
//! The surface model never talks to a platform directly. A host supplies a
//! [`Canvas`] (2D context), a [`CanvasFactory`] for offscreen buffers, and an
//! [`ImageLoader`] that decodes locators asynchronously and later reports the
//! outcome back through [`ImageSurface::finish_load`](crate::ImageSurface::finish_load).

use crate::error::Result;
use crate::pixels::PixelBuffer;
use kurbo::{Affine, Rect};

/// A decoded image handle owned by the host.
pub trait DecodedImage {
    fn natural_width(&self) -> u32;
    fn natural_height(&self) -> u32;
}

/// Something a canvas can draw: a decoded image or another canvas.
pub enum Drawable<'a, C: Canvas + ?Sized> {
    Decoded(&'a C::Image),
    Offscreen(&'a C),
}

/// A 2D drawing context.
pub trait Canvas {
    type Image: DecodedImage;

    /// Backing size in pixels.
    fn size(&self) -> (u32, u32);

    /// Replace the current transform.
    fn set_transform(&mut self, transform: Affine);

    /// Post-multiply the current transform by a rotation.
    fn rotate(&mut self, radians: f64);

    /// Draw `source` scaled into `dest` (user space, current transform applied).
    fn draw_image(&mut self, source: Drawable<'_, Self>, dest: Rect) -> Result<()>;

    /// Reset every pixel to transparent black.
    fn clear(&mut self);

    /// Copy out the whole pixel grid.
    fn get_pixels(&self) -> Result<PixelBuffer>;

    /// Overwrite the pixel grid starting at the origin.
    fn put_pixels(&mut self, pixels: &PixelBuffer) -> Result<()>;
}

/// Creates offscreen canvases.
pub trait CanvasFactory {
    type Canvas: Canvas;

    fn create_canvas(&mut self, width: u32, height: u32) -> Result<Self::Canvas>;
}

/// Monotonic per-surface load sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LoadSeq(pub u64);

impl LoadSeq {
    pub fn next(self) -> Self {
        LoadSeq(self.0 + 1)
    }
}

/// A decode request issued by a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub seq: LoadSeq,
    /// Locator as given by the caller.
    pub locator: String,
    /// Locator to fetch (cache-busted for cross-origin sources).
    pub src: String,
    /// Use anonymous cross-origin credentials.
    pub cross_origin: bool,
}

/// Result of a decode, reported back by the host.
#[derive(Debug)]
pub enum LoadOutcome<I> {
    Decoded(I),
    Failed(String),
}

/// Starts asynchronous decodes. Must not block.
pub trait ImageLoader {
    fn load(&mut self, request: LoadRequest);
}

/// Loader that records requests without fetching anything. Useful when the
/// host drives decoding itself.
impl ImageLoader for Vec<LoadRequest> {
    fn load(&mut self, request: LoadRequest) {
        self.push(request);
    }
}
