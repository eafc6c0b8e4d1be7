//! Software RGBA canvas.
//!
//! Implements the `Canvas` contract on a plain byte grid: affine transforms,
//! nearest-neighbor scaled image draws with source-over blending, and
//! whole-grid pixel get/put. Drawing a tainted image taints the canvas, after
//! which pixel reads are refused the way a browser refuses `getImageData`.

use easel_core::pixels::NUM_CHANNELS;
use easel_core::{
    Affine, Canvas, DecodedImage, Drawable, PixelBuffer, Point, Rect, Result, SurfaceError,
};

/// A decoded image held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: PixelBuffer,
    tainted: bool,
    broken: bool,
}

impl RasterImage {
    pub fn new(pixels: PixelBuffer) -> Self {
        Self {
            pixels,
            tainted: false,
            broken: false,
        }
    }

    /// Single-color image.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * NUM_CHANNELS)
            .collect();
        // length matches by construction
        let pixels = PixelBuffer::from_rgba(width, height, data)
            .unwrap_or_else(|_| PixelBuffer::new(width, height));
        Self::new(pixels)
    }

    /// An image that reports a size but cannot be drawn.
    pub fn broken(width: u32, height: u32) -> Self {
        Self {
            pixels: PixelBuffer::new(width, height),
            tainted: false,
            broken: true,
        }
    }

    /// Mark as fetched from another origin without CORS approval.
    pub fn into_tainted(mut self) -> Self {
        self.tainted = true;
        self
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }
}

impl DecodedImage for RasterImage {
    fn natural_width(&self) -> u32 {
        self.pixels.width()
    }

    fn natural_height(&self) -> u32 {
        self.pixels.height()
    }
}

/// In-memory drawing surface.
#[derive(Debug, Clone)]
pub struct RasterCanvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
    transform: Affine,
    tainted: bool,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * NUM_CHANNELS],
            transform: Affine::IDENTITY,
            tainted: false,
        }
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    /// Pixel at device coordinate `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * NUM_CHANNELS;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[i..i + NUM_CHANNELS]);
        Some(px)
    }

    fn blend(&mut self, x: u32, y: u32, src: &[u8]) {
        let i = (y as usize * self.width as usize + x as usize) * NUM_CHANNELS;
        let dst = &mut self.data[i..i + NUM_CHANNELS];
        let sa = f32::from(src[3]) / 255.0;
        if sa >= 1.0 {
            dst.copy_from_slice(src);
            return;
        }
        if sa <= 0.0 {
            return;
        }
        let da = f32::from(dst[3]) / 255.0;
        let out_a = sa + da * (1.0 - sa);
        for c in 0..3 {
            let sc = f32::from(src[c]);
            let dc = f32::from(dst[c]);
            dst[c] = ((sc * sa + dc * da * (1.0 - sa)) / out_a).round() as u8;
        }
        dst[3] = (out_a * 255.0).round() as u8;
    }
}

impl Canvas for RasterCanvas {
    type Image = RasterImage;

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_transform(&mut self, transform: Affine) {
        self.transform = transform;
    }

    fn rotate(&mut self, radians: f64) {
        self.transform = self.transform * Affine::rotate(radians);
    }

    fn draw_image(&mut self, source: Drawable<'_, Self>, dest: Rect) -> Result<()> {
        let (src_w, src_h, src_data, src_tainted) = match source {
            Drawable::Decoded(image) => {
                if image.broken {
                    return Err(SurfaceError::Backend("image is not decodable".into()));
                }
                let px = &image.pixels;
                (px.width(), px.height(), px.data().to_vec(), image.tainted)
            }
            Drawable::Offscreen(canvas) => {
                (canvas.width, canvas.height, canvas.data.clone(), canvas.tainted)
            }
        };
        self.tainted |= src_tainted;

        if src_w == 0 || src_h == 0 || dest.width() == 0.0 || dest.height() == 0.0 {
            return Ok(());
        }

        // source pixel space → device space
        let to_device = self.transform
            * Affine::translate((dest.x0, dest.y0))
            * Affine::scale_non_uniform(
                dest.width() / f64::from(src_w),
                dest.height() / f64::from(src_h),
            );
        if to_device.determinant().abs() < f64::EPSILON {
            return Ok(());
        }
        let to_source = to_device.inverse();

        let source_rect = Rect::new(0.0, 0.0, f64::from(src_w), f64::from(src_h));
        let bbox = to_device.transform_rect_bbox(source_rect);
        let x0 = bbox.x0.floor().max(0.0) as u32;
        let y0 = bbox.y0.floor().max(0.0) as u32;
        let x1 = (bbox.x1.ceil().max(0.0) as u32).min(self.width);
        let y1 = (bbox.y1.ceil().max(0.0) as u32).min(self.height);

        for y in y0..y1 {
            for x in x0..x1 {
                let p = to_source * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if p.x < 0.0 || p.y < 0.0 || p.x >= f64::from(src_w) || p.y >= f64::from(src_h) {
                    continue;
                }
                let i = (p.y as usize * src_w as usize + p.x as usize) * NUM_CHANNELS;
                let texel = [src_data[i], src_data[i + 1], src_data[i + 2], src_data[i + 3]];
                self.blend(x, y, &texel);
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.data.fill(0);
    }

    fn get_pixels(&self) -> Result<PixelBuffer> {
        if self.tainted {
            return Err(SurfaceError::PixelAccess(
                "canvas has been tainted by cross-origin data".into(),
            ));
        }
        PixelBuffer::from_rgba(self.width, self.height, self.data.clone())
    }

    fn put_pixels(&mut self, pixels: &PixelBuffer) -> Result<()> {
        let rows = pixels.height().min(self.height) as usize;
        let cols = pixels.width().min(self.width) as usize;
        let src_stride = pixels.width() as usize * NUM_CHANNELS;
        let dst_stride = self.width as usize * NUM_CHANNELS;
        for row in 0..rows {
            let len = cols * NUM_CHANNELS;
            let src = &pixels.data()[row * src_stride..row * src_stride + len];
            self.data[row * dst_stride..row * dst_stride + len].copy_from_slice(src);
        }
        Ok(())
    }
}
