//! Headless backend: offscreen canvas factory plus an in-memory image
//! registry that plays the role of the network and decoder.
//!
//! Requests queue up as surfaces issue them and are only resolved when the
//! host calls [`SoftwareBackend::poll`], which keeps decoding asynchronous
//! relative to the surface the same way a browser's image loading is.

use crate::raster::{RasterCanvas, RasterImage};
use easel_core::{
    CanvasFactory, ImageLoader, LoadOutcome, LoadRequest, PixelBuffer, Result, SurfaceError,
};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;

/// Whether a foreign host answers anonymous CORS requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cors {
    Allowed,
    Denied,
}

#[derive(Debug, Clone)]
enum Payload {
    Raster(RasterImage),
    Png(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Entry {
    payload: Payload,
    /// `Some` when the resource lives on another origin.
    remote: Option<Cors>,
}

/// Software implementation of every collaborator a surface needs.
#[derive(Debug, Default)]
pub struct SoftwareBackend {
    entries: HashMap<String, Entry>,
    queue: VecDeque<LoadRequest>,
    fetched: Vec<String>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `image` for `locator` from the page's own origin.
    pub fn register(&mut self, locator: &str, image: RasterImage) {
        self.insert(locator, Payload::Raster(image), None);
    }

    /// Serve PNG-encoded bytes for `locator`; decoded when polled.
    pub fn register_png(&mut self, locator: &str, bytes: Vec<u8>) {
        self.insert(locator, Payload::Png(bytes), None);
    }

    /// Serve `image` from another origin with the given CORS behavior.
    pub fn register_remote(&mut self, locator: &str, image: RasterImage, cors: Cors) {
        self.insert(locator, Payload::Raster(image), Some(cors));
    }

    fn insert(&mut self, locator: &str, payload: Payload, remote: Option<Cors>) {
        self.entries
            .insert(locator.to_string(), Entry { payload, remote });
    }

    /// Requests waiting to be resolved.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Every `src` fetched so far, in order.
    pub fn fetched(&self) -> &[String] {
        &self.fetched
    }

    /// Resolve all queued requests in the order they were issued.
    pub fn poll(&mut self) -> Vec<(LoadRequest, LoadOutcome<RasterImage>)> {
        let mut done = Vec::with_capacity(self.queue.len());
        while let Some(request) = self.queue.pop_front() {
            let outcome = self.resolve(&request);
            done.push((request, outcome));
        }
        done
    }

    /// Resolve only the most recently queued request, leaving older ones
    /// pending. Lets tests deliver completions out of order.
    pub fn poll_latest(&mut self) -> Option<(LoadRequest, LoadOutcome<RasterImage>)> {
        let request = self.queue.pop_back()?;
        let outcome = self.resolve(&request);
        Some((request, outcome))
    }

    fn resolve(&mut self, request: &LoadRequest) -> LoadOutcome<RasterImage> {
        self.fetched.push(request.src.clone());
        let Some(entry) = self.entries.get(&request.locator) else {
            log::debug!("no image registered for {}", request.locator);
            return LoadOutcome::Failed(format!("{} not found", request.src));
        };

        let image = match &entry.payload {
            Payload::Raster(image) => image.clone(),
            Payload::Png(bytes) => match decode_png(bytes) {
                Ok(pixels) => RasterImage::new(pixels),
                Err(e) => return LoadOutcome::Failed(e.to_string()),
            },
        };

        match (entry.remote, request.cross_origin) {
            (None, _) => LoadOutcome::Decoded(image),
            (Some(Cors::Allowed), true) => LoadOutcome::Decoded(image),
            (Some(Cors::Denied), true) => LoadOutcome::Failed(format!(
                "cross-origin request for {} blocked: no Access-Control-Allow-Origin",
                request.src
            )),
            // fetched without CORS: displayable but its pixels stay opaque to us
            (Some(_), false) => LoadOutcome::Decoded(image.into_tainted()),
        }
    }
}

impl ImageLoader for SoftwareBackend {
    fn load(&mut self, request: LoadRequest) {
        log::trace!("queue #{} {}", request.seq.0, request.src);
        self.queue.push_back(request);
    }
}

impl CanvasFactory for SoftwareBackend {
    type Canvas = RasterCanvas;

    fn create_canvas(&mut self, width: u32, height: u32) -> Result<RasterCanvas> {
        Ok(RasterCanvas::new(width, height))
    }
}

/// Decode PNG bytes into 8-bit RGBA.
pub fn decode_png(bytes: &[u8]) -> Result<PixelBuffer> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::normalize_to_color8());
    let mut reader = decoder
        .read_info()
        .map_err(|e| SurfaceError::Backend(format!("png header: {e}")))?;
    let (w, h) = (reader.info().width, reader.info().height);
    let mut buf = vec![0u8; w as usize * h as usize * 4];
    let frame = reader
        .next_frame(&mut buf)
        .map_err(|e| SurfaceError::Backend(format!("png data: {e}")))?;
    buf.truncate(frame.buffer_size());

    let rgba: Vec<u8> = match frame.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::Rgb => buf
            .chunks_exact(3)
            .flat_map(|c| [c[0], c[1], c[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .flat_map(|c| [c[0], c[0], c[0], c[1]])
            .collect(),
        png::ColorType::Grayscale => buf.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        png::ColorType::Indexed => {
            return Err(SurfaceError::Backend("png palette was not expanded".into()));
        }
    };
    PixelBuffer::from_rgba(frame.width, frame.height, rgba)
}
