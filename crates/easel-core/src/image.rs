//! Image surface: a decoded image plus a lazily built, editable pixel buffer.
//!
//! Lifecycle per source: `Loading` → `Loaded | Failed`. Each load carries a
//! [`LoadSeq`]; completions for anything but the latest request are dropped,
//! so the last `set_source` always wins even if an older decode finishes
//! later.
//!
//! After a successful load the decoded image is drawn into an offscreen
//! canvas and its pixels are copied out. The first pixel write switches the
//! surface to render from that buffer for the rest of its life. If the copy is
//! refused the surface still renders the decoded image; pixel reads return
//! `None` and writes are ignored.

use crate::backend::{
    Canvas, CanvasFactory, DecodedImage, Drawable, ImageLoader, LoadOutcome, LoadRequest, LoadSeq,
};
use crate::error::{Result, SurfaceError};
use crate::origin::OriginPolicy;
use crate::pixels::{Channel, PixelBuffer, Rgba};
use kurbo::{Affine, Point, Rect};
use std::fmt;
use std::rc::Rc;

/// Width/height reported before the image has loaded.
pub const NOT_LOADED: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotRequested,
    Loading,
    Loaded,
    Failed,
}

/// What [`ImageSurface::render`] draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    FromDecodedImage,
    FromPixelBuffer,
}

/// Callback fired after each successful load.
pub type LoadCallback = Rc<dyn Fn()>;

/// How the render extent was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extent {
    Unset,
    Natural,
    Explicit,
}

/// Result of reporting a decode back to a surface.
#[must_use = "call `notify()` to run the load callback"]
pub enum Completion {
    /// The surface is now loaded. Holds the registered callback, if any.
    Loaded(Option<LoadCallback>),
    Failed,
    /// The completion belonged to a superseded request and was ignored.
    Stale,
}

impl Completion {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Completion::Loaded(_))
    }

    /// Run the load callback. Hosts that keep the surface behind a `RefCell`
    /// should release their borrow first so the callback may use the surface.
    pub fn notify(self) {
        if let Completion::Loaded(Some(callback)) = self {
            callback();
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Loaded(cb) => write!(f, "Loaded(callback: {})", cb.is_some()),
            Completion::Failed => write!(f, "Failed"),
            Completion::Stale => write!(f, "Stale"),
        }
    }
}

/// An image resource that can be inspected, edited per pixel and drawn onto
/// a canvas of type `C`.
pub struct ImageSurface<C: Canvas> {
    locator: String,
    src: String,
    cross_origin: bool,
    state: LoadState,
    seq: LoadSeq,
    image: Option<C::Image>,
    width: f64,
    height: f64,
    extent: Extent,
    pixels: Option<PixelBuffer>,
    /// Offscreen canvas mirroring `pixels` for drawing.
    offscreen: Option<C>,
    mode: RenderMode,
    dirty: bool,
    pixel_access_denied: bool,
    materialize_pixels: bool,
    on_load: Option<LoadCallback>,
    position: Point,
    rotation: f64,
}

impl<C: Canvas> ImageSurface<C> {
    /// Create a surface and immediately request `locator` from `loader`.
    pub fn new(
        locator: impl Into<String>,
        policy: &OriginPolicy,
        loader: &mut (impl ImageLoader + ?Sized),
    ) -> Self {
        let mut surface = Self {
            locator: String::new(),
            src: String::new(),
            cross_origin: false,
            state: LoadState::NotRequested,
            seq: LoadSeq::default(),
            image: None,
            width: NOT_LOADED,
            height: NOT_LOADED,
            extent: Extent::Unset,
            pixels: None,
            offscreen: None,
            mode: RenderMode::FromDecodedImage,
            dirty: false,
            pixel_access_denied: false,
            materialize_pixels: true,
            on_load: None,
            position: Point::ORIGIN,
            rotation: 0.0,
        };
        surface.begin_load(locator.into(), policy, loader);
        surface
    }

    /// Point the surface at a new locator and restart loading. The load
    /// callback stays registered.
    pub fn set_source(
        &mut self,
        locator: impl Into<String>,
        policy: &OriginPolicy,
        loader: &mut (impl ImageLoader + ?Sized),
    ) {
        self.begin_load(locator.into(), policy, loader);
    }

    fn begin_load(
        &mut self,
        locator: String,
        policy: &OriginPolicy,
        loader: &mut (impl ImageLoader + ?Sized),
    ) {
        let resolved = policy.resolve(&locator);
        self.seq = self.seq.next();
        self.state = LoadState::Loading;
        self.image = None;
        self.width = NOT_LOADED;
        self.height = NOT_LOADED;
        self.extent = Extent::Unset;
        self.pixels = None;
        self.offscreen = None;
        self.mode = RenderMode::FromDecodedImage;
        self.dirty = false;
        self.pixel_access_denied = false;
        self.locator = locator;
        self.src = resolved.src;
        self.cross_origin = resolved.cross_origin;

        log::debug!(
            "load #{} {} (src {}, cross-origin: {})",
            self.seq.0,
            self.locator,
            self.src,
            self.cross_origin
        );
        loader.load(LoadRequest {
            seq: self.seq,
            locator: self.locator.clone(),
            src: self.src.clone(),
            cross_origin: self.cross_origin,
        });
    }

    /// Register the callback run after each successful load, replacing any
    /// earlier one.
    pub fn on_loaded(&mut self, callback: impl Fn() + 'static) {
        self.on_load = Some(Rc::new(callback));
    }

    /// Report the outcome of the decode started for `seq`.
    pub fn finish_load<F>(
        &mut self,
        seq: LoadSeq,
        outcome: LoadOutcome<C::Image>,
        factory: &mut F,
    ) -> Completion
    where
        F: CanvasFactory<Canvas = C> + ?Sized,
    {
        if seq != self.seq || self.state != LoadState::Loading {
            log::debug!(
                "dropping stale completion #{} for {} (current #{})",
                seq.0,
                self.locator,
                self.seq.0
            );
            return Completion::Stale;
        }

        match outcome {
            LoadOutcome::Failed(reason) => {
                log::warn!("image {} failed to load: {reason}", self.src);
                self.state = LoadState::Failed;
                Completion::Failed
            }
            LoadOutcome::Decoded(image) => {
                self.state = LoadState::Loaded;
                self.image = Some(image);
                self.finalize_dimensions();
                if self.materialize_pixels {
                    self.materialize(factory);
                }
                log::debug!(
                    "loaded {} ({}x{}, pixels: {})",
                    self.locator,
                    self.width,
                    self.height,
                    self.pixels.is_some()
                );
                Completion::Loaded(self.on_load.clone())
            }
        }
    }

    fn finalize_dimensions(&mut self) {
        if self.extent != Extent::Unset {
            return;
        }
        if let Some(image) = &self.image {
            self.width = f64::from(image.natural_width());
            self.height = f64::from(image.natural_height());
            self.extent = Extent::Natural;
        }
    }

    fn materialize<F>(&mut self, factory: &mut F)
    where
        F: CanvasFactory<Canvas = C> + ?Sized,
    {
        let Some(image) = &self.image else {
            return;
        };
        match extract_pixels::<C, F>(image, factory) {
            Ok((canvas, pixels)) => {
                self.offscreen = Some(canvas);
                self.pixels = Some(pixels);
                self.dirty = false;
            }
            Err(SurfaceError::PixelAccess(reason)) => {
                log::warn!("pixel data for {} refused: {reason}", self.locator);
                self.pixel_access_denied = true;
            }
            Err(e) => log::warn!("pixel data for {} unavailable: {e}", self.locator),
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    /// Locator as passed by the caller.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Locator actually fetched.
    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn is_cross_origin(&self) -> bool {
        self.cross_origin
    }

    pub fn load_state(&self) -> LoadState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    pub fn render_mode(&self) -> RenderMode {
        self.mode
    }

    /// True once pixel extraction failed for the current load.
    pub fn pixel_access_denied(&self) -> bool {
        self.pixel_access_denied
    }

    pub fn pixel_buffer(&self) -> Option<&PixelBuffer> {
        self.pixels.as_ref()
    }

    /// Skip building the pixel buffer on future loads.
    pub fn set_materialize_pixels(&mut self, enabled: bool) {
        self.materialize_pixels = enabled;
    }

    // ─── Geometry ────────────────────────────────────────────────────────

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Set the rendered extent. Negative values clamp to zero; the pixel
    /// buffer keeps its resolution.
    pub fn set_size(&mut self, width: f64, height: f64) -> Result<()> {
        check_finite("width", width)?;
        check_finite("height", height)?;
        self.width = width.max(0.0);
        self.height = height.max(0.0);
        self.extent = Extent::Explicit;
        Ok(())
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn set_position(&mut self, x: f64, y: f64) {
        self.position = Point::new(x, y);
    }

    pub fn move_by(&mut self, dx: f64, dy: f64) {
        self.position.x += dx;
        self.position.y += dy;
    }

    /// Rotation in radians about the image center.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn set_rotation(&mut self, radians: f64) {
        self.rotation = radians;
    }

    /// Axis-aligned bounds test against the stored position and extent.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        let p = self.position;
        x >= p.x && x <= p.x + self.width && y >= p.y && y <= p.y + self.height
    }

    // ─── Pixels ──────────────────────────────────────────────────────────

    /// RGBA at `(x, y)`, or `None` if pixels are unavailable or the
    /// coordinate is out of range.
    pub fn pixel(&self, x: i64, y: i64) -> Option<Rgba> {
        self.pixels.as_ref()?.pixel(x, y)
    }

    pub fn channel(&self, x: i64, y: i64, channel: Channel) -> Option<u8> {
        self.pixel(x, y).map(|px| px[channel.offset()])
    }

    pub fn red(&self, x: i64, y: i64) -> Option<u8> {
        self.channel(x, y, Channel::Red)
    }

    pub fn green(&self, x: i64, y: i64) -> Option<u8> {
        self.channel(x, y, Channel::Green)
    }

    pub fn blue(&self, x: i64, y: i64) -> Option<u8> {
        self.channel(x, y, Channel::Blue)
    }

    pub fn alpha(&self, x: i64, y: i64) -> Option<u8> {
        self.channel(x, y, Channel::Alpha)
    }

    /// Write one channel. Silently ignored when pixels are unavailable or the
    /// coordinate is out of range. A successful write makes every later
    /// render draw from the pixel buffer.
    pub fn set_pixel(&mut self, x: i64, y: i64, channel: Channel, value: u8) {
        let Some(pixels) = self.pixels.as_mut() else {
            return;
        };
        if pixels.set_channel(x, y, channel, value) {
            self.mode = RenderMode::FromPixelBuffer;
            self.dirty = true;
        }
    }

    pub fn set_red(&mut self, x: i64, y: i64, value: u8) {
        self.set_pixel(x, y, Channel::Red, value);
    }

    pub fn set_green(&mut self, x: i64, y: i64, value: u8) {
        self.set_pixel(x, y, Channel::Green, value);
    }

    pub fn set_blue(&mut self, x: i64, y: i64, value: u8) {
        self.set_pixel(x, y, Channel::Blue, value);
    }

    pub fn set_alpha(&mut self, x: i64, y: i64, value: u8) {
        self.set_pixel(x, y, Channel::Alpha, value);
    }

    // ─── Rendering ───────────────────────────────────────────────────────

    /// Draw at the stored position and rotation.
    pub fn draw(&mut self, target: &mut C) -> Result<()> {
        self.render(target, self.position, self.rotation)
    }

    /// Draw the current visual state centered in the box at `position` of
    /// the current extent, rotated by `rotation` radians about its center.
    ///
    /// The target's transform is reset to identity afterwards, including when
    /// the draw fails.
    pub fn render(&mut self, target: &mut C, position: Point, rotation: f64) -> Result<()> {
        self.finalize_dimensions();
        self.sync_offscreen()?;

        let (w, h) = (self.width, self.height);
        log::trace!(
            "render {} at ({}, {}) {}x{} rot {rotation}",
            self.locator,
            position.x,
            position.y,
            w,
            h
        );

        target.set_transform(Affine::translate((position.x + w / 2.0, position.y + h / 2.0)));
        target.rotate(rotation);
        let drawn = self.draw_current(target, Rect::new(-w / 2.0, -h / 2.0, w / 2.0, h / 2.0));
        target.set_transform(Affine::IDENTITY);
        drawn
    }

    fn sync_offscreen(&mut self) -> Result<()> {
        if self.mode != RenderMode::FromPixelBuffer || !self.dirty {
            return Ok(());
        }
        if let (Some(canvas), Some(pixels)) = (self.offscreen.as_mut(), self.pixels.as_ref()) {
            canvas.clear();
            canvas
                .put_pixels(pixels)
                .map_err(|e| render_error(&self.locator, e))?;
            self.dirty = false;
        }
        Ok(())
    }

    fn draw_current(&self, target: &mut C, dest: Rect) -> Result<()> {
        let source = match (self.mode, &self.offscreen, &self.image) {
            (RenderMode::FromPixelBuffer, Some(canvas), _) => Drawable::Offscreen(canvas),
            (_, _, Some(image)) => Drawable::Decoded(image),
            _ if self.state == LoadState::Failed => {
                return Err(render_error(
                    &self.locator,
                    SurfaceError::Backend("image failed to load".into()),
                ));
            }
            // still loading: nothing to draw yet
            _ => return Ok(()),
        };
        target
            .draw_image(source, dest)
            .map_err(|e| render_error(&self.locator, e))
    }
}

impl<C: Canvas> fmt::Debug for ImageSurface<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSurface")
            .field("locator", &self.locator)
            .field("src", &self.src)
            .field("state", &self.state)
            .field("seq", &self.seq)
            .field("size", &(self.width, self.height))
            .field("mode", &self.mode)
            .field("pixels", &self.pixels.is_some())
            .field("pixel_access_denied", &self.pixel_access_denied)
            .finish()
    }
}

fn extract_pixels<C, F>(image: &C::Image, factory: &mut F) -> Result<(C, PixelBuffer)>
where
    C: Canvas,
    F: CanvasFactory<Canvas = C> + ?Sized,
{
    let (w, h) = (image.natural_width(), image.natural_height());
    if w == 0 || h == 0 {
        return Err(SurfaceError::Backend(format!("image has no pixels ({w}x{h})")));
    }
    let mut canvas = factory.create_canvas(w, h)?;
    canvas.draw_image(
        Drawable::Decoded(image),
        Rect::new(0.0, 0.0, f64::from(w), f64::from(h)),
    )?;
    let pixels = canvas.get_pixels()?;
    Ok((canvas, pixels))
}

fn render_error(locator: &str, err: SurfaceError) -> SurfaceError {
    let reason = match err {
        SurfaceError::Render { .. } => return err,
        SurfaceError::Backend(reason) | SurfaceError::PixelAccess(reason) => reason,
        other => other.to_string(),
    };
    SurfaceError::Render {
        locator: locator.to_string(),
        reason,
    }
}

fn check_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SurfaceError::InvalidArgument(format!(
            "invalid value for `{name}`: {value}. Pass finite numbers to `setSize(width, height)`."
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    // Minimal recording canvas; the software raster backend lives in easel-render.

    #[derive(Debug, Clone)]
    struct FakeImage {
        w: u32,
        h: u32,
        fill: Rgba,
        tainted: bool,
        broken: bool,
    }

    impl FakeImage {
        fn new(w: u32, h: u32) -> Self {
            Self {
                w,
                h,
                fill: [10, 20, 30, 255],
                tainted: false,
                broken: false,
            }
        }
    }

    impl DecodedImage for FakeImage {
        fn natural_width(&self) -> u32 {
            self.w
        }
        fn natural_height(&self) -> u32 {
            self.h
        }
    }

    #[derive(Debug, Default)]
    struct FakeCanvas {
        w: u32,
        h: u32,
        pixels: Vec<u8>,
        tainted: bool,
        transforms: Vec<Affine>,
        draws: Vec<(&'static str, Rect)>,
        puts: usize,
    }

    impl Canvas for FakeCanvas {
        type Image = FakeImage;

        fn size(&self) -> (u32, u32) {
            (self.w, self.h)
        }
        fn set_transform(&mut self, transform: Affine) {
            self.transforms.push(transform);
        }
        fn rotate(&mut self, radians: f64) {
            let current = self.transforms.last().copied().unwrap_or(Affine::IDENTITY);
            self.transforms.push(current * Affine::rotate(radians));
        }
        fn draw_image(&mut self, source: Drawable<'_, Self>, dest: Rect) -> Result<()> {
            match source {
                Drawable::Decoded(img) => {
                    if img.broken {
                        return Err(SurfaceError::Backend("broken image".into()));
                    }
                    self.tainted |= img.tainted;
                    for px in self.pixels.chunks_mut(4) {
                        px.copy_from_slice(&img.fill);
                    }
                    self.draws.push(("decoded", dest));
                }
                Drawable::Offscreen(_) => self.draws.push(("offscreen", dest)),
            }
            Ok(())
        }
        fn clear(&mut self) {
            self.pixels.fill(0);
        }
        fn get_pixels(&self) -> Result<PixelBuffer> {
            if self.tainted {
                return Err(SurfaceError::PixelAccess("canvas is tainted".into()));
            }
            PixelBuffer::from_rgba(self.w, self.h, self.pixels.clone())
        }
        fn put_pixels(&mut self, pixels: &PixelBuffer) -> Result<()> {
            self.pixels.copy_from_slice(pixels.data());
            self.puts += 1;
            Ok(())
        }
    }

    struct Factory;

    impl CanvasFactory for Factory {
        type Canvas = FakeCanvas;
        fn create_canvas(&mut self, width: u32, height: u32) -> Result<FakeCanvas> {
            Ok(FakeCanvas {
                w: width,
                h: height,
                pixels: vec![0; width as usize * height as usize * 4],
                ..FakeCanvas::default()
            })
        }
    }

    struct NoCanvas;

    impl CanvasFactory for NoCanvas {
        type Canvas = FakeCanvas;
        fn create_canvas(&mut self, _width: u32, _height: u32) -> Result<FakeCanvas> {
            Err(SurfaceError::Backend("canvas allocation failed".into()))
        }
    }

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn loaded(image: FakeImage) -> ImageSurface<FakeCanvas> {
        let mut requests: Vec<LoadRequest> = Vec::new();
        let mut surface =
            ImageSurface::new("photo.png", &OriginPolicy::same_origin(), &mut requests);
        let seq = requests[0].seq;
        surface
            .finish_load(seq, LoadOutcome::Decoded(image), &mut Factory)
            .notify();
        surface
    }

    #[test]
    fn new_issues_request_and_reports_not_loaded() {
        let mut requests: Vec<LoadRequest> = Vec::new();
        let surface: ImageSurface<FakeCanvas> =
            ImageSurface::new("photo.png", &OriginPolicy::same_origin(), &mut requests);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].src, "photo.png");
        assert!(!requests[0].cross_origin);
        assert_eq!(surface.load_state(), LoadState::Loading);
        assert_eq!(surface.width(), NOT_LOADED);
        assert_eq!(surface.height(), NOT_LOADED);
        assert_eq!(surface.pixel(0, 0), None);
    }

    #[test]
    fn load_sets_natural_size_and_pixels() {
        let surface = loaded(FakeImage::new(400, 300));
        assert_eq!(surface.load_state(), LoadState::Loaded);
        assert_eq!((surface.width(), surface.height()), (400.0, 300.0));
        assert_eq!(surface.pixel(10, 10), Some([10, 20, 30, 255]));
        assert!(!surface.pixel_access_denied());
    }

    #[test]
    fn callback_runs_once_per_load() {
        let hits = Rc::new(Cell::new(0));
        let mut requests: Vec<LoadRequest> = Vec::new();
        let policy = OriginPolicy::same_origin();
        let mut surface: ImageSurface<FakeCanvas> =
            ImageSurface::new("a.png", &policy, &mut requests);
        let counter = hits.clone();
        surface.on_loaded(move || counter.set(counter.get() + 1));

        surface
            .finish_load(requests[0].seq, LoadOutcome::Decoded(FakeImage::new(2, 2)), &mut Factory)
            .notify();
        assert_eq!(hits.get(), 1);

        // duplicate completion for the same request is ignored
        let dup = surface.finish_load(
            requests[0].seq,
            LoadOutcome::Decoded(FakeImage::new(2, 2)),
            &mut Factory,
        );
        assert!(matches!(dup, Completion::Stale));
        dup.notify();
        assert_eq!(hits.get(), 1);

        // callback survives set_source
        surface.set_source("b.png", &policy, &mut requests);
        surface
            .finish_load(requests[1].seq, LoadOutcome::Decoded(FakeImage::new(3, 3)), &mut Factory)
            .notify();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn reregistering_replaces_callback() {
        let first = Rc::new(Cell::new(false));
        let second = Rc::new(Cell::new(false));
        let mut requests: Vec<LoadRequest> = Vec::new();
        let mut surface: ImageSurface<FakeCanvas> =
            ImageSurface::new("a.png", &OriginPolicy::same_origin(), &mut requests);
        let f = first.clone();
        surface.on_loaded(move || f.set(true));
        let s = second.clone();
        surface.on_loaded(move || s.set(true));
        surface
            .finish_load(requests[0].seq, LoadOutcome::Decoded(FakeImage::new(1, 1)), &mut Factory)
            .notify();
        assert!(!first.get());
        assert!(second.get());
    }

    #[test]
    fn stale_completion_does_not_overwrite_newer_source() {
        let mut requests: Vec<LoadRequest> = Vec::new();
        let policy = OriginPolicy::same_origin();
        let mut surface: ImageSurface<FakeCanvas> =
            ImageSurface::new("old.png", &policy, &mut requests);
        surface.set_source("new.png", &policy, &mut requests);

        let old = surface.finish_load(
            requests[0].seq,
            LoadOutcome::Decoded(FakeImage::new(50, 50)),
            &mut Factory,
        );
        assert!(matches!(old, Completion::Stale));
        assert_eq!(surface.load_state(), LoadState::Loading);
        assert_eq!(surface.width(), NOT_LOADED);

        let new = surface.finish_load(
            requests[1].seq,
            LoadOutcome::Decoded(FakeImage::new(8, 4)),
            &mut Factory,
        );
        assert!(new.is_loaded());
        assert_eq!((surface.width(), surface.height()), (8.0, 4.0));
        assert_eq!(surface.locator(), "new.png");
    }

    #[test]
    fn failed_load_is_not_loaded_and_skips_callback() {
        init_logs();
        let hit = Rc::new(Cell::new(false));
        let mut requests: Vec<LoadRequest> = Vec::new();
        let mut surface: ImageSurface<FakeCanvas> =
            ImageSurface::new("missing.png", &OriginPolicy::same_origin(), &mut requests);
        let h = hit.clone();
        surface.on_loaded(move || h.set(true));
        let completion =
            surface.finish_load(requests[0].seq, LoadOutcome::Failed("404".into()), &mut Factory);
        assert!(matches!(completion, Completion::Failed));
        completion.notify();
        assert!(!hit.get());
        assert_eq!(surface.load_state(), LoadState::Failed);
        assert_eq!(surface.width(), NOT_LOADED);
    }

    #[test]
    fn tainted_image_degrades_to_display_only() {
        let mut image = FakeImage::new(4, 4);
        image.tainted = true;
        let mut surface = loaded(image);
        assert!(surface.is_loaded());
        assert!(surface.pixel_access_denied());
        assert_eq!(surface.pixel(0, 0), None);
        surface.set_red(0, 0, 255);
        assert_eq!(surface.render_mode(), RenderMode::FromDecodedImage);

        let mut target = Factory.create_canvas(10, 10).unwrap();
        surface.render(&mut target, Point::ORIGIN, 0.0).unwrap();
        assert_eq!(target.draws[0].0, "decoded");
    }

    #[test]
    fn only_refused_extraction_counts_as_access_denied() {
        init_logs();

        // zero-sized decode: nothing to copy, but nothing was refused either
        let empty = loaded(FakeImage::new(0, 0));
        assert!(empty.is_loaded());
        assert!(!empty.pixel_access_denied());
        assert_eq!(empty.pixel_buffer(), None);

        // offscreen canvas could not be created
        let mut requests: Vec<LoadRequest> = Vec::new();
        let mut surface: ImageSurface<FakeCanvas> =
            ImageSurface::new("photo.png", &OriginPolicy::same_origin(), &mut requests);
        let completion = surface.finish_load(
            requests[0].seq,
            LoadOutcome::Decoded(FakeImage::new(4, 4)),
            &mut NoCanvas,
        );
        assert!(completion.is_loaded());
        assert!(!surface.pixel_access_denied());
        assert_eq!(surface.pixel(0, 0), None);
        assert_eq!(surface.width(), 4.0);
    }

    #[test]
    fn set_size_validates_and_clamps() {
        let mut surface = loaded(FakeImage::new(4, 4));
        surface.set_size(-5.0, 20.0).unwrap();
        assert_eq!((surface.width(), surface.height()), (0.0, 20.0));
        assert!(matches!(
            surface.set_size(f64::NAN, 1.0),
            Err(SurfaceError::InvalidArgument(_))
        ));
        assert!(matches!(
            surface.set_size(1.0, f64::INFINITY),
            Err(SurfaceError::InvalidArgument(_))
        ));
        // unchanged after the rejected calls
        assert_eq!((surface.width(), surface.height()), (0.0, 20.0));
    }

    #[test]
    fn explicit_size_survives_render_and_keeps_buffer_resolution() {
        let mut surface = loaded(FakeImage::new(4, 4));
        surface.set_size(0.0, 9.0).unwrap();
        let mut target = Factory.create_canvas(10, 10).unwrap();
        surface.render(&mut target, Point::ORIGIN, 0.0).unwrap();
        assert_eq!((surface.width(), surface.height()), (0.0, 9.0));
        let buf = surface.pixel_buffer().unwrap();
        assert_eq!((buf.width(), buf.height()), (4, 4));
    }

    #[test]
    fn size_set_before_load_is_kept() {
        let mut requests: Vec<LoadRequest> = Vec::new();
        let mut surface: ImageSurface<FakeCanvas> =
            ImageSurface::new("a.png", &OriginPolicy::same_origin(), &mut requests);
        surface.set_size(30.0, 40.0).unwrap();
        let _ = surface.finish_load(
            requests[0].seq,
            LoadOutcome::Decoded(FakeImage::new(2, 2)),
            &mut Factory,
        );
        assert_eq!((surface.width(), surface.height()), (30.0, 40.0));
    }

    #[test]
    fn contains_point_uses_position_and_extent() {
        let mut surface = loaded(FakeImage::new(10, 20));
        surface.set_position(5.0, 5.0);
        assert!(surface.contains_point(5.0, 5.0));
        assert!(surface.contains_point(15.0, 25.0));
        assert!(!surface.contains_point(15.1, 10.0));
        assert!(!surface.contains_point(4.9, 10.0));
        surface.move_by(100.0, 0.0);
        assert!(surface.contains_point(110.0, 10.0));
    }

    #[test]
    fn set_pixel_round_trips_and_switches_mode() {
        let mut surface = loaded(FakeImage::new(20, 20));
        surface.set_pixel(10, 10, Channel::Red, 255);
        assert_eq!(surface.pixel(10, 10), Some([255, 20, 30, 255]));
        surface.set_alpha(3, 4, 7);
        assert_eq!(surface.alpha(3, 4), Some(7));
        assert_eq!(surface.render_mode(), RenderMode::FromPixelBuffer);
    }

    #[test]
    fn set_pixel_before_load_is_noop() {
        let mut requests: Vec<LoadRequest> = Vec::new();
        let mut surface: ImageSurface<FakeCanvas> =
            ImageSurface::new("a.png", &OriginPolicy::same_origin(), &mut requests);
        surface.set_green(0, 0, 1);
        assert_eq!(surface.pixel(0, 0), None);
        assert_eq!(surface.render_mode(), RenderMode::FromDecodedImage);
    }

    #[test]
    fn render_applies_transform_and_restores_identity() {
        let mut surface = loaded(FakeImage::new(40, 20));
        let mut target = Factory.create_canvas(100, 100).unwrap();
        surface
            .render(&mut target, Point::new(10.0, 10.0), std::f64::consts::FRAC_PI_2)
            .unwrap();

        assert_eq!(target.transforms[0], Affine::translate((30.0, 20.0)));
        assert_eq!(target.transforms.last(), Some(&Affine::IDENTITY));
        assert_eq!(
            target.draws,
            vec![("decoded", Rect::new(-20.0, -10.0, 20.0, 10.0))]
        );
    }

    #[test]
    fn dirty_buffer_is_pushed_once_then_drawn_from_offscreen() {
        let mut surface = loaded(FakeImage::new(4, 4));
        surface.set_blue(1, 1, 0);
        let mut target = Factory.create_canvas(10, 10).unwrap();
        surface.draw(&mut target).unwrap();
        surface.draw(&mut target).unwrap();
        assert_eq!(surface.offscreen.as_ref().map(|c| c.puts), Some(1));
        assert!(target.draws.iter().all(|(kind, _)| *kind == "offscreen"));
    }

    #[test]
    fn draw_failure_is_render_error_and_transform_is_restored() {
        let mut image = FakeImage::new(4, 4);
        image.broken = true;
        let mut requests: Vec<LoadRequest> = Vec::new();
        let mut surface: ImageSurface<FakeCanvas> =
            ImageSurface::new("bad.png", &OriginPolicy::same_origin(), &mut requests);
        surface.set_materialize_pixels(false);
        let _ = surface.finish_load(requests[0].seq, LoadOutcome::Decoded(image), &mut Factory);

        let mut target = Factory.create_canvas(10, 10).unwrap();
        let err = surface.render(&mut target, Point::ORIGIN, 0.0).unwrap_err();
        assert!(matches!(err, SurfaceError::Render { ref locator, .. } if locator == "bad.png"));
        assert_eq!(target.transforms.last(), Some(&Affine::IDENTITY));
    }

    #[test]
    fn failed_source_renders_as_error_while_loading_draws_nothing() {
        let mut requests: Vec<LoadRequest> = Vec::new();
        let mut surface: ImageSurface<FakeCanvas> =
            ImageSurface::new("a.png", &OriginPolicy::same_origin(), &mut requests);
        let mut target = Factory.create_canvas(10, 10).unwrap();
        surface.render(&mut target, Point::ORIGIN, 0.0).unwrap();
        assert!(target.draws.is_empty());

        let _ = surface.finish_load(
            requests[0].seq,
            LoadOutcome::Failed("404".into()),
            &mut Factory,
        );
        assert!(surface.render(&mut target, Point::ORIGIN, 0.0).is_err());
        assert_eq!(target.transforms.last(), Some(&Affine::IDENTITY));
    }

    #[test]
    fn set_source_resets_pixels_and_mode() {
        let mut requests: Vec<LoadRequest> = Vec::new();
        let policy = OriginPolicy::same_origin();
        let mut surface: ImageSurface<FakeCanvas> =
            ImageSurface::new("a.png", &policy, &mut requests);
        let _ = surface.finish_load(
            requests[0].seq,
            LoadOutcome::Decoded(FakeImage::new(4, 4)),
            &mut Factory,
        );
        surface.set_red(0, 0, 1);
        surface.set_size(99.0, 99.0).unwrap();
        surface.set_source("b.png", &policy, &mut requests);

        assert_eq!(surface.load_state(), LoadState::Loading);
        assert_eq!(surface.render_mode(), RenderMode::FromDecodedImage);
        assert_eq!(surface.width(), NOT_LOADED);
        assert_eq!(surface.pixel(0, 0), None);
        assert!(requests[1].seq > requests[0].seq);
    }
}
