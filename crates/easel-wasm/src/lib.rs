//! WASM bridge for easel: exposes `WebImage` to JavaScript.
//!
//! Compiled via `wasm-pack build --target web`. Decoding is done by the
//! browser's `<img>` element; rendering and pixel access go through a 2D
//! canvas context.

mod web;

use easel_core::{
    Channel, ImageConfig, ImageSurface, OriginPolicy, Point, SourceCache, SurfaceError,
    clamp_channel,
};
use log::LevelFilter;
use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use web_sys::CanvasRenderingContext2d;

pub use web::{LoadedImage, WebCanvas, WebFactory};
use web::{PendingLoad, WebLoader};

/// Value reported for pixel reads outside a loaded image.
const UNDEFINED_CHANNEL: i32 = -1;

thread_local! {
    static CONFIG: RefCell<ImageConfig> = RefCell::new(ImageConfig::default());
}

/// Surface state reachable from both the JS object and the `<img>` handlers.
pub(crate) struct Shared {
    pub(crate) surface: ImageSurface<WebCanvas>,
    pending: Option<PendingLoad>,
}

/// An image that can be drawn on a canvas and edited pixel by pixel.
///
/// Width and height read as 0 until the browser finishes decoding; register
/// a callback with `loaded` to run code once the pixels are available.
#[wasm_bindgen]
pub struct WebImage {
    shared: Rc<RefCell<Shared>>,
}

#[wasm_bindgen]
impl WebImage {
    /// Create an image and start loading `filename`.
    #[wasm_bindgen(constructor)]
    pub fn new(filename: JsValue) -> Result<WebImage, JsError> {
        console_error_panic_hook_setup();
        console_log_setup();

        let locator = locator_arg(&filename, "new WebImage(filename)")?;
        let config = current_config();
        let policy = OriginPolicy::from_config(&config, SourceCache::shared());

        let shared = Rc::new_cyclic(|weak| {
            let mut loader = WebLoader::new(weak.clone());
            let mut surface = ImageSurface::new(locator, &policy, &mut loader);
            surface.set_materialize_pixels(config.materialize_pixels);
            RefCell::new(Shared {
                surface,
                pending: loader.issued,
            })
        });
        Ok(WebImage { shared })
    }

    /// Replace the image source. A callback registered with `loaded` fires
    /// again when the new image is ready.
    #[wasm_bindgen(js_name = setImage)]
    pub fn set_image(&self, filename: JsValue) -> Result<(), JsError> {
        let locator = locator_arg(&filename, "setImage(filename)")?;
        let policy = OriginPolicy::from_config(&current_config(), SourceCache::shared());
        let mut loader = WebLoader::new(Rc::downgrade(&self.shared));

        let previous = {
            let mut shared = self.shared.borrow_mut();
            shared.surface.set_source(locator, &policy, &mut loader);
            std::mem::replace(&mut shared.pending, loader.issued)
        };
        drop(previous);
        Ok(())
    }

    /// Run `callback` each time an image finishes loading.
    pub fn loaded(&self, callback: js_sys::Function) {
        self.shared.borrow_mut().surface.on_loaded(move || {
            if let Err(e) = callback.call0(&JsValue::NULL) {
                log::error!("image load callback threw: {}", web::js_message(&e));
            }
        });
    }

    #[wasm_bindgen(js_name = isLoaded)]
    pub fn is_loaded(&self) -> bool {
        self.shared.borrow().surface.is_loaded()
    }

    /// The locator this image was created or last set with.
    #[wasm_bindgen(js_name = getFilename)]
    pub fn filename(&self) -> String {
        self.shared.borrow().surface.locator().to_string()
    }

    /// Whether the browser refused pixel access for this image.
    #[wasm_bindgen(js_name = pixelAccessDenied)]
    pub fn pixel_access_denied(&self) -> bool {
        self.shared.borrow().surface.pixel_access_denied()
    }

    // ─── Geometry ────────────────────────────────────────────────────────

    #[wasm_bindgen(js_name = getWidth)]
    pub fn width(&self) -> f64 {
        self.shared.borrow().surface.width()
    }

    #[wasm_bindgen(js_name = getHeight)]
    pub fn height(&self) -> f64 {
        self.shared.borrow().surface.height()
    }

    /// Set the drawn size. Pixel data keeps the natural size.
    #[wasm_bindgen(js_name = setSize)]
    pub fn set_size(&self, width: f64, height: f64) -> Result<(), JsError> {
        self.shared.borrow_mut().surface.set_size(width, height)?;
        Ok(())
    }

    #[wasm_bindgen(js_name = getX)]
    pub fn x(&self) -> f64 {
        self.shared.borrow().surface.position().x
    }

    #[wasm_bindgen(js_name = getY)]
    pub fn y(&self) -> f64 {
        self.shared.borrow().surface.position().y
    }

    #[wasm_bindgen(js_name = setPosition)]
    pub fn set_position(&self, x: f64, y: f64) {
        self.shared.borrow_mut().surface.set_position(x, y);
    }

    #[wasm_bindgen(js_name = "move")]
    pub fn move_by(&self, dx: f64, dy: f64) {
        self.shared.borrow_mut().surface.move_by(dx, dy);
    }

    /// Rotation in degrees, applied about the image center.
    #[wasm_bindgen(js_name = setRotation)]
    pub fn set_rotation(&self, degrees: f64) {
        self.shared
            .borrow_mut()
            .surface
            .set_rotation(degrees.to_radians());
    }

    #[wasm_bindgen(js_name = getRotation)]
    pub fn rotation(&self) -> f64 {
        self.shared.borrow().surface.rotation().to_degrees()
    }

    #[wasm_bindgen(js_name = containsPoint)]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.shared.borrow().surface.contains_point(x, y)
    }

    // ─── Pixels ──────────────────────────────────────────────────────────

    /// `[r, g, b, a]` at `(x, y)`; every entry is -1 outside the image.
    #[wasm_bindgen(js_name = getPixel)]
    pub fn get_pixel(&self, x: f64, y: f64) -> js_sys::Array {
        let rgba = pixel_coords(x, y).and_then(|(x, y)| self.shared.borrow().surface.pixel(x, y));
        pixel_or_sentinel(rgba)
            .into_iter()
            .map(JsValue::from)
            .collect()
    }

    #[wasm_bindgen(js_name = getRed)]
    pub fn get_red(&self, x: f64, y: f64) -> i32 {
        self.read(x, y, Channel::Red)
    }

    #[wasm_bindgen(js_name = getGreen)]
    pub fn get_green(&self, x: f64, y: f64) -> i32 {
        self.read(x, y, Channel::Green)
    }

    #[wasm_bindgen(js_name = getBlue)]
    pub fn get_blue(&self, x: f64, y: f64) -> i32 {
        self.read(x, y, Channel::Blue)
    }

    #[wasm_bindgen(js_name = getAlpha)]
    pub fn get_alpha(&self, x: f64, y: f64) -> i32 {
        self.read(x, y, Channel::Alpha)
    }

    /// Write channel `component` (0 red, 1 green, 2 blue, 3 alpha) at
    /// `(x, y)`. Values are clamped to 0..=255.
    #[wasm_bindgen(js_name = setPixel)]
    pub fn set_pixel(&self, x: f64, y: f64, component: u32, value: f64) {
        match Channel::try_from(component) {
            Ok(channel) => self.write(x, y, channel, value),
            Err(e) => log::warn!("setPixel ignored: {e}"),
        }
    }

    #[wasm_bindgen(js_name = setRed)]
    pub fn set_red(&self, x: f64, y: f64, value: f64) {
        self.write(x, y, Channel::Red, value);
    }

    #[wasm_bindgen(js_name = setGreen)]
    pub fn set_green(&self, x: f64, y: f64, value: f64) {
        self.write(x, y, Channel::Green, value);
    }

    #[wasm_bindgen(js_name = setBlue)]
    pub fn set_blue(&self, x: f64, y: f64, value: f64) {
        self.write(x, y, Channel::Blue, value);
    }

    #[wasm_bindgen(js_name = setAlpha)]
    pub fn set_alpha(&self, x: f64, y: f64, value: f64) {
        self.write(x, y, Channel::Alpha, value);
    }

    // ─── Rendering ───────────────────────────────────────────────────────

    /// Draw at the image's own position and rotation.
    pub fn draw(&self, ctx: &CanvasRenderingContext2d) -> Result<(), JsError> {
        let mut target = WebCanvas::new(ctx.clone());
        self.shared.borrow_mut().surface.draw(&mut target)?;
        Ok(())
    }

    /// Draw with the top-left corner at `(x, y)`, rotated by `rotation`
    /// radians about the image center.
    pub fn render(
        &self,
        ctx: &CanvasRenderingContext2d,
        x: f64,
        y: f64,
        rotation: f64,
    ) -> Result<(), JsError> {
        let mut target = WebCanvas::new(ctx.clone());
        self.shared
            .borrow_mut()
            .surface
            .render(&mut target, Point::new(x, y), rotation)?;
        Ok(())
    }
}

impl WebImage {
    fn read(&self, x: f64, y: f64, channel: Channel) -> i32 {
        pixel_coords(x, y)
            .and_then(|(x, y)| self.shared.borrow().surface.channel(x, y, channel))
            .map_or(UNDEFINED_CHANNEL, i32::from)
    }

    fn write(&self, x: f64, y: f64, channel: Channel, value: f64) {
        let Some((x, y)) = pixel_coords(x, y) else {
            return;
        };
        self.shared
            .borrow_mut()
            .surface
            .set_pixel(x, y, channel, clamp_channel(value));
    }
}

// ─── Module-level functions ──────────────────────────────────────────────

/// Replace the image configuration used by images created afterwards.
///
/// Accepts a JSON object with any of `cache_bust_param`, `page_url` and
/// `materialize_pixels`; missing keys take their defaults.
#[wasm_bindgen(js_name = configureImages)]
pub fn configure_images(json: &str) -> Result<(), JsError> {
    let config: ImageConfig = serde_json::from_str(json)?;
    CONFIG.with(|c| *c.borrow_mut() = config);
    Ok(())
}

/// Set the console log level (`error`, `warn`, `info`, `debug`, `trace`,
/// `off`). Returns `false` for an unknown level.
#[wasm_bindgen(js_name = setLogLevel)]
pub fn set_log_level(level: &str) -> bool {
    console_log_setup();
    match parse_level(level) {
        Some(filter) => {
            log::set_max_level(filter);
            true
        }
        None => false,
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────

fn locator_arg(value: &JsValue, call: &str) -> Result<String, SurfaceError> {
    value.as_string().ok_or_else(|| {
        SurfaceError::InvalidArgument(format!(
            "you must pass a string to `{call}` that has the image's URL"
        ))
    })
}

fn current_config() -> ImageConfig {
    let mut config = CONFIG.with(|c| c.borrow().clone());
    if config.page_url.is_none() {
        config.page_url = web_sys::window().and_then(|w| w.location().href().ok());
    }
    config
}

/// Integral coordinates only; anything else addresses no pixel.
fn pixel_coords(x: f64, y: f64) -> Option<(i64, i64)> {
    let whole = |v: f64| (v.is_finite() && v.fract() == 0.0).then_some(v as i64);
    Some((whole(x)?, whole(y)?))
}

fn pixel_or_sentinel(rgba: Option<[u8; 4]>) -> [i32; 4] {
    rgba.map_or([UNDEFINED_CHANNEL; 4], |p| p.map(i32::from))
}

/// Level name as accepted by `setLogLevel`, case-insensitive.
fn parse_level(name: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(name.trim()).ok()
}

fn console_log_setup() {
    use std::sync::Once;
    static SET_LOGGER: Once = Once::new();
    SET_LOGGER.call_once(|| {
        // the host page may already have installed a logger
        let _ = console_log::init_with_level(log::Level::Warn);
    });
}

fn console_error_panic_hook_setup() {
    #[cfg(target_arch = "wasm32")]
    {
        use std::sync::Once;
        static SET_HOOK: Once = Once::new();
        SET_HOOK.call_once(|| {
            std::panic::set_hook(Box::new(|info| {
                let msg = format!("easel WASM panic: {info}");
                web_sys::console::error_1(&msg.into());
            }));
        });
    }
}
