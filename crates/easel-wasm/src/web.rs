//! Browser backend: `CanvasRenderingContext2d` as the drawing surface and
//! `HtmlImageElement` as the decoder.

use easel_core::{
    Affine, Canvas, CanvasFactory, DecodedImage, Drawable, ImageLoader, LoadOutcome, LoadRequest,
    LoadSeq, PixelBuffer, Rect, Result, SurfaceError,
};
use std::cell::RefCell;
use std::rc::Weak;
use wasm_bindgen::prelude::*;
use wasm_bindgen::{Clamped, JsCast};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement, ImageData};

use crate::Shared;

/// Best-effort text for a thrown JS value.
pub(crate) fn js_message(value: &JsValue) -> String {
    value
        .dyn_ref::<js_sys::Error>()
        .map(|e| String::from(e.message()))
        .or_else(|| value.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

/// A fully decoded `<img>`.
#[derive(Debug, Clone)]
pub struct LoadedImage(pub HtmlImageElement);

impl DecodedImage for LoadedImage {
    fn natural_width(&self) -> u32 {
        self.0.natural_width()
    }

    fn natural_height(&self) -> u32 {
        self.0.natural_height()
    }
}

/// A 2D context, on screen or off.
#[derive(Debug, Clone)]
pub struct WebCanvas {
    ctx: CanvasRenderingContext2d,
}

impl WebCanvas {
    pub fn new(ctx: CanvasRenderingContext2d) -> Self {
        Self { ctx }
    }

    fn element(&self) -> Result<HtmlCanvasElement> {
        self.ctx
            .canvas()
            .ok_or_else(|| SurfaceError::Backend("context is not attached to a canvas".into()))
    }
}

impl Canvas for WebCanvas {
    type Image = LoadedImage;

    fn size(&self) -> (u32, u32) {
        self.ctx
            .canvas()
            .map(|c| (c.width(), c.height()))
            .unwrap_or((0, 0))
    }

    fn set_transform(&mut self, transform: Affine) {
        let [a, b, c, d, e, f] = transform.as_coeffs();
        if let Err(err) = self.ctx.set_transform(a, b, c, d, e, f) {
            log::warn!("setTransform failed: {}", js_message(&err));
        }
    }

    fn rotate(&mut self, radians: f64) {
        if let Err(err) = self.ctx.rotate(radians) {
            log::warn!("rotate failed: {}", js_message(&err));
        }
    }

    fn draw_image(&mut self, source: Drawable<'_, Self>, dest: Rect) -> Result<()> {
        let (x, y, w, h) = (dest.x0, dest.y0, dest.width(), dest.height());
        let drawn = match source {
            Drawable::Decoded(image) => self
                .ctx
                .draw_image_with_html_image_element_and_dw_and_dh(&image.0, x, y, w, h),
            Drawable::Offscreen(canvas) => {
                let element = canvas.element()?;
                self.ctx
                    .draw_image_with_html_canvas_element_and_dw_and_dh(&element, x, y, w, h)
            }
        };
        drawn.map_err(|e| SurfaceError::Backend(js_message(&e)))
    }

    fn clear(&mut self) {
        let (w, h) = self.size();
        self.ctx.save();
        self.set_transform(Affine::IDENTITY);
        self.ctx.clear_rect(0.0, 0.0, f64::from(w), f64::from(h));
        self.ctx.restore();
    }

    fn get_pixels(&self) -> Result<PixelBuffer> {
        let (w, h) = self.size();
        let data = self
            .ctx
            .get_image_data(0.0, 0.0, f64::from(w), f64::from(h))
            .map_err(|e| SurfaceError::PixelAccess(js_message(&e)))?;
        PixelBuffer::from_rgba(data.width(), data.height(), data.data().0)
    }

    fn put_pixels(&mut self, pixels: &PixelBuffer) -> Result<()> {
        let data = ImageData::new_with_u8_clamped_array_and_sh(
            Clamped(pixels.data()),
            pixels.width(),
            pixels.height(),
        )
        .map_err(|e| SurfaceError::Backend(js_message(&e)))?;
        self.ctx
            .put_image_data(&data, 0.0, 0.0)
            .map_err(|e| SurfaceError::Backend(js_message(&e)))
    }
}

/// Creates hidden `<canvas>` elements.
pub struct WebFactory;

impl CanvasFactory for WebFactory {
    type Canvas = WebCanvas;

    fn create_canvas(&mut self, width: u32, height: u32) -> Result<WebCanvas> {
        let backend = |e: JsValue| SurfaceError::Backend(js_message(&e));
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| SurfaceError::Backend("no document".into()))?;
        let canvas: HtmlCanvasElement = document
            .create_element("canvas")
            .map_err(backend)?
            .dyn_into()
            .map_err(|_| SurfaceError::Backend("created element is not a canvas".into()))?;
        canvas.set_width(width);
        canvas.set_height(height);
        let ctx: CanvasRenderingContext2d = canvas
            .get_context("2d")
            .map_err(backend)?
            .ok_or_else(|| SurfaceError::Backend("2d context unavailable".into()))?
            .dyn_into()
            .map_err(|_| SurfaceError::Backend("unexpected context type".into()))?;
        Ok(WebCanvas::new(ctx))
    }
}

/// An `<img>` in flight and the handlers that report back to its surface.
pub(crate) struct PendingLoad {
    image: HtmlImageElement,
    _onload: Closure<dyn FnMut()>,
    _onerror: Closure<dyn FnMut()>,
}

impl Drop for PendingLoad {
    fn drop(&mut self) {
        // a superseded element may still fire; detach before the closures go away
        self.image.set_onload(None);
        self.image.set_onerror(None);
    }
}

/// Issues `<img>` requests whose completions land in `target`.
pub(crate) struct WebLoader {
    target: Weak<RefCell<Shared>>,
    pub(crate) issued: Option<PendingLoad>,
}

impl WebLoader {
    pub(crate) fn new(target: Weak<RefCell<Shared>>) -> Self {
        Self {
            target,
            issued: None,
        }
    }

    fn start(&self, request: &LoadRequest) -> std::result::Result<PendingLoad, JsValue> {
        let image = HtmlImageElement::new()?;
        if request.cross_origin {
            image.set_cross_origin(Some("anonymous"));
        }

        let onload = {
            let target = self.target.clone();
            let element = image.clone();
            let seq = request.seq;
            Closure::<dyn FnMut()>::new(move || {
                deliver(&target, seq, LoadOutcome::Decoded(LoadedImage(element.clone())));
            })
        };
        let onerror = {
            let target = self.target.clone();
            let src = request.src.clone();
            let seq = request.seq;
            Closure::<dyn FnMut()>::new(move || {
                deliver(&target, seq, LoadOutcome::Failed(format!("could not load {src}")));
            })
        };
        image.set_onload(Some(onload.as_ref().unchecked_ref()));
        image.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        image.set_src(&request.src);

        Ok(PendingLoad {
            image,
            _onload: onload,
            _onerror: onerror,
        })
    }
}

impl ImageLoader for WebLoader {
    fn load(&mut self, request: LoadRequest) {
        match self.start(&request) {
            Ok(pending) => self.issued = Some(pending),
            Err(e) => log::error!("cannot request {}: {}", request.src, js_message(&e)),
        }
    }
}

fn deliver(target: &Weak<RefCell<Shared>>, seq: LoadSeq, outcome: LoadOutcome<LoadedImage>) {
    let Some(shared) = target.upgrade() else {
        return;
    };
    // release the borrow before the user callback can touch the image again
    let completion = shared
        .borrow_mut()
        .surface
        .finish_load(seq, outcome, &mut WebFactory);
    completion.notify();
}
