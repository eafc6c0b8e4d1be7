pub mod backend;
pub mod config;
pub mod error;
pub mod image;
pub mod origin;
pub mod pixels;

pub use backend::{
    Canvas, CanvasFactory, DecodedImage, Drawable, ImageLoader, LoadOutcome, LoadRequest, LoadSeq,
};
pub use config::ImageConfig;
pub use error::{Result, SurfaceError};
pub use image::{Completion, ImageSurface, LoadCallback, LoadState, NOT_LOADED, RenderMode};
pub use origin::{OriginPolicy, ResolvedSource, SourceCache};
pub use pixels::{Channel, PixelBuffer, Rgba, clamp_channel};

// Re-export kurbo geometry so downstream crates don't need a direct dependency
pub use kurbo::{Affine, Point, Rect};
