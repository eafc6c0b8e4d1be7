//! Headless software backend for easel image surfaces.
//!
//! Native hosts and the test suites use this in place of a browser: a raster
//! canvas that honors transforms and an image registry standing in for the
//! network and decoder.

pub mod backend;
pub mod raster;

pub use backend::{Cors, SoftwareBackend, decode_png};
pub use raster::{RasterCanvas, RasterImage};

/// Image surface drawn onto the software canvas.
pub type SoftwareSurface = easel_core::ImageSurface<RasterCanvas>;
