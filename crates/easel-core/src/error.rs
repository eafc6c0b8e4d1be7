//! Error taxonomy for image surfaces.
//!
//! Validation errors surface immediately. Resource failures that the calling
//! program cannot control (decode failure, pixel-access denial) are degraded
//! inside the surface and never reach the caller as `Err`, except for a draw
//! call that actually fails at render time.

/// Errors produced by image surfaces and their drawing backends.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    /// Wrong argument passed to a constructor or size setter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying draw call failed.
    #[error(
        "unable to draw image from `{locator}`: {reason}. Make sure you have a valid image URL."
    )]
    Render { locator: String, reason: String },

    /// Pixel extraction was refused (typically a cross-origin restriction).
    #[error("pixel access denied: {0}")]
    PixelAccess(String),

    /// Canvas creation or buffer handling failed in the drawing backend.
    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, SurfaceError>;
