//! RGBA pixel grid backing an image surface.
//!
//! Row-major, four bytes per pixel. Coordinate checks follow the drawable
//! API's historical rule: the upper bound is inclusive, so `x == width`
//! addresses the first pixel of the following row and reads past the end of
//! the grid yield nothing instead of panicking.

use crate::error::{Result, SurfaceError};

pub const NUM_CHANNELS: usize = 4;

/// A single RGBA pixel.
pub type Rgba = [u8; NUM_CHANNELS];

/// One color channel of an RGBA pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Red = 0,
    Green = 1,
    Blue = 2,
    Alpha = 3,
}

impl Channel {
    #[inline]
    pub fn offset(self) -> usize {
        self as usize
    }
}

impl TryFrom<u32> for Channel {
    type Error = SurfaceError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Channel::Red),
            1 => Ok(Channel::Green),
            2 => Ok(Channel::Blue),
            3 => Ok(Channel::Alpha),
            other => Err(SurfaceError::InvalidArgument(format!(
                "channel must be 0 (red), 1 (green), 2 (blue) or 3 (alpha), got {other}"
            ))),
        }
    }
}

/// Convert an arbitrary number into a channel byte the way a clamped byte
/// array stores it: NaN becomes 0, values clamp to `[0, 255]`, and halves
/// round to even.
pub fn clamp_channel(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    let clamped = value.clamp(0.0, 255.0);
    let floor = clamped.floor();
    let frac = clamped - floor;
    let rounded = if frac > 0.5 || (frac == 0.5 && floor % 2.0 != 0.0) {
        floor + 1.0
    } else {
        floor
    };
    rounded as u8
}

/// Owned RGBA pixel grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// A fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * NUM_CHANNELS],
        }
    }

    /// Wrap raw RGBA bytes. Fails if the byte count does not match the size.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * NUM_CHANNELS;
        if data.len() != expected {
            return Err(SurfaceError::Backend(format!(
                "pixel data for {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Byte offset of the pixel at `(x, y)`, or `None` when the coordinate is
    /// rejected or falls past the end of the grid.
    fn byte_index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x > i64::from(self.width) || y > i64::from(self.height) {
            return None;
        }
        let linear = y * i64::from(self.width) + x;
        let start = usize::try_from(linear).ok()?.checked_mul(NUM_CHANNELS)?;
        (start + NUM_CHANNELS <= self.data.len()).then_some(start)
    }

    /// Read the pixel at `(x, y)`.
    pub fn pixel(&self, x: i64, y: i64) -> Option<Rgba> {
        let i = self.byte_index(x, y)?;
        let mut px = [0u8; NUM_CHANNELS];
        px.copy_from_slice(&self.data[i..i + NUM_CHANNELS]);
        Some(px)
    }

    /// Write one channel of the pixel at `(x, y)`. Returns `false` when the
    /// coordinate is not addressable and nothing was written.
    pub fn set_channel(&mut self, x: i64, y: i64, channel: Channel, value: u8) -> bool {
        match self.byte_index(x, y) {
            Some(i) => {
                self.data[i + channel.offset()] = value;
                true
            }
            None => false,
        }
    }

    /// Write a whole pixel; same addressing rules as [`set_channel`](Self::set_channel).
    pub fn set_pixel(&mut self, x: i64, y: i64, rgba: Rgba) -> bool {
        match self.byte_index(x, y) {
            Some(i) => {
                self.data[i..i + NUM_CHANNELS].copy_from_slice(&rgba);
                true
            }
            None => false,
        }
    }
}
