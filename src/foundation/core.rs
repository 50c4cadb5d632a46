use crate::foundation::error::{VidloomError, VidloomResult};

pub use kurbo::{Affine, Point, Rect, Vec2};

/// Microseconds per second; all pipeline timestamps are expressed in µs.
pub const MICROS_PER_SECOND: u64 = 1_000_000;

/// Microseconds per millisecond; the muxer's timecode unit is ms.
pub const MICROS_PER_MILLI: u64 = 1_000;

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> VidloomResult<Self> {
        if width == 0 || height == 0 {
            return Err(VidloomError::validation("canvas width/height must be > 0"));
        }
        Ok(Self { width, height })
    }
}

/// Convert a µs timestamp to fractional milliseconds.
pub fn us_to_ms(us: u64) -> f64 {
    us as f64 / MICROS_PER_MILLI as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_rejects_zero_dimensions() {
        assert!(Canvas::new(0, 10).is_err());
        assert!(Canvas::new(10, 0).is_err());
        assert!(Canvas::new(1, 1).is_ok());
    }

    #[test]
    fn us_to_ms_is_fractional() {
        assert_eq!(us_to_ms(1_500), 1.5);
        assert_eq!(us_to_ms(0), 0.0);
    }
}
