//! Wrist location to depth-image pixel projection.
//!
//! The palm detector reports the wrist in a centred, normalized frame.
//! Horizontal coordinates are halved to align with the color camera's
//! wider field of view before being scaled to the depth resolution.

use crate::geometry::{Vec2, Vec3};

/// Integer pixel coordinate. May lie outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelCoord {
    pub x: i64,
    pub y: i64,
}

impl PixelCoord {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Whether both coordinates are within one pixel of `other`.
    pub fn is_adjacent(&self, other: PixelCoord) -> bool {
        self.x.abs_diff(other.x) <= 1 && self.y.abs_diff(other.y) <= 1
    }

    pub fn to_sexp(&self) -> String {
        format!("(:x {} :y {})", self.x, self.y)
    }
}

/// Project a wrist location to a depth pixel.
pub fn wrist_to_pixel(wrist: Vec3, width: usize, height: usize) -> PixelCoord {
    let u = wrist.x * 0.5 + 0.5;
    let v = wrist.y + 0.5;
    PixelCoord {
        x: (u * width as f32).floor() as i64,
        y: (v * height as f32).floor() as i64,
    }
}

/// Wrist pixel normalized back to 0.0-1.0 by the depth resolution.
pub fn wrist_uv(wrist: Vec3, width: usize, height: usize) -> Vec2 {
    if width == 0 || height == 0 {
        return Vec2::default();
    }
    let pixel = wrist_to_pixel(wrist, width, height);
    Vec2::new(pixel.x as f32 / width as f32, pixel.y as f32 / height as f32)
}
