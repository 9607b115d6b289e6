//! Visualization mask for the depth search.
//!
//! Marks the tracked pixel, the pixel where depth was found, and the
//! outline of the search window.

use rayon::prelude::*;

use crate::depth::projection::PixelCoord;
use crate::depth::sampler::DepthReading;

/// One overlay pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayPixel {
    #[default]
    Clear,
    /// Marker drawn while a depth reading is available.
    Depth,
    /// Marker drawn while no depth reading is available.
    NoDepth,
}

/// Row-major overlay mask matching the depth image size.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayMask {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<OverlayPixel>,
}

impl OverlayMask {
    /// Build the mask. Everything is clear when tracking is not confident.
    pub fn build(
        width: usize,
        height: usize,
        target: PixelCoord,
        reading: &DepthReading,
        radius: i64,
        tracking: bool,
    ) -> Self {
        let marker = if reading.distance > 0.0 {
            OverlayPixel::Depth
        } else {
            OverlayPixel::NoDepth
        };
        let found = reading.pixel;
        let reach = radius.max(0).unsigned_abs();

        let pixels = (0..width * height)
            .into_par_iter()
            .map(|i| {
                if !tracking {
                    return OverlayPixel::Clear;
                }
                let here = PixelCoord::new((i % width) as i64, (i / width) as i64);
                let dx = target.x.abs_diff(here.x);
                let dy = target.y.abs_diff(here.y);

                let visible = here.is_adjacent(target)
                    || found.is_some_and(|p| here.is_adjacent(p))
                    || (dx == reach && dy <= reach)
                    || (dy == reach && dx <= reach);
                if visible {
                    marker
                } else {
                    OverlayPixel::Clear
                }
            })
            .collect();

        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> OverlayPixel {
        if x >= self.width || y >= self.height {
            return OverlayPixel::Clear;
        }
        self.pixels[y * self.width + x]
    }

    /// Number of non-clear pixels.
    pub fn visible_count(&self) -> usize {
        self.pixels
            .iter()
            .filter(|p| **p != OverlayPixel::Clear)
            .count()
    }

    pub fn summary_sexp(&self) -> String {
        let marker = self
            .pixels
            .iter()
            .find(|p| **p != OverlayPixel::Clear)
            .map(|p| match p {
                OverlayPixel::Depth => ":depth",
                _ => ":no-depth",
            })
            .unwrap_or("nil");
        format!(
            "(:width {} :height {} :visible {} :marker {})",
            self.width,
            self.height,
            self.visible_count(),
            marker,
        )
    }
}
