//! Windowed nearest-depth search around a tracked pixel.
//!
//! Rows are scanned in parallel, each producing its own minimum in a
//! dedicated slot. A single-threaded merge then picks the minimum over
//! the rows inside the window, so the result never depends on thread
//! scheduling: ties go to the lowest row, then the lowest column.

use rayon::prelude::*;
use tracing::trace;

use crate::depth::projection::PixelCoord;
use crate::error::FrameError;

// ── Image ──────────────────────────────────────────────────

/// Row-major 16-bit depth image. Zero means "no reading".
#[derive(Debug, Clone)]
pub struct DepthImage {
    width: usize,
    height: usize,
    samples: Vec<u16>,
}

impl DepthImage {
    pub fn new(width: usize, height: usize, samples: Vec<u16>) -> Result<Self, FrameError> {
        let expected = width
            .checked_mul(height)
            .ok_or(FrameError::depth_buffer(usize::MAX, samples.len()))?;
        if samples.len() != expected {
            return Err(FrameError::depth_buffer(expected, samples.len()));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn sample(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.samples.get(y * self.width + x).copied()
    }

    fn row(&self, y: usize) -> &[u16] {
        &self.samples[y * self.width..(y + 1) * self.width]
    }
}

// ── Config ─────────────────────────────────────────────────

/// Largest accepted search radius. Wider than any supported depth sensor.
pub const MAX_SEARCH_RADIUS: i64 = 10_000;

/// Depth search parameters.
#[derive(Debug, Clone)]
pub struct DepthConfig {
    /// Half-size of the square search window (pixels), at most
    /// [`MAX_SEARCH_RADIUS`].
    pub search_radius: i64,
    /// Raw sample to distance conversion factor.
    pub scale: f32,
    /// Minimum hand confidence for a search to run.
    pub min_confidence: f32,
    /// Depth resolution assumed before the first depth frame arrives.
    pub default_width: usize,
    pub default_height: usize,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            search_radius: 25,
            scale: 0.001,
            min_confidence: 0.8,
            default_width: 640,
            default_height: 576,
        }
    }
}

// ── Reading ────────────────────────────────────────────────

/// Result of one search. `raw == -1` marks "no reading".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthReading {
    pub raw: i32,
    pub distance: f32,
    pub pixel: Option<PixelCoord>,
}

impl DepthReading {
    pub const SENTINEL: DepthReading = DepthReading {
        raw: -1,
        distance: -1.0,
        pixel: None,
    };

    pub fn to_sexp(&self) -> String {
        let pixel = self
            .pixel
            .map(|p| p.to_sexp())
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:raw {} :distance {:.4} :pixel {})",
            self.raw, self.distance, pixel
        )
    }
}

impl Default for DepthReading {
    fn default() -> Self {
        Self::SENTINEL
    }
}

// ── Search ─────────────────────────────────────────────────

/// Smallest positive sample in row `y` within `[start, end]`; first wins.
fn row_minimum(image: &DepthImage, y: usize, start: usize, end: usize) -> Option<(usize, u16)> {
    let row = image.row(y);
    let mut best: Option<(usize, u16)> = None;
    for (x, &v) in row.iter().enumerate().take(end + 1).skip(start) {
        if v > 0 && best.map_or(true, |(_, b)| v < b) {
            best = Some((x, v));
        }
    }
    best
}

/// Nearest positive sample within `radius` of `target` (square window).
///
/// Window bounds saturate, so any target or radius is safe.
pub fn find_nearest(
    image: &DepthImage,
    target: PixelCoord,
    radius: i64,
) -> Option<(PixelCoord, u16)> {
    if image.width == 0 || image.height == 0 || radius < 0 {
        return None;
    }
    let reach = radius.unsigned_abs();
    let max_x = image.width as i64 - 1;
    let start_x = target.x.saturating_sub(radius).max(0);
    let end_x = target.x.saturating_add(radius).min(max_x);
    let columns = (start_x <= end_x).then_some((start_x as usize, end_x as usize));

    // One slot per row; rows outside the window stay empty
    let rows: Vec<Option<(usize, u16)>> = (0..image.height)
        .into_par_iter()
        .map(|y| {
            if target.y.abs_diff(y as i64) > reach {
                return None;
            }
            let (start, end) = columns?;
            row_minimum(image, y, start, end)
        })
        .collect();

    let start_y = target.y.saturating_sub(radius).max(0);
    let end_y = target.y.saturating_add(radius).min(image.height as i64 - 1);
    let mut best: Option<(PixelCoord, u16)> = None;
    for y in start_y..=end_y {
        if let Some((x, v)) = rows[y as usize] {
            if best.map_or(true, |(_, b)| v < b) {
                best = Some((PixelCoord::new(x as i64, y), v));
            }
        }
    }
    best
}

/// Depth search with confidence gating and distance scaling.
pub struct DepthWindowSampler {
    pub config: DepthConfig,
    last: DepthReading,
    last_target: Option<PixelCoord>,
}

impl DepthWindowSampler {
    pub fn new(config: DepthConfig) -> Self {
        Self {
            config,
            last: DepthReading::SENTINEL,
            last_target: None,
        }
    }

    /// Search around `target`. Below the confidence threshold the
    /// search is skipped and the sentinel is returned.
    pub fn sample(&mut self, image: &DepthImage, target: PixelCoord, confidence: f32) -> DepthReading {
        self.last_target = Some(target);
        self.last = if confidence < self.config.min_confidence {
            DepthReading::SENTINEL
        } else {
            match find_nearest(image, target, self.radius()) {
                Some((pixel, raw)) => DepthReading {
                    raw: i32::from(raw),
                    distance: f32::from(raw) * self.config.scale,
                    pixel: Some(pixel),
                },
                None => DepthReading::SENTINEL,
            }
        };
        trace!(
            x = target.x,
            y = target.y,
            raw = self.last.raw,
            "depth sampled"
        );
        self.last
    }

    pub fn last(&self) -> DepthReading {
        self.last
    }

    /// Configured radius clamped to `0..=MAX_SEARCH_RADIUS`.
    pub fn radius(&self) -> i64 {
        self.config.search_radius.clamp(0, MAX_SEARCH_RADIUS)
    }

    pub fn last_target(&self) -> Option<PixelCoord> {
        self.last_target
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let target = self
            .last_target
            .map(|p| p.to_sexp())
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:radius {} :scale {:.4} :target {} :reading {})",
            self.config.search_radius,
            self.config.scale,
            target,
            self.last.to_sexp(),
        )
    }
}

impl Default for DepthWindowSampler {
    fn default() -> Self {
        Self::new(DepthConfig::default())
    }
}

// ── Tests ──────────────────────────────────────────────────
