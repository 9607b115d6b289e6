//! One-dimensional drag mapping from hand height to a channel value.
//!
//! On pinch entry the control span is laid out around the current hand
//! position so that the entry point maps back to the channel's current
//! value. Moving toward `top` raises the value to 1.0, toward `bottom`
//! lowers it to 0.0.

use crate::geometry::Vec2;

/// Calibrated drag span in wrist UV coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DragCalibration {
    /// Position at calibration time.
    pub entry: Vec2,
    /// Y coordinate mapping to 1.0.
    pub top: f32,
    /// Y coordinate mapping to 0.0.
    pub bottom: f32,
}

impl DragCalibration {
    /// Lay out a span of `length` so that `entry.y` reads back `current`.
    pub fn calibrate(entry: Vec2, length: f32, current: f32) -> Self {
        Self {
            entry,
            top: entry.y - (1.0 - current) * length,
            bottom: entry.y + current * length,
        }
    }

    /// Channel value for hand height `y`, in 0.0-1.0.
    ///
    /// A zero-length span reads 0.5.
    pub fn value_at(&self, y: f32) -> f32 {
        let span = (self.top - self.bottom).abs();
        if span <= f32::EPSILON || !span.is_finite() {
            return 0.5;
        }
        let lo = self.top.min(self.bottom);
        let hi = self.top.max(self.bottom);
        let clamped = y.max(lo).min(hi);
        (clamped - self.bottom).abs() / span
    }

    pub fn to_sexp(&self) -> String {
        format!(
            "(:entry-x {:.4} :entry-y {:.4} :top {:.4} :bottom {:.4})",
            self.entry.x, self.entry.y, self.top, self.bottom
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_entry_reads_back_current_value() {
        for current in [0.0, 0.25, 0.5, 0.9, 1.0] {
            let drag = DragCalibration::calibrate(Vec2::new(0.3, 0.4), 0.2, current);
            assert!((drag.value_at(0.4) - current).abs() < EPS, "current {}", current);
        }
    }

    #[test]
    fn test_boundaries() {
        let drag = DragCalibration::calibrate(Vec2::new(0.0, 0.5), 0.2, 0.5);
        assert!((drag.top - 0.4).abs() < EPS);
        assert!((drag.bottom - 0.6).abs() < EPS);
        assert!((drag.value_at(drag.top) - 1.0).abs() < EPS);
        assert!(drag.value_at(drag.bottom).abs() < EPS);
    }

    #[test]
    fn test_clamped_outside_span() {
        let drag = DragCalibration::calibrate(Vec2::new(0.0, 0.5), 0.2, 0.5);
        assert!((drag.value_at(-10.0) - 1.0).abs() < EPS);
        assert!(drag.value_at(10.0).abs() < EPS);
    }

    #[test]
    fn test_zero_span_reads_midpoint() {
        let drag = DragCalibration::calibrate(Vec2::new(0.0, 0.5), 0.0, 0.8);
        assert_eq!(drag.value_at(0.1), 0.5);
        assert_eq!(DragCalibration::default().value_at(0.3), 0.5);
    }

    #[test]
    fn test_non_finite_height_does_not_panic() {
        let drag = DragCalibration::calibrate(Vec2::new(0.0, 0.5), 0.2, 0.5);
        let _ = drag.value_at(f32::NAN);
    }
}
