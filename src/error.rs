//! Error types for frame ingestion.

use thiserror::Error;

/// Errors raised while turning raw tracker or depth input into frames.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    /// Joint list does not contain exactly one entry per joint.
    #[error("expected {expected} joints, got {actual}")]
    JointCount {
        /// Expected joint count.
        expected: usize,
        /// Actual joint count.
        actual: usize,
    },

    /// A coordinate was NaN or infinite.
    #[error("non-finite coordinate at joint {0}")]
    NonFinite(usize),

    /// Depth sample buffer does not match the declared dimensions.
    #[error("depth buffer size mismatch: expected {expected}, got {actual}")]
    DepthBufferSize {
        /// Expected sample count (width * height).
        expected: usize,
        /// Actual sample count.
        actual: usize,
    },

    /// A required message field is missing or malformed.
    #[error("missing or invalid field: {0}")]
    Field(&'static str),
}

impl FrameError {
    /// Creates a joint count error.
    #[must_use]
    pub const fn joint_count(expected: usize, actual: usize) -> Self {
        Self::JointCount { expected, actual }
    }

    /// Creates a depth buffer size error.
    #[must_use]
    pub const fn depth_buffer(expected: usize, actual: usize) -> Self {
        Self::DepthBufferSize { expected, actual }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_count_display() {
        let msg = format!("{}", FrameError::joint_count(21, 10));
        assert!(msg.contains("21"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn test_depth_buffer_display() {
        let msg = format!("{}", FrameError::depth_buffer(100, 50));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn test_field_display() {
        let msg = format!("{}", FrameError::Field("joints"));
        assert_eq!(msg, "missing or invalid field: joints");
    }
}
