//! Per-joint flexion angles from joint positions.
//!
//! Each angle is the interior angle at a joint of the triangle formed
//! with its previous and next joints (law of cosines). A straight finger
//! reads 180 degrees; a fully folded joint approaches 0.

use crate::geometry::Vec3;
use crate::hand::joints::JOINT_COUNT;

/// Joints whose angle is defined as zero: the wrist and the fingertips.
pub const ZERO_ANGLE_JOINTS: [usize; 6] = [0, 4, 8, 12, 16, 20];

/// First joint of each finger; its previous joint is the wrist.
pub const FIRST_FINGER_JOINTS: [usize; 5] = [1, 5, 9, 13, 17];

/// Compute all 21 joint angles in degrees.
pub fn joint_angles(joints: &[Vec3; JOINT_COUNT]) -> [f32; JOINT_COUNT] {
    let mut angles = [0.0; JOINT_COUNT];
    for (i, angle) in angles.iter_mut().enumerate() {
        *angle = joint_angle(joints, i);
    }
    angles
}

/// Angle at joint `i` in degrees, in [0, 180].
///
/// Coincident neighbours (a zero-length side) yield 0 rather than NaN.
pub fn joint_angle(joints: &[Vec3; JOINT_COUNT], i: usize) -> f32 {
    if i >= JOINT_COUNT || ZERO_ANGLE_JOINTS.contains(&i) {
        return 0.0;
    }

    let prev = if FIRST_FINGER_JOINTS.contains(&i) { 0 } else { i - 1 };
    let next = i + 1;

    let joint = joints[i];
    let a = joints[next].distance(joint);
    let b = joints[prev].distance(joint);
    let c = joints[next].distance(joints[prev]);

    if a <= f32::EPSILON || b <= f32::EPSILON {
        return 0.0;
    }

    let cos = ((a * a + b * b - c * c) / (2.0 * a * b)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}
