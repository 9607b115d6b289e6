//! Synthetic joint layouts for tests.
//!
//! Fingers lie in the XY plane rising from the wrist at the origin.
//! An extended finger is collinear (180 degree joints); a curled finger
//! folds 90 degrees toward -Z at its middle and distal joints.

use crate::geometry::Vec3;
use crate::hand::joints::JOINT_COUNT;

const FINGER_X: [f32; 4] = [-0.15, 0.0, 0.15, 0.3];

fn thumb(extended: bool) -> [Vec3; 4] {
    if extended {
        [
            Vec3::new(-0.3, 0.3, 0.0),
            Vec3::new(-0.5, 0.5, 0.0),
            Vec3::new(-0.65, 0.65, 0.0),
            Vec3::new(-0.8, 0.8, 0.0),
        ]
    } else {
        [
            Vec3::new(-0.3, 0.3, 0.0),
            Vec3::new(-0.5, 0.5, 0.0),
            Vec3::new(-0.5, 0.5, -0.3),
            Vec3::new(-0.3, 0.3, -0.3),
        ]
    }
}

fn finger(x: f32, extended: bool) -> [Vec3; 4] {
    if extended {
        [
            Vec3::new(x, 1.0, 0.0),
            Vec3::new(x, 1.4, 0.0),
            Vec3::new(x, 1.7, 0.0),
            Vec3::new(x, 1.9, 0.0),
        ]
    } else {
        [
            Vec3::new(x, 1.0, 0.0),
            Vec3::new(x, 1.4, 0.0),
            Vec3::new(x, 1.4, -0.3),
            Vec3::new(x, 1.2, -0.3),
        ]
    }
}

/// Build a hand where each finger (thumb..pinky) is extended or curled.
pub fn pose(extended: [bool; 5]) -> [Vec3; JOINT_COUNT] {
    let mut joints = [Vec3::ZERO; JOINT_COUNT];
    joints[1..5].copy_from_slice(&thumb(extended[0]));
    for (i, x) in FINGER_X.iter().enumerate() {
        let start = 5 + i * 4;
        joints[start..start + 4].copy_from_slice(&finger(*x, extended[i + 1]));
    }
    joints
}

/// All five fingers extended.
pub fn open_hand() -> [Vec3; JOINT_COUNT] {
    pose([true; 5])
}

/// All five fingers curled.
pub fn fist() -> [Vec3; JOINT_COUNT] {
    pose([false; 5])
}

/// Index extended, everything else curled.
pub fn pointing() -> [Vec3; JOINT_COUNT] {
    pose([false, true, false, false, false])
}

/// Index and middle extended, thumb curled.
pub fn double_pointing() -> [Vec3; JOINT_COUNT] {
    pose([false, true, true, false, false])
}

/// Thumb, index and middle extended.
pub fn gun_pointing() -> [Vec3; JOINT_COUNT] {
    pose([true, true, true, false, false])
}

/// Thumb and pinky extended.
pub fn wide_hand() -> [Vec3; JOINT_COUNT] {
    pose([true, false, false, false, true])
}

/// Fist with the index tip resting on the thumb tip.
pub fn pinch() -> [Vec3; JOINT_COUNT] {
    let mut joints = fist();
    joints[8] = joints[4] + Vec3::new(0.01, 0.0, 0.0);
    joints
}
