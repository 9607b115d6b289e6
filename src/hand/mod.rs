//! Hand pose pipeline: joint angles, finger states, hand state, debouncing.

pub mod angles;
pub mod classifier;
pub mod debounce;
pub mod finger;
pub mod joints;

#[cfg(test)]
pub(crate) mod test_poses;

pub use classifier::{classify_hand, HandPose, HandState, ProximityConfig};
pub use debounce::{DebounceConfig, TemporalDebouncer};
pub use finger::{FingerState, FingerStates};
pub use joints::{
    Finger, FingerJointMap, HandFrame, HandSize, HandTrackingConfig, HandTrackingState,
    Handedness, Joint, JOINT_COUNT,
};

use crate::geometry::Vec3;

/// Result of classifying one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub fingers: FingerStates,
    pub hand: HandState,
}

/// Run the per-frame classification: angles, then fingers, then hand state.
pub fn classify_joints(
    joints: &[Vec3; JOINT_COUNT],
    map: &FingerJointMap,
    proximity: &ProximityConfig,
) -> Classification {
    let angles = angles::joint_angles(joints);
    let fingers = FingerStates::from_angles(&angles, map);
    let hand = classify_hand(&HandPose {
        fingers,
        joints,
        map,
        proximity,
    });
    Classification { fingers, hand }
}
