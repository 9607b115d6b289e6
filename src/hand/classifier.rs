//! Hand state classification from finger states and fingertip proximity.
//!
//! Predicates are evaluated in a fixed order and every match overwrites
//! the previous result, so the last matching predicate wins. Inputs that
//! satisfy several predicates resolve by this order, not by specificity.

use crate::geometry::Vec3;
use crate::hand::finger::{FingerState, FingerStates};
use crate::hand::joints::{Finger, FingerJointMap, JOINT_COUNT};

/// Discrete whole-hand gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandState {
    #[default]
    None,
    Palming,
    Pointing,
    DoublePointing,
    GunPointing,
    Pinching,
    Grabbing,
    WideHandling,
    Fisting,
}

impl HandState {
    /// String representation for IPC.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Palming => "palming",
            Self::Pointing => "pointing",
            Self::DoublePointing => "double-pointing",
            Self::GunPointing => "gun-pointing",
            Self::Pinching => "pinching",
            Self::Grabbing => "grabbing",
            Self::WideHandling => "wide-handling",
            Self::Fisting => "fisting",
        }
    }
}

// ── Config ─────────────────────────────────────────────────

/// Allowance factors for the fingertip touching test.
///
/// Two tips touch when their distance is at most the first finger's
/// distal segment length times the factor. The values are calibration
/// data for a particular sensor and hand size.
#[derive(Debug, Clone)]
pub struct ProximityConfig {
    /// Factor used when no specific one applies.
    pub default_factor: f32,
    /// Thumb-index factor for pinching.
    pub pinch_factor: f32,
    /// Thumb-index and thumb-middle factor for grabbing.
    pub grab_factor: f32,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            default_factor: 1.25,
            pinch_factor: 1.15,
            grab_factor: 1.35,
        }
    }
}

// ── Classification ─────────────────────────────────────────

/// Everything a predicate may look at for one frame.
pub struct HandPose<'a> {
    pub fingers: FingerStates,
    pub joints: &'a [Vec3; JOINT_COUNT],
    pub map: &'a FingerJointMap,
    pub proximity: &'a ProximityConfig,
}

impl HandPose<'_> {
    fn pointing(&self, finger: Finger) -> bool {
        self.fingers.is(finger, FingerState::Pointing)
    }

    fn clenched(&self, finger: Finger) -> bool {
        self.fingers.is(finger, FingerState::Clenched)
    }

    /// Whether the tips of `a` and `b` touch, scaled by `a`'s distal segment.
    pub fn tips_touching(&self, a: Finger, b: Finger, factor: f32) -> bool {
        let (Some((a_distal, a_tip)), Some((_, b_tip))) =
            (self.map.distal_and_tip(a), self.map.distal_and_tip(b))
        else {
            return false;
        };
        let tips = self.joints[a_tip].distance(self.joints[b_tip]);
        let segment = self.joints[a_tip].distance(self.joints[a_distal]);
        tips <= segment * factor
    }
}

type Predicate = fn(&HandPose) -> bool;

fn is_palming(p: &HandPose) -> bool {
    // Index is checked twice and ring not at all; kept as observed.
    p.pointing(Finger::Thumb)
        && p.pointing(Finger::Index)
        && p.pointing(Finger::Middle)
        && p.pointing(Finger::Index)
        && p.pointing(Finger::Pinky)
}

fn is_pointing(p: &HandPose) -> bool {
    p.pointing(Finger::Index)
        && !p.pointing(Finger::Middle)
        && !p.pointing(Finger::Ring)
        && !p.pointing(Finger::Pinky)
}

fn is_double_pointing(p: &HandPose) -> bool {
    !p.pointing(Finger::Thumb)
        && p.pointing(Finger::Index)
        && p.pointing(Finger::Middle)
        && !p.pointing(Finger::Ring)
        && !p.pointing(Finger::Pinky)
}

fn is_gun_pointing(p: &HandPose) -> bool {
    p.pointing(Finger::Thumb)
        && p.pointing(Finger::Index)
        && p.pointing(Finger::Middle)
        && !p.pointing(Finger::Ring)
        && !p.pointing(Finger::Pinky)
}

fn is_wide_handling(p: &HandPose) -> bool {
    p.pointing(Finger::Thumb)
        && !p.pointing(Finger::Index)
        && !p.pointing(Finger::Middle)
        && !p.pointing(Finger::Ring)
        && p.pointing(Finger::Pinky)
        && !p.tips_touching(Finger::Thumb, Finger::Index, p.proximity.default_factor)
}

fn is_fisting(p: &HandPose) -> bool {
    p.clenched(Finger::Index)
        && p.clenched(Finger::Middle)
        && p.clenched(Finger::Ring)
        && matches!(
            p.fingers.get(Finger::Pinky),
            FingerState::Clenched | FingerState::HalfClosed
        )
}

fn is_pinching(p: &HandPose) -> bool {
    p.tips_touching(Finger::Thumb, Finger::Index, p.proximity.pinch_factor)
        && !p.tips_touching(Finger::Thumb, Finger::Middle, p.proximity.default_factor)
}

fn is_grabbing(p: &HandPose) -> bool {
    let factor = p.proximity.grab_factor;
    p.tips_touching(Finger::Thumb, Finger::Index, factor)
        && p.tips_touching(Finger::Thumb, Finger::Middle, factor)
        && p.pointing(Finger::Thumb)
}

/// Predicates in evaluation order; a later match overrides an earlier one.
const CHAIN: [(Predicate, HandState); 8] = [
    (is_palming, HandState::Palming),
    (is_pointing, HandState::Pointing),
    (is_double_pointing, HandState::DoublePointing),
    (is_gun_pointing, HandState::GunPointing),
    (is_wide_handling, HandState::WideHandling),
    (is_fisting, HandState::Fisting),
    (is_pinching, HandState::Pinching),
    (is_grabbing, HandState::Grabbing),
];

/// Classify the instantaneous hand state for one frame.
pub fn classify_hand(pose: &HandPose) -> HandState {
    let mut state = HandState::None;
    for (predicate, label) in CHAIN {
        if predicate(pose) {
            state = label;
        }
    }
    state
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::angles::joint_angles;
    use crate::hand::test_poses;

    use FingerState::{Clenched as C, HalfClosed as H, None as N, Open as O, Pointing as P};

    /// Classify with explicit finger states over joints whose tips are apart.
    fn classify_states(states: [FingerState; 5]) -> HandState {
        classify_states_at(states, &test_poses::open_hand())
    }

    fn classify_states_at(states: [FingerState; 5], joints: &[Vec3; JOINT_COUNT]) -> HandState {
        let map = FingerJointMap::default();
        let proximity = ProximityConfig::default();
        classify_hand(&HandPose {
            fingers: FingerStates::new(states),
            joints,
            map: &map,
            proximity: &proximity,
        })
    }

    /// Classify straight from joint positions.
    fn classify_joints(joints: &[Vec3; JOINT_COUNT]) -> HandState {
        let map = FingerJointMap::default();
        let fingers = FingerStates::from_angles(&joint_angles(joints), &map);
        classify_states_at(fingers.states, joints)
    }

    #[test]
    fn test_none() {
        assert_eq!(classify_states([N, N, N, N, N]), HandState::None);
        assert_eq!(classify_states([O, O, O, O, O]), HandState::None);
    }

    #[test]
    fn test_palming_ignores_ring() {
        assert_eq!(classify_states([P, P, P, C, P]), HandState::Palming);
        assert_eq!(classify_states([P, P, P, P, P]), HandState::Palming);
    }

    #[test]
    fn test_pointing_ignores_thumb() {
        assert_eq!(classify_states([N, P, N, N, N]), HandState::Pointing);
        assert_eq!(classify_states([P, P, O, H, N]), HandState::Pointing);
    }

    #[test]
    fn test_double_and_gun_pointing() {
        assert_eq!(classify_states([N, P, P, N, N]), HandState::DoublePointing);
        assert_eq!(classify_states([P, P, P, N, N]), HandState::GunPointing);
    }

    #[test]
    fn test_wide_handling() {
        assert_eq!(classify_states([P, N, N, N, P]), HandState::WideHandling);
    }

    #[test]
    fn test_fisting() {
        assert_eq!(classify_states([N, C, C, C, C]), HandState::Fisting);
        assert_eq!(classify_states([P, C, C, C, H]), HandState::Fisting);
        assert_eq!(classify_states([N, C, C, C, O]), HandState::None);
    }

    #[test]
    fn test_wide_handling_accepts_open_middle_fingers() {
        assert_eq!(classify_states([P, O, O, O, P]), HandState::WideHandling);
    }

    #[test]
    fn test_fisting_ignores_thumb() {
        assert_eq!(classify_states([P, C, C, C, C]), HandState::Fisting);
    }

    #[test]
    fn test_pinching_overrides_fisting() {
        let joints = test_poses::pinch();
        assert_eq!(classify_states_at([N, C, C, C, C], &joints), HandState::Pinching);
    }

    #[test]
    fn test_pinching_overrides_pointing() {
        let joints = test_poses::pinch();
        assert_eq!(classify_states_at([N, P, N, N, N], &joints), HandState::Pinching);
    }

    #[test]
    fn test_grabbing_overrides_pinching_only_with_thumb_pointing() {
        let mut joints = test_poses::pinch();
        // Bring the middle tip onto the thumb tip as well
        joints[12] = joints[4] + Vec3::new(0.0, 0.01, 0.0);
        assert_eq!(classify_states_at([P, C, C, C, C], &joints), HandState::Grabbing);
        // Without thumb pointing, grabbing fails and pinching also fails
        // (thumb-middle touching), so Fisting remains.
        assert_eq!(classify_states_at([N, C, C, C, C], &joints), HandState::Fisting);
    }

    #[test]
    fn test_gun_pointing_overrides_double_pointing_chain() {
        // Gun pointing with the index tip on the thumb tip becomes pinching.
        let mut joints = test_poses::gun_pointing();
        joints[8] = joints[4];
        assert_eq!(classify_states_at([P, P, P, N, N], &joints), HandState::Pinching);
    }

    #[test]
    fn test_wide_handling_blocked_by_touching_tips() {
        let mut joints = test_poses::wide_hand();
        joints[8] = joints[4];
        // Thumb-index touching blocks WideHandling; Pinching then matches
        assert_eq!(classify_states_at([P, N, N, N, P], &joints), HandState::Pinching);
    }

    #[test]
    fn test_tips_touching_uses_first_finger_segment() {
        let joints = test_poses::pinch();
        let map = FingerJointMap::default();
        let proximity = ProximityConfig::default();
        let pose = HandPose {
            fingers: FingerStates::default(),
            joints: &joints,
            map: &map,
            proximity: &proximity,
        };
        assert!(pose.tips_touching(Finger::Thumb, Finger::Index, 1.15));
        assert!(!pose.tips_touching(Finger::Thumb, Finger::Middle, 1.25));
        // Zero allowance only admits exactly coincident tips
        assert!(!pose.tips_touching(Finger::Thumb, Finger::Index, 0.0));
    }

    #[test]
    fn test_pinch_factor_is_configurable() {
        let joints = test_poses::pinch();
        let map = FingerJointMap::default();
        let proximity = ProximityConfig {
            pinch_factor: 0.0,
            ..ProximityConfig::default()
        };
        let state = classify_hand(&HandPose {
            fingers: FingerStates::new([N, C, C, C, C]),
            joints: &joints,
            map: &map,
            proximity: &proximity,
        });
        assert_eq!(state, HandState::Fisting);
    }

    #[test]
    fn test_classify_from_joint_poses() {
        assert_eq!(classify_joints(&test_poses::open_hand()), HandState::Palming);
        assert_eq!(classify_joints(&test_poses::fist()), HandState::Fisting);
        assert_eq!(classify_joints(&test_poses::pointing()), HandState::Pointing);
        assert_eq!(classify_joints(&test_poses::double_pointing()), HandState::DoublePointing);
        assert_eq!(classify_joints(&test_poses::gun_pointing()), HandState::GunPointing);
        assert_eq!(classify_joints(&test_poses::wide_hand()), HandState::WideHandling);
        assert_eq!(classify_joints(&test_poses::pinch()), HandState::Pinching);
    }

    #[test]
    fn test_as_str() {
        assert_eq!(HandState::DoublePointing.as_str(), "double-pointing");
        assert_eq!(HandState::WideHandling.as_str(), "wide-handling");
        assert_eq!(HandState::None.as_str(), "none");
    }
}
