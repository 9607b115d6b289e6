//! Finger state classification from joint angles.

use crate::hand::joints::{Finger, FingerJointMap, JOINT_COUNT};

/// Discrete pose of a single finger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FingerState {
    #[default]
    None,
    Pointing,
    Open,
    HalfClosed,
    Clenched,
}

impl FingerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pointing => "pointing",
            Self::Open => "open",
            Self::HalfClosed => "half-closed",
            Self::Clenched => "clenched",
        }
    }
}

/// Lower bounds (exclusive) on the proximal, middle, and distal angles.
const POINTING_MIN: [f32; 3] = [120.0, 148.0, 148.0];
const OPEN_MIN: [f32; 3] = [90.0, 120.0, 120.0];
const HALF_CLOSED_MIN: [f32; 3] = [90.0, 95.0, 90.0];
/// Upper bounds (exclusive) on the middle and distal angles.
const CLENCHED_MAX: [f32; 2] = [98.0, 165.0];

fn all_exceed(angles: [f32; 3], min: [f32; 3]) -> bool {
    angles.iter().zip(min.iter()).all(|(a, m)| a > m)
}

/// Classify one finger from its (proximal, middle, distal) angles.
///
/// Checks run Pointing, Open, HalfClosed, Clenched; first match wins.
pub fn classify_finger(angles: [f32; 3]) -> FingerState {
    if all_exceed(angles, POINTING_MIN) {
        return FingerState::Pointing;
    }
    if all_exceed(angles, OPEN_MIN) {
        return FingerState::Open;
    }
    if all_exceed(angles, HALF_CLOSED_MIN) {
        return FingerState::HalfClosed;
    }
    if angles[1] < CLENCHED_MAX[0] && angles[2] < CLENCHED_MAX[1] {
        return FingerState::Clenched;
    }
    FingerState::None
}

/// States of all five fingers for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FingerStates {
    pub states: [FingerState; 5],
}

impl FingerStates {
    pub fn new(states: [FingerState; 5]) -> Self {
        Self { states }
    }

    /// Classify every finger from the full angle set.
    ///
    /// A finger whose mapped angle joints fall outside the angle set
    /// classifies as `None`.
    pub fn from_angles(angles: &[f32; JOINT_COUNT], map: &FingerJointMap) -> Self {
        let mut states = [FingerState::None; 5];
        for finger in Finger::ALL {
            let [p, m, d, _] = map.finger(finger);
            if p >= JOINT_COUNT || m >= JOINT_COUNT || d >= JOINT_COUNT {
                continue;
            }
            states[finger as usize] = classify_finger([angles[p], angles[m], angles[d]]);
        }
        Self { states }
    }

    pub fn get(&self, finger: Finger) -> FingerState {
        self.states[finger as usize]
    }

    pub fn is(&self, finger: Finger, state: FingerState) -> bool {
        self.get(finger) == state
    }

    pub fn to_sexp(&self) -> String {
        let mut s = String::from("(");
        for (i, finger) in Finger::ALL.iter().enumerate() {
            if i > 0 {
                s.push(' ');
            }
            s.push_str(&format!(":{} :{}", finger.as_str(), self.get(*finger).as_str()));
        }
        s.push(')');
        s
    }
}
