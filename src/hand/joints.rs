//! Hand joint layout, per-frame tracker input, and tracking state.
//!
//! Models the 21-landmark hand: wrist at index 0, then four joints per
//! finger in thumb/index/middle/ring/pinky order. Provides joint
//! distance queries, hand size, and the index-finger pointing ray.

use tracing::debug;

use crate::error::FrameError;
use crate::geometry::{Ray, Vec3};

// ── Joint definitions ──────────────────────────────────────

/// The 21 tracked hand landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Joint {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of joints per hand.
pub const JOINT_COUNT: usize = 21;

impl Joint {
    /// Convert joint enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// String representation for IPC.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbCmc => "thumb-cmc",
            Self::ThumbMcp => "thumb-mcp",
            Self::ThumbIp => "thumb-ip",
            Self::ThumbTip => "thumb-tip",
            Self::IndexMcp => "index-mcp",
            Self::IndexPip => "index-pip",
            Self::IndexDip => "index-dip",
            Self::IndexTip => "index-tip",
            Self::MiddleMcp => "middle-mcp",
            Self::MiddlePip => "middle-pip",
            Self::MiddleDip => "middle-dip",
            Self::MiddleTip => "middle-tip",
            Self::RingMcp => "ring-mcp",
            Self::RingPip => "ring-pip",
            Self::RingDip => "ring-dip",
            Self::RingTip => "ring-tip",
            Self::PinkyMcp => "pinky-mcp",
            Self::PinkyPip => "pinky-pip",
            Self::PinkyDip => "pinky-dip",
            Self::PinkyTip => "pinky-tip",
        }
    }
}

// ── Fingers ────────────────────────────────────────────────

/// The five fingers, in landmark order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumb => "thumb",
            Self::Index => "index",
            Self::Middle => "middle",
            Self::Ring => "ring",
            Self::Pinky => "pinky",
        }
    }
}

/// Landmark indices for each finger: `[proximal, middle, distal, tip]`.
///
/// The first three carry the flexion angles used for finger
/// classification; the last two are used for fingertip proximity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerJointMap {
    pub joints: [[usize; 4]; 5],
}

impl Default for FingerJointMap {
    fn default() -> Self {
        Self {
            joints: [
                [1, 2, 3, 4],
                [5, 6, 7, 8],
                [9, 10, 11, 12],
                [13, 14, 15, 16],
                [17, 18, 19, 20],
            ],
        }
    }
}

impl FingerJointMap {
    /// Joint indices for one finger.
    pub fn finger(&self, finger: Finger) -> [usize; 4] {
        self.joints[finger as usize]
    }

    /// Distal joint and tip indices for a finger, if both are in range.
    pub fn distal_and_tip(&self, finger: Finger) -> Option<(usize, usize)> {
        let [_, _, distal, tip] = self.finger(finger);
        (distal < JOINT_COUNT && tip < JOINT_COUNT).then_some((distal, tip))
    }
}

// ── Hand enum ──────────────────────────────────────────────

/// Which hand the tracker reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }
}

// ── Frame ──────────────────────────────────────────────────

/// One tick of tracker output.
#[derive(Debug, Clone)]
pub struct HandFrame {
    /// Joint positions indexed by `Joint`.
    pub joints: [Vec3; JOINT_COUNT],
    /// Normalized wrist location reported by the palm detector.
    pub wrist: Vec3,
    /// Tracking confidence (0.0-1.0).
    pub confidence: f32,
    pub handedness: Handedness,
    /// Wall-clock timestamp in milliseconds.
    pub timestamp_ms: f64,
}

impl HandFrame {
    /// Build a frame from a flat joint list, validating count and values.
    pub fn from_positions(
        positions: &[Vec3],
        wrist: Option<Vec3>,
        confidence: f32,
        handedness: Handedness,
        timestamp_ms: f64,
    ) -> Result<Self, FrameError> {
        if positions.len() != JOINT_COUNT {
            return Err(FrameError::joint_count(JOINT_COUNT, positions.len()));
        }
        if let Some(i) = positions.iter().position(|p| !p.is_finite()) {
            return Err(FrameError::NonFinite(i));
        }
        let mut joints = [Vec3::ZERO; JOINT_COUNT];
        joints.copy_from_slice(positions);
        Ok(Self {
            wrist: wrist.unwrap_or(joints[Joint::Wrist.index()]),
            joints,
            confidence,
            handedness,
            timestamp_ms,
        })
    }
}

/// Hand width and control height, derived from the MCP knuckles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HandSize {
    /// Index MCP to pinky MCP distance.
    pub width: f32,
    /// Twice the knuckle width; drives the drag control length.
    pub height: f32,
}

/// Hand size from the knuckle span.
pub fn hand_size(joints: &[Vec3; JOINT_COUNT]) -> HandSize {
    let width = joints[Joint::PinkyMcp.index()].distance(joints[Joint::IndexMcp.index()]);
    HandSize {
        width,
        height: width * 2.0,
    }
}

/// Ray from the index fingertip along the index finger (MCP to tip).
pub fn pointing_ray(joints: &[Vec3; JOINT_COUNT]) -> Ray {
    let tip = joints[Joint::IndexTip.index()];
    let mcp = joints[Joint::IndexMcp.index()];
    Ray::new(tip, tip - mcp)
}

// ── Config ─────────────────────────────────────────────────

/// Configuration for tracker input gating.
#[derive(Debug, Clone)]
pub struct HandTrackingConfig {
    /// Enable gesture processing.
    pub enabled: bool,
    /// Minimum confidence (0.0-1.0) for a frame to be classified.
    pub min_confidence: f32,
}

impl Default for HandTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: 0.8,
        }
    }
}

// ── State ──────────────────────────────────────────────────

/// Latest accepted tracker frame and derived measurements.
pub struct HandTrackingState {
    pub config: HandTrackingConfig,
    /// Most recent frame, whether or not it passed the confidence gate.
    pub frame: Option<HandFrame>,
    /// Whether the most recent frame passed the confidence gate.
    pub tracking_active: bool,
    pub hand_size: HandSize,
}

impl HandTrackingState {
    pub fn new() -> Self {
        Self {
            config: HandTrackingConfig::default(),
            frame: None,
            tracking_active: false,
            hand_size: HandSize::default(),
        }
    }

    /// Store a new frame. Returns whether it is confident enough to classify.
    pub fn update(&mut self, frame: HandFrame) -> bool {
        if !self.config.enabled {
            return false;
        }

        self.tracking_active = frame.confidence >= self.config.min_confidence;
        if self.tracking_active {
            self.hand_size = hand_size(&frame.joints);
        } else {
            debug!(
                confidence = frame.confidence,
                min = self.config.min_confidence,
                "hand frame below confidence threshold"
            );
        }
        self.frame = Some(frame);
        self.tracking_active
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let (confidence, handedness, timestamp) = match &self.frame {
            Some(f) => (f.confidence, f.handedness.as_str(), f.timestamp_ms),
            None => (0.0, "nil", 0.0),
        };
        format!(
            "(:enabled {} :tracking {} :min-confidence {:.2} :confidence {:.2} :handedness {} :timestamp-ms {:.0} :hand-size (:width {:.4} :height {:.4}))",
            if self.config.enabled { "t" } else { "nil" },
            if self.tracking_active { "t" } else { "nil" },
            self.config.min_confidence,
            confidence,
            handedness,
            timestamp,
            self.hand_size.width,
            self.hand_size.height,
        )
    }
}

impl Default for HandTrackingState {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────
