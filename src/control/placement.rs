//! Placement ray capture and spawning.
//!
//! Two aiming rays are captured one at a time; when the pair is complete
//! it is handed to a `RaySpawner`, which decides where the new object goes.

use tracing::debug;

use crate::geometry::{Ray, Vec3};

/// Number of rays in a placement batch.
pub const PLACEMENT_RAYS: usize = 2;

/// Fixed-capacity buffer of captured rays.
#[derive(Debug, Default)]
pub struct PlacementBuffer {
    lines: Vec<Ray>,
}

impl PlacementBuffer {
    pub fn new() -> Self {
        Self {
            lines: Vec::with_capacity(PLACEMENT_RAYS),
        }
    }

    /// Capture one ray. Returns the full pair and clears when complete.
    pub fn push(&mut self, ray: Ray) -> Option<[Ray; PLACEMENT_RAYS]> {
        self.lines.push(ray);
        debug!(captured = self.lines.len(), "placement ray captured");
        if self.lines.len() < PLACEMENT_RAYS {
            return None;
        }
        let pair = [self.lines[0], self.lines[1]];
        self.lines.clear();
        Some(pair)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Receives a completed placement pair.
pub trait RaySpawner {
    /// Position for the new object, or `None` to reject the pair.
    fn spawn(&mut self, rays: &[Ray; PLACEMENT_RAYS]) -> Option<Vec3>;
}

/// Places the object midway between the closest points of the two rays.
#[derive(Debug, Default)]
pub struct ClosestApproachSpawner;

impl RaySpawner for ClosestApproachSpawner {
    fn spawn(&mut self, rays: &[Ray; PLACEMENT_RAYS]) -> Option<Vec3> {
        let [a, b] = rays;
        let w = a.origin - b.origin;
        let aa = a.direction.dot(a.direction);
        let bb = b.direction.dot(b.direction);
        let ab = a.direction.dot(b.direction);
        let aw = a.direction.dot(w);
        let bw = b.direction.dot(w);

        let denom = aa * bb - ab * ab;
        if aa <= f32::EPSILON || bb <= f32::EPSILON || denom.abs() <= 1e-6 * aa * bb {
            debug!("placement rays parallel or degenerate");
            return None;
        }

        let s = (ab * bw - bb * aw) / denom;
        let t = (aa * bw - ab * aw) / denom;
        if s < 0.0 || t < 0.0 {
            debug!(s, t, "placement rays diverge");
            return None;
        }

        let pa = a.at(s);
        let pb = b.at(t);
        Some((pa + pb) * 0.5)
    }
}
