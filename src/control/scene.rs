//! Ray-based target resolution against registered lights.

use crate::control::light::{LightId, LightRegistry};
use crate::geometry::{Ray, Vec3};

/// Resolves a pointing ray to the light it hits, if any.
pub trait TargetResolver {
    fn resolve(&self, ray: &Ray, lights: &LightRegistry) -> Option<LightId>;
}

/// Treats every light as a sphere of fixed radius around its position.
#[derive(Debug, Clone)]
pub struct LightScene {
    pub radius: f32,
}

impl Default for LightScene {
    fn default() -> Self {
        Self { radius: 0.15 }
    }
}

impl LightScene {
    pub fn new(radius: f32) -> Self {
        Self { radius }
    }

    /// Distance along the unit ray to the first sphere surface hit.
    fn hit_distance(&self, ray: &Ray, center: Vec3) -> Option<f32> {
        let dir = ray.direction.normalized()?;
        let oc = ray.origin - center;
        let b = oc.dot(dir);
        let c = oc.dot(oc) - self.radius * self.radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let sqrt = disc.sqrt();
        let near = -b - sqrt;
        let far = -b + sqrt;
        if near >= 0.0 {
            Some(near)
        } else if far >= 0.0 {
            // Origin inside the sphere
            Some(0.0)
        } else {
            None
        }
    }
}

impl TargetResolver for LightScene {
    fn resolve(&self, ray: &Ray, lights: &LightRegistry) -> Option<LightId> {
        lights
            .iter()
            .filter_map(|l| self.hit_distance(ray, l.position).map(|t| (l.id, t)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }
}
