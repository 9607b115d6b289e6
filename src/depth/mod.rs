//! Depth lookup under the tracked wrist.

pub mod overlay;
pub mod projection;
pub mod sampler;

pub use overlay::{OverlayMask, OverlayPixel};
pub use projection::{wrist_to_pixel, wrist_uv, PixelCoord};
pub use sampler::{
    find_nearest, DepthConfig, DepthImage, DepthReading, DepthWindowSampler, MAX_SEARCH_RADIUS,
};
