//! The two culling pipelines and the pieces they share.

use glam::Vec3;

use crate::managers::WorldBounds;

pub mod cpu;
pub mod gpu;
pub mod visibility;

/// Threads per workgroup of the culling kernel. The dispatch rounds the
/// instance count up to a multiple of this.
pub const WORKGROUP_SIZE: u32 = 64;

/// Importance metric of a visible instance: the ratio of its bounding
/// radius to its projected distance, clamped to [0, 1]. Larger is more
/// important. This is the CPU mirror of the kernel's metric; the two must
/// branch identically.
pub fn lod_metric(bounds: &WorldBounds, camera_position: Vec3, tan_half_vfov: f32) -> f32 {
    // Boxes authored with a zero-radius sphere still get a usable size.
    let radius = bounds.sphere.radius.max(bounds.extent.length());
    let distance = (bounds.sphere.center - camera_position).length();
    (radius / (distance * tan_half_vfov).max(1e-6)).clamp(0.0, 1.0)
}

/// Chooses the LOD bucket for a metric. Strictly above the threshold is
/// bucket 0; ties resolve to bucket 1, never both.
pub fn lod_bucket(metric: f32, threshold: f32) -> usize {
    usize::from(metric <= threshold)
}
