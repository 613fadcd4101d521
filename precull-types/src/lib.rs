//! Type definitions shared between the precull engine crate and its
//! consumers. Everything in here is plain data: no device handles, no
//! per-frame state.

use glam::{Mat4, Vec3, Vec3A, Vec4};
use serde::{Deserialize, Serialize};

/// Number of discrete LOD levels supported by the dispatcher.
///
/// Changing this requires symmetric resizing of every per-LOD buffer and
/// the matching kernel branch, so it lives here as the single source of
/// truth.
pub const MAX_LOD: usize = 2;

/// Number of half-space planes in a full frustum.
pub const FRUSTUM_PLANE_COUNT: usize = 6;

/// Number of planes tested by the transposed (SoA) layout. Near and far
/// are dropped from that layout by contract.
pub const SIDE_PLANE_COUNT: usize = 4;

/// Winding convention the projection matrices are built with.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    #[default]
    Left,
    Right,
}

/// Describes how the world should be projected into the camera.
#[derive(Debug, Copy, Clone)]
pub enum CameraProjection {
    Orthographic {
        /// Size assumes the location is at the center of the camera area.
        size: Vec3A,
    },
    Perspective {
        /// Vertical field of view in degrees.
        vfov: f32,
        /// Near plane distance.
        near: f32,
        /// Far plane distance. Finite, as the culler extracts a far plane.
        far: f32,
    },
    /// A combined view-projection supplied verbatim by the host.
    Raw(Mat4),
}

impl Default for CameraProjection {
    fn default() -> Self {
        Self::Perspective {
            vfov: 60.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Camera state consumed once per frame.
#[derive(Debug, Default, Copy, Clone)]
pub struct Camera {
    pub projection: CameraProjection,
    /// World -> view matrix.
    pub view: Mat4,
}

/// Which interpretation of an instance's bounds the cullers test against.
///
/// Chosen once at load for the whole store, mirroring how the bounds are
/// authored; the two forms are never mixed within a store.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundsKind {
    /// Center + radius, trivial distance test.
    Sphere,
    /// Center + half-extent, tested via the projected-radius technique.
    #[default]
    Aabb,
}

/// A single static render instance as supplied by the host at load time.
///
/// Immutable after load. The bounds are local-space; world-space bounds are
/// derived once when the store is built.
#[derive(Debug, Copy, Clone)]
pub struct Instance {
    /// Model -> world matrix.
    pub transform: Mat4,
    /// Inverse of `transform`. Computed on load when absent.
    pub inv_transform: Option<Mat4>,
    /// Local-space bounding sphere: xyz center, w radius.
    pub bounding_sphere: Vec4,
    /// Local-space half-extent of the bounding box.
    pub extent: Vec3,
}

impl Instance {
    /// An instance with the given transform and a unit sphere/box bound at
    /// the local origin.
    pub fn from_transform(transform: Mat4) -> Self {
        Self {
            transform,
            inv_transform: None,
            bounding_sphere: Vec4::new(0.0, 0.0, 0.0, 1.0),
            extent: Vec3::ONE,
        }
    }
}
