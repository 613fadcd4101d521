//! Frustum planes, bounding volumes, and the tests between them.
//!
//! Plane extraction follows <https://www.gamedevs.org/uploads/fast-extraction-viewing-frustum-planes-from-world-view-projection-matrix.pdf>.

use glam::{Mat4, Vec3, Vec4};
use precull_types::{FRUSTUM_PLANE_COUNT, SIDE_PLANE_COUNT};
use thiserror::Error;

/// A plane normal shorter than this is a degenerate projection, not a
/// normalizable one.
const MIN_NORMAL_LENGTH: f32 = 1e-8;

/// Extraction failed because the supplied matrix does not describe a
/// usable projection.
#[derive(Error, Debug, Copy, Clone, PartialEq)]
pub enum PlaneExtractionError {
    #[error("view-projection produced a near-zero plane normal (length {normal_length})")]
    DegenerateProjection { normal_length: f32 },
}

/// Represents a point in space and a radius from that point.
#[derive(Debug, Default, Clone, Copy)]
#[repr(C, align(16))]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

unsafe impl bytemuck::Pod for BoundingSphere {}
unsafe impl bytemuck::Zeroable for BoundingSphere {}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Moves the sphere into the space described by `transform`, growing the
    /// radius by the largest axis scale.
    pub fn apply_transform(self, transform: Mat4) -> Self {
        let max_scale = transform
            .x_axis
            .truncate()
            .length_squared()
            .max(
                transform
                    .y_axis
                    .truncate()
                    .length_squared()
                    .max(transform.z_axis.truncate().length_squared()),
            )
            .sqrt();
        let center = transform * self.center.extend(1.0);

        Self {
            center: center.truncate(),
            radius: max_scale * self.radius,
        }
    }
}

/// Represents a plane as a vec4 (or vec3 + f32).
#[derive(Debug, Default, Copy, Clone)]
#[repr(C, align(16))]
pub struct ShaderPlane {
    pub abc: Vec3,
    pub d: f32,
}

unsafe impl bytemuck::Pod for ShaderPlane {}
unsafe impl bytemuck::Zeroable for ShaderPlane {}

impl ShaderPlane {
    pub fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self {
            abc: Vec3::new(a, b, c),
            d,
        }
    }

    /// Scales the plane so the normal has unit length. Distance tests are
    /// only meaningful on normalized planes.
    pub fn normalize(mut self) -> Result<Self, PlaneExtractionError> {
        let mag = self.abc.length();
        if mag < MIN_NORMAL_LENGTH {
            return Err(PlaneExtractionError::DegenerateProjection { normal_length: mag });
        }

        self.abc /= mag;
        self.d /= mag;

        Ok(self)
    }

    /// Signed distance from the plane to `point`. Positive is inside.
    pub fn distance(self, point: Vec3) -> f32 {
        self.abc.dot(point) + self.d
    }

    /// Radius of `extent` projected onto the plane normal. An AABB tested
    /// with this radius behaves exactly like a sphere of matching size, so
    /// the test has no false negatives.
    pub fn projected_radius(self, extent: Vec3) -> f32 {
        self.abc.abs().dot(extent)
    }
}

/// A frustum composed of the 6 canonical half-space planes, normals
/// pointing inward.
#[derive(Debug, Copy, Clone)]
#[repr(C, align(16))]
pub struct Frustum {
    pub left: ShaderPlane,
    pub right: ShaderPlane,
    pub bottom: ShaderPlane,
    pub top: ShaderPlane,
    pub near: ShaderPlane,
    pub far: ShaderPlane,
}

unsafe impl bytemuck::Pod for Frustum {}
unsafe impl bytemuck::Zeroable for Frustum {}

impl Frustum {
    /// Extracts all 6 planes from a combined view-projection matrix,
    /// `row3 ± row{0,1,2}`, each normalized.
    pub fn from_view_proj(matrix: Mat4) -> Result<Self, PlaneExtractionError> {
        let mat_arr = matrix.to_cols_array_2d();

        let left = ShaderPlane::new(
            mat_arr[0][3] + mat_arr[0][0],
            mat_arr[1][3] + mat_arr[1][0],
            mat_arr[2][3] + mat_arr[2][0],
            mat_arr[3][3] + mat_arr[3][0],
        );

        let right = ShaderPlane::new(
            mat_arr[0][3] - mat_arr[0][0],
            mat_arr[1][3] - mat_arr[1][0],
            mat_arr[2][3] - mat_arr[2][0],
            mat_arr[3][3] - mat_arr[3][0],
        );

        let bottom = ShaderPlane::new(
            mat_arr[0][3] + mat_arr[0][1],
            mat_arr[1][3] + mat_arr[1][1],
            mat_arr[2][3] + mat_arr[2][1],
            mat_arr[3][3] + mat_arr[3][1],
        );

        let top = ShaderPlane::new(
            mat_arr[0][3] - mat_arr[0][1],
            mat_arr[1][3] - mat_arr[1][1],
            mat_arr[2][3] - mat_arr[2][1],
            mat_arr[3][3] - mat_arr[3][1],
        );

        let near = ShaderPlane::new(
            mat_arr[0][3] + mat_arr[0][2],
            mat_arr[1][3] + mat_arr[1][2],
            mat_arr[2][3] + mat_arr[2][2],
            mat_arr[3][3] + mat_arr[3][2],
        );

        let far = ShaderPlane::new(
            mat_arr[0][3] - mat_arr[0][2],
            mat_arr[1][3] - mat_arr[1][2],
            mat_arr[2][3] - mat_arr[2][2],
            mat_arr[3][3] - mat_arr[3][2],
        );

        Ok(Self {
            left: left.normalize()?,
            right: right.normalize()?,
            bottom: bottom.normalize()?,
            top: top.normalize()?,
            near: near.normalize()?,
            far: far.normalize()?,
        })
    }

    pub fn planes(&self) -> [ShaderPlane; FRUSTUM_PLANE_COUNT] {
        [self.left, self.right, self.bottom, self.top, self.near, self.far]
    }

    /// The 4 side planes, in the order the SoA packet transposes them.
    pub fn side_planes(&self) -> [ShaderPlane; SIDE_PLANE_COUNT] {
        [self.left, self.right, self.bottom, self.top]
    }

    /// Determines if the sphere is at all inside the frustum.
    pub fn contains_sphere(&self, sphere: BoundingSphere) -> bool {
        let neg_radius = -sphere.radius;

        for plane in &self.planes() {
            if plane.distance(sphere.center) < neg_radius {
                return false;
            }
        }

        true
    }

    /// Determines if the box given by center and half-extent is at all
    /// inside the frustum, via the projected-radius technique.
    pub fn contains_aabb(&self, center: Vec3, extent: Vec3) -> bool {
        for plane in &self.planes() {
            if plane.distance(center) + plane.projected_radius(extent) < 0.0 {
                return false;
            }
        }

        true
    }
}

/// The 4 side planes transposed into SoA form: each vector holds one
/// coordinate across all 4 planes, enabling one 4-wide test per instance.
///
/// Near and far are excluded from this layout by contract: it is a
/// horizontal/vertical-only test trading two planes of precision for
/// bandwidth. Geometry is otherwise identical to [`Frustum::side_planes`],
/// guaranteed by constructing the packet from an already-extracted frustum.
#[derive(Debug, Copy, Clone)]
#[repr(C, align(16))]
pub struct PlanePacket4 {
    pub nx: Vec4,
    pub ny: Vec4,
    pub nz: Vec4,
    pub d: Vec4,
}

unsafe impl bytemuck::Pod for PlanePacket4 {}
unsafe impl bytemuck::Zeroable for PlanePacket4 {}

impl PlanePacket4 {
    pub fn new(frustum: &Frustum) -> Self {
        let [p0, p1, p2, p3] = frustum.side_planes();

        Self {
            nx: Vec4::new(p0.abc.x, p1.abc.x, p2.abc.x, p3.abc.x),
            ny: Vec4::new(p0.abc.y, p1.abc.y, p2.abc.y, p3.abc.y),
            nz: Vec4::new(p0.abc.z, p1.abc.z, p2.abc.z, p3.abc.z),
            d: Vec4::new(p0.d, p1.d, p2.d, p3.d),
        }
    }

    /// Extraction convenience; equivalent to building the full frustum and
    /// transposing its side planes.
    pub fn from_view_proj(matrix: Mat4) -> Result<Self, PlaneExtractionError> {
        Ok(Self::new(&Frustum::from_view_proj(matrix)?))
    }

    fn distances(&self, center: Vec3) -> Vec4 {
        self.nx * Vec4::splat(center.x) + self.ny * Vec4::splat(center.y) + self.nz * Vec4::splat(center.z) + self.d
    }

    /// 4-wide sphere test, OR-reducing the per-lane rejection mask. No
    /// early exit.
    pub fn contains_sphere(&self, sphere: BoundingSphere) -> bool {
        let culled = (self.distances(sphere.center) + Vec4::splat(sphere.radius)).cmplt(Vec4::ZERO);
        !culled.any()
    }

    /// 4-wide box test with per-lane projected radii.
    pub fn contains_aabb(&self, center: Vec3, extent: Vec3) -> bool {
        let radii = self.nx.abs() * Vec4::splat(extent.x)
            + self.ny.abs() * Vec4::splat(extent.y)
            + self.nz.abs() * Vec4::splat(extent.z);
        let culled = (self.distances(center) + radii).cmplt(Vec4::ZERO);
        !culled.any()
    }
}
