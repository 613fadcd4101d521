use glam::{Mat3, Mat4, Vec3};
use precull_types::{BoundsKind, Instance};

use crate::{error::CullerInitializationError, util::frustum::BoundingSphere};

/// World-space bounds of a single instance. Computed once when the store is
/// built; never recomputed or mutated during culling.
#[derive(Debug, Default, Copy, Clone)]
pub struct WorldBounds {
    pub sphere: BoundingSphere,
    /// Half-extent of the world-space axis-aligned box.
    pub extent: Vec3,
}

impl WorldBounds {
    /// Derives world bounds from a local bound and the instance transform.
    pub fn from_instance(instance: &Instance) -> Self {
        let local_center = instance.bounding_sphere.truncate();
        let local_sphere = BoundingSphere::new(local_center, instance.bounding_sphere.w);

        let linear = Mat3::from_mat4(instance.transform);
        // abs() per column gives the tightest axis-aligned extent of the
        // rotated box.
        let abs_linear = Mat3::from_cols(linear.x_axis.abs(), linear.y_axis.abs(), linear.z_axis.abs());

        Self {
            sphere: local_sphere.apply_transform(instance.transform),
            extent: abs_linear * instance.extent,
        }
    }
}

/// One record of the immutable instance store.
#[derive(Debug, Copy, Clone)]
pub struct InternalInstance {
    /// Model -> world matrix.
    pub transform: Mat4,
    pub inv_transform: Mat4,
}

/// The per-instance bounds store. Built once at load from the externally
/// supplied list; exposes read-only indexed access that is safe for
/// concurrent reads by multiple workers.
pub struct InstanceManager {
    instances: Vec<InternalInstance>,
    bounds: Vec<WorldBounds>,
    kind: BoundsKind,
}

impl InstanceManager {
    pub fn new(source: &[Instance], kind: BoundsKind) -> Result<Self, CullerInitializationError> {
        if source.is_empty() {
            return Err(CullerInitializationError::ZeroInstances);
        }

        let instances = source
            .iter()
            .map(|instance| InternalInstance {
                transform: instance.transform,
                inv_transform: instance.inv_transform.unwrap_or_else(|| instance.transform.inverse()),
            })
            .collect();
        let bounds = source.iter().map(WorldBounds::from_instance).collect();

        log::info!("built instance store: {} instances, bounds {kind:?}", source.len());

        Ok(Self {
            instances,
            bounds,
            kind,
        })
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn bounds_kind(&self) -> BoundsKind {
        self.kind
    }

    pub fn bounds(&self) -> &[WorldBounds] {
        &self.bounds
    }

    pub fn instances(&self) -> &[InternalInstance] {
        &self.instances
    }
}

#[cfg(test)]
mod test {
    use glam::{Mat4, Quat, Vec3, Vec4};
    use precull_types::{BoundsKind, Instance};

    use super::{InstanceManager, WorldBounds};

    #[test]
    fn empty_store_is_rejected() {
        assert!(InstanceManager::new(&[], BoundsKind::Aabb).is_err());
    }

    #[test]
    fn sphere_translates_and_scales() {
        let instance = Instance {
            transform: Mat4::from_scale_rotation_translation(
                Vec3::splat(2.0),
                Quat::IDENTITY,
                Vec3::new(10.0, 0.0, 0.0),
            ),
            inv_transform: None,
            bounding_sphere: Vec4::new(0.0, 1.0, 0.0, 3.0),
            extent: Vec3::ONE,
        };

        let bounds = WorldBounds::from_instance(&instance);
        assert!(bounds.sphere.center.abs_diff_eq(Vec3::new(10.0, 2.0, 0.0), 1e-5));
        assert!((bounds.sphere.radius - 6.0).abs() < 1e-5);
    }

    #[test]
    fn rotated_box_extent_stays_conservative() {
        // A unit box rotated 45 degrees around Y needs sqrt(2) of slack in
        // X and Z.
        let instance = Instance {
            transform: Mat4::from_quat(Quat::from_rotation_y(45.0_f32.to_radians())),
            inv_transform: None,
            bounding_sphere: Vec4::new(0.0, 0.0, 0.0, 0.0),
            extent: Vec3::ONE,
        };

        let bounds = WorldBounds::from_instance(&instance);
        let expected = 2.0_f32.sqrt();
        assert!((bounds.extent.x - expected).abs() < 1e-5);
        assert!((bounds.extent.y - 1.0).abs() < 1e-5);
        assert!((bounds.extent.z - expected).abs() < 1e-5);
    }

    #[test]
    fn inverse_is_derived_when_absent() {
        let transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let manager = InstanceManager::new(
            &[Instance {
                transform,
                inv_transform: None,
                bounding_sphere: Vec4::new(0.0, 0.0, 0.0, 1.0),
                extent: Vec3::ONE,
            }],
            BoundsKind::Sphere,
        )
        .unwrap();

        let roundtrip = manager.instances()[0].transform * manager.instances()[0].inv_transform;
        assert!(roundtrip.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }
}
