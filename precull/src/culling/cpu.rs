//! The CPU parallel culler.
//!
//! Each instance is independent, so the store is split into disjoint index
//! ranges processed fork-join style by a rayon pool. `cull` does not return
//! until every batch has finished; the result slice is never partially
//! valid.

use precull_types::BoundsKind;
use rayon::prelude::*;

use crate::{
    error::CullerInitializationError,
    managers::{InstanceManager, WorldBounds},
    mode::CpuAlgorithm,
    options::CullingConfig,
    util::frustum::{Frustum, PlanePacket4},
};

pub struct CpuCuller {
    algorithm: CpuAlgorithm,
    batch_granularity: usize,
    /// Dedicated pool when the worker count is pinned by config; otherwise
    /// the global pool (sized to hardware concurrency) is used.
    pool: Option<rayon::ThreadPool>,
    visibility: Vec<bool>,
}

impl CpuCuller {
    pub fn new(config: &CullingConfig, instance_count: usize) -> Result<Self, CullerInitializationError> {
        config.validate()?;

        let pool = match config.worker_threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|index| format!("precull-worker-{index}"))
                    .build()?,
            ),
            None => None,
        };

        Ok(Self {
            algorithm: config.cpu_algorithm,
            batch_granularity: config.batch_granularity,
            pool,
            visibility: vec![true; instance_count],
        })
    }

    pub fn algorithm(&self) -> CpuAlgorithm {
        self.algorithm
    }

    /// Recomputes every visibility flag against the given frustum.
    ///
    /// This is the frame's hard barrier: the returned slice is only handed
    /// out once the join has completed, and it stays valid until the next
    /// `cull` call.
    pub fn cull(&mut self, frustum: &Frustum, instances: &InstanceManager) -> &[bool] {
        profiling::scope!("CPU Culling");

        debug_assert_eq!(self.visibility.len(), instances.len());

        let kind = instances.bounds_kind();
        let bounds = instances.bounds();
        let granularity = self.batch_granularity;
        let algorithm = self.algorithm;
        let visibility = &mut self.visibility;

        let mut job = move || match algorithm {
            CpuAlgorithm::Scalar => cull_scalar(visibility, bounds, frustum, kind, granularity),
            CpuAlgorithm::Soa => {
                let packet = PlanePacket4::new(frustum);
                cull_soa(visibility, bounds, &packet, kind, granularity)
            }
        };

        match &self.pool {
            Some(pool) => pool.install(job),
            None => job(),
        }

        &self.visibility
    }

    /// Flags from the most recent `cull` call.
    pub fn visibility(&self) -> &[bool] {
        &self.visibility
    }

    pub fn visible_count(&self) -> usize {
        self.visibility.iter().filter(|&&visible| visible).count()
    }
}

/// Per-plane loop over all 6 planes. The early exit on the first rejecting
/// plane is purely a throughput optimization; results are identical
/// without it.
fn cull_scalar(
    visibility: &mut [bool],
    bounds: &[WorldBounds],
    frustum: &Frustum,
    kind: BoundsKind,
    granularity: usize,
) {
    visibility
        .par_iter_mut()
        .zip(bounds.par_iter())
        .with_min_len(granularity)
        .for_each(|(flag, bound)| {
            *flag = match kind {
                BoundsKind::Sphere => frustum.contains_sphere(bound.sphere),
                BoundsKind::Aabb => frustum.contains_aabb(bound.sphere.center, bound.extent),
            };
        });
}

/// One 4-wide test against the transposed side planes, OR-reducing the
/// rejection mask. No early exit, and no near/far test: that is the
/// documented contract of the reduced layout, not an approximation of the
/// scalar path.
fn cull_soa(
    visibility: &mut [bool],
    bounds: &[WorldBounds],
    packet: &PlanePacket4,
    kind: BoundsKind,
    granularity: usize,
) {
    visibility
        .par_iter_mut()
        .zip(bounds.par_iter())
        .with_min_len(granularity)
        .for_each(|(flag, bound)| {
            *flag = match kind {
                BoundsKind::Sphere => packet.contains_sphere(bound.sphere),
                BoundsKind::Aabb => packet.contains_aabb(bound.sphere.center, bound.extent),
            };
        });
}

#[cfg(test)]
mod test {
    use glam::{Mat4, Vec3, Vec4};
    use precull_types::{BoundsKind, Instance};

    use super::CpuCuller;
    use crate::{
        managers::InstanceManager,
        mode::CpuAlgorithm,
        options::CullingConfig,
        util::frustum::Frustum,
    };

    fn grid_instances() -> Vec<Instance> {
        // A slab of unit-bounded instances at z = 10, wide enough that a 90
        // degree frustum culls most of the outer ones, with z safely inside
        // near/far for every instance.
        let mut instances = Vec::new();
        for x in -12..=12 {
            for y in -12..=12 {
                instances.push(Instance {
                    transform: Mat4::from_translation(Vec3::new(x as f32 * 2.0, y as f32 * 2.0, 10.0)),
                    inv_transform: None,
                    bounding_sphere: Vec4::new(0.0, 0.0, 0.0, 1.0),
                    extent: Vec3::ONE,
                });
            }
        }
        instances
    }

    fn test_frustum() -> Frustum {
        Frustum::from_view_proj(Mat4::perspective_lh(90.0_f32.to_radians(), 1.0, 0.1, 100.0)).unwrap()
    }

    fn config(algorithm: CpuAlgorithm) -> CullingConfig {
        CullingConfig {
            cpu_algorithm: algorithm,
            batch_granularity: 7,
            ..Default::default()
        }
    }

    #[test]
    fn matches_serial_reference() {
        let instances = InstanceManager::new(&grid_instances(), BoundsKind::Aabb).unwrap();
        let frustum = test_frustum();

        let mut culler = CpuCuller::new(&config(CpuAlgorithm::Scalar), instances.len()).unwrap();
        let flags = culler.cull(&frustum, &instances);

        for (index, bound) in instances.bounds().iter().enumerate() {
            let expected = frustum.contains_aabb(bound.sphere.center, bound.extent);
            assert_eq!(flags[index], expected, "instance {index}");
        }

        let visible = culler.visible_count();
        assert!(visible > 0 && visible < instances.len());
    }

    #[test]
    fn scalar_and_soa_agree_away_from_near_and_far() {
        // The grid keeps every instance between near and far, so any
        // scalar/SoA disagreement would be a genuine bug rather than the
        // reduced layout's documented near/far blindness.
        let instances = InstanceManager::new(&grid_instances(), BoundsKind::Aabb).unwrap();
        let frustum = test_frustum();

        let mut scalar = CpuCuller::new(&config(CpuAlgorithm::Scalar), instances.len()).unwrap();
        let mut soa = CpuCuller::new(&config(CpuAlgorithm::Soa), instances.len()).unwrap();

        assert_eq!(scalar.cull(&frustum, &instances), soa.cull(&frustum, &instances));
    }

    #[test]
    fn sphere_and_aabb_kinds_both_cull() {
        for kind in [BoundsKind::Sphere, BoundsKind::Aabb] {
            let instances = InstanceManager::new(&grid_instances(), kind).unwrap();
            let frustum = test_frustum();

            let mut culler = CpuCuller::new(&config(CpuAlgorithm::Scalar), instances.len()).unwrap();
            culler.cull(&frustum, &instances);
            let visible = culler.visible_count();
            assert!(visible > 0 && visible < instances.len(), "{kind:?}");
        }
    }

    #[test]
    fn pinned_worker_pool_produces_identical_results() {
        let instances = InstanceManager::new(&grid_instances(), BoundsKind::Aabb).unwrap();
        let frustum = test_frustum();

        let mut global = CpuCuller::new(&config(CpuAlgorithm::Scalar), instances.len()).unwrap();
        let pinned_config = CullingConfig {
            worker_threads: Some(2),
            ..config(CpuAlgorithm::Scalar)
        };
        let mut pinned = CpuCuller::new(&pinned_config, instances.len()).unwrap();

        assert_eq!(global.cull(&frustum, &instances), pinned.cull(&frustum, &instances));
    }

    #[test]
    fn repeated_culls_are_deterministic() {
        let instances = InstanceManager::new(&grid_instances(), BoundsKind::Aabb).unwrap();
        let frustum = test_frustum();

        let mut culler = CpuCuller::new(&config(CpuAlgorithm::Soa), instances.len()).unwrap();
        let first = culler.cull(&frustum, &instances).to_vec();
        let second = culler.cull(&frustum, &instances).to_vec();
        assert_eq!(first, second);
    }
}
