//! Startup configuration, validated once. There is no runtime mutation:
//! every knob here is frame-invariant.

use precull_types::{BoundsKind, MAX_LOD};
use serde::{Deserialize, Serialize};

use crate::{
    error::CullerInitializationError,
    mode::{CpuAlgorithm, CullingMode, PlaneLayout},
};

/// Per-LOD debug tint, linear RGBA.
pub type LodColor = [f32; 4];

/// Configuration consumed at initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    pub mode: CullingMode,
    pub cpu_algorithm: CpuAlgorithm,
    pub gpu_plane_layout: PlaneLayout,
    /// Which interpretation of instance bounds the tests use.
    pub bounds: BoundsKind,
    /// Importance cutoff in [0, 1]. A visible instance whose metric is
    /// strictly greater selects LOD 0, otherwise LOD 1.
    pub lod_threshold: f32,
    /// Minimum number of instances a CPU worker takes per batch.
    pub batch_granularity: usize,
    /// Worker threads for the CPU path. `None` uses hardware concurrency.
    pub worker_threads: Option<usize>,
    /// Tint written into the per-LOD draw uniforms.
    pub lod_colors: [LodColor; MAX_LOD],
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            mode: CullingMode::default(),
            cpu_algorithm: CpuAlgorithm::default(),
            gpu_plane_layout: PlaneLayout::default(),
            bounds: BoundsKind::default(),
            lod_threshold: 0.1,
            batch_granularity: 32,
            worker_threads: None,
            lod_colors: [[0.0, 1.0, 0.0, 1.0], [1.0, 1.0, 0.0, 1.0]],
        }
    }
}

impl CullingConfig {
    /// Checks every invariant the cullers rely on. Called by both pipeline
    /// constructors; a failure aborts initialization.
    pub fn validate(&self) -> Result<(), CullerInitializationError> {
        if !(0.0..=1.0).contains(&self.lod_threshold) {
            return Err(CullerInitializationError::InvalidLodThreshold {
                value: self.lod_threshold,
            });
        }
        if self.batch_granularity == 0 {
            return Err(CullerInitializationError::InvalidBatchGranularity);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::CullingConfig;

    #[test]
    fn default_config_is_valid() {
        CullingConfig::default().validate().unwrap();
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut config = CullingConfig::default();
        config.lod_threshold = 1.5;
        assert!(config.validate().is_err());

        config.lod_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_granularity_is_rejected() {
        let mut config = CullingConfig::default();
        config.batch_granularity = 0;
        assert!(config.validate().is_err());
    }
}
