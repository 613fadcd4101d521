use precull_types::MAX_LOD;
use thiserror::Error;

/// Reason why a culler failed to initialize.
///
/// These are configuration contract violations: there is no degraded mode,
/// initialization aborts with the diagnostic.
#[derive(Error, Debug)]
pub enum CullerInitializationError {
    #[error("instance list is empty; the store is fixed at init and an empty one can never cull")]
    ZeroInstances,
    #[error("exactly {MAX_LOD} LOD meshes are required, got {actual}")]
    LodMeshCountMismatch { actual: usize },
    #[error("LOD threshold {value} is outside [0, 1]")]
    InvalidLodThreshold { value: f32 },
    #[error("worker batch granularity must be at least 1")]
    InvalidBatchGranularity,
    #[error("duplicate mesh name {0:?} in registry")]
    DuplicateMeshName(String),
    #[error("failed to build culling worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
