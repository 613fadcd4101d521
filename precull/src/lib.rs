//! Per-frame visibility culling and LOD bucketing for large counts of
//! static render instances, built on wgpu.
//!
//! Two pipelines share one immutable instance store:
//!
//! - A GPU-driven path: a compute kernel tests every instance against the
//!   camera frustum, buckets survivors by LOD through atomic compaction,
//!   patches the indirect draw arguments on-device, and one indirect draw
//!   per LOD renders the result. The CPU never reads anything back.
//! - A CPU path: a fork-join parallel job computes a visibility flag per
//!   instance, with a scalar per-plane test or a transposed 4-wide SoA
//!   test, and an idempotent gate forwards only actual transitions to the
//!   host renderer.
//!
//! The mode is chosen once at setup via [`CullingMode`] and never changes
//! mid-session. Instances are fixed after load; only the camera moves.

mod error;
mod mode;
mod options;
mod system;

pub mod culling;
pub mod managers;
pub mod util;

pub use error::*;
pub use mode::*;
pub use options::*;
pub use system::*;

pub use precull_types as types;
