use serde::{Deserialize, Serialize};

/// Which algorithm the CPU parallel culler runs. Ignored in GPU mode.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuAlgorithm {
    /// Per-plane loop over all 6 planes with early exit.
    #[default]
    Scalar,
    /// One 4-wide test against the transposed side planes. Near and far
    /// are not tested in this mode.
    Soa,
}

/// Storage shape of the frustum-plane buffer the GPU kernel reads.
/// Ignored in CPU mode.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaneLayout {
    /// All 6 canonical planes, tested sequentially.
    #[default]
    Full,
    /// The 4 side planes transposed for one 4-wide test. Near and far are
    /// not tested in this layout.
    Soa,
}

/// Determines which of the two culling pipelines drives rendering.
///
/// The mode is frame-invariant: it is chosen once at setup and selects the
/// matching [`ModeData`] arm for the whole session.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CullingMode {
    #[default]
    CpuPowered,
    GpuPowered,
}

impl CullingMode {
    /// Turns a CullingMode into a [`ModeData`] calling the appropriate
    /// initalization function.
    pub fn into_data<C, G>(self, cpu: impl FnOnce() -> C, gpu: impl FnOnce() -> G) -> ModeData<C, G> {
        match self {
            Self::CpuPowered => ModeData::Cpu(cpu()),
            Self::GpuPowered => ModeData::Gpu(gpu()),
        }
    }
}

/// Stores two different types of data depending on the culling mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModeData<C, G> {
    Cpu(C),
    Gpu(G),
}

impl<C, G> ModeData<C, G> {
    pub fn mode(&self) -> CullingMode {
        match self {
            Self::Cpu(_) => CullingMode::CpuPowered,
            Self::Gpu(_) => CullingMode::GpuPowered,
        }
    }

    pub fn into_cpu(self) -> C {
        match self {
            Self::Cpu(c) => c,
            Self::Gpu(_) => panic!("tried to extract cpu data in gpu mode"),
        }
    }

    pub fn as_cpu(&self) -> &C {
        match self {
            Self::Cpu(c) => c,
            Self::Gpu(_) => panic!("tried to extract cpu data in gpu mode"),
        }
    }

    pub fn as_cpu_mut(&mut self) -> &mut C {
        match self {
            Self::Cpu(c) => c,
            Self::Gpu(_) => panic!("tried to extract cpu data in gpu mode"),
        }
    }

    pub fn into_gpu(self) -> G {
        match self {
            Self::Gpu(g) => g,
            Self::Cpu(_) => panic!("tried to extract gpu data in cpu mode"),
        }
    }

    pub fn as_gpu(&self) -> &G {
        match self {
            Self::Gpu(g) => g,
            Self::Cpu(_) => panic!("tried to extract gpu data in cpu mode"),
        }
    }

    pub fn as_gpu_mut(&mut self) -> &mut G {
        match self {
            Self::Gpu(g) => g,
            Self::Cpu(_) => panic!("tried to extract gpu data in cpu mode"),
        }
    }
}
