//! Glue tying the managers and the active pipeline into the host's frame
//! loop: explicit init / per-frame update / teardown, no implicit
//! registration.

use precull_types::{Camera, Handedness, Instance};
use wgpu::{CommandEncoder, Device, Queue, RenderPass};

use crate::{
    culling::{
        cpu::CpuCuller,
        gpu::{GpuCuller, GpuCullerArgs},
        visibility::{VisibilityGate, VisibilitySink},
    },
    error::CullerInitializationError,
    managers::{CameraManager, InstanceManager, MeshRegistry},
    mode::ModeData,
    options::CullingConfig,
    util::frustum::{Frustum, PlaneExtractionError},
};

struct CpuPipeline {
    culler: CpuCuller,
    gate: VisibilityGate,
}

/// A complete culling session over one immutable instance store.
///
/// The mode is fixed at construction; calling into the other mode's
/// per-frame path is a programming error and panics, matching the
/// [`ModeData`] accessors.
pub struct CullingSystem {
    camera: CameraManager,
    instances: InstanceManager,
    data: ModeData<CpuPipeline, GpuCuller>,
}

impl CullingSystem {
    /// Initializes a CPU-powered session. Teardown is `Drop`.
    pub fn new_cpu(
        config: &CullingConfig,
        camera: Camera,
        handedness: Handedness,
        source: &[Instance],
    ) -> Result<Self, CullerInitializationError> {
        let instances = InstanceManager::new(source, config.bounds)?;
        let culler = CpuCuller::new(config, instances.len())?;
        let gate = VisibilityGate::new(instances.len());

        Ok(Self {
            camera: CameraManager::new(camera, handedness, None),
            instances,
            data: ModeData::Cpu(CpuPipeline { culler, gate }),
        })
    }

    /// Initializes a GPU-powered session on the given device.
    pub fn new_gpu(
        config: &CullingConfig,
        camera: Camera,
        handedness: Handedness,
        source: &[Instance],
        device: &Device,
        meshes: MeshRegistry,
    ) -> Result<Self, CullerInitializationError> {
        let instances = InstanceManager::new(source, config.bounds)?;
        let culler = GpuCuller::new(GpuCullerArgs {
            device,
            config,
            instances: &instances,
            meshes,
        })?;

        Ok(Self {
            camera: CameraManager::new(camera, handedness, None),
            instances,
            data: ModeData::Gpu(culler),
        })
    }

    /// Per-frame camera state from the host.
    pub fn set_camera(&mut self, camera: Camera, aspect_ratio: Option<f32>) {
        self.camera.set_aspect_data(camera, aspect_ratio.unwrap_or(1.0));
    }

    pub fn camera(&self) -> &CameraManager {
        &self.camera
    }

    pub fn instances(&self) -> &InstanceManager {
        &self.instances
    }

    /// CPU-mode frame: parallel cull, join, then gate the results into the
    /// host's renderer. Returns the number of visible instances.
    pub fn cull_cpu(&mut self, sink: &mut dyn VisibilitySink) -> Result<usize, PlaneExtractionError> {
        let frustum = Frustum::from_view_proj(self.camera.view_proj())?;
        let pipeline = self.data.as_cpu_mut();

        let flags = pipeline.culler.cull(&frustum, &self.instances);
        pipeline.gate.apply(flags, sink);

        let visible = pipeline.culler.visible_count();
        log::trace!("cpu cull: {visible}/{} visible", self.instances.len());
        Ok(visible)
    }

    /// GPU-mode frame: encodes reset, upload, dispatch, and the indirect
    /// args patch onto the host's command stream.
    pub fn encode_gpu_cull(
        &self,
        queue: &Queue,
        encoder: &mut CommandEncoder,
    ) -> Result<(), PlaneExtractionError> {
        self.data.as_gpu().cull(queue, encoder, &self.camera)
    }

    /// GPU-mode frame: the indirect draws, one per LOD.
    pub fn draw_gpu<'rpass>(&'rpass self, rpass: &mut RenderPass<'rpass>, draw_binding_index: u32) {
        self.data.as_gpu().run(rpass, draw_binding_index);
    }

    /// The GPU culler, for hosts that need the draw bind group layout.
    pub fn gpu(&self) -> &GpuCuller {
        self.data.as_gpu()
    }
}
