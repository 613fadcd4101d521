//! The GPU culling / LOD dispatcher.
//!
//! Instance data is uploaded once at initialization; every frame re-uploads
//! only the planes and camera scalars, dispatches the culling kernel, and
//! patches the indirect arguments on-device. The CPU never reads anything
//! back.

use std::{iter::zip, mem, num::NonZeroU64};

use glam::{Mat4, Vec3, Vec4};
use precull_types::{BoundsKind, MAX_LOD};
use wgpu::{
    util::{BufferInitDescriptor, DeviceExt},
    BindGroup, BindGroupLayout, BindingType, Buffer, BufferBindingType, BufferDescriptor, BufferUsages,
    CommandEncoder, ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor, Device, IndexFormat,
    PipelineLayoutDescriptor, Queue, RenderPass, ShaderStages,
};

use crate::{
    culling::WORKGROUP_SIZE,
    error::CullerInitializationError,
    managers::{CameraManager, InstanceManager, MeshRegistry},
    mode::PlaneLayout,
    options::CullingConfig,
    util::{
        bind_merge::{BindGroupBuilder, BindGroupLayoutBuilder},
        frustum::{Frustum, PlaneExtractionError, PlanePacket4},
        math::round_up_div,
    },
};

/// GPU mirror of one instance record. Uploaded once; read by the culling
/// kernel for its bounds and by the host's vertex stage for its matrices.
#[repr(C, align(16))]
#[derive(Debug, Copy, Clone)]
struct ShaderInstance {
    transform: Mat4,
    inv_transform: Mat4,
    /// xyz world center, w radius.
    bounding_sphere: Vec4,
    /// xyz world half-extent, w unused.
    extent: Vec4,
}

unsafe impl bytemuck::Pod for ShaderInstance {}
unsafe impl bytemuck::Zeroable for ShaderInstance {}

/// Per-frame scalars for the culling kernel. Layout must match the
/// `CullingUniforms` struct in the kernels.
#[repr(C, align(16))]
#[derive(Debug, Copy, Clone)]
struct ShaderCullingUniforms {
    camera_position: Vec3,
    tan_half_vfov: f32,
    lod_threshold: f32,
    instance_count: u32,
    bounds_mode: u32,
    _padding: u32,
}

unsafe impl bytemuck::Pod for ShaderCullingUniforms {}
unsafe impl bytemuck::Zeroable for ShaderCullingUniforms {}

const BOUNDS_MODE_SPHERE: u32 = 0;
const BOUNDS_MODE_AABB: u32 = 1;

/// Indexed indirect draw record, one per LOD. `instance_count` is patched
/// on-device from the live bucket counter each frame.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
struct ShaderIndirectArgs {
    index_count: u32,
    instance_count: u32,
    first_index: u32,
    base_vertex: i32,
    first_instance: u32,
}

unsafe impl bytemuck::Pod for ShaderIndirectArgs {}
unsafe impl bytemuck::Zeroable for ShaderIndirectArgs {}

const ARGS_STRIDE: u64 = mem::size_of::<ShaderIndirectArgs>() as u64;

/// Per-LOD uniforms for the draw stage.
#[repr(C, align(16))]
#[derive(Debug, Copy, Clone)]
struct ShaderLodUniforms {
    color: Vec4,
}

unsafe impl bytemuck::Pod for ShaderLodUniforms {}
unsafe impl bytemuck::Zeroable for ShaderLodUniforms {}

pub struct GpuCullerArgs<'a> {
    pub device: &'a Device,
    pub config: &'a CullingConfig,
    pub instances: &'a InstanceManager,
    pub meshes: MeshRegistry,
}

pub struct GpuCuller {
    pipeline: ComputePipeline,
    cull_bg: BindGroup,

    plane_buffer: Buffer,
    uniform_buffer: Buffer,
    counter_buffer: Buffer,
    args_buffer: Buffer,

    draw_bgl: BindGroupLayout,
    draw_bgs: Vec<BindGroup>,
    meshes: MeshRegistry,

    plane_layout: PlaneLayout,
    bounds_mode: u32,
    lod_threshold: f32,
    instance_count: u32,
    workgroup_count: u32,
}

impl GpuCuller {
    pub fn new(args: GpuCullerArgs<'_>) -> Result<Self, CullerInitializationError> {
        args.config.validate()?;
        // The registry enforces mesh count == MAX_LOD at construction and
        // the instance manager rejects empty stores, so every buffer below
        // has a fixed, non-zero size for the whole session.
        debug_assert_eq!(args.meshes.len(), MAX_LOD);

        let device = args.device;
        let instance_count = args.instances.len() as u32;
        let workgroup_count = round_up_div(instance_count, WORKGROUP_SIZE);

        let mut instance_data = Vec::with_capacity(args.instances.len() * mem::size_of::<ShaderInstance>());
        for (instance, bounds) in zip(args.instances.instances(), args.instances.bounds()) {
            instance_data.extend_from_slice(bytemuck::bytes_of(&ShaderInstance {
                transform: instance.transform,
                inv_transform: instance.inv_transform,
                bounding_sphere: bounds.sphere.center.extend(bounds.sphere.radius),
                extent: bounds.extent.extend(0.0),
            }));
        }

        let instance_buffer = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("culling instance input"),
            contents: &instance_data,
            usage: BufferUsages::STORAGE,
        });

        let plane_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("frustum planes"),
            size: match args.config.gpu_plane_layout {
                PlaneLayout::Full => mem::size_of::<Frustum>() as u64,
                PlaneLayout::Soa => mem::size_of::<PlanePacket4>() as u64,
            },
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("culling uniforms"),
            size: mem::size_of::<ShaderCullingUniforms>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // One u32 atomic per LOD bucket. COPY_DST for the per-frame reset,
        // COPY_SRC for the counter -> args patch.
        let counter_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("lod bucket counters"),
            size: (MAX_LOD * mem::size_of::<u32>()) as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let index_buffers: Vec<Buffer> = (0..MAX_LOD)
            .map(|lod| {
                device.create_buffer(&BufferDescriptor {
                    label: Some(&format!("lod {lod} compacted indices")),
                    size: (args.instances.len() * mem::size_of::<u32>()) as u64,
                    usage: BufferUsages::STORAGE,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let initial_args: Vec<ShaderIndirectArgs> = (0..MAX_LOD)
            .map(|lod| ShaderIndirectArgs {
                index_count: args.meshes.lod(lod).index_count,
                instance_count: 0,
                first_index: 0,
                base_vertex: 0,
                first_instance: 0,
            })
            .collect();

        let args_buffer = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("lod indirect args"),
            contents: bytemuck::cast_slice(&initial_args),
            usage: BufferUsages::INDIRECT | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
        });

        let sm = match args.config.gpu_plane_layout {
            PlaneLayout::Full => device.create_shader_module(wgpu::include_wgsl!("../shaders/cull.wgsl")),
            PlaneLayout::Soa => device.create_shader_module(wgpu::include_wgsl!("../shaders/cull_soa.wgsl")),
        };

        let mut cull_bglb = BindGroupLayoutBuilder::new();
        cull_bglb
            .append(
                ShaderStages::COMPUTE,
                BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<ShaderCullingUniforms>() as _),
                },
                None,
            )
            .append(
                ShaderStages::COMPUTE,
                BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<PlanePacket4>() as _),
                },
                None,
            )
            .append(
                ShaderStages::COMPUTE,
                BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<ShaderInstance>() as _),
                },
                None,
            )
            .append(
                ShaderStages::COMPUTE,
                BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new((MAX_LOD * mem::size_of::<u32>()) as _),
                },
                None,
            );
        for _ in 0..MAX_LOD {
            cull_bglb.append(
                ShaderStages::COMPUTE,
                BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<u32>() as _),
                },
                None,
            );
        }
        let cull_bgl = cull_bglb.build(device, Some("culling bgl"));

        let pll = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("culling pll"),
            bind_group_layouts: &[&cull_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("culling pipeline"),
            layout: Some(&pll),
            module: &sm,
            entry_point: "cs_main",
        });

        let mut cull_bgb = BindGroupBuilder::new();
        cull_bgb
            .append_buffer(&uniform_buffer)
            .append_buffer(&plane_buffer)
            .append_buffer(&instance_buffer)
            .append_buffer(&counter_buffer);
        for index_buffer in &index_buffers {
            cull_bgb.append_buffer(index_buffer);
        }
        let cull_bg = cull_bgb.build(device, Some("culling bg"), &cull_bgl);

        // Draw-stage interface: the vertex shader fetches its instance via
        // the compacted index list, so each LOD gets the shared instance
        // buffer plus its own list and tint.
        let mut draw_bglb = BindGroupLayoutBuilder::new();
        draw_bglb
            .append(
                ShaderStages::VERTEX,
                BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<ShaderInstance>() as _),
                },
                None,
            )
            .append(
                ShaderStages::VERTEX,
                BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<u32>() as _),
                },
                None,
            )
            .append(
                ShaderStages::VERTEX_FRAGMENT,
                BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<ShaderLodUniforms>() as _),
                },
                None,
            );
        let draw_bgl = draw_bglb.build(device, Some("culled draw bgl"));

        let draw_bgs = (0..MAX_LOD)
            .map(|lod| {
                let lod_uniforms = device.create_buffer_init(&BufferInitDescriptor {
                    label: Some(&format!("lod {lod} draw uniforms")),
                    contents: bytemuck::bytes_of(&ShaderLodUniforms {
                        color: Vec4::from_array(args.config.lod_colors[lod]),
                    }),
                    usage: BufferUsages::UNIFORM,
                });

                let mut bgb = BindGroupBuilder::new();
                bgb.append_buffer(&instance_buffer)
                    .append_buffer(&index_buffers[lod])
                    .append_buffer(&lod_uniforms);
                bgb.build(device, Some(&format!("lod {lod} draw bg")), &draw_bgl)
            })
            .collect();

        log::info!(
            "gpu culler ready: {instance_count} instances, {workgroup_count} workgroups, {:?} planes",
            args.config.gpu_plane_layout
        );

        Ok(Self {
            pipeline,
            cull_bg,
            plane_buffer,
            uniform_buffer,
            counter_buffer,
            args_buffer,
            draw_bgl,
            draw_bgs,
            meshes: args.meshes,
            plane_layout: args.config.gpu_plane_layout,
            bounds_mode: match args.config.bounds {
                BoundsKind::Sphere => BOUNDS_MODE_SPHERE,
                BoundsKind::Aabb => BOUNDS_MODE_AABB,
            },
            lod_threshold: args.config.lod_threshold,
            instance_count,
            workgroup_count,
        })
    }

    /// Layout the host's render pipeline binds the per-LOD draw data with.
    pub fn draw_bind_group_layout(&self) -> &BindGroupLayout {
        &self.draw_bgl
    }

    pub fn meshes(&self) -> &MeshRegistry {
        &self.meshes
    }

    /// Encodes one frame of culling: counter reset, plane/scalar upload,
    /// kernel dispatch, and the counter -> indirect-args patch.
    ///
    /// Everything is ordered on the one command stream; the queue writes
    /// land at submission, ahead of the encoded commands, so the dispatch
    /// always sees this frame's planes and zeroed counters. Nothing here
    /// blocks on the device.
    pub fn cull(
        &self,
        queue: &Queue,
        encoder: &mut CommandEncoder,
        camera: &CameraManager,
    ) -> Result<(), PlaneExtractionError> {
        profiling::scope!("GPU Culling");

        let frustum = Frustum::from_view_proj(camera.view_proj())?;
        match self.plane_layout {
            PlaneLayout::Full => queue.write_buffer(&self.plane_buffer, 0, bytemuck::bytes_of(&frustum)),
            PlaneLayout::Soa => {
                queue.write_buffer(&self.plane_buffer, 0, bytemuck::bytes_of(&PlanePacket4::new(&frustum)))
            }
        }

        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&ShaderCullingUniforms {
                camera_position: camera.location(),
                tan_half_vfov: camera.tan_half_vfov(),
                lod_threshold: self.lod_threshold,
                instance_count: self.instance_count,
                bounds_mode: self.bounds_mode,
                _padding: 0,
            }),
        );

        encoder.clear_buffer(&self.counter_buffer, 0, None);

        {
            let mut cpass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("cull + lod bucket"),
            });
            cpass.set_pipeline(&self.pipeline);
            cpass.set_bind_group(0, &self.cull_bg, &[]);
            cpass.dispatch_workgroups(self.workgroup_count, 1, 1);
        }

        for lod in 0..MAX_LOD as u64 {
            // instance_count sits one word into each args record.
            encoder.copy_buffer_to_buffer(
                &self.counter_buffer,
                lod * mem::size_of::<u32>() as u64,
                &self.args_buffer,
                lod * ARGS_STRIDE + mem::size_of::<u32>() as u64,
                mem::size_of::<u32>() as u64,
            );
        }

        Ok(())
    }

    /// Issues one indirect draw per LOD into an already-configured render
    /// pass. The caller has bound its pipeline and material; this binds the
    /// per-LOD draw data at `draw_binding_index` and the LOD mesh buffers.
    pub fn run<'rpass>(&'rpass self, rpass: &mut RenderPass<'rpass>, draw_binding_index: u32) {
        for lod in 0..MAX_LOD {
            let mesh = self.meshes.lod(lod);

            rpass.set_bind_group(draw_binding_index, &self.draw_bgs[lod], &[]);
            rpass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            rpass.set_index_buffer(mesh.index_buffer.slice(..), IndexFormat::Uint32);
            rpass.draw_indexed_indirect(&self.args_buffer, lod as u64 * ARGS_STRIDE);
        }
    }
}

#[cfg(test)]
mod test {
    use glam::{Mat4, Vec3, Vec4};
    use precull_types::{Camera, CameraProjection, Handedness, Instance, MAX_LOD};
    use wgpu::util::DeviceExt;

    use super::{GpuCuller, GpuCullerArgs};
    use crate::{
        managers::{CameraManager, InstanceManager, LodMesh, MeshRegistry},
        mode::PlaneLayout,
        options::CullingConfig,
    };

    struct TestContext {
        device: wgpu::Device,
        queue: wgpu::Queue,
    }

    impl TestContext {
        fn new() -> Option<Self> {
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
            let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
            let (device, queue) =
                pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None)).ok()?;
            Some(Self { device, queue })
        }

        fn meshes(&self) -> MeshRegistry {
            let meshes = (0..MAX_LOD)
                .map(|lod| LodMesh {
                    name: format!("lod{lod}"),
                    vertex_buffer: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: None,
                        contents: &[0; 48],
                        usage: wgpu::BufferUsages::VERTEX,
                    }),
                    index_buffer: self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: None,
                        contents: bytemuck::cast_slice(&[0u32; 6]),
                        usage: wgpu::BufferUsages::INDEX,
                    }),
                    index_count: 6,
                })
                .collect();
            MeshRegistry::new(meshes).unwrap()
        }

        /// Runs one frame of culling and reads the counters plus patched
        /// args back to the CPU.
        fn cull_once(&self, culler: &GpuCuller, camera: &CameraManager) -> Vec<u32> {
            let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: None,
                size: 48,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });

            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
            culler.cull(&self.queue, &mut encoder, camera).unwrap();
            encoder.copy_buffer_to_buffer(&culler.counter_buffer, 0, &readback, 0, 8);
            encoder.copy_buffer_to_buffer(&culler.args_buffer, 0, &readback, 8, 40);
            self.queue.submit(Some(encoder.finish()));

            let slice = readback.slice(..);
            slice.map_async(wgpu::MapMode::Read, |result| result.unwrap());
            self.device.poll(wgpu::Maintain::Wait);
            let mapped = slice.get_mapped_range();
            bytemuck::cast_slice(&mapped).to_vec()
        }
    }

    fn sphere_instance(center: Vec3, radius: f32, extent: Vec3) -> Instance {
        Instance {
            transform: Mat4::from_translation(center),
            inv_transform: None,
            bounding_sphere: Vec4::new(0.0, 0.0, 0.0, radius),
            extent,
        }
    }

    fn test_camera() -> CameraManager {
        CameraManager::new(
            Camera {
                projection: CameraProjection::Perspective {
                    vfov: 90.0,
                    near: 0.1,
                    far: 100.0,
                },
                view: Mat4::IDENTITY,
            },
            Handedness::Left,
            None,
        )
    }

    #[test]
    fn culls_and_buckets() {
        let Some(ctx) = TestContext::new() else {
            return;
        };

        let instances = InstanceManager::new(
            &[
                // Close and large: visible, metric 0.87 -> LOD 0.
                sphere_instance(Vec3::new(0.0, 0.0, 10.0), 5.0, Vec3::splat(5.0)),
                // Distant and small: visible, metric 0.035 -> LOD 1.
                sphere_instance(Vec3::new(0.0, 0.0, 50.0), 1.0, Vec3::ONE),
                // Behind the camera.
                sphere_instance(Vec3::new(0.0, 0.0, -10.0), 1.0, Vec3::ONE),
                // Far outside the side planes.
                sphere_instance(Vec3::new(1000.0, 0.0, 10.0), 1.0, Vec3::ONE),
            ],
            precull_types::BoundsKind::Aabb,
        )
        .unwrap();

        let culler = GpuCuller::new(GpuCullerArgs {
            device: &ctx.device,
            config: &CullingConfig::default(),
            instances: &instances,
            meshes: ctx.meshes(),
        })
        .unwrap();

        let words = ctx.cull_once(&culler, &test_camera());

        // Bucket counters.
        assert_eq!(&words[0..2], &[1, 1]);
        // Indirect args: index_count unchanged, instance_count patched from
        // the counters.
        assert_eq!(words[2], 6);
        assert_eq!(words[3], 1);
        assert_eq!(words[7], 6);
        assert_eq!(words[8], 1);
    }

    #[test]
    fn importance_split_is_five_five() {
        let Some(ctx) = TestContext::new() else {
            return;
        };

        // Metrics 0.05..0.95 in steps of 0.1 at distance 10; five exceed
        // the 0.5 threshold.
        let instances: Vec<Instance> = (0..10)
            .map(|step| {
                sphere_instance(
                    Vec3::new(0.0, 0.0, 10.0),
                    (0.05 + step as f32 * 0.1) * 10.0,
                    Vec3::ZERO,
                )
            })
            .collect();
        let instances = InstanceManager::new(&instances, precull_types::BoundsKind::Aabb).unwrap();

        let config = CullingConfig {
            lod_threshold: 0.5,
            ..Default::default()
        };
        let culler = GpuCuller::new(GpuCullerArgs {
            device: &ctx.device,
            config: &config,
            instances: &instances,
            meshes: ctx.meshes(),
        })
        .unwrap();

        let words = ctx.cull_once(&culler, &test_camera());
        assert_eq!(&words[0..2], &[5, 5]);
    }

    #[test]
    fn soa_layout_skips_near_and_far() {
        let Some(ctx) = TestContext::new() else {
            return;
        };

        // Between the camera and the near plane: the full layout culls it,
        // the four-plane layout keeps it.
        let instances = InstanceManager::new(
            &[sphere_instance(Vec3::new(0.0, 0.0, 0.02), 0.005, Vec3::ZERO)],
            precull_types::BoundsKind::Sphere,
        )
        .unwrap();

        for (layout, expected) in [(PlaneLayout::Full, [0, 0]), (PlaneLayout::Soa, [0, 1])] {
            let config = CullingConfig {
                gpu_plane_layout: layout,
                bounds: precull_types::BoundsKind::Sphere,
                lod_threshold: 0.5,
                ..Default::default()
            };
            let culler = GpuCuller::new(GpuCullerArgs {
                device: &ctx.device,
                config: &config,
                instances: &instances,
                meshes: ctx.meshes(),
            })
            .unwrap();

            let words = ctx.cull_once(&culler, &test_camera());
            assert_eq!(&words[0..2], &expected, "{layout:?}");
        }
    }
}
