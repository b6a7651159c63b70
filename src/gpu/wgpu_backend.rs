//! [`RenderBackend`] executing frame plans with wgpu.
//!
//! GL-style state (current program, uniform values, bound textures) is resolved by
//! [`FramePlan`] first; this module only turns each planned draw into pipeline,
//! bind group and vertex buffer bindings inside one render pass.
//!
//! Bind groups are classified from the reflected interface:
//! - a group made only of `mat4x4<f32>` uniforms is served from a per-program
//!   uniform arena with dynamic offsets, one slot per draw
//! - a group holding one 2D texture (and optionally a sampler) gets one cached bind
//!   group per texture

use std::collections::HashMap;

use glam::Mat4;
use log::{debug, warn};
use wgpu::util::DeviceExt;

use super::backend::{
    check_frame_size, BufferId, ProgramId, ProgramSource, RenderBackend, TextureId,
};
use super::command::{CommandList, Topology};
use super::context::GpuContext;
use super::plan::{FramePlan, PlannedDraw};
use crate::error::{CompositorError, Result};
use crate::shader::{InputFormat, ProgramInterface, ResourceKind, ShaderResource};
use crate::video::VideoFrame;

/// Format of every video texture; raw values, no sRGB decode
pub const VIDEO_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Column-major `mat4x4<f32>` as laid out in a uniform buffer
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MatrixUniform {
    columns: [f32; 16],
}

impl From<&Mat4> for MatrixUniform {
    fn from(matrix: &Mat4) -> Self {
        Self {
            columns: matrix.to_cols_array(),
        }
    }
}

const MATRIX_SIZE: u64 = std::mem::size_of::<MatrixUniform>() as u64;
const INITIAL_ARENA_SLOTS: u64 = 16;

struct UniformArena {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    slots: u64,
}

struct UniformGroup {
    layout: wgpu::BindGroupLayout,
    /// Sorted; also the order of dynamic offsets
    bindings: Vec<u32>,
    /// Bytes per draw: one aligned matrix per binding
    slot_stride: u64,
    arena: Option<UniformArena>,
}

struct TextureGroup {
    layout: wgpu::BindGroupLayout,
    texture_binding: u32,
    sampler_binding: Option<u32>,
}

enum GroupSlot {
    Uniforms(UniformGroup),
    Texture(TextureGroup),
}

struct ProgramEntry {
    strip: wgpu::RenderPipeline,
    list: wgpu::RenderPipeline,
    groups: Vec<GroupSlot>,
    vertex_location: u32,
    vertex_components: u32,
    vertex_stride: u32,
}

impl ProgramEntry {
    fn pipeline(&self, topology: Topology) -> &wgpu::RenderPipeline {
        match topology {
            Topology::TriangleStrip => &self.strip,
            Topology::TriangleList => &self.list,
        }
    }
}

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    /// Keyed by the program and group the bind group was built for
    bind_groups: HashMap<(ProgramId, u32), wgpu::BindGroup>,
}

struct RenderTarget {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

pub struct WgpuBackend {
    gpu: GpuContext,
    target_format: wgpu::TextureFormat,
    sampler: wgpu::Sampler,
    uniform_alignment: u64,
    max_texture_dimension: u32,
    next_id: u32,
    programs: HashMap<ProgramId, ProgramEntry>,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    textures: HashMap<TextureId, TextureEntry>,
    target: Option<RenderTarget>,
}

fn backend_error(message: impl Into<String>) -> CompositorError {
    CompositorError::Backend(message.into())
}

fn vertex_format(format: InputFormat) -> Option<(wgpu::VertexFormat, u32)> {
    match format {
        InputFormat::Float32 => Some((wgpu::VertexFormat::Float32, 1)),
        InputFormat::Float32x2 => Some((wgpu::VertexFormat::Float32x2, 2)),
        InputFormat::Float32x3 => Some((wgpu::VertexFormat::Float32x3, 3)),
        InputFormat::Float32x4 => Some((wgpu::VertexFormat::Float32x4, 4)),
        InputFormat::Other => None,
    }
}

fn visibility(resource: &ShaderResource) -> wgpu::ShaderStages {
    let mut stages = wgpu::ShaderStages::NONE;
    if resource.vertex {
        stages |= wgpu::ShaderStages::VERTEX;
    }
    if resource.fragment {
        stages |= wgpu::ShaderStages::FRAGMENT;
    }
    stages
}

impl WgpuBackend {
    /// Backend rendering into views of `target_format`
    pub fn new(gpu: GpuContext, target_format: wgpu::TextureFormat) -> Self {
        let sampler = gpu.device().create_sampler(&wgpu::SamplerDescriptor {
            label: Some("video sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let uniform_alignment = u64::from(gpu.device().limits().min_uniform_buffer_offset_alignment)
            .max(MATRIX_SIZE);

        let max_texture_dimension = gpu.device().limits().max_texture_dimension_2d;

        Self {
            gpu,
            target_format,
            sampler,
            uniform_alignment,
            max_texture_dimension,
            next_id: 0,
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            target: None,
        }
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    /// Set the view the next submitted frames render into
    pub fn set_target(&mut self, view: wgpu::TextureView, width: u32, height: u32) {
        self.target = Some(RenderTarget {
            view,
            width,
            height,
        });
    }

    pub fn clear_target(&mut self) {
        self.target = None;
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Run `create` inside an error scope and map a captured error with `map`
    fn scoped<T>(
        &self,
        filter: wgpu::ErrorFilter,
        create: impl FnOnce(&wgpu::Device) -> T,
        map: impl FnOnce(wgpu::Error) -> CompositorError,
    ) -> Result<T> {
        let device = self.gpu.device();
        device.push_error_scope(filter);
        let value = create(device);
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(map(err)),
            None => Ok(value),
        }
    }

    /// Like [`scoped`](Self::scoped) for allocations: validation and out-of-memory
    /// errors both surface as `ResourceExhaustion`
    fn scoped_allocation<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        let device = self.gpu.device();
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(device);
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(err) => Err(CompositorError::ResourceExhaustion(err.to_string())),
            None => Ok(value),
        }
    }

    fn classify_group(&self, group: u32, resources: &[&ShaderResource]) -> Result<GroupSlot> {
        let device = self.gpu.device();

        if resources.iter().all(|r| r.kind == ResourceKind::Matrix4) {
            let entries: Vec<_> = resources
                .iter()
                .map(|r| wgpu::BindGroupLayoutEntry {
                    binding: r.binding,
                    visibility: visibility(r),
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(MATRIX_SIZE),
                    },
                    count: None,
                })
                .collect();
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("matrix group layout"),
                entries: &entries,
            });
            let bindings: Vec<u32> = resources.iter().map(|r| r.binding).collect();
            let slot_stride = self.uniform_alignment * bindings.len() as u64;
            return Ok(GroupSlot::Uniforms(UniformGroup {
                layout,
                bindings,
                slot_stride,
                arena: None,
            }));
        }

        let textures: Vec<_> = resources
            .iter()
            .filter(|r| r.kind == ResourceKind::Texture2d)
            .collect();
        let samplers: Vec<_> = resources
            .iter()
            .filter(|r| r.kind == ResourceKind::Sampler)
            .collect();
        if textures.len() != 1 || samplers.len() > 1 || textures.len() + samplers.len() != resources.len()
        {
            return Err(backend_error(format!(
                "@group({group}) mixes resources this backend cannot bind"
            )));
        }

        let texture = textures[0];
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: texture.binding,
            visibility: visibility(texture),
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }];
        if let Some(sampler) = samplers.first() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: sampler.binding,
                visibility: visibility(sampler),
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("video texture group layout"),
            entries: &entries,
        });

        Ok(GroupSlot::Texture(TextureGroup {
            layout,
            texture_binding: texture.binding,
            sampler_binding: samplers.first().map(|s| s.binding),
        }))
    }

    fn create_video_texture(&self, width: u32, height: u32) -> Result<(wgpu::Texture, wgpu::TextureView)> {
        check_frame_size(width, height, self.max_texture_dimension)?;
        self.scoped_allocation(|device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("video texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: VIDEO_TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        })
    }

    /// Make sure every uniform arena can hold one slot per draw of its program
    fn reserve_arenas(&mut self, plan: &FramePlan) {
        let mut draws_per_program: HashMap<ProgramId, u64> = HashMap::new();
        for draw in &plan.draws {
            *draws_per_program.entry(draw.program).or_default() += 1;
        }

        let device = self.gpu.device();
        for (program, draws) in draws_per_program {
            let Some(entry) = self.programs.get_mut(&program) else {
                continue;
            };
            for slot in &mut entry.groups {
                let GroupSlot::Uniforms(group) = slot else {
                    continue;
                };
                if group.arena.as_ref().is_some_and(|arena| arena.slots >= draws) {
                    continue;
                }

                let slots = draws.next_power_of_two().max(INITIAL_ARENA_SLOTS);
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("matrix arena"),
                    size: slots * group.slot_stride,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let entries: Vec<_> = group
                    .bindings
                    .iter()
                    .enumerate()
                    .map(|(index, binding)| wgpu::BindGroupEntry {
                        binding: *binding,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &buffer,
                            offset: index as u64 * self.uniform_alignment,
                            size: wgpu::BufferSize::new(MATRIX_SIZE),
                        }),
                    })
                    .collect();
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("matrix arena bind group"),
                    layout: &group.layout,
                    entries: &entries,
                });
                debug!("matrix arena for {program:?} grown to {slots} slots");
                group.arena = Some(UniformArena {
                    buffer,
                    bind_group,
                    slots,
                });
            }
        }
    }

    /// Write every draw's matrices into its program's arenas
    fn upload_matrices(&self, plan: &FramePlan) -> Result<()> {
        let mut contents: HashMap<(ProgramId, usize), Vec<u8>> = HashMap::new();
        let mut slot_of_program: HashMap<ProgramId, u64> = HashMap::new();

        for draw in &plan.draws {
            let entry = self.program(draw.program)?;
            let slot = slot_of_program.entry(draw.program).or_default();
            for (index, group_slot) in entry.groups.iter().enumerate() {
                let GroupSlot::Uniforms(group) = group_slot else {
                    continue;
                };
                let bytes = contents.entry((draw.program, index)).or_default();
                let base = (*slot * group.slot_stride) as usize;
                bytes.resize(base + group.slot_stride as usize, 0);
                for (position, binding) in group.bindings.iter().enumerate() {
                    let matrix: &Mat4 = draw.matrices.get(&(index as u32, *binding)).ok_or_else(|| {
                        backend_error(format!(
                            "draw with no matrix uploaded to @group({index}) @binding({binding})"
                        ))
                    })?;
                    let offset = base + position * self.uniform_alignment as usize;
                    bytes[offset..offset + MATRIX_SIZE as usize]
                        .copy_from_slice(bytemuck::bytes_of(&MatrixUniform::from(matrix)));
                }
            }
            *slot += 1;
        }

        for ((program, index), bytes) in contents {
            if let Some(GroupSlot::Uniforms(UniformGroup {
                arena: Some(arena), ..
            })) = self.programs.get(&program).and_then(|p| p.groups.get(index))
            {
                self.gpu.queue().write_buffer(&arena.buffer, 0, &bytes);
            }
        }
        Ok(())
    }

    /// Build missing texture bind groups for every draw
    fn prepare_texture_groups(&mut self, plan: &FramePlan) -> Result<()> {
        let device = self.gpu.device();
        for draw in &plan.draws {
            let entry = self
                .programs
                .get(&draw.program)
                .ok_or_else(|| backend_error(format!("unknown program {:?}", draw.program)))?;
            for (index, group_slot) in entry.groups.iter().enumerate() {
                let GroupSlot::Texture(group) = group_slot else {
                    continue;
                };
                let key = (index as u32, group.texture_binding);
                let texture_id = *draw.textures.get(&key).ok_or_else(|| {
                    backend_error(format!(
                        "draw with no texture bound to @group({}) @binding({})",
                        key.0, key.1
                    ))
                })?;
                let texture = self
                    .textures
                    .get_mut(&texture_id)
                    .ok_or_else(|| backend_error(format!("unknown texture {texture_id:?}")))?;

                texture
                    .bind_groups
                    .entry((draw.program, key.0))
                    .or_insert_with(|| {
                        let mut entries = vec![wgpu::BindGroupEntry {
                            binding: group.texture_binding,
                            resource: wgpu::BindingResource::TextureView(&texture.view),
                        }];
                        if let Some(binding) = group.sampler_binding {
                            entries.push(wgpu::BindGroupEntry {
                                binding,
                                resource: wgpu::BindingResource::Sampler(&self.sampler),
                            });
                        }
                        device.create_bind_group(&wgpu::BindGroupDescriptor {
                            label: Some("video texture bind group"),
                            layout: &group.layout,
                            entries: &entries,
                        })
                    });
            }
        }
        Ok(())
    }

    fn program(&self, program: ProgramId) -> Result<&ProgramEntry> {
        self.programs
            .get(&program)
            .ok_or_else(|| backend_error(format!("unknown program {program:?}")))
    }

    fn check_attribute(&self, entry: &ProgramEntry, draw: &PlannedDraw) -> Result<()> {
        let attribute = &draw.attribute;
        let stride = if attribute.stride == 0 {
            entry.vertex_stride
        } else {
            attribute.stride
        };
        if attribute.location != entry.vertex_location
            || attribute.components != entry.vertex_components
            || stride != entry.vertex_stride
        {
            return Err(backend_error(format!(
                "attribute layout @location({}) {}x f32 stride {} does not match the program input",
                attribute.location, attribute.components, attribute.stride
            )));
        }
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn create_program(
        &mut self,
        source: &ProgramSource<'_>,
        interface: &ProgramInterface,
    ) -> Result<ProgramId> {
        let [input] = interface.vertex_inputs.as_slice() else {
            return Err(backend_error(format!(
                "expected exactly one vertex input, found {}",
                interface.vertex_inputs.len()
            )));
        };
        let (format, components) = vertex_format(input.format).ok_or_else(|| {
            backend_error(format!("unsupported vertex input format for `{}`", input.name))
        })?;
        let vertex_stride = components * 4;

        let group_count = interface.resources.iter().map(|r| r.group + 1).max().unwrap_or(0);
        let mut groups = Vec::with_capacity(group_count as usize);
        for group in 0..group_count {
            let members: Vec<_> = interface.resources.iter().filter(|r| r.group == group).collect();
            if members.is_empty() {
                return Err(backend_error(format!("bind group indices skip @group({group})")));
            }
            groups.push(self.classify_group(group, &members)?);
        }

        let layouts: Vec<&wgpu::BindGroupLayout> = groups
            .iter()
            .map(|slot| match slot {
                GroupSlot::Uniforms(group) => &group.layout,
                GroupSlot::Texture(group) => &group.layout,
            })
            .collect();

        let target_format = self.target_format;
        let attributes = [wgpu::VertexAttribute {
            format,
            offset: 0,
            shader_location: input.location,
        }];

        let (strip, list) = self.scoped(
            wgpu::ErrorFilter::Validation,
            |device| {
                let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("split vertex shader"),
                    source: wgpu::ShaderSource::Wgsl(source.vertex.into()),
                });
                let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("split fragment shader"),
                    source: wgpu::ShaderSource::Wgsl(source.fragment.into()),
                });
                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("split pipeline layout"),
                    bind_group_layouts: &layouts,
                    push_constant_ranges: &[],
                });

                let pipeline = |topology: wgpu::PrimitiveTopology| {
                    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some("split pipeline"),
                        layout: Some(&pipeline_layout),
                        vertex: wgpu::VertexState {
                            module: &vertex_module,
                            entry_point: Some(interface.vertex_entry.as_str()),
                            buffers: &[wgpu::VertexBufferLayout {
                                array_stride: u64::from(vertex_stride),
                                step_mode: wgpu::VertexStepMode::Vertex,
                                attributes: &attributes,
                            }],
                            compilation_options: Default::default(),
                        },
                        fragment: Some(wgpu::FragmentState {
                            module: &fragment_module,
                            entry_point: Some(interface.fragment_entry.as_str()),
                            targets: &[Some(wgpu::ColorTargetState {
                                format: target_format,
                                blend: Some(wgpu::BlendState::REPLACE),
                                write_mask: wgpu::ColorWrites::ALL,
                            })],
                            compilation_options: Default::default(),
                        }),
                        primitive: wgpu::PrimitiveState {
                            topology,
                            strip_index_format: None,
                            front_face: wgpu::FrontFace::Ccw,
                            cull_mode: None,
                            polygon_mode: wgpu::PolygonMode::Fill,
                            unclipped_depth: false,
                            conservative: false,
                        },
                        depth_stencil: None,
                        multisample: wgpu::MultisampleState {
                            count: 1,
                            mask: !0,
                            alpha_to_coverage_enabled: false,
                        },
                        multiview: None,
                        cache: None,
                    })
                };
                (
                    pipeline(wgpu::PrimitiveTopology::TriangleStrip),
                    pipeline(wgpu::PrimitiveTopology::TriangleList),
                )
            },
            |err| backend_error(format!("pipeline creation failed: {err}")),
        )?;

        let program = ProgramId(self.next_id());
        self.programs.insert(
            program,
            ProgramEntry {
                strip,
                list,
                groups,
                vertex_location: input.location,
                vertex_components: components,
                vertex_stride,
            },
        );
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            warn!("delete of unknown program {program:?}");
        }
        for texture in self.textures.values_mut() {
            texture.bind_groups.retain(|(owner, _), _| *owner != program);
        }
    }

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<BufferId> {
        let buffer = self.scoped_allocation(|device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("unit quad"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            })
        })?;
        let id = BufferId(self.next_id());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn generate_textures(&mut self, count: usize) -> Result<Vec<TextureId>> {
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            match self.create_video_texture(1, 1) {
                Ok(pair) => created.push(pair),
                Err(err) => {
                    for (texture, _) in created {
                        texture.destroy();
                    }
                    return Err(err);
                }
            }
        }

        let mut ids = Vec::with_capacity(count);
        for (texture, view) in created {
            let id = TextureId(self.next_id());
            self.textures.insert(
                id,
                TextureEntry {
                    texture,
                    view,
                    width: 1,
                    height: 1,
                    bind_groups: HashMap::new(),
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(entry) = self.textures.remove(&texture) {
            entry.texture.destroy();
        }
    }

    fn upload_frame(&mut self, texture: TextureId, frame: &VideoFrame) -> Result<()> {
        let (width, height) = (frame.width(), frame.height());
        check_frame_size(width, height, self.max_texture_dimension)?;
        let needs_resize = {
            let entry = self
                .textures
                .get(&texture)
                .ok_or_else(|| backend_error(format!("upload into unknown texture {texture:?}")))?;
            entry.width != width || entry.height != height
        };

        if needs_resize {
            let (new_texture, view) = self.create_video_texture(width, height)?;
            if let Some(entry) = self.textures.get_mut(&texture) {
                entry.texture.destroy();
                entry.texture = new_texture;
                entry.view = view;
                entry.width = width;
                entry.height = height;
                entry.bind_groups.clear();
            }
        }

        let Some(entry) = self.textures.get(&texture) else {
            return Err(backend_error(format!("upload into unknown texture {texture:?}")));
        };
        self.gpu.queue().write_texture(
            entry.texture.as_image_copy(),
            frame.pixels(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn submit(&mut self, commands: &CommandList) -> Result<()> {
        let plan = FramePlan::build(commands)?;
        if self.target.is_none() {
            return Err(backend_error("no render target set"));
        }

        self.reserve_arenas(&plan);
        self.upload_matrices(&plan)?;
        self.prepare_texture_groups(&plan)?;

        let target = self
            .target
            .as_ref()
            .ok_or_else(|| backend_error("no render target set"))?;
        let load = match plan.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            }),
            None => wgpu::LoadOp::Load,
        };

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("split encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("split pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut slot_of_program: HashMap<ProgramId, u32> = HashMap::new();
            for draw in &plan.draws {
                let entry = self.program(draw.program)?;
                self.check_attribute(entry, draw)?;
                let slot = slot_of_program.entry(draw.program).or_default();

                render_pass.set_pipeline(entry.pipeline(draw.topology));
                if let Some(viewport) = draw.viewport {
                    let width = viewport.width.min(target.width.saturating_sub(viewport.x));
                    let height = viewport.height.min(target.height.saturating_sub(viewport.y));
                    render_pass.set_viewport(
                        viewport.x as f32,
                        viewport.y as f32,
                        width as f32,
                        height as f32,
                        0.0,
                        1.0,
                    );
                }

                for (index, group_slot) in entry.groups.iter().enumerate() {
                    match group_slot {
                        GroupSlot::Uniforms(group) => {
                            let arena = group.arena.as_ref().ok_or_else(|| {
                                backend_error(format!("no matrix arena for @group({index})"))
                            })?;
                            let offset = *slot * group.slot_stride as u32;
                            let offsets = vec![offset; group.bindings.len()];
                            render_pass.set_bind_group(index as u32, &arena.bind_group, &offsets);
                        }
                        GroupSlot::Texture(group) => {
                            let bind_group = draw
                                .textures
                                .get(&(index as u32, group.texture_binding))
                                .and_then(|id| self.textures.get(id))
                                .and_then(|texture| {
                                    texture.bind_groups.get(&(draw.program, index as u32))
                                })
                                .ok_or_else(|| {
                                    backend_error(format!("no texture bind group for @group({index})"))
                                })?;
                            render_pass.set_bind_group(index as u32, bind_group, &[]);
                        }
                    }
                }

                let buffer = self.buffers.get(&draw.attribute.buffer).ok_or_else(|| {
                    backend_error(format!("unknown vertex buffer {:?}", draw.attribute.buffer))
                })?;
                render_pass.set_vertex_buffer(0, buffer.slice(u64::from(draw.attribute.offset)..));
                render_pass.draw(draw.first..draw.first + draw.count, 0..1);
                *slot += 1;
            }
        }

        self.gpu.queue().submit(std::iter::once(encoder.finish()));
        debug!("submitted frame with {} draws", plan.draws.len());
        Ok(())
    }
}
