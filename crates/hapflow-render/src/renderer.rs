//! Frame Renderer - draws the current Hap frame as a textured quad
//!
//! Executes a [`DrawCommand`] with one of three pipelines: pass-through
//! sampling, YCoCg decode for Hap Q, or the solid placeholder.

use crate::backend::WgpuTexture;
use crate::program::{DrawCommand, ProgramKind, PLACEHOLDER_COLOR};
use bytemuck::{Pod, Zeroable};
use hapflow_core::Rect;
use std::sync::Arc;
use tracing::info;

/// Uniforms for frame drawing (matches hap_frame.wgsl)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
struct FrameUniforms {
    rect: [f32; 4],     // 16 bytes
    uv_scale: [f32; 2], // 8 bytes
    _padding: [f32; 2], // 8 bytes
    color: [f32; 4],    // 16 bytes (total 48 bytes)
}

impl FrameUniforms {
    fn for_command(command: &DrawCommand, viewport: &Rect) -> Self {
        let (uv_scale, color) = match command {
            DrawCommand::Placeholder { .. } => ([1.0, 1.0], PLACEHOLDER_COLOR),
            DrawCommand::Textured { uv_scale, .. } => (*uv_scale, [1.0; 4]),
        };
        Self {
            rect: command.rect().to_ndc(viewport),
            uv_scale,
            _padding: [0.0; 2],
            color,
        }
    }
}

/// Renders frames into a color target
pub struct FrameRenderer {
    device: Arc<wgpu::Device>,
    passthrough_pipeline: wgpu::RenderPipeline,
    ycocg_pipeline: wgpu::RenderPipeline,
    placeholder_pipeline: wgpu::RenderPipeline,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    last_uniforms: Option<FrameUniforms>,
    /// Bind group of the most recently drawn texture, keyed by texture id
    texture_bind_group: Option<(u64, wgpu::BindGroup)>,
}

impl FrameRenderer {
    pub fn new(device: Arc<wgpu::Device>, target_format: wgpu::TextureFormat) -> Self {
        info!("Creating frame renderer for {:?}", target_format);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Hap Frame Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Hap Frame Uniform Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Hap Frame Texture Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Hap Frame Uniform Buffer"),
            size: std::mem::size_of::<FrameUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Hap Frame Uniform Bind Group"),
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let shader_source = include_str!("../../../shaders/hap_frame.wgsl");
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Hap Frame Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let textured_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Hap Frame Pipeline Layout"),
            bind_group_layouts: &[&uniform_bind_group_layout, &texture_bind_group_layout],
            push_constant_ranges: &[],
        });
        let placeholder_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Hap Placeholder Pipeline Layout"),
            bind_group_layouts: &[&uniform_bind_group_layout],
            push_constant_ranges: &[],
        });

        let build = |label: &str, layout: &wgpu::PipelineLayout, fragment: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &shader_module,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader_module,
                    entry_point: Some(fragment),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
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

        let passthrough_pipeline = build(
            "Hap Passthrough Pipeline",
            &textured_layout,
            ProgramKind::Passthrough.fragment_entry_point(),
        );
        let ycocg_pipeline = build(
            "Hap Q YCoCg Pipeline",
            &textured_layout,
            ProgramKind::YCoCgDecode.fragment_entry_point(),
        );
        let placeholder_pipeline = build(
            "Hap Placeholder Pipeline",
            &placeholder_layout,
            "fs_placeholder",
        );

        Self {
            device,
            passthrough_pipeline,
            ycocg_pipeline,
            placeholder_pipeline,
            texture_bind_group_layout,
            uniform_buffer,
            uniform_bind_group,
            sampler,
            last_uniforms: None,
            texture_bind_group: None,
        }
    }

    /// Record `command` into a render pass over `target`.
    ///
    /// `viewport` is the target's extent in pixels. A textured command
    /// without a texture falls back to the placeholder.
    pub fn draw(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        viewport: Rect,
        command: &DrawCommand,
        texture: Option<&WgpuTexture>,
    ) {
        let command = match (command, texture) {
            (DrawCommand::Textured { .. }, None) => DrawCommand::Placeholder { rect: viewport },
            _ => *command,
        };

        let uniforms = FrameUniforms::for_command(&command, &viewport);
        if self.last_uniforms != Some(uniforms) {
            queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
            self.last_uniforms = Some(uniforms);
        }

        if let (DrawCommand::Textured { .. }, Some(texture)) = (&command, texture) {
            self.prepare_texture(texture);
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Hap Frame Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if command.rect().is_empty() {
            return;
        }

        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        match command {
            DrawCommand::Placeholder { .. } => {
                pass.set_pipeline(&self.placeholder_pipeline);
            }
            DrawCommand::Textured { program, .. } => {
                let Some((_, bind_group)) = &self.texture_bind_group else {
                    return;
                };
                pass.set_pipeline(match program {
                    ProgramKind::Passthrough => &self.passthrough_pipeline,
                    ProgramKind::YCoCgDecode => &self.ycocg_pipeline,
                });
                pass.set_bind_group(1, bind_group, &[]);
            }
        }
        pass.draw(0..6, 0..1);
    }

    fn prepare_texture(&mut self, texture: &WgpuTexture) {
        if matches!(&self.texture_bind_group, Some((id, _)) if *id == texture.id) {
            return;
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Hap Frame Texture Bind Group"),
            layout: &self.texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.texture_bind_group = Some((texture.id, bind_group));
    }
}
