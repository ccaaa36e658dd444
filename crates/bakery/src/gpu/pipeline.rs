use std::borrow::Cow;

use tracing::debug;
use wgpu::naga::ShaderStage;

use crate::error::CompileError;

use super::compile::{prepare_compute, prepare_render};
use super::reflect::{parse_stage, storage_bindings, StorageBinding};
use super::target::quad_vertex_layout;
use super::uniforms::{UniformBlock, UniformLayout, UniformValue};
use super::{ComputeSource, ProgramCompiler, RenderSource, ShaderProgram};

/// Compiles programs against one wgpu device.
#[derive(Clone)]
pub struct WgpuCompiler {
    device: wgpu::Device,
    target_format: wgpu::TextureFormat,
}

pub(crate) enum PipelineKind {
    Render(wgpu::RenderPipeline),
    Compute {
        pipeline: wgpu::ComputePipeline,
        storage_layout: Option<wgpu::BindGroupLayout>,
        storage: Vec<StorageBinding>,
    },
}

/// Uniform buffer plus its bind group, present when the program declares
/// any hoisted uniforms.
pub(crate) struct UniformBinding {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

/// A compiled render or compute pipeline with its uniform shadow.
pub struct WgpuProgram {
    pub(crate) label: String,
    pub(crate) kind: PipelineKind,
    pub(crate) uniforms: UniformBlock,
    pub(crate) uniform_binding: Option<UniformBinding>,
}

impl ShaderProgram for WgpuProgram {
    fn label(&self) -> &str {
        &self.label
    }

    fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.has(name)
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> bool {
        self.uniforms.set(name, value)
    }
}

impl WgpuCompiler {
    pub(crate) fn new(device: wgpu::Device, target_format: wgpu::TextureFormat) -> Self {
        Self {
            device,
            target_format,
        }
    }

    /// Runs `build` inside a validation scope so pipeline errors come back as
    /// values instead of reaching the uncaptured error handler.
    fn scoped<T>(&self, source_id: &str, build: impl FnOnce() -> T) -> Result<T, CompileError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = build();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(CompileError::new(source_id, err.to_string())),
            None => Ok(value),
        }
    }

    fn uniform_binding(&self, layout: &UniformLayout) -> Option<(wgpu::BindGroupLayout, UniformBinding)> {
        if layout.is_empty() {
            return None;
        }

        let bind_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("bake uniform layout"),
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
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bake uniforms"),
            size: u64::from(layout.size()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bake uniform bind group"),
            layout: &bind_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Some((bind_layout, UniformBinding { buffer, bind_group }))
    }

    fn shader_module(&self, label: &str, source: String, stage: ShaderStage) -> wgpu::ShaderModule {
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(source),
                stage,
                defines: &[],
            },
        })
    }
}

impl ProgramCompiler for WgpuCompiler {
    type Program = WgpuProgram;

    fn compile_render(&self, source: &RenderSource) -> Result<WgpuProgram, CompileError> {
        let prepared = prepare_render(&source.vertex, &source.fragment)
            .map_err(|message| CompileError::new(&source.fragment_id, message))?;

        // parse up front for readable diagnostics; wgpu only reports a summary
        parse_stage(&prepared.vertex, ShaderStage::Vertex)
            .map_err(|message| CompileError::new(&source.vertex_id, message))?;
        parse_stage(&prepared.fragment, ShaderStage::Fragment)
            .map_err(|message| CompileError::new(&source.fragment_id, message))?;

        let uniform_binding = self.uniform_binding(&prepared.uniforms);
        let targets: Vec<Option<wgpu::ColorTargetState>> = (0..source.color_targets.max(1))
            .map(|_| {
                Some(wgpu::ColorTargetState {
                    format: self.target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let pipeline = self.scoped(&source.fragment_id, || {
            let vertex_module =
                self.shader_module(&source.vertex_id, prepared.vertex, ShaderStage::Vertex);
            let fragment_module =
                self.shader_module(&source.fragment_id, prepared.fragment, ShaderStage::Fragment);

            let bind_group_layouts: Vec<&wgpu::BindGroupLayout> = uniform_binding
                .iter()
                .map(|(layout, _)| layout)
                .collect();
            let pipeline_layout = self
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("bake pipeline layout"),
                    bind_group_layouts: &bind_group_layouts,
                    push_constant_ranges: &[],
                });

            self.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(source.fragment_id.as_str()),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &vertex_module,
                        entry_point: Some("main"),
                        buffers: &[quad_vertex_layout()],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        strip_index_format: None,
                        front_face: wgpu::FrontFace::Ccw,
                        cull_mode: None,
                        polygon_mode: wgpu::PolygonMode::Fill,
                        unclipped_depth: false,
                        conservative: false,
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    fragment: Some(wgpu::FragmentState {
                        module: &fragment_module,
                        entry_point: Some("main"),
                        targets: &targets,
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    }),
                    multiview: None,
                    cache: None,
                })
        })?;

        debug!(
            vertex = %source.vertex_id,
            fragment = %source.fragment_id,
            uniforms = prepared.uniforms.size(),
            targets = source.color_targets,
            "compiled render program"
        );

        Ok(WgpuProgram {
            label: source.fragment_id.clone(),
            kind: PipelineKind::Render(pipeline),
            uniforms: UniformBlock::new(prepared.uniforms),
            uniform_binding: uniform_binding.map(|(_, binding)| binding),
        })
    }

    fn compile_compute(&self, source: &ComputeSource) -> Result<WgpuProgram, CompileError> {
        let prepared = prepare_compute(&source.source);
        let module = parse_stage(&prepared, ShaderStage::Compute)
            .map_err(|message| CompileError::new(&source.id, message))?;
        let storage = storage_bindings(&module);

        let (pipeline, storage_layout) = self.scoped(&source.id, || {
            let storage_layout = (!storage.is_empty()).then(|| {
                let entries: Vec<wgpu::BindGroupLayoutEntry> = storage
                    .iter()
                    .map(|binding| wgpu::BindGroupLayoutEntry {
                        binding: binding.slot,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage {
                                read_only: binding.read_only,
                            },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    })
                    .collect();
                self.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("bake storage layout"),
                        entries: &entries,
                    })
            });
            let pipeline_layout = self
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("bake compute layout"),
                    bind_group_layouts: &storage_layout.iter().collect::<Vec<_>>(),
                    push_constant_ranges: &[],
                });
            let module = self.shader_module(&source.id, prepared, ShaderStage::Compute);
            let pipeline = self
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(source.id.as_str()),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some("main"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                });
            (pipeline, storage_layout)
        })?;

        debug!(compute = %source.id, storage_slots = storage.len(), "compiled compute program");

        Ok(WgpuProgram {
            label: source.id.clone(),
            kind: PipelineKind::Compute {
                pipeline,
                storage_layout,
                storage,
            },
            uniforms: UniformBlock::new(UniformLayout::default()),
            uniform_binding: None,
        })
    }
}
