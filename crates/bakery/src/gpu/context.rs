use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::GpuError;
use crate::types::{DeviceOptions, GpuPowerPreference};

use super::pipeline::{PipelineKind, UniformBinding, WgpuCompiler, WgpuProgram};
use super::target::{select_target_format, QuadMesh, WgpuStorage, WgpuTargets, TARGET_FORMATS};
use super::uniforms::UniformBlock;
use super::{GpuDevice, Readback};

/// Identity of the adapter a device was opened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSummary {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl AdapterSummary {
    fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

/// Headless wgpu device used by every baker.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter: AdapterSummary,
    max_dimension: u32,
    target_format: wgpu::TextureFormat,
    quad: QuadMesh,
    storage_slots: BTreeMap<u32, wgpu::Buffer>,
}

impl WgpuDevice {
    /// Opens a device without any surface.
    pub fn headless(options: &DeviceOptions) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match options.power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: options.force_fallback_adapter,
        }))?;

        let adapter_summary = AdapterSummary::from_wgpu(&adapter.get_info());
        let limits = adapter.limits();
        debug!(
            name = %adapter_summary.name,
            backend = ?adapter_summary.backend,
            device_type = ?adapter_summary.device_type,
            is_software = adapter_summary.is_software(),
            "selected GPU adapter"
        );

        let target_format = select_target_format(|format| {
            adapter.get_texture_format_features(format).allowed_usages
        })
        .unwrap_or_else(|| {
            warn!(
                adapter = %adapter_summary.name,
                "no renderable float target format; render bakes will fail"
            );
            TARGET_FORMATS[0]
        });
        debug!(?target_format, "selected bake target format");

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("shaderbake device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;

        let quad = QuadMesh::new(&device);
        Ok(Self {
            device,
            queue,
            adapter: adapter_summary,
            max_dimension: limits.max_texture_dimension_2d,
            target_format,
            quad,
            storage_slots: BTreeMap::new(),
        })
    }

    pub fn adapter(&self) -> &AdapterSummary {
        &self.adapter
    }

    /// Format of the colour targets this device renders into.
    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    fn upload_uniforms(&self, uniforms: &mut UniformBlock, binding: Option<&UniformBinding>) {
        if !uniforms.take_dirty() {
            return;
        }
        if let Some(binding) = binding {
            self.queue.write_buffer(&binding.buffer, 0, uniforms.bytes());
        }
    }

    /// Records one command buffer, submits it and waits for the queue.
    fn submit_scoped(
        &self,
        encode: impl FnOnce(&mut wgpu::CommandEncoder) -> Result<(), GpuError>,
    ) -> Result<(), GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bake encoder"),
            });
        let encoded = encode(&mut encoder);
        if encoded.is_ok() {
            self.queue.submit(Some(encoder.finish()));
        }
        let scope = pollster::block_on(self.device.pop_error_scope());
        encoded?;
        if let Some(err) = scope {
            return Err(GpuError::Validation(err.to_string()));
        }
        self.device.poll(wgpu::PollType::Wait)?;
        Ok(())
    }
}

impl GpuDevice for WgpuDevice {
    type Compiler = WgpuCompiler;
    type Targets = WgpuTargets;
    type Storage = WgpuStorage;

    fn compiler(&self) -> WgpuCompiler {
        WgpuCompiler::new(self.device.clone(), self.target_format)
    }

    fn create_targets(&mut self, width: u32, height: u32, count: u32) -> Result<WgpuTargets, GpuError> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(GpuError::TargetTooLarge {
                width,
                height,
                max: self.max_dimension,
            });
        }
        debug!(width, height, count, "creating bake targets");
        Ok(WgpuTargets::new(&self.device, self.target_format, width, height, count))
    }

    fn draw(&mut self, program: &mut WgpuProgram, targets: &WgpuTargets) -> Result<(), GpuError> {
        let PipelineKind::Render(pipeline) = &program.kind else {
            return Err(GpuError::WrongProgram {
                label: program.label.clone(),
                expected: "render",
            });
        };
        self.upload_uniforms(&mut program.uniforms, program.uniform_binding.as_ref());

        let uniform_binding = program.uniform_binding.as_ref();
        self.submit_scoped(|encoder| {
            let attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = targets
                .views
                .iter()
                .map(|view| {
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
                .collect();

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("bake pass"),
                color_attachments: &attachments,
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            if let Some(binding) = uniform_binding {
                pass.set_bind_group(0, &binding.bind_group, &[]);
            }
            pass.set_vertex_buffer(0, self.quad.vertices.slice(..));
            pass.set_index_buffer(self.quad.indices.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..QuadMesh::INDEX_COUNT, 0, 0..1);
            Ok(())
        })
    }

    fn read_target(&mut self, targets: &WgpuTargets, index: usize) -> Result<Readback, GpuError> {
        let texture = targets.texture(index)?;
        self.submit_scoped(|encoder| {
            targets.encode_copy(encoder, texture);
            Ok(())
        })?;
        Ok(Readback {
            width: targets.width,
            height: targets.height,
            channels: 4,
            texels: targets.read_staging(&self.device)?,
        })
    }

    fn create_storage(&mut self, data: &[f32]) -> Result<WgpuStorage, GpuError> {
        Ok(WgpuStorage::new(&self.device, data))
    }

    fn bind_storage(&mut self, storage: &WgpuStorage, slot: u32) -> Result<(), GpuError> {
        self.storage_slots.insert(slot, storage.buffer.clone());
        Ok(())
    }

    fn dispatch(&mut self, program: &mut WgpuProgram, workgroups: [u32; 3]) -> Result<(), GpuError> {
        let PipelineKind::Compute {
            pipeline,
            storage_layout,
            storage,
        } = &program.kind
        else {
            return Err(GpuError::WrongProgram {
                label: program.label.clone(),
                expected: "compute",
            });
        };

        let bind_group = match storage_layout {
            Some(layout) => {
                let mut entries = Vec::with_capacity(storage.len());
                for binding in storage {
                    let buffer = self
                        .storage_slots
                        .get(&binding.slot)
                        .ok_or(GpuError::UnboundStorage(binding.slot))?;
                    entries.push(wgpu::BindGroupEntry {
                        binding: binding.slot,
                        resource: buffer.as_entire_binding(),
                    });
                }
                Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("bake storage bind group"),
                    layout,
                    entries: &entries,
                }))
            }
            None => None,
        };

        let [x, y, z] = workgroups;
        debug!(program = %program.label, x, y, z, "dispatching compute");
        self.submit_scoped(|encoder| {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("bake compute pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            if let Some(bind_group) = &bind_group {
                pass.set_bind_group(0, bind_group, &[]);
            }
            pass.dispatch_workgroups(x, y, z);
            Ok(())
        })
    }

    fn read_storage(&mut self, storage: &WgpuStorage) -> Result<Vec<f32>, GpuError> {
        self.submit_scoped(|encoder| {
            storage.encode_copy(encoder);
            Ok(())
        })?;
        storage.read_staging(&self.device)
    }
}
