//! In-memory [`GpuDevice`] for exercising the bakers without an adapter.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::error::{CompileError, GpuError};
use crate::gpu::{
    prepare_render, ComputeSource, GpuDevice, ProgramCompiler, Readback, RenderSource,
    ShaderProgram, UniformBlock, UniformLayout, UniformValue,
};

/// Any source containing this marker fails to compile.
pub(crate) const BROKEN: &str = "#error";

#[derive(Debug)]
pub(crate) struct FakeProgram {
    pub label: String,
    pub uniforms: UniformBlock,
    pub compute: bool,
}

impl ShaderProgram for FakeProgram {
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

/// Records every source it compiles.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeCompiler {
    pub compiled: Arc<Mutex<Vec<String>>>,
}

impl ProgramCompiler for FakeCompiler {
    type Program = FakeProgram;

    fn compile_render(&self, source: &RenderSource) -> Result<FakeProgram, CompileError> {
        if source.fragment.contains(BROKEN) {
            return Err(CompileError::new(&source.fragment_id, "syntax error"));
        }
        let prepared = prepare_render(&source.vertex, &source.fragment)
            .map_err(|message| CompileError::new(&source.fragment_id, message))?;
        self.compiled.lock().unwrap().push(source.fragment.clone());
        Ok(FakeProgram {
            label: source.fragment_id.clone(),
            uniforms: UniformBlock::new(prepared.uniforms),
            compute: false,
        })
    }

    fn compile_compute(&self, source: &ComputeSource) -> Result<FakeProgram, CompileError> {
        if source.source.contains(BROKEN) {
            return Err(CompileError::new(&source.id, "syntax error"));
        }
        self.compiled.lock().unwrap().push(source.source.clone());
        Ok(FakeProgram {
            label: source.id.clone(),
            uniforms: UniformBlock::new(UniformLayout::default()),
            compute: true,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FakeTargets {
    width: u32,
    height: u32,
    count: u32,
}

/// Fills every draw with the next palette colour; target 1 receives the
/// inverted colour so dual-target bakes can be told apart.
#[derive(Debug, Default)]
pub(crate) struct FakeDevice {
    pub compiler: FakeCompiler,
    pub palette: Vec<[f32; 4]>,
    /// Uniform state captured at each draw.
    pub draws: Vec<UniformBlock>,
    pub dispatches: Vec<[u32; 3]>,
    pub storage: Vec<Vec<f32>>,
    slots: BTreeMap<u32, usize>,
    fill: Option<[f32; 4]>,
}

impl FakeDevice {
    pub fn with_palette(palette: Vec<[f32; 4]>) -> Self {
        Self {
            palette,
            ..Self::default()
        }
    }

    pub fn recorded(&self, name: &str) -> Vec<Option<UniformValue>> {
        self.draws.iter().map(|block| block.value(name)).collect()
    }
}

impl GpuDevice for FakeDevice {
    type Compiler = FakeCompiler;
    type Targets = FakeTargets;
    type Storage = usize;

    fn compiler(&self) -> FakeCompiler {
        self.compiler.clone()
    }

    fn create_targets(&mut self, width: u32, height: u32, count: u32) -> Result<FakeTargets, GpuError> {
        Ok(FakeTargets {
            width,
            height,
            count,
        })
    }

    fn draw(&mut self, program: &mut FakeProgram, _targets: &FakeTargets) -> Result<(), GpuError> {
        if program.compute {
            return Err(GpuError::WrongProgram {
                label: program.label.clone(),
                expected: "render",
            });
        }
        let colour = if self.palette.is_empty() {
            [0.5; 4]
        } else {
            self.palette[self.draws.len() % self.palette.len()]
        };
        self.fill = Some(colour);
        self.draws.push(program.uniforms.clone());
        Ok(())
    }

    fn read_target(&mut self, targets: &FakeTargets, index: usize) -> Result<Readback, GpuError> {
        if index >= targets.count as usize {
            return Err(GpuError::TargetIndex {
                index,
                count: targets.count as usize,
            });
        }
        let [r, g, b, a] = self.fill.unwrap_or([0.0; 4]);
        let texel = if index == 0 {
            [r, g, b, a]
        } else {
            [1.0 - r, 1.0 - g, 1.0 - b, a]
        };
        let texels = (0..targets.width * targets.height)
            .flat_map(|_| texel)
            .collect();
        Ok(Readback {
            width: targets.width,
            height: targets.height,
            channels: 4,
            texels,
        })
    }

    fn create_storage(&mut self, data: &[f32]) -> Result<usize, GpuError> {
        self.storage.push(data.to_vec());
        Ok(self.storage.len() - 1)
    }

    fn bind_storage(&mut self, storage: &usize, slot: u32) -> Result<(), GpuError> {
        self.slots.insert(slot, *storage);
        Ok(())
    }

    /// Copies slot 0 into slot 1.
    fn dispatch(&mut self, program: &mut FakeProgram, workgroups: [u32; 3]) -> Result<(), GpuError> {
        if !program.compute {
            return Err(GpuError::WrongProgram {
                label: program.label.clone(),
                expected: "compute",
            });
        }
        let input = *self.slots.get(&0).ok_or(GpuError::UnboundStorage(0))?;
        let output = *self.slots.get(&1).ok_or(GpuError::UnboundStorage(1))?;
        self.storage[output] = self.storage[input].clone();
        self.dispatches.push(workgroups);
        Ok(())
    }

    fn read_storage(&mut self, storage: &usize) -> Result<Vec<f32>, GpuError> {
        Ok(self.storage[*storage].clone())
    }
}
