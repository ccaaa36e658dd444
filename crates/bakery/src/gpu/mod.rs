//! GPU seam shared by every baker.
//!
//! - `compile` normalises desktop-style GLSL into Vulkan GLSL 450 with one
//!   std140 uniform block.
//! - `uniforms` keeps the CPU shadow of that block and its std140 layout.
//! - `reflect` runs the naga front end for diagnostics and storage bindings.
//! - `pipeline` turns prepared sources into wgpu render/compute pipelines.
//! - `target` owns offscreen colour targets, the baking quad and readback.
//! - `context` is the headless [`WgpuDevice`] tying the pieces together.
//!
//! Bakers only talk to the [`GpuDevice`] trait so they can be exercised
//! against an in-memory device in tests.

mod compile;
mod context;
mod pipeline;
mod reflect;
mod target;
mod uniforms;

pub use compile::{BUILTIN_VERTEX_ID, BUILTIN_VERTEX_SHADER};
pub use context::{AdapterSummary, WgpuDevice};
pub use pipeline::{WgpuCompiler, WgpuProgram};
pub use target::{WgpuStorage, WgpuTargets};
pub use uniforms::{UniformKind, UniformLayout, UniformValue};

pub(crate) use compile::prepare_render;
pub(crate) use uniforms::UniformBlock;

use crate::error::{CompileError, GpuError};

/// Vertex + fragment sources ready for compilation.
#[derive(Debug, Clone)]
pub struct RenderSource {
    pub vertex_id: String,
    pub vertex: String,
    pub fragment_id: String,
    pub fragment: String,
    /// Number of colour outputs the fragment stage writes.
    pub color_targets: u32,
}

/// Compute source ready for compilation.
#[derive(Debug, Clone)]
pub struct ComputeSource {
    pub id: String,
    pub source: String,
}

/// Raw float texels read back from the device, rows bottom-up.
#[derive(Debug, Clone, PartialEq)]
pub struct Readback {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub texels: Vec<f32>,
}

/// A compiled program and its uniform slots.
pub trait ShaderProgram {
    fn label(&self) -> &str;

    /// Whether the program declares `name` in its uniform block.
    fn has_uniform(&self, name: &str) -> bool;

    /// Best-effort uniform write; returns `false` when nothing was written.
    fn set_uniform(&mut self, name: &str, value: UniformValue) -> bool;
}

/// Compiles programs for one device. Cloneable so compilation can move to a
/// worker thread while the device keeps drawing.
pub trait ProgramCompiler: Clone + Send + 'static {
    type Program: ShaderProgram + Send + 'static;

    fn compile_render(&self, source: &RenderSource) -> Result<Self::Program, CompileError>;

    fn compile_compute(&self, source: &ComputeSource) -> Result<Self::Program, CompileError>;
}

/// Offscreen rendering and compute operations the bakers rely on.
pub trait GpuDevice {
    type Compiler: ProgramCompiler;
    type Targets;
    type Storage;

    fn compiler(&self) -> Self::Compiler;

    fn compile_render(
        &self,
        source: &RenderSource,
    ) -> Result<<Self::Compiler as ProgramCompiler>::Program, CompileError> {
        self.compiler().compile_render(source)
    }

    fn compile_compute(
        &self,
        source: &ComputeSource,
    ) -> Result<<Self::Compiler as ProgramCompiler>::Program, CompileError> {
        self.compiler().compile_compute(source)
    }

    /// Creates `count` RGBA32F colour targets of `width x height`.
    fn create_targets(
        &mut self,
        width: u32,
        height: u32,
        count: u32,
    ) -> Result<Self::Targets, GpuError>;

    /// Draws the baking quad once into every target.
    fn draw(
        &mut self,
        program: &mut <Self::Compiler as ProgramCompiler>::Program,
        targets: &Self::Targets,
    ) -> Result<(), GpuError>;

    /// Blocking readback of one target.
    fn read_target(&mut self, targets: &Self::Targets, index: usize) -> Result<Readback, GpuError>;

    fn create_storage(&mut self, data: &[f32]) -> Result<Self::Storage, GpuError>;

    /// Attaches `storage` to storage binding `slot` for subsequent dispatches.
    fn bind_storage(&mut self, storage: &Self::Storage, slot: u32) -> Result<(), GpuError>;

    fn dispatch(
        &mut self,
        program: &mut <Self::Compiler as ProgramCompiler>::Program,
        workgroups: [u32; 3],
    ) -> Result<(), GpuError>;

    fn read_storage(&mut self, storage: &Self::Storage) -> Result<Vec<f32>, GpuError>;
}

/// Program type produced by a device's compiler.
pub type Program<D> = <<D as GpuDevice>::Compiler as ProgramCompiler>::Program;
