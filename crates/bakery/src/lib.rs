//! Offline GPU baking for shader assets.
//!
//! Three batch bakers share one headless device abstraction:
//!
//! ```text
//!   ShaderRef ──▶ SourceProvider ──▶ GpuDevice::compile_render ──┐
//!                                                                ├─▶ draw/dispatch ─▶ Readback ─▶ convert ─▶ RgbaImage
//!   compute id ─▶ SourceProvider ──▶ GpuDevice::compile_compute ─┘
//! ```
//!
//! * [`bake_imposter`] renders one view per [`OrbitSampler`] sample and
//!   composites the views into an [`Atlas`] (optionally a second normal atlas).
//! * [`FrameSequence`] renders a fragment shader at evenly spaced `u_time`s.
//! * [`compute_bake`] seeds two storage buffers and reads the output back as
//!   an image.
//!
//! For interactive work a [`PreviewSession`] owns a device plus a
//! [`HotReloadController`]; a [`ShaderWatcher`] posts change signals into the
//! controller's inbox and the session swaps programs between frames.

mod atlas;
mod compute;
mod convert;
mod error;
pub mod gpu;
mod imposter;
mod orbit;
mod preview;
mod reload;
mod sequence;
mod types;
mod watch;

#[cfg(test)]
mod testing;

pub use atlas::Atlas;
pub use compute::{
    compute_bake, compute_bake_wgpu, compute_params, run_compute, INPUT_SLOT, OUTPUT_SLOT,
    WORKGROUPS,
};
pub use convert::{convert, to_byte};
pub use error::{BakeError, CompileError, ConversionError, GpuError, SamplingError};
pub use gpu::{
    AdapterSummary, ComputeSource, GpuDevice, Readback, RenderSource, ShaderProgram, UniformValue,
    WgpuDevice,
};
pub use imposter::{bake_imposter, bake_imposter_wgpu, ImposterAtlases, ImposterParams};
pub use orbit::{Cell, OrbitSampler, Sample, Samples};
pub use preview::{orbit_camera, PreviewSession, PreviewStep, FOCUS};
pub use reload::{
    build_program, CompileStrategy, HotReloadController, ProgramId, ReloadOutcome, ReloadState,
};
pub use sequence::{sequence_wgpu, FrameSequence, SequenceParams};
pub use types::{
    DeviceOptions, GpuPowerPreference, LoadedProgram, ProgramSource, ShaderRef, TargetLayout,
    U_CAMPOS, U_DRAWBG, U_FOCUS, U_HEIGHT, U_TIME, U_WIDTH,
};
pub use watch::{inbox, is_relevant, post, ShaderWatcher, WatchError, WatchEvent};

pub use shadersource::{
    FileSourceProvider, MemorySourceProvider, SourceError, SourceParams, SourceProvider,
};
