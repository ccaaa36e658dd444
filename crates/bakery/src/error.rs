use shadersource::SourceError;
use thiserror::Error;

/// Shader compilation or pipeline creation failed.
#[derive(Debug, Clone, Error)]
#[error("failed to compile shader '{source_id}': {message}")]
pub struct CompileError {
    pub source_id: String,
    pub message: String,
}

impl CompileError {
    pub fn new(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("expected 4 channels per texel, got {0}")]
    Channels(u32),

    #[error("buffer holds {actual} floats but {width}x{height}x4 needs {expected}")]
    Shape {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SamplingError {
    #[error("orbit needs at least one row")]
    ZeroRows,

    #[error("orbit distance must be positive and finite, got {0}")]
    Distance(f64),

    #[error("resolution {resolution} is too small for {n_row} rows")]
    CellTooSmall { resolution: u32, n_row: u32 },
}

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("buffer mapping failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("buffer mapping callback was dropped")]
    MapChannelClosed,

    #[error("GPU validation error: {0}")]
    Validation(String),

    #[error("target index {index} out of range ({count} targets)")]
    TargetIndex { index: usize, count: usize },

    #[error("target size {width}x{height} exceeds device limit {max}")]
    TargetTooLarge { width: u32, height: u32, max: u32 },

    #[error("no storage buffer bound to slot {0}")]
    UnboundStorage(u32),

    #[error("program '{label}' is not a {expected} program")]
    WrongProgram { label: String, expected: &'static str },
}

/// Everything a bake job can fail with.
#[derive(Debug, Error)]
pub enum BakeError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Sampling(#[from] SamplingError),

    #[error("failed to load shader '{id}': {source}")]
    Source {
        id: String,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("output size {width}x{height} is empty")]
    InvalidSize { width: u32, height: u32 },

    #[error("compile worker exited without a result")]
    WorkerLost,
}

impl BakeError {
    pub(crate) fn loading(id: &str) -> impl FnOnce(SourceError) -> Self + '_ {
        move |source| BakeError::Source {
            id: id.to_owned(),
            source,
        }
    }
}
