use shadersource::SourceProvider;
use tracing::{debug, info, warn};

use crate::atlas::Atlas;
use crate::convert::convert;
use crate::error::{BakeError, SamplingError};
use crate::gpu::{GpuDevice, ShaderProgram, WgpuDevice};
use crate::orbit::OrbitSampler;
use crate::types::{DeviceOptions, ShaderRef, TargetLayout, U_CAMPOS, U_DRAWBG};

/// Geometry of an imposter bake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImposterParams {
    /// Edge length of the square atlas in pixels.
    pub resolution: u32,
    /// Cells per atlas row and column.
    pub n_row: u32,
    /// Orbit radius of the camera.
    pub distance: f64,
    pub targets: TargetLayout,
}

impl Default for ImposterParams {
    fn default() -> Self {
        Self {
            resolution: 2048,
            n_row: 9,
            distance: 10.0,
            targets: TargetLayout::Single,
        }
    }
}

impl ImposterParams {
    /// Pixel size of one cell.
    pub fn cell_size(&self) -> Result<u32, SamplingError> {
        if self.n_row == 0 {
            return Err(SamplingError::ZeroRows);
        }
        match self.resolution / self.n_row {
            0 => Err(SamplingError::CellTooSmall {
                resolution: self.resolution,
                n_row: self.n_row,
            }),
            cell => Ok(cell),
        }
    }
}

/// Finished atlases of one bake.
#[derive(Debug, Clone, PartialEq)]
pub struct ImposterAtlases {
    pub albedo: Atlas,
    /// Present for [`TargetLayout::AlbedoNormal`] bakes.
    pub normal: Option<Atlas>,
}

/// Renders one view per orbit sample and composites them into atlases.
pub fn bake_imposter<D, P>(
    device: &mut D,
    provider: &P,
    shaders: &ShaderRef,
    params: &ImposterParams,
) -> Result<ImposterAtlases, BakeError>
where
    D: GpuDevice,
    P: SourceProvider + ?Sized,
{
    let sampler = OrbitSampler::new(params.n_row, params.distance)?;
    let cell = params.cell_size()?;
    let count = params.targets.count();

    let source = shaders.load(provider, count)?;
    let mut program = device.compile_render(&source)?;

    if program.has_uniform(U_DRAWBG) {
        program.set_uniform(U_DRAWBG, (params.targets == TargetLayout::AlbedoNormal).into());
    }
    if !program.has_uniform(U_CAMPOS) {
        warn!(shader = %shaders.fragment, "shader does not declare {U_CAMPOS}; every cell renders the same view");
    }

    let targets = device.create_targets(cell, cell, count)?;
    let mut atlases: Vec<Atlas> = (0..count)
        .map(|_| Atlas::new(params.resolution, params.n_row))
        .collect();
    debug!(
        resolution = params.resolution,
        n_row = params.n_row,
        cell,
        targets = count,
        "baking imposter"
    );

    for sample in sampler.samples() {
        program.set_uniform(U_CAMPOS, sample.position.into());
        device.draw(&mut program, &targets)?;
        for (index, atlas) in atlases.iter_mut().enumerate() {
            let readback = device.read_target(&targets, index)?;
            atlas.paste(sample.cell, &convert(&readback)?);
        }
    }

    info!(shader = %shaders.fragment, samples = sampler.len(), "imposter bake complete");

    let mut atlases = atlases.into_iter();
    let albedo = atlases
        .next()
        .unwrap_or_else(|| Atlas::new(params.resolution, params.n_row));
    Ok(ImposterAtlases {
        albedo,
        normal: atlases.next(),
    })
}

/// [`bake_imposter`] on a freshly opened headless device.
pub fn bake_imposter_wgpu<P>(
    options: &DeviceOptions,
    provider: &P,
    shaders: &ShaderRef,
    params: &ImposterParams,
) -> Result<ImposterAtlases, BakeError>
where
    P: SourceProvider + ?Sized,
{
    let mut device = WgpuDevice::headless(options)?;
    bake_imposter(&mut device, provider, shaders, params)
}
