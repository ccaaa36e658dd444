use image::RgbaImage;
use rand::Rng;
use shadersource::{SourceParams, SourceProvider};
use tracing::{debug, info};

use crate::convert::convert;
use crate::error::BakeError;
use crate::gpu::{ComputeSource, GpuDevice, Program, Readback, WgpuDevice};
use crate::types::DeviceOptions;

/// Workgroup counts of every dispatch, also substituted as `%X`, `%Y`, `%Z`.
pub const WORKGROUPS: [u32; 3] = [1024, 1, 1];

/// Storage slot seeded with random input.
pub const INPUT_SLOT: u32 = 0;
/// Storage slot read back as the output image.
pub const OUTPUT_SLOT: u32 = 1;

/// Substitution parameters for a compute shader producing `width x height`.
pub fn compute_params(width: u32, height: u32) -> SourceParams {
    let [x, y, z] = WORKGROUPS;
    shadersource::params([
        ("X", x),
        ("Y", y),
        ("Z", z),
        ("WIDTH", width),
        ("HEIGHT", height),
    ])
}

/// Resolves, compiles and runs one compute shader.
pub fn compute_bake<D, P>(
    device: &mut D,
    provider: &P,
    id: &str,
    width: u32,
    height: u32,
) -> Result<RgbaImage, BakeError>
where
    D: GpuDevice,
    P: SourceProvider + ?Sized,
{
    if width == 0 || height == 0 {
        return Err(BakeError::InvalidSize { width, height });
    }
    let source = provider
        .resolve(id, &compute_params(width, height))
        .map_err(BakeError::loading(id))?;
    let mut program = device.compile_compute(&ComputeSource {
        id: id.to_owned(),
        source,
    })?;
    let image = run_compute(device, &mut program, width, height)?;
    info!(shader = %id, width, height, "compute bake complete");
    Ok(image)
}

/// Dispatches an already compiled compute program over fresh buffers.
///
/// The input slot holds `width * height` random RGBA texels in `[0, 1)`,
/// the output slot the same number of zeroed texels.
pub fn run_compute<D>(
    device: &mut D,
    program: &mut Program<D>,
    width: u32,
    height: u32,
) -> Result<RgbaImage, BakeError>
where
    D: GpuDevice,
{
    if width == 0 || height == 0 {
        return Err(BakeError::InvalidSize { width, height });
    }
    let len = width as usize * height as usize * 4;
    let mut rng = rand::thread_rng();
    let input: Vec<f32> = (0..len).map(|_| rng.gen::<f32>()).collect();
    let output = vec![0.0f32; len];

    let input = device.create_storage(&input)?;
    device.bind_storage(&input, INPUT_SLOT)?;
    let output = device.create_storage(&output)?;
    device.bind_storage(&output, OUTPUT_SLOT)?;

    debug!(width, height, workgroups = ?WORKGROUPS, "running compute");
    device.dispatch(program, WORKGROUPS)?;
    let texels = device.read_storage(&output)?;

    Ok(convert(&Readback {
        width,
        height,
        channels: 4,
        texels,
    })?)
}

/// [`compute_bake`] on a freshly opened headless device.
pub fn compute_bake_wgpu<P>(
    options: &DeviceOptions,
    provider: &P,
    id: &str,
    width: u32,
    height: u32,
) -> Result<RgbaImage, BakeError>
where
    P: SourceProvider + ?Sized,
{
    let mut device = WgpuDevice::headless(options)?;
    compute_bake(&mut device, provider, id, width, height)
}
