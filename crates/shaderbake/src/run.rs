use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bakery::{
    bake_imposter_wgpu, compute_bake_wgpu, sequence_wgpu, DeviceOptions, FileSourceProvider,
    GpuPowerPreference, ImposterParams, SequenceParams, ShaderRef, TargetLayout,
};
use tracing_subscriber::EnvFilter;

use crate::cli::{ComputeArgs, GlobalArgs, ImposterArgs, SequenceArgs};
use crate::output::{write_atlases, write_frames, write_png};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Adapter options from the global flags, falling back to a configured
/// power preference.
pub fn device_options(global: &GlobalArgs, configured: Option<GpuPowerPreference>) -> DeviceOptions {
    DeviceOptions {
        power: global.gpu_power.or(configured).unwrap_or_default(),
        force_fallback_adapter: global.software,
    }
}

pub fn shader_root(global: &GlobalArgs) -> PathBuf {
    global
        .shader_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn provider(root: &Path) -> Result<FileSourceProvider> {
    if !root.is_dir() {
        anyhow::bail!("shader root {} is not a directory", root.display());
    }
    tracing::debug!(root = %root.display(), "resolving shaders");
    Ok(FileSourceProvider::new(root))
}

pub fn run_imposter(global: &GlobalArgs, args: ImposterArgs) -> Result<()> {
    let provider = provider(&shader_root(global))?;
    let shaders = ShaderRef {
        vertex: args.vertex,
        fragment: args.fragment,
    };
    let params = ImposterParams {
        resolution: args.resolution,
        n_row: args.n_row,
        distance: args.distance,
        targets: if args.normal {
            TargetLayout::AlbedoNormal
        } else {
            TargetLayout::Single
        },
    };

    let atlases = bake_imposter_wgpu(&device_options(global, None), &provider, &shaders, &params)
        .with_context(|| format!("failed to bake imposter from {}", shaders.fragment))?;
    let written = write_atlases(&args.output, &atlases, &params)?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

pub fn run_sequence(global: &GlobalArgs, args: SequenceArgs) -> Result<()> {
    let provider = provider(&shader_root(global))?;
    let shaders = ShaderRef {
        vertex: args.vertex,
        fragment: args.fragment,
    };
    let (width, height) = args.size;
    let params = SequenceParams {
        width,
        height,
        start: args.start,
        end: args.end,
        frames: args.frames,
        uniforms: args.uniforms,
    };

    let sequence = sequence_wgpu(&device_options(global, None), &provider, &shaders, &params)
        .with_context(|| format!("failed to prepare sequence for {}", shaders.fragment))?;
    let written = write_frames(&args.output, sequence)
        .with_context(|| format!("failed to render sequence for {}", shaders.fragment))?;
    println!("{} frames written to {}", written, args.output.display());
    Ok(())
}

pub fn run_compute(global: &GlobalArgs, args: ComputeArgs) -> Result<()> {
    let provider = provider(&shader_root(global))?;
    let (width, height) = args.size;
    let image = compute_bake_wgpu(
        &device_options(global, None),
        &provider,
        &args.shader,
        width,
        height,
    )
    .with_context(|| format!("failed to run compute shader {}", args.shader))?;
    write_png(&args.output, &image)?;
    println!("{}", args.output.display());
    Ok(())
}
