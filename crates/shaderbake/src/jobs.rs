use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Context, Result};
use bakeconfig::{BakeConfig, Defaults, Job, PowerSetting, TargetSetting, UniformSetting};
use bakery::{
    bake_imposter_wgpu, compute_bake_wgpu, compute_params, sequence_wgpu, DeviceOptions,
    FileSourceProvider, GpuPowerPreference, ImposterParams, SequenceParams, ShaderRef,
    SourceProvider, TargetLayout, UniformValue,
};

use crate::cli::{GlobalArgs, JobsArgs};
use crate::output::{write_atlases, write_frames, write_png};
use crate::run::{device_options, provider};

/// A job with every default applied and every path made absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedJob {
    pub name: String,
    pub plan: BakePlan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BakePlan {
    Imposter {
        shaders: ShaderRef,
        params: ImposterParams,
        output: PathBuf,
    },
    Sequence {
        shaders: ShaderRef,
        params: SequenceParams,
        output: PathBuf,
    },
    Compute {
        shader: String,
        width: u32,
        height: u32,
        output: PathBuf,
    },
}

impl BakePlan {
    pub fn output(&self) -> &Path {
        match self {
            BakePlan::Imposter { output, .. }
            | BakePlan::Sequence { output, .. }
            | BakePlan::Compute { output, .. } => output,
        }
    }
}

pub fn run_jobs(global: &GlobalArgs, args: JobsArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read job file {}", args.file.display()))?;
    let config = BakeConfig::from_toml_str(&raw)
        .with_context(|| format!("failed to load job file {}", args.file.display()))?;

    let base = args
        .file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let root = global
        .shader_root
        .clone()
        .unwrap_or_else(|| base.join(config.defaults.shader_root.as_deref().unwrap_or(Path::new("."))));
    let output_dir = base.join(
        config
            .defaults
            .output_dir
            .as_deref()
            .unwrap_or(Path::new("out")),
    );

    let provider = provider(&root)?;
    let jobs = config
        .jobs
        .iter()
        .map(|job| plan_job(job, &config.defaults, &output_dir))
        .collect::<Result<Vec<_>>>()?;
    tracing::info!(
        file = %args.file.display(),
        jobs = jobs.len(),
        root = %root.display(),
        "loaded job file"
    );

    if args.dry_run {
        return dry_run(&provider, &jobs);
    }

    let options = device_options(global, config.defaults.gpu_power.map(map_power));
    let results: Vec<(String, Result<()>)> = if args.sequential {
        jobs.iter()
            .map(|job| (job.name.clone(), execute(&options, &provider, job)))
            .collect()
    } else {
        thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .iter()
                .map(|job| {
                    let options = &options;
                    let provider = &provider;
                    (
                        job.name.clone(),
                        scope.spawn(move || execute(options, provider, job)),
                    )
                })
                .collect();
            handles
                .into_iter()
                .map(|(name, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("job thread panicked")));
                    (name, result)
                })
                .collect()
        })
    };

    let total = results.len();
    let mut failed = 0;
    for (name, result) in results {
        match result {
            Ok(()) => tracing::info!(job = %name, "job finished"),
            Err(err) => {
                failed += 1;
                tracing::error!(job = %name, "job failed: {err:#}");
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {total} jobs failed");
    }
    Ok(())
}

pub fn plan_job(job: &Job, defaults: &Defaults, output_dir: &Path) -> Result<PlannedJob> {
    let name = job.name().to_owned();
    let plan = match job {
        Job::Imposter(job) => BakePlan::Imposter {
            shaders: ShaderRef {
                vertex: job.vertex.clone().or_else(|| defaults.vertex.clone()),
                fragment: job.fragment.clone(),
            },
            params: ImposterParams {
                resolution: job.resolution,
                n_row: job.n_row,
                distance: job.distance,
                targets: match job.targets {
                    TargetSetting::Single => TargetLayout::Single,
                    TargetSetting::AlbedoNormal => TargetLayout::AlbedoNormal,
                },
            },
            output: output_dir.join(format!("{name}.png")),
        },
        Job::Sequence(job) => BakePlan::Sequence {
            shaders: ShaderRef {
                vertex: job.vertex.clone().or_else(|| defaults.vertex.clone()),
                fragment: job.fragment.clone(),
            },
            params: SequenceParams {
                width: job.width,
                height: job.height,
                start: job.start,
                end: job.end,
                frames: job.frames,
                uniforms: job
                    .uniforms
                    .iter()
                    .map(|(uniform, value)| {
                        map_uniform(value)
                            .map(|value| (uniform.clone(), value))
                            .with_context(|| format!("job '{name}' uniform '{uniform}'"))
                    })
                    .collect::<Result<_>>()?,
            },
            output: output_dir.join(&name),
        },
        Job::Compute(job) => BakePlan::Compute {
            shader: job.shader.clone(),
            width: job.width,
            height: job.height,
            output: output_dir.join(format!("{name}.png")),
        },
    };
    Ok(PlannedJob { name, plan })
}

fn map_power(setting: PowerSetting) -> GpuPowerPreference {
    match setting {
        PowerSetting::Low => GpuPowerPreference::Low,
        PowerSetting::High => GpuPowerPreference::High,
    }
}

fn map_uniform(value: &UniformSetting) -> Result<UniformValue> {
    Ok(match value {
        UniformSetting::Bool(value) => UniformValue::Bool(*value),
        UniformSetting::Int(value) => {
            UniformValue::Int(i32::try_from(*value).context("integer out of range")?)
        }
        UniformSetting::Float(value) => UniformValue::Float(*value as f32),
        UniformSetting::Vector(components) => {
            let c: Vec<f32> = components.iter().map(|value| *value as f32).collect();
            match c[..] {
                [x, y] => UniformValue::Vec2([x, y]),
                [x, y, z] => UniformValue::Vec3([x, y, z]),
                [x, y, z, w] => UniformValue::Vec4([x, y, z, w]),
                _ => anyhow::bail!("expected 2 to 4 components, got {}", c.len()),
            }
        }
    })
}

/// Resolves every source a job needs and reports what would be written.
fn dry_run(provider: &FileSourceProvider, jobs: &[PlannedJob]) -> Result<()> {
    let mut failed = 0;
    for job in jobs {
        let resolved = match &job.plan {
            BakePlan::Imposter {
                shaders, params, ..
            } => shaders.load(provider, params.targets.count()).map(drop),
            BakePlan::Sequence { shaders, .. } => shaders.load(provider, 1).map(drop),
            BakePlan::Compute {
                shader,
                width,
                height,
                ..
            } => provider
                .resolve(shader, &compute_params(*width, *height))
                .map(drop)
                .map_err(|source| bakery::BakeError::Source {
                    id: shader.clone(),
                    source,
                }),
        };
        match resolved {
            Ok(()) => println!("{:<24} ok -> {}", job.name, job.plan.output().display()),
            Err(err) => {
                failed += 1;
                println!("{:<24} error: {err}", job.name);
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} jobs have unresolvable sources", jobs.len());
    }
    Ok(())
}

/// Runs one job on its own device.
fn execute(options: &DeviceOptions, provider: &FileSourceProvider, job: &PlannedJob) -> Result<()> {
    tracing::info!(job = %job.name, output = %job.plan.output().display(), "starting job");
    match &job.plan {
        BakePlan::Imposter {
            shaders,
            params,
            output,
        } => {
            let atlases = bake_imposter_wgpu(options, provider, shaders, params)?;
            write_atlases(output, &atlases, params)?;
        }
        BakePlan::Sequence {
            shaders,
            params,
            output,
        } => {
            let sequence = sequence_wgpu(options, provider, shaders, params)?;
            write_frames(output, sequence)?;
        }
        BakePlan::Compute {
            shader,
            width,
            height,
            output,
        } => {
            let image = compute_bake_wgpu(options, provider, shader, *width, *height)?;
            write_png(output, &image)?;
        }
    }
    Ok(())
}
