use std::path::PathBuf;
use std::time::Duration;

use bakery::{GpuPowerPreference, UniformValue};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "shaderbake",
    author,
    version,
    about = "Bake imposter atlases, frame sequences and compute shader output on the GPU"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Directory shader identifiers and includes resolve against.
    #[arg(long, global = true, value_name = "DIR")]
    pub shader_root: Option<PathBuf>,

    /// Adapter power preference: `low` or `high`.
    #[arg(long, global = true, value_name = "POWER", value_parser = parse_gpu_power)]
    pub gpu_power: Option<GpuPowerPreference>,

    /// Force the software fallback adapter.
    #[arg(long, global = true)]
    pub software: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bake an imposter atlas from orbiting camera views.
    Imposter(ImposterArgs),
    /// Render a fragment shader at evenly spaced times.
    Sequence(SequenceArgs),
    /// Run a compute shader once and save its output buffer.
    Compute(ComputeArgs),
    /// Run every job of a TOML job file.
    Jobs(JobsArgs),
    /// Re-render a shader whenever its sources change.
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
pub struct ImposterArgs {
    /// Fragment shader identifier (e.g. `gl/imposter.fs`).
    #[arg(value_name = "FRAGMENT")]
    pub fragment: String,

    /// Vertex shader identifier; the built-in full-screen quad when omitted.
    #[arg(long, value_name = "VERTEX")]
    pub vertex: Option<String>,

    /// Edge length of the square atlas in pixels.
    #[arg(long, default_value_t = 2048)]
    pub resolution: u32,

    /// Cells per atlas row and column.
    #[arg(long, default_value_t = 9)]
    pub n_row: u32,

    /// Orbit radius of the camera.
    #[arg(long, default_value_t = 10.0)]
    pub distance: f64,

    /// Also bake a normal atlas from the shader's second output.
    #[arg(long)]
    pub normal: bool,

    /// Albedo atlas path; the normal atlas and JSON layout are written beside it.
    #[arg(short, long, value_name = "PATH", default_value = "imposter.png")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct SequenceArgs {
    /// Fragment shader identifier.
    #[arg(value_name = "FRAGMENT")]
    pub fragment: String,

    #[arg(long, value_name = "VERTEX")]
    pub vertex: Option<String>,

    /// Frame size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimensions, default_value = "512x512")]
    pub size: (u32, u32),

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub start: f64,

    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    pub end: f64,

    #[arg(long, default_value_t = 1)]
    pub frames: u32,

    /// Extra uniform as `name=value`; vectors are comma separated. Repeatable.
    #[arg(long = "uniform", value_name = "NAME=VALUE", value_parser = parse_uniform)]
    pub uniforms: Vec<(String, UniformValue)>,

    /// Directory the numbered frames are written to.
    #[arg(short, long, value_name = "DIR", default_value = "frames")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct ComputeArgs {
    /// Compute shader identifier.
    #[arg(value_name = "SHADER")]
    pub shader: String,

    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimensions, default_value = "512x512")]
    pub size: (u32, u32),

    #[arg(short, long, value_name = "PATH", default_value = "compute.png")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct JobsArgs {
    /// TOML job file.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Parse the file and resolve every shader source without touching the GPU.
    #[arg(long)]
    pub dry_run: bool,

    /// Run jobs one after another instead of in parallel.
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Fragment shader identifier, or the compute shader with `--compute`.
    #[arg(value_name = "SHADER")]
    pub shader: String,

    #[arg(long, value_name = "VERTEX", conflicts_with = "compute")]
    pub vertex: Option<String>,

    /// Treat SHADER as a compute shader and re-run it on every change.
    #[arg(long)]
    pub compute: bool,

    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimensions, default_value = "512x512")]
    pub size: (u32, u32),

    /// Preview image rewritten after every successful (re)load.
    #[arg(short, long, value_name = "PATH", default_value = "preview.png")]
    pub output: PathBuf,

    /// Quiet period folding bursts of file events into one reload.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub debounce: Option<Duration>,

    /// Render loop rate.
    #[arg(long, default_value_t = 30.0)]
    pub fps: f32,

    /// Stop after this many frames instead of running until interrupted.
    #[arg(long, value_name = "COUNT")]
    pub frames: Option<u64>,

    /// Compile on the render thread instead of a worker thread.
    #[arg(long)]
    pub inline_compile: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_gpu_power(value: &str) -> Result<GpuPowerPreference, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("unknown GPU power preference '{value}'; expected low or high"))
}

pub fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{w}'"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{h}'"))?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_uniform(value: &str) -> Result<(String, UniformValue), String> {
    let (name, raw) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{value}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("uniform name must not be empty".into());
    }
    let raw = raw.trim();

    let parsed = match raw.to_ascii_lowercase().as_str() {
        "true" => UniformValue::Bool(true),
        "false" => UniformValue::Bool(false),
        _ if raw.contains(',') => {
            let components = raw
                .split(',')
                .map(|part| part.trim().parse::<f32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| format!("invalid vector '{raw}' for uniform '{name}'"))?;
            match components[..] {
                [x, y] => UniformValue::Vec2([x, y]),
                [x, y, z] => UniformValue::Vec3([x, y, z]),
                [x, y, z, w] => UniformValue::Vec4([x, y, z, w]),
                _ => {
                    return Err(format!(
                        "uniform '{name}' must have 2 to 4 components, got {}",
                        components.len()
                    ))
                }
            }
        }
        _ => {
            if let Ok(int) = raw.parse::<i32>() {
                UniformValue::Int(int)
            } else {
                raw.parse::<f32>()
                    .map(UniformValue::Float)
                    .map_err(|_| format!("invalid value '{raw}' for uniform '{name}'"))?
            }
        }
    };
    Ok((name.to_owned(), parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uniform_variants() {
        assert_eq!(
            parse_uniform("u_glow=0.5").unwrap(),
            ("u_glow".to_owned(), UniformValue::Float(0.5))
        );
        assert_eq!(
            parse_uniform("u_steps = 12").unwrap(),
            ("u_steps".to_owned(), UniformValue::Int(12))
        );
        assert_eq!(
            parse_uniform("u_invert=TRUE").unwrap().1,
            UniformValue::Bool(true)
        );
        assert_eq!(
            parse_uniform("u_tint=1,0.5,0").unwrap().1,
            UniformValue::Vec3([1.0, 0.5, 0.0])
        );
        assert!(parse_uniform("u_tint=1,2,3,4,5").is_err());
        assert!(parse_uniform("=1").is_err());
        assert!(parse_uniform("u_glow").is_err());
        assert!(parse_uniform("u_glow=bright").is_err());
    }

    #[test]
    fn parses_dimensions() {
        assert_eq!(parse_dimensions("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_dimensions("64X32").unwrap(), (64, 32));
        assert!(parse_dimensions("0x10").is_err());
        assert!(parse_dimensions("wide").is_err());
    }

    #[test]
    fn global_flags_apply_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "shaderbake",
            "compute",
            "step.glsl",
            "--size",
            "8x4",
            "--software",
            "--gpu-power",
            "low",
        ])
        .expect("parse");
        assert!(cli.global.software);
        assert_eq!(cli.global.gpu_power, Some(GpuPowerPreference::Low));
        let Command::Compute(args) = cli.command else {
            panic!("expected compute");
        };
        assert_eq!(args.size, (8, 4));
    }
}
