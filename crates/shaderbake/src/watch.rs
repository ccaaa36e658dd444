use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bakery::{
    compute_params, CompileStrategy, PreviewSession, ProgramSource, ReloadOutcome, ShaderRef,
    ShaderWatcher, SourceProvider, WgpuDevice,
};

use crate::cli::{GlobalArgs, WatchArgs};
use crate::output::write_png;
use crate::run::{device_options, provider, shader_root};

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

pub fn run_watch(global: &GlobalArgs, args: WatchArgs) -> Result<()> {
    let root = shader_root(global);
    let provider: Arc<dyn SourceProvider> = Arc::new(provider(&root)?);
    let (width, height) = args.size;
    let source = if args.compute {
        ProgramSource::Compute {
            id: args.shader.clone(),
            params: compute_params(width, height),
        }
    } else {
        ProgramSource::Render {
            shaders: ShaderRef {
                vertex: args.vertex.clone(),
                fragment: args.shader.clone(),
            },
            color_targets: 1,
        }
    };
    let strategy = if args.inline_compile {
        CompileStrategy::Immediate
    } else {
        CompileStrategy::Threaded
    };

    let device = WgpuDevice::headless(&device_options(global, None))
        .context("failed to open GPU device")?;
    tracing::info!(
        adapter = ?device.adapter(),
        format = ?device.target_format(),
        "opened preview device"
    );

    let (watcher, inbox) = ShaderWatcher::spawn(&root, args.debounce.unwrap_or(DEFAULT_DEBOUNCE))
        .with_context(|| format!("failed to watch {}", root.display()))?;
    let mut session = PreviewSession::new(device, provider, source, strategy, width, height)
        .with_context(|| format!("failed to compile {}", args.shader))?
        .with_inbox(inbox);
    tracing::info!(
        shader = %args.shader,
        root = %watcher.path().display(),
        output = %args.output.display(),
        "watching for changes"
    );

    let frame_time = Duration::from_secs_f32(1.0 / args.fps.max(1.0));
    let started = Instant::now();
    let mut frame = 0u64;
    loop {
        if args.frames.is_some_and(|limit| frame >= limit) {
            break;
        }
        let tick = Instant::now();
        let step = session.step(started.elapsed().as_secs_f64())?;

        if let ReloadOutcome::Failed(err) = &step.outcome {
            eprintln!("reload failed, keeping previous program: {err}");
        }
        if let Some(image) = step.image {
            write_png(&args.output, &image)?;
            tracing::info!(
                generation = %session.controller().generation(),
                path = %args.output.display(),
                "preview updated"
            );
        }

        frame += 1;
        if let Some(remaining) = frame_time.checked_sub(tick.elapsed()) {
            thread::sleep(remaining);
        }
    }

    drop(watcher);
    Ok(())
}
