//! Headless live preview driven by the hot-reload controller.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use image::RgbaImage;
use shadersource::SourceProvider;
use tracing::debug;

use crate::compute::run_compute;
use crate::convert::convert;
use crate::error::BakeError;
use crate::gpu::{GpuDevice, UniformValue};
use crate::reload::{CompileStrategy, HotReloadController, ReloadOutcome};
use crate::types::{ProgramSource, U_CAMPOS, U_FOCUS, U_HEIGHT, U_TIME, U_WIDTH};
use crate::watch::WatchEvent;

/// Point the preview camera looks at.
pub const FOCUS: [f32; 3] = [0.0, 2.0, 0.0];

/// Camera position at `time` seconds: a radius-7 circle four units up.
pub fn orbit_camera(time: f64) -> [f32; 3] {
    [(7.0 * time.cos()) as f32, 4.0, (-7.0 * time.sin()) as f32]
}

/// One iteration of [`PreviewSession::step`].
#[derive(Debug)]
pub struct PreviewStep {
    pub outcome: ReloadOutcome,
    /// Output of the first frame and of every frame after a reload.
    pub image: Option<RgbaImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Render,
    Compute,
}

/// A render loop that owns its device and active program.
///
/// Render programs are drawn on every step with the orbiting camera; compute
/// programs only run after they were (re)loaded.
pub struct PreviewSession<D: GpuDevice> {
    device: D,
    controller: HotReloadController<D>,
    targets: D::Targets,
    mode: Mode,
    width: u32,
    height: u32,
    fresh: bool,
}

impl<D: GpuDevice> PreviewSession<D> {
    pub fn new(
        mut device: D,
        provider: Arc<dyn SourceProvider>,
        source: ProgramSource,
        strategy: CompileStrategy,
        width: u32,
        height: u32,
    ) -> Result<Self, BakeError> {
        if width == 0 || height == 0 {
            return Err(BakeError::InvalidSize { width, height });
        }
        let (mode, count) = match &source {
            ProgramSource::Render { color_targets, .. } => (Mode::Render, (*color_targets).max(1)),
            ProgramSource::Compute { .. } => (Mode::Compute, 1),
        };

        let mut controller = HotReloadController::new(&device, provider, source, strategy)?;
        if mode == Mode::Render {
            controller.set_uniform(U_WIDTH, UniformValue::UInt(width));
            controller.set_uniform(U_HEIGHT, UniformValue::UInt(height));
            controller.set_uniform(U_FOCUS, FOCUS.into());
        }
        let targets = device.create_targets(width, height, count)?;

        Ok(Self {
            device,
            controller,
            targets,
            mode,
            width,
            height,
            fresh: true,
        })
    }

    /// Connects a watcher inbox to the controller.
    pub fn with_inbox(mut self, inbox: Receiver<WatchEvent>) -> Self {
        self.controller = self.controller.with_inbox(inbox);
        self
    }

    pub fn controller(&self) -> &HotReloadController<D> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut HotReloadController<D> {
        &mut self.controller
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Polls for a new program, then renders one frame at `time`.
    ///
    /// A failed reload is reported in the outcome and the previous program
    /// keeps rendering; only GPU and conversion errors are returned.
    pub fn step(&mut self, time: f64) -> Result<PreviewStep, BakeError> {
        let outcome = self.controller.poll();
        let changed = matches!(outcome, ReloadOutcome::Reloaded(_)) || std::mem::take(&mut self.fresh);

        let image = match self.mode {
            Mode::Compute if changed => Some(run_compute(
                &mut self.device,
                self.controller.program_mut(),
                self.width,
                self.height,
            )?),
            Mode::Compute => None,
            Mode::Render => {
                self.controller.set_uniform(U_TIME, UniformValue::Float(time as f32));
                self.controller.set_uniform(U_CAMPOS, orbit_camera(time).into());
                self.device.draw(self.controller.program_mut(), &self.targets)?;
                if changed {
                    let readback = self.device.read_target(&self.targets, 0)?;
                    Some(convert(&readback)?)
                } else {
                    None
                }
            }
        };

        if image.is_some() {
            debug!(generation = %self.controller.generation(), time, "preview frame captured");
        }
        Ok(PreviewStep { outcome, image })
    }
}

#[cfg(test)]
mod tests {
    use shadersource::MemorySourceProvider;

    use super::*;
    use crate::compute::compute_params;
    use crate::reload::ProgramId;
    use crate::testing::FakeDevice;
    use crate::types::ShaderRef;

    const FRAGMENT: &str = "uniform float u_time;\nuniform vec3 u_campos;\nuniform vec3 u_focus;\nin vec2 v_uv;\nout vec4 color;\nvoid main() {}";

    fn render_session() -> PreviewSession<FakeDevice> {
        let provider: Arc<dyn SourceProvider> =
            Arc::new(MemorySourceProvider::new().with("live.fs", FRAGMENT));
        PreviewSession::new(
            FakeDevice::default(),
            provider,
            ProgramSource::Render {
                shaders: ShaderRef::fragment_only("live.fs"),
                color_targets: 1,
            },
            CompileStrategy::Immediate,
            4,
            2,
        )
        .expect("session")
    }

    #[test]
    fn camera_orbits_around_the_focus() {
        let start = orbit_camera(0.0);
        assert!((start[0] - 7.0).abs() < 1e-6);
        assert_eq!(start[1], 4.0);
        assert!(start[2].abs() < 1e-6);

        let quarter = orbit_camera(std::f64::consts::FRAC_PI_2);
        assert!(quarter[0].abs() < 1e-6);
        assert!((quarter[2] + 7.0).abs() < 1e-6);
    }

    #[test]
    fn first_frame_is_captured_and_later_frames_are_not() {
        let mut session = render_session();

        let first = session.step(0.0).expect("step");
        assert!(matches!(first.outcome, ReloadOutcome::Unchanged));
        assert_eq!(first.image.expect("image").dimensions(), (4, 2));

        let second = session.step(0.5).expect("step");
        assert!(second.image.is_none());

        let draws = &session.device().draws;
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1].value(U_TIME), Some(UniformValue::Float(0.5)));
        assert_eq!(draws[0].value(U_FOCUS), Some(UniformValue::Vec3(FOCUS)));
    }

    #[test]
    fn reload_captures_a_new_frame() {
        let mut session = render_session();
        session.step(0.0).expect("step");

        session.controller_mut().request_reload();
        let step = session.step(1.0).expect("step");
        assert!(matches!(step.outcome, ReloadOutcome::Reloaded(ProgramId(1))));
        assert!(step.image.is_some());
        // persistent uniforms survive the swap
        assert_eq!(
            session.device().draws[1].value(U_FOCUS),
            Some(UniformValue::Vec3(FOCUS))
        );
    }

    #[test]
    fn compute_preview_runs_only_after_loads() {
        let provider: Arc<dyn SourceProvider> = Arc::new(
            MemorySourceProvider::new().with("step.glsl", "layout(local_size_x = 1) in;\nvoid main() {}"),
        );
        let mut session = PreviewSession::new(
            FakeDevice::default(),
            provider,
            ProgramSource::Compute {
                id: "step.glsl".to_owned(),
                params: compute_params(2, 2),
            },
            CompileStrategy::Immediate,
            2,
            2,
        )
        .expect("session");

        assert!(session.step(0.0).expect("step").image.is_some());
        assert!(session.step(0.1).expect("step").image.is_none());
        session.controller_mut().request_reload();
        assert!(session.step(0.2).expect("step").image.is_some());
        assert_eq!(session.device().dispatches.len(), 2);
    }
}
