use image::RgbaImage;
use shadersource::SourceProvider;
use tracing::{debug, info};

use crate::convert::convert;
use crate::error::BakeError;
use crate::gpu::{GpuDevice, Program, ShaderProgram, UniformValue, WgpuDevice};
use crate::types::{DeviceOptions, ShaderRef, U_HEIGHT, U_TIME, U_WIDTH};

/// Output size, time span and extra uniforms of a frame sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceParams {
    pub width: u32,
    pub height: u32,
    pub start: f64,
    pub end: f64,
    pub frames: u32,
    /// Applied once before the first frame, only where the shader declares them.
    pub uniforms: Vec<(String, UniformValue)>,
}

impl Default for SequenceParams {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            start: 0.0,
            end: 1.0,
            frames: 1,
            uniforms: Vec::new(),
        }
    }
}

impl SequenceParams {
    /// Time between consecutive frames; the whole span when no frames are
    /// requested.
    pub fn step(&self) -> f64 {
        let span = self.end - self.start;
        if self.frames == 0 {
            span
        } else {
            span / f64::from(self.frames)
        }
    }
}

/// Lazily rendered frames of one shader over time.
///
/// Each frame is drawn only after the previous one was read back, so at most
/// one frame is ever in flight.
pub struct FrameSequence<D: GpuDevice> {
    device: D,
    program: Program<D>,
    targets: D::Targets,
    label: String,
    start: f64,
    step: f64,
    frames: u32,
    next: u32,
}

impl<D: GpuDevice> FrameSequence<D> {
    /// Compiles the shader on `device` and prepares the render target.
    pub fn new<P>(
        mut device: D,
        provider: &P,
        shaders: &ShaderRef,
        params: &SequenceParams,
    ) -> Result<Self, BakeError>
    where
        P: SourceProvider + ?Sized,
    {
        if params.width == 0 || params.height == 0 {
            return Err(BakeError::InvalidSize {
                width: params.width,
                height: params.height,
            });
        }

        let source = shaders.load(provider, 1)?;
        let mut program = device.compile_render(&source)?;

        program.set_uniform(U_WIDTH, UniformValue::UInt(params.width));
        program.set_uniform(U_HEIGHT, UniformValue::UInt(params.height));
        for (name, value) in &params.uniforms {
            if program.has_uniform(name) {
                program.set_uniform(name, *value);
            } else {
                debug!(uniform = %name, shader = %shaders.fragment, "shader does not declare uniform; skipped");
            }
        }

        let targets = device.create_targets(params.width, params.height, 1)?;
        Ok(Self {
            device,
            program,
            targets,
            label: shaders.fragment.clone(),
            start: params.start,
            step: params.step(),
            frames: params.frames,
            next: 0,
        })
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// `u_time` of frame `index`.
    pub fn time_of(&self, index: u32) -> f64 {
        self.start + self.step * f64::from(index)
    }

    /// Gives the device back, e.g. to inspect it after the run.
    pub fn into_device(self) -> D {
        self.device
    }

    fn render(&mut self, index: u32) -> Result<RgbaImage, BakeError> {
        let time = self.time_of(index);
        self.program.set_uniform(U_TIME, UniformValue::Float(time as f32));
        self.device.draw(&mut self.program, &self.targets)?;
        let readback = self.device.read_target(&self.targets, 0)?;
        Ok(convert(&readback)?)
    }
}

impl<D: GpuDevice> Iterator for FrameSequence<D> {
    type Item = Result<RgbaImage, BakeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.frames {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let frame = self.render(index);
        if frame.is_err() {
            // a failed frame ends the sequence
            self.next = self.frames;
        } else if self.next == self.frames {
            info!(shader = %self.label, frames = self.frames, "frame sequence complete");
        }
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.frames - self.next) as usize;
        (0, Some(remaining))
    }
}

/// Opens a fresh headless device and prepares a [`FrameSequence`] on it.
pub fn sequence_wgpu<P>(
    options: &DeviceOptions,
    provider: &P,
    shaders: &ShaderRef,
    params: &SequenceParams,
) -> Result<FrameSequence<WgpuDevice>, BakeError>
where
    P: SourceProvider + ?Sized,
{
    let device = WgpuDevice::headless(options)?;
    FrameSequence::new(device, provider, shaders, params)
}

#[cfg(test)]
mod tests {
    use shadersource::MemorySourceProvider;

    use super::*;
    use crate::testing::FakeDevice;

    const FRAGMENT: &str = "uniform float u_time;\nuniform float u_width;\nuniform vec3 u_tint;\nin vec2 v_uv;\nout vec4 color;\nvoid main() {}";

    fn provider() -> MemorySourceProvider {
        MemorySourceProvider::new().with("frames.fs", FRAGMENT)
    }

    fn times(device: &FakeDevice) -> Vec<f32> {
        device
            .recorded(U_TIME)
            .into_iter()
            .map(|value| match value {
                Some(UniformValue::Float(time)) => time,
                other => panic!("unexpected u_time {other:?}"),
            })
            .collect()
    }

    #[test]
    fn steps_time_across_the_span() {
        let params = SequenceParams {
            width: 8,
            height: 4,
            frames: 5,
            ..SequenceParams::default()
        };
        let mut sequence = FrameSequence::new(
            FakeDevice::default(),
            &provider(),
            &ShaderRef::fragment_only("frames.fs"),
            &params,
        )
        .expect("sequence");

        let frames: Vec<RgbaImage> = sequence.by_ref().collect::<Result<_, _>>().expect("frames");
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|frame| frame.dimensions() == (8, 4)));

        let device = sequence.into_device();
        let expected = [0.0, 0.2, 0.4, 0.6, 0.8];
        let recorded = times(&device);
        assert_eq!(recorded.len(), expected.len());
        for (time, want) in recorded.iter().zip(expected) {
            assert!((time - want).abs() < 1e-6, "{time} != {want}");
        }
        assert_eq!(
            device.recorded(U_WIDTH)[0],
            Some(UniformValue::Float(8.0))
        );
    }

    #[test]
    fn zero_frames_yields_nothing() {
        let params = SequenceParams {
            frames: 0,
            start: 1.0,
            end: 3.0,
            ..SequenceParams::default()
        };
        assert_eq!(params.step(), 2.0);
        let mut sequence = FrameSequence::new(
            FakeDevice::default(),
            &provider(),
            &ShaderRef::fragment_only("frames.fs"),
            &params,
        )
        .expect("sequence");
        assert!(sequence.next().is_none());
    }

    #[test]
    fn extra_uniforms_apply_only_when_declared() {
        let params = SequenceParams {
            frames: 1,
            uniforms: vec![
                ("u_tint".to_owned(), UniformValue::Vec3([0.1, 0.2, 0.3])),
                ("u_missing".to_owned(), UniformValue::Float(1.0)),
            ],
            ..SequenceParams::default()
        };
        let sequence = FrameSequence::new(
            FakeDevice::default(),
            &provider(),
            &ShaderRef::fragment_only("frames.fs"),
            &params,
        )
        .expect("sequence");
        let device = {
            let mut sequence = sequence;
            sequence.next().expect("frame").expect("rendered");
            sequence.into_device()
        };
        assert_eq!(
            device.recorded("u_tint"),
            vec![Some(UniformValue::Vec3([0.1, 0.2, 0.3]))]
        );
        assert_eq!(device.recorded("u_missing"), vec![None]);
    }

    #[test]
    fn rejects_empty_output() {
        let params = SequenceParams {
            width: 0,
            ..SequenceParams::default()
        };
        let result = FrameSequence::new(
            FakeDevice::default(),
            &provider(),
            &ShaderRef::fragment_only("frames.fs"),
            &params,
        );
        assert!(matches!(result, Err(BakeError::InvalidSize { width: 0, .. })));
    }
}
