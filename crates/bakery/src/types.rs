use std::fmt;
use std::str::FromStr;

use shadersource::{SourceParams, SourceProvider};

use crate::error::BakeError;
use crate::gpu::{ComputeSource, RenderSource, BUILTIN_VERTEX_ID, BUILTIN_VERTEX_SHADER};

/// Camera position for the current sample.
pub const U_CAMPOS: &str = "u_campos";
/// Whether the shader should paint its background.
pub const U_DRAWBG: &str = "u_drawbg";
/// Frame time in the sequencer and preview.
pub const U_TIME: &str = "u_time";
pub const U_WIDTH: &str = "u_width";
pub const U_HEIGHT: &str = "u_height";
/// Point the preview camera looks at.
pub const U_FOCUS: &str = "u_focus";

/// GPU power preference requested when picking an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

impl FromStr for GpuPowerPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            other => Err(format!("unknown GPU power preference '{other}'")),
        }
    }
}

impl fmt::Display for GpuPowerPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::High => f.write_str("high"),
        }
    }
}

/// How a headless device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceOptions {
    pub power: GpuPowerPreference,
    /// Request the software (fallback) adapter.
    pub force_fallback_adapter: bool,
}

/// Colour targets written by an imposter shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetLayout {
    #[default]
    Single,
    AlbedoNormal,
}

impl TargetLayout {
    pub fn count(self) -> u32 {
        match self {
            Self::Single => 1,
            Self::AlbedoNormal => 2,
        }
    }
}

/// Shader identifiers of a render job. A missing vertex shader falls back to
/// the built-in pass-through stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderRef {
    pub vertex: Option<String>,
    pub fragment: String,
}

impl ShaderRef {
    pub fn fragment_only(fragment: impl Into<String>) -> Self {
        Self {
            vertex: None,
            fragment: fragment.into(),
        }
    }

    /// Fetches both stages through `provider`.
    pub fn load<P>(&self, provider: &P, color_targets: u32) -> Result<RenderSource, BakeError>
    where
        P: SourceProvider + ?Sized,
    {
        let params = SourceParams::new();
        let (vertex_id, vertex) = match &self.vertex {
            Some(id) => (
                id.clone(),
                provider.resolve(id, &params).map_err(BakeError::loading(id))?,
            ),
            None => (BUILTIN_VERTEX_ID.to_owned(), BUILTIN_VERTEX_SHADER.to_owned()),
        };
        let fragment = provider
            .resolve(&self.fragment, &params)
            .map_err(BakeError::loading(&self.fragment))?;

        Ok(RenderSource {
            vertex_id,
            vertex,
            fragment_id: self.fragment.clone(),
            fragment,
            color_targets,
        })
    }
}

/// What a hot-reloadable program is rebuilt from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramSource {
    Render { shaders: ShaderRef, color_targets: u32 },
    Compute { id: String, params: SourceParams },
}

/// A program's fetched source text.
#[derive(Debug, Clone)]
pub enum LoadedProgram {
    Render(RenderSource),
    Compute(ComputeSource),
}

impl ProgramSource {
    pub fn load<P>(&self, provider: &P) -> Result<LoadedProgram, BakeError>
    where
        P: SourceProvider + ?Sized,
    {
        match self {
            Self::Render {
                shaders,
                color_targets,
            } => shaders.load(provider, *color_targets).map(LoadedProgram::Render),
            Self::Compute { id, params } => provider
                .resolve(id, params)
                .map(|source| {
                    LoadedProgram::Compute(ComputeSource {
                        id: id.clone(),
                        source,
                    })
                })
                .map_err(BakeError::loading(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use shadersource::MemorySourceProvider;

    use super::*;

    #[test]
    fn missing_vertex_uses_builtin_stage() {
        let provider = MemorySourceProvider::new().with("gl/imposter.fs", "out vec4 c;");
        let source = ShaderRef::fragment_only("gl/imposter.fs")
            .load(&provider, 1)
            .expect("load");
        assert_eq!(source.vertex_id, BUILTIN_VERTEX_ID);
        assert_eq!(source.fragment, "out vec4 c;");
    }

    #[test]
    fn missing_fragment_names_the_identifier() {
        let provider = MemorySourceProvider::new();
        let err = ShaderRef::fragment_only("gl/missing.fs")
            .load(&provider, 1)
            .unwrap_err();
        assert!(err.to_string().contains("gl/missing.fs"));
    }

    #[test]
    fn power_preference_parses_case_insensitively() {
        assert_eq!("HIGH".parse(), Ok(GpuPowerPreference::High));
        assert_eq!("low".parse(), Ok(GpuPowerPreference::Low));
        assert!("medium".parse::<GpuPowerPreference>().is_err());
    }
}
