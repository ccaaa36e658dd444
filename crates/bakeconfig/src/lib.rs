use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse job file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid job file: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetSetting {
    #[default]
    Single,
    AlbedoNormal,
}

/// Value of an extra sequence uniform as written in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum UniformSetting {
    Bool(bool),
    Int(i64),
    Float(f64),
    Vector(Vec<f64>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BakeConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub shader_root: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Vertex shader used by render jobs that name none.
    pub vertex: Option<String>,
    pub gpu_power: Option<PowerSetting>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Job {
    Imposter(ImposterJob),
    Sequence(SequenceJob),
    Compute(ComputeJob),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImposterJob {
    pub name: String,
    pub fragment: String,
    pub vertex: Option<String>,
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    #[serde(default = "default_n_row")]
    pub n_row: u32,
    #[serde(default = "default_distance")]
    pub distance: f64,
    #[serde(default)]
    pub targets: TargetSetting,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SequenceJob {
    pub name: String,
    pub fragment: String,
    pub vertex: Option<String>,
    #[serde(default = "default_frame_size")]
    pub width: u32,
    #[serde(default = "default_frame_size")]
    pub height: u32,
    #[serde(default)]
    pub start: f64,
    #[serde(default = "default_end")]
    pub end: f64,
    #[serde(default = "default_frames")]
    pub frames: u32,
    #[serde(default)]
    pub uniforms: BTreeMap<String, UniformSetting>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComputeJob {
    pub name: String,
    pub shader: String,
    #[serde(default = "default_frame_size")]
    pub width: u32,
    #[serde(default = "default_frame_size")]
    pub height: u32,
}

fn default_resolution() -> u32 {
    2048
}

fn default_n_row() -> u32 {
    9
}

fn default_distance() -> f64 {
    10.0
}

fn default_frame_size() -> u32 {
    512
}

fn default_end() -> f64 {
    1.0
}

fn default_frames() -> u32 {
    1
}

impl BakeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BakeConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported job file version {}; expected 1",
                self.version
            )));
        }

        if self.jobs.is_empty() {
            return Err(ConfigError::Invalid(
                "job file must define at least one job".into(),
            ));
        }

        let mut names = BTreeSet::new();
        for job in &self.jobs {
            let name = job.name();
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{} job with empty name",
                    job.kind()
                )));
            }
            if name.contains(['/', '\\']) {
                return Err(ConfigError::Invalid(format!(
                    "job name '{name}' may not contain path separators"
                )));
            }
            if !names.insert(name) {
                return Err(ConfigError::Invalid(format!("duplicate job name '{name}'")));
            }
            job.validate()?;
        }

        Ok(())
    }
}

impl Job {
    pub fn name(&self) -> &str {
        match self {
            Job::Imposter(job) => &job.name,
            Job::Sequence(job) => &job.name,
            Job::Compute(job) => &job.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Job::Imposter(_) => "imposter",
            Job::Sequence(_) => "sequence",
            Job::Compute(_) => "compute",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let name = self.name();
        match self {
            Job::Imposter(job) => {
                require_source(name, "fragment", &job.fragment)?;
                if job.n_row == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "job '{name}' n_row must be greater than zero"
                    )));
                }
                if job.resolution < job.n_row {
                    return Err(ConfigError::Invalid(format!(
                        "job '{name}' resolution {} is smaller than n_row {}",
                        job.resolution, job.n_row
                    )));
                }
                if !job.distance.is_finite() || job.distance <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "job '{name}' distance must be a positive number"
                    )));
                }
            }
            Job::Sequence(job) => {
                require_source(name, "fragment", &job.fragment)?;
                require_size(name, job.width, job.height)?;
                if !job.start.is_finite() || !job.end.is_finite() {
                    return Err(ConfigError::Invalid(format!(
                        "job '{name}' start and end must be finite"
                    )));
                }
                for (uniform, value) in &job.uniforms {
                    if let UniformSetting::Vector(components) = value {
                        if !(2..=4).contains(&components.len()) {
                            return Err(ConfigError::Invalid(format!(
                                "job '{name}' uniform '{uniform}' must have 2 to 4 components"
                            )));
                        }
                    }
                }
            }
            Job::Compute(job) => {
                require_source(name, "shader", &job.shader)?;
                require_size(name, job.width, job.height)?;
            }
        }
        Ok(())
    }
}

fn require_source(name: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!(
            "job '{name}' {field} may not be empty"
        )));
    }
    Ok(())
}

fn require_size(name: &str, width: u32, height: u32) -> Result<(), ConfigError> {
    if width == 0 || height == 0 {
        return Err(ConfigError::Invalid(format!(
            "job '{name}' size {width}x{height} is empty"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[defaults]
shader_root = "demos"
output_dir = "out"
vertex = "gl/simple.vs"
gpu_power = "low"

[[jobs]]
kind = "imposter"
name = "raymarch"
fragment = "gl/imposter.fs"
resolution = 1024
n_row = 8
targets = "albedo-normal"

[[jobs]]
kind = "sequence"
name = "pulse"
fragment = "gl/pulse.fs"
frames = 24
end = 2

[jobs.uniforms]
u_tint = [1.0, 0.5, 0.25]
u_steps = 12
u_glow = 0.75
u_invert = true

[[jobs]]
kind = "compute"
name = "noise"
shader = "compute/step_texture.glsl"
width = 256
height = 128
"#;

    #[test]
    fn parses_sample_config() {
        let config = BakeConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.jobs.len(), 3);
        assert_eq!(config.defaults.gpu_power, Some(PowerSetting::Low));
        assert_eq!(
            config.defaults.vertex.as_deref(),
            Some("gl/simple.vs")
        );

        let Job::Imposter(imposter) = &config.jobs[0] else {
            panic!("raymarch is not an imposter job");
        };
        assert_eq!(imposter.targets, TargetSetting::AlbedoNormal);
        assert_eq!(imposter.distance, 10.0);

        let Job::Sequence(sequence) = &config.jobs[1] else {
            panic!("pulse is not a sequence job");
        };
        assert_eq!(sequence.end, 2.0);
        assert_eq!(sequence.width, 512);
        assert_eq!(
            sequence.uniforms.get("u_tint"),
            Some(&UniformSetting::Vector(vec![1.0, 0.5, 0.25]))
        );
        assert_eq!(sequence.uniforms.get("u_steps"), Some(&UniformSetting::Int(12)));
        assert_eq!(sequence.uniforms.get("u_glow"), Some(&UniformSetting::Float(0.75)));
        assert_eq!(sequence.uniforms.get("u_invert"), Some(&UniformSetting::Bool(true)));

        assert_eq!(config.jobs[2].name(), "noise");
        assert_eq!(config.jobs[2].kind(), "compute");
    }

    #[test]
    fn imposter_defaults_match_the_bakery() {
        let config = BakeConfig::from_toml_str(
            r#"
version = 1

[[jobs]]
kind = "imposter"
name = "tree"
fragment = "tree.fs"
"#,
        )
        .unwrap();
        let Job::Imposter(job) = &config.jobs[0] else {
            panic!("expected imposter");
        };
        assert_eq!((job.resolution, job.n_row), (2048, 9));
        assert_eq!(job.targets, TargetSetting::Single);
        assert!(config.defaults.vertex.is_none());
    }

    #[test]
    fn rejects_duplicate_names() {
        let config = r#"
version = 1

[[jobs]]
kind = "compute"
name = "a"
shader = "x.glsl"

[[jobs]]
kind = "compute"
name = "a"
shader = "y.glsl"
"#;
        let err = BakeConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref message) if message.contains("duplicate")));
    }

    #[test]
    fn rejects_zero_rows() {
        let config = r#"
version = 1

[[jobs]]
kind = "imposter"
name = "flat"
fragment = "flat.fs"
n_row = 0
"#;
        let err = BakeConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_long_vectors() {
        let config = r#"
version = 1

[[jobs]]
kind = "sequence"
name = "wide"
fragment = "wide.fs"

[jobs.uniforms]
u_bad = [1.0, 2.0, 3.0, 4.0, 5.0]
"#;
        let err = BakeConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_defaults() {
        let config = r#"
version = 1

[defaults]
watch_debounce = "150ms"

[[jobs]]
kind = "compute"
name = "noise"
shader = "noise.glsl"
"#;
        let err = BakeConfig::from_toml_str(config).unwrap_err();
        assert!(
            matches!(err, ConfigError::Parse(ref inner) if inner.to_string().contains("watch_debounce"))
        );
    }

    #[test]
    fn rejects_unknown_kind() {
        let config = r#"
version = 1

[[jobs]]
kind = "video"
name = "clip"
"#;
        let err = BakeConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = BakeConfig::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
