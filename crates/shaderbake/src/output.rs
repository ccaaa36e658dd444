use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bakery::{BakeError, ImposterAtlases, ImposterParams, TargetLayout};
use image::RgbaImage;
use serde::Serialize;

/// JSON description of a baked atlas set, written next to the PNGs.
#[derive(Debug, Serialize)]
pub struct AtlasLayout {
    pub resolution: u32,
    pub n_row: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub distance: f64,
    pub layers: Vec<AtlasLayer>,
}

#[derive(Debug, Serialize)]
pub struct AtlasLayer {
    pub layer: &'static str,
    pub file: String,
}

pub fn write_png(path: &Path, image: &RgbaImage) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote image");
    Ok(())
}

/// `albedo.png` → `albedo_<suffix>.<ext>`.
fn sibling(path: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "imposter".to_owned());
    let name = if suffix.is_empty() {
        format!("{stem}.{extension}")
    } else {
        format!("{stem}_{suffix}.{extension}")
    };
    path.with_file_name(name)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Writes the albedo atlas to `path`, the normal atlas (if any) beside it and
/// a JSON layout sidecar. Returns every written path.
pub fn write_atlases(
    path: &Path,
    atlases: &ImposterAtlases,
    params: &ImposterParams,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut layers = Vec::new();

    write_png(path, &atlases.albedo.image)?;
    layers.push(AtlasLayer {
        layer: "albedo",
        file: file_name(path),
    });
    written.push(path.to_path_buf());

    if let Some(normal) = &atlases.normal {
        let normal_path = sibling(path, "normal", "png");
        write_png(&normal_path, &normal.image)?;
        layers.push(AtlasLayer {
            layer: "normal",
            file: file_name(&normal_path),
        });
        written.push(normal_path);
    } else if params.targets == TargetLayout::AlbedoNormal {
        tracing::warn!("albedo+normal bake produced no normal atlas");
    }

    let layout = AtlasLayout {
        resolution: params.resolution,
        n_row: params.n_row,
        cell_width: atlases.albedo.cell_width,
        cell_height: atlases.albedo.cell_height,
        distance: params.distance,
        layers,
    };
    let sidecar = sibling(path, "", "json");
    let json = serde_json::to_string_pretty(&layout).context("failed to encode atlas layout")?;
    fs::write(&sidecar, json).with_context(|| format!("failed to write {}", sidecar.display()))?;
    written.push(sidecar);

    Ok(written)
}

pub fn frame_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("frame_{index:04}.png"))
}

/// Writes frames as they are rendered, stopping at the first failure.
pub fn write_frames<I>(dir: &Path, frames: I) -> Result<u32>
where
    I: IntoIterator<Item = Result<RgbaImage, BakeError>>,
{
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut count = 0;
    for frame in frames {
        let frame = frame.with_context(|| format!("frame {count} failed"))?;
        write_png(&frame_path(dir, count), &frame)?;
        count += 1;
    }
    Ok(count)
}
