use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::GpuError;

/// Colour target formats in order of preference. Some adapters (GL on
/// llvmpipe among them) can sample RGBA32F but not render into it.
pub(crate) const TARGET_FORMATS: [wgpu::TextureFormat; 2] = [
    wgpu::TextureFormat::Rgba32Float,
    wgpu::TextureFormat::Rgba16Float,
];

/// First format in [`TARGET_FORMATS`] whose usages include rendering.
pub(crate) fn select_target_format(
    allowed_usages: impl Fn(wgpu::TextureFormat) -> wgpu::TextureUsages,
) -> Option<wgpu::TextureFormat> {
    TARGET_FORMATS.into_iter().find(|format| {
        allowed_usages(*format)
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC)
    })
}

fn texel_bytes(format: wgpu::TextureFormat) -> u32 {
    match format {
        wgpu::TextureFormat::Rgba16Float => 8,
        _ => 16,
    }
}

/// Widens one tightly packed row of texels to `f32` channels.
fn decode_row(format: wgpu::TextureFormat, row: &[u8]) -> Vec<f32> {
    match format {
        wgpu::TextureFormat::Rgba16Float => bytemuck::pod_collect_to_vec::<u8, half::f16>(row)
            .into_iter()
            .map(half::f16::to_f32)
            .collect(),
        _ => bytemuck::pod_collect_to_vec::<u8, f32>(row),
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 3],
    uv: [f32; 2],
}

const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0, 0.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, -1.0, 0.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [-1.0, 1.0, 0.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0, 0.0],
        uv: [1.0, 1.0],
    },
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 1, 2, 3];

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

/// Interleaved `in_verts` / `in_uvs` layout of the baking quad.
pub(crate) fn quad_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &QUAD_ATTRIBUTES,
    }
}

/// Static full-screen quad uploaded once per device.
pub(crate) struct QuadMesh {
    pub vertices: wgpu::Buffer,
    pub indices: wgpu::Buffer,
}

impl QuadMesh {
    pub const INDEX_COUNT: u32 = QUAD_INDICES.len() as u32;

    pub fn new(device: &wgpu::Device) -> Self {
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bake quad vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bake quad indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self { vertices, indices }
    }
}

/// Float colour targets sharing one readback staging buffer.
pub struct WgpuTargets {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) textures: Vec<wgpu::Texture>,
    pub(crate) views: Vec<wgpu::TextureView>,
    format: wgpu::TextureFormat,
    padded_bytes_per_row: u32,
    staging: wgpu::Buffer,
}

impl WgpuTargets {
    pub(crate) fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        count: u32,
    ) -> Self {
        let textures: Vec<wgpu::Texture> = (0..count)
            .map(|index| {
                let label = format!("bake target {index}");
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(label.as_str()),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            })
            .collect();
        let views = textures
            .iter()
            .map(|texture| texture.create_view(&wgpu::TextureViewDescriptor::default()))
            .collect();

        let padded_bytes_per_row =
            (width * texel_bytes(format)).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bake target readback"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            width,
            height,
            textures,
            views,
            format,
            padded_bytes_per_row,
            staging,
        }
    }

    pub(crate) fn texture(&self, index: usize) -> Result<&wgpu::Texture, GpuError> {
        self.textures.get(index).ok_or(GpuError::TargetIndex {
            index,
            count: self.textures.len(),
        })
    }

    pub(crate) fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Maps the staging buffer and returns texels with rows bottom-up.
    pub(crate) fn read_staging(&self, device: &wgpu::Device) -> Result<Vec<f32>, GpuError> {
        let bytes = map_read(device, &self.staging)?;
        let row_bytes = (self.width * texel_bytes(self.format)) as usize;
        let mut texels = Vec::with_capacity((self.width * self.height * 4) as usize);
        // texture row 0 is the top; GL readback starts at the bottom
        for row in bytes
            .chunks_exact(self.padded_bytes_per_row as usize)
            .take(self.height as usize)
            .rev()
        {
            texels.extend(decode_row(self.format, &row[..row_bytes]));
        }
        Ok(texels)
    }
}

/// Storage buffer of `f32` values plus its readback staging buffer.
pub struct WgpuStorage {
    pub(crate) buffer: wgpu::Buffer,
    staging: wgpu::Buffer,
    len: usize,
}

impl WgpuStorage {
    pub(crate) fn new(device: &wgpu::Device, data: &[f32]) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bake storage"),
            contents: bytemuck::cast_slice(data),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bake storage readback"),
            size: buffer.size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            staging,
            len: data.len(),
        }
    }

    pub(crate) fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &self.staging, 0, self.buffer.size());
    }

    pub(crate) fn read_staging(&self, device: &wgpu::Device) -> Result<Vec<f32>, GpuError> {
        let bytes = map_read(device, &self.staging)?;
        let mut values: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        values.truncate(self.len);
        Ok(values)
    }
}

/// Blocking map of a `MAP_READ` buffer.
fn map_read(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Result<Vec<u8>, GpuError> {
    let slice = buffer.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::PollType::Wait)?;
    receiver
        .recv()
        .map_err(|_| GpuError::MapChannelClosed)??;

    let bytes = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usages_without_float32_rendering(format: wgpu::TextureFormat) -> wgpu::TextureUsages {
        let sampled = wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::TEXTURE_BINDING;
        match format {
            wgpu::TextureFormat::Rgba32Float => sampled | wgpu::TextureUsages::STORAGE_BINDING,
            _ => sampled | wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn prefers_float32_when_renderable() {
        let format = select_target_format(|_| wgpu::TextureUsages::all());
        assert_eq!(format, Some(wgpu::TextureFormat::Rgba32Float));
    }

    #[test]
    fn falls_back_to_half_float_when_float32_is_not_renderable() {
        let format = select_target_format(usages_without_float32_rendering);
        assert_eq!(format, Some(wgpu::TextureFormat::Rgba16Float));
    }

    #[test]
    fn no_format_when_nothing_is_renderable() {
        let format = select_target_format(|_| wgpu::TextureUsages::TEXTURE_BINDING);
        assert_eq!(format, None);
    }

    #[test]
    fn half_float_rows_widen_to_f32() {
        let texels = [0.0f32, 0.25, 0.5, 1.0].map(half::f16::from_f32);
        let row: &[u8] = bytemuck::cast_slice(&texels);
        assert_eq!(row.len(), texel_bytes(wgpu::TextureFormat::Rgba16Float) as usize);
        assert_eq!(
            decode_row(wgpu::TextureFormat::Rgba16Float, row),
            vec![0.0, 0.25, 0.5, 1.0]
        );
    }

    #[test]
    fn float32_rows_pass_through() {
        let texels = [0.1f32, 0.2, 0.3, 0.4];
        let row: &[u8] = bytemuck::cast_slice(&texels);
        assert_eq!(
            decode_row(wgpu::TextureFormat::Rgba32Float, row),
            texels.to_vec()
        );
    }
}
