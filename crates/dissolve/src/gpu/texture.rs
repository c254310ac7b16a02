use anyhow::{bail, Result};
use effectconfig::Sampling;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::grid::ParticleGrid;
use crate::source::SourceImage;

/// GPU resources for one dissolve run: the source texture, its sampler and
/// the per-instance particle index buffer. Dropped wholesale when the run is
/// replaced or reset.
pub(crate) struct ParticleBuffers {
    _texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
    pub index_buffer: wgpu::Buffer,
    pub instance_count: u32,
}

impl ParticleBuffers {
    #[allow(clippy::too_many_arguments)]
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        uniform_buffer: &wgpu::Buffer,
        image: &SourceImage,
        grid: &ParticleGrid,
        sampling: Sampling,
        max_dimension: u32,
    ) -> Result<Self> {
        if grid.is_empty() {
            bail!(
                "{}x{} image produced an empty particle grid",
                image.width(),
                image.height()
            );
        }
        check_index_buffer(grid, device.limits().max_buffer_size)?;
        if image.width() > max_dimension || image.height() > max_dimension {
            bail!(
                "GPU max texture dimension is {max_dimension}, source image is {}x{}",
                image.width(),
                image.height()
            );
        }

        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("dissolve source texture"),
                size: wgpu::Extent3d {
                    width: image.width(),
                    height: image.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            image.as_raw(),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = create_sampler(device, sampling);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("dissolve bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let indices = grid.indices();
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("particle index buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            particles = grid.count(),
            ?sampling,
            "uploaded dissolve source"
        );

        Ok(Self {
            _texture: texture,
            bind_group,
            index_buffer,
            instance_count: grid.count(),
        })
    }
}

fn check_index_buffer(grid: &ParticleGrid, max_buffer_size: u64) -> Result<()> {
    let bytes = grid.index_bytes();
    if bytes > max_buffer_size {
        bail!(
            "{} particles need a {bytes} byte index buffer, GPU allows {max_buffer_size}",
            grid.count()
        );
    }
    Ok(())
}

fn filter_mode(sampling: Sampling) -> wgpu::FilterMode {
    match sampling {
        Sampling::Linear => wgpu::FilterMode::Linear,
        Sampling::Nearest => wgpu::FilterMode::Nearest,
    }
}

fn create_sampler(device: &wgpu::Device, sampling: Sampling) -> wgpu::Sampler {
    let filter = filter_mode(sampling);
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("dissolve source sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_buffer_must_fit_the_device_limit() {
        let grid = ParticleGrid::new(300, 200, 2.0);
        assert!(check_index_buffer(&grid, 60_000).is_ok());
        let err = check_index_buffer(&grid, 59_999).unwrap_err();
        assert!(err.to_string().contains("15000 particles"));
        assert!(check_index_buffer(&ParticleGrid::new(4096, 4096, 1.0), 1 << 26).is_ok());
        assert!(check_index_buffer(&ParticleGrid::new(8192, 8192, 1.0), 1 << 26).is_err());
    }

    #[test]
    fn sampling_maps_to_filter_modes() {
        assert_eq!(filter_mode(Sampling::Linear), wgpu::FilterMode::Linear);
        assert_eq!(filter_mode(Sampling::Nearest), wgpu::FilterMode::Nearest);
    }
}
