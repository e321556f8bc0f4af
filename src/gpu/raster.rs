//! Off-screen point sprite rendering of particle positions.
//!
//! Particle state lives in textures, one texel per particle, laid out as a
//! square grid. The rasterizer draws one quad per particle into an
//! Rgba8Unorm color buffer, looking up each particle's position with a
//! vertex-stage `textureLoad` so no data ever round-trips through the CPU.
//!
//! Position convention: a texel's `xy` holds the particle's position in the
//! unit square, mapped to the full output buffer. The remaining channels are
//! free for whatever the update programs track (heading, age, species).

use wgpu::util::DeviceExt;

use crate::error::{GpuError, RasterizerError};
use crate::gpu::OUTPUT_FORMAT;

/// Point sprite shader shared by every rasterizer.
///
/// Each instance is one particle; `@location(0)` carries the particle's
/// texel coordinate in the position texture. Six vertices expand it to a
/// quad of `point_size` output pixels around the particle's position. The
/// fragment stage writes a radial falloff into the red channel.
const RASTER_SHADER: &str = r#"
struct RasterParams {
    resolution: vec2<f32>,
    point_size: f32,
    _pad: f32,
};

@group(0) @binding(0)
var<uniform> params: RasterParams;
@group(0) @binding(1)
var positions: texture_2d<f32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @location(0) texel: vec2<u32>,
) -> VertexOutput {
    var quad = array<vec2<f32>, 6>(
        vec2<f32>(-0.5, -0.5),
        vec2<f32>(0.5, -0.5),
        vec2<f32>(0.5, 0.5),
        vec2<f32>(-0.5, -0.5),
        vec2<f32>(0.5, 0.5),
        vec2<f32>(-0.5, 0.5),
    );

    let p = textureLoad(positions, vec2<i32>(texel), 0);
    let center = p.xy * 2.0 - vec2<f32>(1.0);
    let corner = quad[vertex_index];
    let offset = corner * params.point_size * 2.0 / params.resolution;

    var out: VertexOutput;
    out.position = vec4<f32>(center + offset, 0.0, 1.0);
    out.uv = corner + vec2<f32>(0.5);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let d = 1.0 - length(vec2<f32>(0.5) - in.uv);
    return vec4<f32>(d, 0.0, 0.0, 1.0);
}
"#;

/// Uniforms for the point sprite pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct RasterParams {
    resolution: [f32; 2],
    point_size: f32,
    _pad: f32,
}

/// Side length of the square texel grid for `particle_count` particles.
///
/// `None` when the count is not a perfect square.
fn grid_side(particle_count: u32) -> Option<u32> {
    let side = (particle_count as f64).sqrt().round() as u32;
    if side.checked_mul(side) == Some(particle_count) {
        Some(side)
    } else {
        None
    }
}

/// Check construction parameters, returning the grid side on success.
fn validate(width: u32, height: u32, particle_count: u32) -> Result<u32, RasterizerError> {
    if width == 0 || height == 0 {
        return Err(RasterizerError::ZeroOutputSize);
    }
    if particle_count == 0 {
        return Err(RasterizerError::ZeroParticleCount);
    }
    grid_side(particle_count).ok_or(RasterizerError::NonSquareParticleCount(particle_count))
}

/// Texel coordinate of every particle, in instance order.
///
/// Particle `i` reads texel `(i % side, i / side)`, the same row-major
/// layout [`SeedTexture`](crate::SeedTexture) uses, so seed builders can
/// think in flat particle indices.
fn texel_coords(particle_count: u32, side: u32) -> Vec<[u32; 2]> {
    (0..particle_count).map(|i| [i % side, i / side]).collect()
}

/// Row stride for copying the output texture into a mappable buffer.
fn padded_bytes_per_row(width: u32) -> u32 {
    let bytes_per_row = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (bytes_per_row + align - 1) / align * align
}

/// Drop the per-row copy padding, leaving tightly packed RGBA rows.
fn strip_row_padding(data: &[u8], width: u32, height: u32, padded_bytes_per_row: u32) -> Vec<u8> {
    let row_bytes = (width * 4) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * padded_bytes_per_row as usize;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}

/// Renders particles as point sprites into an off-screen color buffer.
///
/// The buffer is cleared to black and redrawn from scratch every
/// [`render`](Self::render), so stale sprites never survive a frame. Bind the
/// result anywhere a `texture_2d<f32>` fits, or pull the pixels back with
/// [`read_back`](Self::read_back).
pub struct ParticleRasterizer {
    width: u32,
    height: u32,
    particle_count: u32,
    side: u32,
    point_size: f32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    texel_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl ParticleRasterizer {
    /// Create a rasterizer drawing `particle_count` sprites into a
    /// `width` x `height` buffer.
    ///
    /// The count must be a perfect square: particle positions are read from
    /// a square grid of texels, one per particle.
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        particle_count: u32,
    ) -> Result<Self, RasterizerError> {
        let side = validate(width, height, particle_count)?;

        log::debug!(
            "Creating particle rasterizer: {} particles ({}x{} texels) into {}x{}",
            particle_count,
            side,
            side,
            width,
            height
        );

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Particle Output Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let texels = texel_coords(particle_count, side);
        let texel_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Texel Buffer"),
            contents: bytemuck::cast_slice(&texels),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let params = RasterParams {
            resolution: [width as f32, height as f32],
            point_size: 1.0,
            _pad: 0.0,
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Raster Params Buffer"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Point Sprite Shader"),
            source: wgpu::ShaderSource::Wgsl(RASTER_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Raster Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Raster Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Point Sprite Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[u32; 2]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &[wgpu::VertexAttribute {
                        offset: 0,
                        shader_location: 0,
                        format: wgpu::VertexFormat::Uint32x2,
                    }],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: OUTPUT_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            width,
            height,
            particle_count,
            side,
            point_size: 1.0,
            texture,
            view,
            texel_buffer,
            params_buffer,
            pipeline,
            bind_group_layout,
        })
    }

    /// Sprite size in output pixels. Defaults to one pixel.
    pub fn with_point_size(mut self, point_size: f32) -> Self {
        self.point_size = point_size;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    /// Side length of the position texel grid.
    pub fn grid_side(&self) -> u32 {
        self.side
    }

    /// The off-screen color buffer, for binding in later passes.
    pub fn output_view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn output_texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Clear the output buffer and draw every particle.
    ///
    /// `positions` is sampled per instance with `textureLoad`; pass the
    /// scheduler's current view of the position variable. The pass is only
    /// recorded here, the host submits the encoder.
    pub fn render(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        positions: &wgpu::TextureView,
    ) {
        let params = RasterParams {
            resolution: [self.width as f32, self.height as f32],
            point_size: self.point_size,
            _pad: 0.0,
        };
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        // The position view alternates every tick, so the bind group is
        // rebuilt per pass.
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Raster Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(positions),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Point Sprite Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, self.texel_buffer.slice(..));
        pass.draw(0..6, 0..self.particle_count);
    }

    /// Copy the output buffer to the CPU as tightly packed RGBA bytes.
    ///
    /// Blocks until the copy completes. Row order matches the texture, top
    /// row first.
    pub fn read_back(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>, GpuError> {
        let padded_bytes_per_row = padded_bytes_per_row(self.width);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Raster Readback Buffer"),
            size: padded_bytes_per_row as u64 * self.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Raster Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });

        rx.recv()
            .map_err(|_| GpuError::BufferMapping("map callback never ran".to_string()))?
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

        let pixels = {
            let data = slice.get_mapped_range();
            strip_row_padding(&data, self.width, self.height, padded_bytes_per_row)
        };
        staging.unmap();
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Grid Geometry Tests ==========

    #[test]
    fn test_grid_side_of_perfect_squares() {
        assert_eq!(grid_side(1), Some(1));
        assert_eq!(grid_side(4), Some(2));
        assert_eq!(grid_side(1024), Some(32));
        assert_eq!(grid_side(65536), Some(256));
    }

    #[test]
    fn test_grid_side_rejects_non_squares() {
        assert_eq!(grid_side(2), None);
        assert_eq!(grid_side(3), None);
        assert_eq!(grid_side(1000), None);
        assert_eq!(grid_side(1023), None);
    }

    #[test]
    fn test_texel_coords_cover_the_grid_once() {
        let coords = texel_coords(16, 4);
        assert_eq!(coords.len(), 16);
        assert_eq!(coords[0], [0, 0]);
        assert_eq!(coords[3], [3, 0]);
        // Row-major: particle `side` starts the second row.
        assert_eq!(coords[4], [0, 1]);
        assert_eq!(coords[15], [3, 3]);

        for &[x, y] in &coords {
            assert!(x < 4 && y < 4);
        }
        let mut unique = coords.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 16);
    }

    // ========== Validation Tests ==========

    #[test]
    fn test_validate_accepts_square_counts() {
        assert_eq!(validate(640, 480, 1024).unwrap(), 32);
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        assert!(matches!(
            validate(0, 480, 1024),
            Err(RasterizerError::ZeroOutputSize)
        ));
        assert!(matches!(
            validate(640, 0, 1024),
            Err(RasterizerError::ZeroOutputSize)
        ));
        assert!(matches!(
            validate(640, 480, 0),
            Err(RasterizerError::ZeroParticleCount)
        ));
        assert!(matches!(
            validate(640, 480, 1000),
            Err(RasterizerError::NonSquareParticleCount(1000))
        ));
    }

    // ========== Readback Layout Tests ==========

    #[test]
    fn test_padded_rows_are_256_aligned() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(100), 512);
        assert_eq!(padded_bytes_per_row(256), 1024);
    }

    #[test]
    fn test_strip_row_padding_keeps_pixel_rows() {
        // Two rows of a 2-pixel-wide image padded out to 16-byte rows.
        let mut data = vec![0u8; 32];
        data[0..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[16..24].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let pixels = strip_row_padding(&data, 2, 2, 16);
        assert_eq!(pixels, (1..=16).collect::<Vec<u8>>());
    }

    // ========== Shader Tests ==========

    #[test]
    fn test_point_sprite_shader_validates() {
        let module =
            naga::front::wgsl::parse_str(RASTER_SHADER).expect("Point sprite shader should parse");
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .expect("Point sprite shader should validate");
    }
}
