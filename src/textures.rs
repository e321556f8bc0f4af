//! Seed data and sampling configuration for state textures.
//!
//! Every state variable starts life as a [`SeedTexture`]: a CPU-side block of
//! RGBA float texels that is uploaded into both of the variable's render
//! targets at initialization. After that the data lives on the GPU only.
//!
//! # Quick Start
//!
//! ```ignore
//! use texsched::prelude::*;
//!
//! // One texel per particle: xy = position in the unit square, z = heading.
//! let seed = SeedTexture::from_fn(32, 32, |x, y| {
//!     let i = y * 32 + x;
//!     [hash01(i, 0), hash01(i, 1), hash01(i, 2), 1.0]
//! });
//! ```

/// Address mode for state texture sampling.
///
/// Applied to the sampler a variable's dependencies are read through, so it
/// controls what update programs see for coordinates outside 0-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    /// Clamp to edge color (default). Coordinates outside 0-1 use edge texels.
    #[default]
    ClampToEdge,
    /// Repeat/tile the texture. Coordinates wrap around.
    Repeat,
    /// Mirror the texture at boundaries.
    MirrorRepeat,
}

impl From<AddressMode> for wgpu::AddressMode {
    fn from(mode: AddressMode) -> Self {
        match mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
            AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }
}

/// CPU-side RGBA float data used to prime a state variable.
///
/// Texels are row-major: the texel at `(x, y)` occupies the four floats
/// starting at `(y * width + x) * 4`. The same ordering the GPU sees.
#[derive(Debug, Clone)]
pub struct SeedTexture {
    /// Texture width in texels.
    pub width: u32,
    /// Texture height in texels.
    pub height: u32,
    /// Raw RGBA data (width * height * 4 floats).
    pub data: Vec<f32>,
}

impl SeedTexture {
    /// Create a seed with every channel of every texel set to zero.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let blank = SeedTexture::zeros(256, 256);
    /// ```
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; (width * height * 4) as usize],
        }
    }

    /// Create a seed from raw RGBA float data.
    ///
    /// # Panics
    ///
    /// Panics if `data` does not hold exactly `width * height * 4` floats.
    pub fn from_data(width: u32, height: u32, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            (width * height * 4) as usize,
            "RGBA seed data size mismatch"
        );
        Self {
            width,
            height,
            data,
        }
    }

    /// Create a seed by evaluating a closure for every texel.
    ///
    /// The closure receives `(x, y)` and returns the texel's RGBA value.
    /// Texels are visited in row-major order.
    ///
    /// # Example
    ///
    /// ```ignore
    /// // Encode each texel's own coordinates, handy for debugging lookups.
    /// let coords = SeedTexture::from_fn(64, 64, |x, y| {
    ///     [x as f32, y as f32, 0.0, 1.0]
    /// });
    /// ```
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [f32; 4]) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Read one texel back out of the seed data.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the texture.
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        assert!(x < self.width && y < self.height, "Texel out of bounds");
        let i = ((y * self.width + x) * 4) as usize;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// The raw data as bytes, in the layout `Queue::write_texture` expects.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Bytes per row of texels.
    pub fn bytes_per_row(&self) -> u32 {
        self.width * 4 * std::mem::size_of::<f32>() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_fills_every_channel() {
        let seed = SeedTexture::zeros(4, 3);
        assert_eq!(seed.data.len(), 4 * 3 * 4);
        assert!(seed.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn from_fn_visits_texels_row_major() {
        let seed = SeedTexture::from_fn(3, 2, |x, y| [x as f32, y as f32, 0.0, 1.0]);
        assert_eq!(seed.texel(0, 0), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(seed.texel(2, 0), [2.0, 0.0, 0.0, 1.0]);
        assert_eq!(seed.texel(0, 1), [0.0, 1.0, 0.0, 1.0]);
        // Texel (x, y) starts at (y * width + x) * 4.
        assert_eq!(seed.data[(1 * 3 + 2) * 4], 2.0);
    }

    #[test]
    #[should_panic(expected = "RGBA seed data size mismatch")]
    fn from_data_rejects_short_buffers() {
        SeedTexture::from_data(4, 4, vec![0.0; 15]);
    }

    #[test]
    fn byte_view_matches_float_layout() {
        let seed = SeedTexture::zeros(8, 8);
        assert_eq!(seed.as_bytes().len(), 8 * 8 * 4 * 4);
        assert_eq!(seed.bytes_per_row(), 8 * 4 * 4);
    }
}
