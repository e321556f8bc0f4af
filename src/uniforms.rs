//! Custom uniforms for passing runtime data to update programs.
//!
//! Each state variable carries its own set of named uniforms. They become
//! fields of the `params` struct in the variable's specialized program, and
//! the host updates them between ticks.
//!
//! # Example
//!
//! ```ignore
//! let config = VariableConfig::new(UPDATE_BODY)
//!     .with_uniform("time", 0.0f32)
//!     .with_uniform("speed", 0.12f32);
//!
//! // Each frame, before advancing the simulation:
//! scheduler.set_uniform(position, "time", clock.elapsed());
//! scheduler.compute(&device, &queue);
//! ```
//!
//! In WGSL the values are read as `params.time`, `params.speed`, and so on,
//! after the built-in `params.resolution`.

use glam::{Vec2, Vec3, Vec4};
use std::collections::HashMap;

/// Supported uniform value types.
#[derive(Clone, Copy, Debug)]
pub enum UniformValue {
    F32(f32),
    I32(i32),
    U32(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl UniformValue {
    /// Get the WGSL type name for this value.
    pub fn wgsl_type(&self) -> &'static str {
        match self {
            UniformValue::F32(_) => "f32",
            UniformValue::I32(_) => "i32",
            UniformValue::U32(_) => "u32",
            UniformValue::Vec2(_) => "vec2<f32>",
            UniformValue::Vec3(_) => "vec3<f32>",
            UniformValue::Vec4(_) => "vec4<f32>",
        }
    }

    /// Get the byte size of this value (without trailing padding).
    pub fn byte_size(&self) -> usize {
        match self {
            UniformValue::F32(_) => 4,
            UniformValue::I32(_) => 4,
            UniformValue::U32(_) => 4,
            UniformValue::Vec2(_) => 8,
            UniformValue::Vec3(_) => 12, // 12 bytes, aligned to 16
            UniformValue::Vec4(_) => 16,
        }
    }

    /// The alignment WGSL gives this value in a uniform buffer struct.
    pub fn alignment(&self) -> usize {
        match self {
            UniformValue::Vec4(_) | UniformValue::Vec3(_) => 16,
            UniformValue::Vec2(_) => 8,
            _ => 4,
        }
    }

    /// Write this value to a byte buffer.
    pub fn write_bytes(&self, buf: &mut Vec<u8>) {
        match self {
            UniformValue::F32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            UniformValue::I32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            UniformValue::U32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            UniformValue::Vec2(v) => {
                buf.extend_from_slice(&v.x.to_le_bytes());
                buf.extend_from_slice(&v.y.to_le_bytes());
            }
            UniformValue::Vec3(v) => {
                buf.extend_from_slice(&v.x.to_le_bytes());
                buf.extend_from_slice(&v.y.to_le_bytes());
                buf.extend_from_slice(&v.z.to_le_bytes());
                // No padding here - a following scalar packs into the tail,
                // matching WGSL's uniform layout
            }
            UniformValue::Vec4(v) => {
                buf.extend_from_slice(&v.x.to_le_bytes());
                buf.extend_from_slice(&v.y.to_le_bytes());
                buf.extend_from_slice(&v.z.to_le_bytes());
                buf.extend_from_slice(&v.w.to_le_bytes());
            }
        }
    }
}

// Conversion traits for ergonomic API
impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::F32(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::I32(v)
    }
}

impl From<u32> for UniformValue {
    fn from(v: u32) -> Self {
        UniformValue::U32(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

/// Collection of custom uniform values for one variable.
#[derive(Clone, Debug, Default)]
pub struct CustomUniforms {
    /// Ordered list of (name, value) pairs.
    /// Order matters for WGSL struct layout.
    values: Vec<(String, UniformValue)>,
    /// Quick lookup by name.
    indices: HashMap<String, usize>,
}

impl CustomUniforms {
    /// Create empty custom uniforms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a uniform value.
    ///
    /// Setting a name that exists updates it in place; declaration order is
    /// fixed by first use, so struct layout never shifts under a live
    /// pipeline.
    pub fn set<V: Into<UniformValue>>(&mut self, name: &str, value: V) {
        let value = value.into();
        if let Some(&idx) = self.indices.get(name) {
            self.values[idx].1 = value;
        } else {
            let idx = self.values.len();
            self.values.push((name.to_string(), value));
            self.indices.insert(name.to_string(), idx);
        }
    }

    /// Get a uniform value by name.
    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.indices.get(name).map(|&idx| &self.values[idx].1)
    }

    /// Check if any custom uniforms are defined.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get the number of custom uniforms.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Iterate over all uniforms in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Generate WGSL struct fields for these uniforms.
    pub(crate) fn to_wgsl_fields(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| format!("    {}: {},", name, value.wgsl_type()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Serialize all values to bytes for GPU upload.
    ///
    /// Offsets follow WGSL uniform layout. The result is valid both at the
    /// start of a buffer and appended after any 16-byte-aligned header.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for (_, value) in &self.values {
            let align = value.alignment();
            while buf.len() % align != 0 {
                buf.push(0);
            }
            value.write_bytes(&mut buf);
        }
        buf
    }

    /// Calculate total byte size with trailing alignment.
    pub(crate) fn byte_size(&self) -> usize {
        let bytes = self.to_bytes();
        // Round up to 16-byte alignment for uniform buffer
        (bytes.len() + 15) & !15
    }
}
