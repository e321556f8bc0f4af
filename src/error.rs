//! Error types for texsched.
//!
//! This module provides error types for GPU initialization, scheduler
//! configuration, and rasterizer setup.

use std::fmt;

/// Errors that can occur during GPU initialization or readback.
#[derive(Debug)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::SurfaceCreation(e) => write!(f, "Failed to create GPU surface: {}", e),
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::SurfaceCreation(e) => Some(e),
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::CreateSurfaceError> for GpuError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        GpuError::SurfaceCreation(e)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors that can occur while configuring or initializing a
/// [`ComputeScheduler`](crate::ComputeScheduler).
///
/// Configuration errors are reported as early as possible: bad names at
/// registration, everything that needs the full variable set (dependency
/// resolution, device capabilities) at initialization.
#[derive(Debug)]
pub enum SchedulerError {
    /// Variable name is not a valid WGSL identifier.
    InvalidVariableName(String),
    /// Variable name collides with a binding the generated program declares.
    ReservedVariableName(String),
    /// A variable with this name is already registered.
    DuplicateVariable(String),
    /// A declared dependency does not match any registered variable.
    UnknownDependency {
        /// The variable whose dependency list failed to resolve.
        variable: String,
        /// The name that matched nothing.
        dependency: String,
    },
    /// Scheduler resolution has a zero dimension.
    ZeroResolution,
    /// Scheduler resolution exceeds the device's 2D texture limit.
    ResolutionTooLarge {
        /// The requested dimension.
        requested: u32,
        /// The device limit.
        max: u32,
    },
    /// The adapter cannot render into 32-bit float textures.
    FloatTargetUnsupported,
    /// The device exposes no sampled textures to shader stages.
    VertexTextureUnsupported,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::InvalidVariableName(name) => write!(
                f,
                "Invalid variable name '{}'. Names must start with a letter or underscore and contain only ASCII letters, digits, and underscores.",
                name
            ),
            SchedulerError::ReservedVariableName(name) => write!(
                f,
                "Variable name '{}' is reserved for generated program bindings.",
                name
            ),
            SchedulerError::DuplicateVariable(name) => {
                write!(f, "A variable named '{}' is already registered.", name)
            }
            SchedulerError::UnknownDependency {
                variable,
                dependency,
            } => write!(
                f,
                "Variable '{}' depends on '{}', which is not a registered variable.",
                variable, dependency
            ),
            SchedulerError::ZeroResolution => {
                write!(f, "Scheduler resolution must be non-zero in both dimensions.")
            }
            SchedulerError::ResolutionTooLarge { requested, max } => write!(
                f,
                "Scheduler resolution {} exceeds the device's maximum 2D texture dimension of {}.",
                requested, max
            ),
            SchedulerError::FloatTargetUnsupported => write!(
                f,
                "This adapter cannot use Rgba32Float textures as render targets, which state variables require."
            ),
            SchedulerError::VertexTextureUnsupported => write!(
                f,
                "This device cannot sample textures from shader stages, which particle position lookup requires."
            ),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Errors that can occur when creating a
/// [`ParticleRasterizer`](crate::ParticleRasterizer).
#[derive(Debug)]
pub enum RasterizerError {
    /// Output buffer has a zero dimension.
    ZeroOutputSize,
    /// Particle count is zero.
    ZeroParticleCount,
    /// Particle count is not a perfect square.
    NonSquareParticleCount(u32),
}

impl fmt::Display for RasterizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasterizerError::ZeroOutputSize => {
                write!(f, "Rasterizer output size must be non-zero in both dimensions.")
            }
            RasterizerError::ZeroParticleCount => {
                write!(f, "Particle count must be at least 1.")
            }
            RasterizerError::NonSquareParticleCount(count) => write!(
                f,
                "Particle count {} is not a perfect square. Positions are looked up from a square grid of texels, so counts like 1024 (32 x 32) are required.",
                count
            ),
        }
    }
}

impl std::error::Error for RasterizerError {}
