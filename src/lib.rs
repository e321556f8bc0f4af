//! # texsched - Texture Computation Scheduler
//!
//! GPU particle simulations whose entire state lives in textures.
//!
//! texsched advances named state variables with user-supplied WGSL programs,
//! double-buffering every variable so updates always read a consistent
//! snapshot, then draws particles straight from the resulting position
//! texture. No per-tick CPU round trips, no storage buffer plumbing.
//!
//! ## Quick Start
//!
//! ```ignore
//! use texsched::prelude::*;
//!
//! const DRIFT: &str = r#"
//! fn update(coord: vec2<f32>) -> vec4<f32> {
//!     let p = textureSampleLevel(position, state_sampler, coord, 0.0);
//!     return vec4<f32>(fract(p.xy + vec2<f32>(params.speed, 0.0)), p.zw);
//! }
//! "#;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gpu = pollster::block_on(GpuContext::headless())?;
//!
//!     let mut scheduler = ComputeScheduler::new(32, 32);
//!     let seed = SeedTexture::from_fn(32, 32, |x, y| {
//!         [x as f32 / 32.0, y as f32 / 32.0, 0.0, 1.0]
//!     });
//!     let position = scheduler.add_variable(
//!         "position",
//!         VariableConfig::new(DRIFT).with_uniform("speed", 0.002f32),
//!         seed,
//!     )?;
//!     scheduler.set_dependencies(position, &["position"]);
//!     scheduler.initialize(&gpu.adapter, &gpu.device, &gpu.queue)?;
//!
//!     let rasterizer = ParticleRasterizer::new(&gpu.device, 640, 480, 32 * 32)?;
//!     loop {
//!         scheduler.compute(&gpu.device, &gpu.queue);
//!         let mut encoder = gpu.device.create_command_encoder(&Default::default());
//!         rasterizer.render(
//!             &gpu.device,
//!             &gpu.queue,
//!             &mut encoder,
//!             scheduler.current_texture(position),
//!         );
//!         gpu.queue.submit(std::iter::once(encoder.finish()));
//!     }
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### State Variables
//!
//! A variable is one W x H grid of RGBA float texels: a position per
//! particle, a trail field, a velocity layer. Each one carries a WGSL update
//! program defining `fn update(coord: vec2<f32>) -> vec4<f32>`, run once per
//! texel per tick.
//!
//! ### Dependencies
//!
//! [`ComputeScheduler::set_dependencies`] names the variables a program
//! reads. Each name becomes a `texture_2d<f32>` global in the generated
//! program, sampled through `state_sampler`. A variable listing itself reads
//! its own previous state.
//!
//! ### Double Buffering
//!
//! Every variable owns two render targets. Ticks write into the back target
//! while reading fronts, and one scheduler-wide flip happens after all
//! variables have rendered. Update order between variables can never change
//! results within a tick.
//!
//! ### Point Sprites
//!
//! [`ParticleRasterizer`] draws one sprite per particle into an off-screen
//! buffer, reading positions from a state texture in the vertex stage. The
//! particle count must be a perfect square: particle `i` lives at texel
//! `(i % side, i / side)`.

pub mod error;
mod gpu;
pub mod textures;
pub mod time;
mod uniforms;
mod variable;

pub use bytemuck;
pub use error::{GpuError, RasterizerError, SchedulerError};
pub use glam::{Vec2, Vec3, Vec4};
pub use gpu::{
    ComputeScheduler, GpuContext, ParticleRasterizer, PresentationQuad, OUTPUT_FORMAT, STATE_FORMAT,
};
pub use textures::{AddressMode, SeedTexture};
pub use time::SimClock;
pub use uniforms::{CustomUniforms, UniformValue};
pub use variable::{Variable, VariableConfig};

/// Convenient re-exports for common usage.
///
/// # Usage
///
/// ```ignore
/// use texsched::prelude::*;
/// ```
///
/// This imports:
/// - [`ComputeScheduler`] - registers and advances state variables
/// - [`ParticleRasterizer`] - draws particles from a position texture
/// - [`PresentationQuad`] - blits the result to a surface
/// - [`VariableConfig`], [`SeedTexture`], [`AddressMode`] - variable setup
/// - [`GpuContext`] - headless adapter/device acquisition
/// - [`SimClock`] - tick timing
/// - [`Vec2`], [`Vec3`], [`Vec4`] - glam vector types
pub mod prelude {
    pub use crate::error::{GpuError, RasterizerError, SchedulerError};
    pub use crate::gpu::{ComputeScheduler, GpuContext, ParticleRasterizer, PresentationQuad};
    pub use crate::textures::{AddressMode, SeedTexture};
    pub use crate::time::SimClock;
    pub use crate::uniforms::{CustomUniforms, UniformValue};
    pub use crate::variable::{Variable, VariableConfig};
    pub use crate::{Vec2, Vec3, Vec4};
}
