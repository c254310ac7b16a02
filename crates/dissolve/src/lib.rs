//! "Dissolve to dust" transition renderer.
//!
//! An image is cut into a grid of `particle_size` pixel blocks, one particle
//! per block, and a pair of GLSL shaders scatters, shrinks and fades the
//! particles over a fixed duration. The flow through the crate:
//!
//! ```text
//!   host thread                          render thread
//!   DissolveController ──commands──▶ DissolveInbox ──▶ Animator (pending slot)
//!     vanish / reset      (wake)                          │ take_pending
//!                                                         ▼
//!                                   GpuState::render ─▶ upload texture + index buffer
//!                                                         │ advance(now)
//!                                                         ▼
//!                                   Draw(uniforms) │ Completed (callback) │ Idle
//! ```
//!
//! Everything above the `gpu` module is plain data and can be exercised
//! without a device. `trajectory` carries a CPU copy of the shader maths for
//! hosts that need to know where a particle is at a given time.

mod animator;
mod compile;
mod controller;
mod gpu;
mod grid;
mod source;
mod trajectory;
mod types;
mod window;

pub use animator::{
    Animator, CompletionCallback, DissolveRequest, FrameParams, FrameStep, Phase, SessionPlan,
};
pub use compile::{fragment_shader_source, vertex_shader_source};
pub use controller::{channel, DissolveCommand, DissolveController, DissolveInbox, WakeFn};
pub use effectconfig::{Color, Sampling};
pub use gpu::{AdapterProfile, DissolveUniforms};
pub use grid::ParticleGrid;
pub use source::SourceImage;
pub use trajectory::{
    fragment_alpha, hash1, hash2, mask_radius, visibility, ParticleModel, ParticleState,
    ParticleTiming, VISIBILITY_EXPONENT,
};
pub use types::{EffectSettings, Placement, PreviewConfig, SurfaceAlpha, Viewport};
pub use window::{WindowRuntime, WindowSignal};
