//! wgpu side of the dissolve renderer.
//!
//! - `context` owns the instance, device and surface, and reconfigures the
//!   swapchain when the window resizes.
//! - `pipeline` compiles the particle shaders into a single render pipeline
//!   with one bind group (uniforms, source texture, sampler).
//! - `texture` uploads a source image and its particle index buffer for one run.
//! - `uniforms` mirrors the shader parameter block.
//! - `state` drives the animator once per frame and records the draw.

mod context;
mod pipeline;
mod state;
mod texture;
mod uniforms;

pub use context::AdapterProfile;
pub(crate) use state::GpuState;
pub use uniforms::DissolveUniforms;
