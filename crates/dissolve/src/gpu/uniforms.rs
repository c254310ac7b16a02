use bytemuck::{Pod, Zeroable};

use crate::animator::FrameParams;
use crate::types::Viewport;

/// CPU mirror of the `DissolveParams` std140 block in the shaders.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DissolveUniforms {
    pub elapsed_ms: f32,
    pub duration_ms: f32,
    pub particle_size: f32,
    pub grid_width: f32,
    pub grid_height: f32,
    pub origin_left: f32,
    pub origin_top: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub padding: [f32; 3],
}

unsafe impl Zeroable for DissolveUniforms {}
unsafe impl Pod for DissolveUniforms {}

impl DissolveUniforms {
    pub fn new(viewport: Viewport) -> Self {
        let mut uniforms = Self::default();
        uniforms.set_viewport(viewport);
        uniforms
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport_width = viewport.width as f32;
        self.viewport_height = viewport.height as f32;
    }

    /// Copies the per-frame values computed by the animator.
    pub fn apply(&mut self, frame: &FrameParams) {
        self.elapsed_ms = frame.elapsed_ms;
        self.duration_ms = frame.duration_ms;
        self.particle_size = frame.particle_size;
        self.grid_width = frame.grid.width() as f32;
        self.grid_height = frame.grid.height() as f32;
        self.origin_left = frame.origin[0];
        self.origin_top = frame.origin[1];
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
