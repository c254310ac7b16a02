use std::time::{Duration, Instant};

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use crate::animator::{Animator, FrameStep};
use crate::types::{PreviewConfig, Viewport};

use super::context::{AdapterProfile, GpuContext};
use super::pipeline::{DissolvePipeline, QUAD_VERTICES};
use super::texture::ParticleBuffers;
use super::uniforms::DissolveUniforms;

/// Owns every GPU resource of the renderer. Lives on the render thread only.
pub(crate) struct GpuState {
    context: GpuContext,
    pipeline: DissolvePipeline,
    uniform_buffer: wgpu::Buffer,
    uniforms: DissolveUniforms,
    buffers: Option<ParticleBuffers>,
    animator: Animator,
    clear_color: wgpu::Color,
    frames_drawn: u32,
    last_stats: Instant,
}

impl GpuState {
    pub(crate) fn new<T>(target: &T, size: Viewport, config: &PreviewConfig) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size, config.surface_alpha)?;
        let pipeline = DissolvePipeline::new(&context.device, context.surface_format, 1)?;

        let uniforms = DissolveUniforms::new(context.viewport);
        let uniform_buffer =
            context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("dissolve uniforms"),
                    contents: uniforms.as_bytes(),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });

        let [r, g, b, a] = config.clear_color.to_f64();
        Ok(Self {
            context,
            pipeline,
            uniform_buffer,
            uniforms,
            buffers: None,
            animator: Animator::new(),
            clear_color: wgpu::Color { r, g, b, a },
            frames_drawn: 0,
            last_stats: Instant::now(),
        })
    }

    pub(crate) fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    pub(crate) fn animator_mut(&mut self) -> &mut Animator {
        &mut self.animator
    }

    /// True while a run is queued or in flight.
    pub(crate) fn is_animating(&self) -> bool {
        self.animator.is_busy()
    }

    pub(crate) fn resize(&mut self, viewport: Viewport) {
        if viewport.is_empty() {
            return;
        }
        self.context.resize(viewport);
        self.uniforms.set_viewport(viewport);
    }

    pub(crate) fn reconfigure(&mut self) {
        self.context.reconfigure();
    }

    /// Draws one frame. Pending requests are uploaded first, then the
    /// animator decides whether particles are drawn this frame.
    pub(crate) fn render(&mut self, now: Instant) -> Result<FrameStep, wgpu::SurfaceError> {
        let frame = self.context.surface.get_current_texture()?;

        self.activate_pending();
        let step = self.animator.advance(now);
        if !matches!(step, FrameStep::Draw(_)) {
            self.buffers = None;
        }

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("dissolve encoder"),
                });

        if let (FrameStep::Draw(params), Some(_)) = (&step, self.buffers.as_ref()) {
            self.uniforms.apply(params);
            self.context
                .queue
                .write_buffer(&self.uniform_buffer, 0, self.uniforms.as_bytes());
        }

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("dissolve pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let (FrameStep::Draw(_), Some(buffers)) = (&step, self.buffers.as_ref()) {
                render_pass.set_pipeline(&self.pipeline.pipeline);
                render_pass.set_bind_group(0, &buffers.bind_group, &[]);
                render_pass.set_vertex_buffer(0, buffers.index_buffer.slice(..));
                render_pass.draw(0..QUAD_VERTICES, 0..buffers.instance_count);
            }
        }

        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
        self.record_frame(now, &step);
        Ok(step)
    }

    fn activate_pending(&mut self) {
        let Some(request) = self.animator.take_pending() else {
            return;
        };
        let plan = request.plan(self.context.viewport);
        let uploaded = ParticleBuffers::upload(
            &self.context.device,
            &self.context.queue,
            &self.pipeline.bind_group_layout,
            &self.uniform_buffer,
            &request.image,
            &plan.grid,
            plan.settings.sampling,
            self.context.adapter_profile.max_texture_dimension_2d,
        );
        self.buffers = self.animator.activate(request, plan, uploaded);
    }

    fn record_frame(&mut self, now: Instant, step: &FrameStep) {
        if let FrameStep::Draw(params) = step {
            self.frames_drawn += 1;
            trace!(elapsed_ms = params.elapsed_ms, "drew dissolve frame");
        }
        let since = now.saturating_duration_since(self.last_stats);
        if since >= Duration::from_secs(1) {
            if self.frames_drawn > 0 {
                debug!(
                    fps = (self.frames_drawn as f32 / since.as_secs_f32()).round(),
                    "render stats"
                );
            }
            self.frames_drawn = 0;
            self.last_stats = now;
        }
    }
}
