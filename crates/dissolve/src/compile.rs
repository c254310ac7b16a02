use std::borrow::Cow;

use anyhow::{anyhow, Result};
use wgpu::naga::ShaderStage;

/// Compiles the particle trajectory vertex stage.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile_glsl(
        device,
        "dissolve particle vertex",
        VERTEX_SHADER_GLSL,
        ShaderStage::Vertex,
    )
}

/// Compiles the fade and discard fragment stage.
pub(crate) fn compile_fragment_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile_glsl(
        device,
        "dissolve particle fragment",
        FRAGMENT_SHADER_GLSL,
        ShaderStage::Fragment,
    )
}

/// Front-end and validation errors are caught in an error scope and
/// returned instead of reaching the device's uncaptured-error handler.
fn compile_glsl(
    device: &wgpu::Device,
    label: &'static str,
    source: &'static str,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(anyhow!("{label}: {err}")),
        None => Ok(module),
    }
}

/// Uniform block shared by both stages.
///
/// The layout must match [`DissolveUniforms`](crate::gpu::DissolveUniforms):
/// twelve tightly packed floats, the last three padding the block to 48 bytes.
macro_rules! params_block {
    () => {
        r"#version 450
layout(std140, set = 0, binding = 0) uniform DissolveParams {
    float elapsed_ms;
    float duration_ms;
    float particle_size;
    float grid_width;
    float grid_height;
    float origin_left;
    float origin_top;
    float viewport_width;
    float viewport_height;
    float _padding0;
    float _padding1;
    float _padding2;
} params;
"
    };
}

/// Particle index in, sprite quad corner out.
///
/// GL point sprites have no wgpu equivalent, so each instance is a six-vertex
/// quad and the corner doubles as the point coordinate for the fragment stage.
/// Every formula here has a CPU twin in `trajectory.rs`.
const VERTEX_SHADER_GLSL: &str = concat!(
    params_block!(),
    r"
layout(location = 0) in float a_index;

layout(location = 0) out float v_lifetime;
layout(location = 1) out vec2 v_uv;
layout(location = 2) out vec2 v_point;

const vec2 corners[6] = vec2[6](
    vec2(0.0, 0.0),
    vec2(1.0, 0.0),
    vec2(0.0, 1.0),
    vec2(0.0, 1.0),
    vec2(1.0, 0.0),
    vec2(1.0, 1.0)
);

float random1(float value) {
    return fract(sin(value) * 100000.0);
}

float random2(vec2 st) {
    return fract(sin(dot(st, vec2(12.9898, 78.233))) * 43758.5453);
}

void main() {
    float grid_width = max(params.grid_width, 1.0);
    float row = floor(a_index / grid_width);
    float column = a_index - row * grid_width;

    vec2 origin_px = vec2(params.origin_left, params.origin_top);
    vec2 pixel = params.particle_size * vec2(column + 0.5, row + 0.5) + origin_px;
    vec2 viewport = max(vec2(params.viewport_width, params.viewport_height), vec2(1.0));
    vec2 origin = vec2(2.0 * pixel.x / viewport.x - 1.0, 1.0 - 2.0 * pixel.y / viewport.y);

    float r = random2(pixel);
    float min_window = params.duration_ms / 4.0;
    float window = min_window * (1.0 + r);
    float delay = pixel.x / viewport.x * min_window;
    float span = delay + window;
    float lifetime = 1.0;
    if (span > 0.0) {
        lifetime = min(max(params.elapsed_ms, 0.0) / span, 1.0);
    }
    float acceleration = 1.0 + 3.0 * (pixel.x / viewport.x);
    float factor = pow(lifetime, acceleration);

    float rand_y = random1(origin.y);
    float rand_x = random1(origin.x);
    vec2 target = vec2(
        origin.x + fract(10000.0 * rand_y * rand_y * r) - 0.5,
        origin.y + fract(100000.0 * rand_x * rand_x * r) - 0.25
    );
    vec2 center = mix(origin, target, factor);

    uint corner_index = uint(gl_VertexIndex) % 6u;
    vec2 corner = corners[corner_index];
    vec2 half_extent = vec2(params.particle_size) / viewport;
    vec2 offset = vec2(corner.x * 2.0 - 1.0, 1.0 - corner.y * 2.0) * half_extent;

    vec2 footprint = max(vec2(params.grid_width, params.grid_height) * params.particle_size, vec2(0.000001));
    v_uv = (pixel - origin_px) / footprint;
    v_lifetime = lifetime;
    v_point = corner;
    gl_Position = vec4(center + offset, 0.0, 1.0);
}
"
);

/// Samples first so the implicit-LOD lookup stays in uniform control flow.
const FRAGMENT_SHADER_GLSL: &str = concat!(
    params_block!(),
    r"
layout(location = 0) in float v_lifetime;
layout(location = 1) in vec2 v_uv;
layout(location = 2) in vec2 v_point;

layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 1) uniform texture2D source_texture;
layout(set = 0, binding = 2) uniform sampler source_sampler;

void main() {
    vec4 color = texture(sampler2D(source_texture, source_sampler), v_uv);
    if (v_lifetime >= 1.0) {
        discard;
    }
    if (color.a <= 0.0) {
        discard;
    }
    float visibility = pow(v_lifetime, 5.0);
    if (distance(v_point, vec2(0.5, 0.5)) > 1.0 - visibility) {
        discard;
    }
    out_color = vec4(color.rgb, mix(color.a, 0.0, visibility));
}
"
);

/// Full vertex stage source, as handed to the GLSL frontend.
pub fn vertex_shader_source() -> &'static str {
    VERTEX_SHADER_GLSL
}

/// Full fragment stage source, as handed to the GLSL frontend.
pub fn fragment_shader_source() -> &'static str {
    FRAGMENT_SHADER_GLSL
}
