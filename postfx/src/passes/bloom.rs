//! Bloom pass: thresholded glow composited over the read buffer

use serde::{Deserialize, Serialize};

use crate::backend::{ColorBuffer, StencilFunc};
use crate::error::ComposerError;
use crate::graphics::blit::{fullscreen_pipeline, stencil_index};
use crate::graphics::{CameraState, ColorTarget, SceneInput, WgpuContext};
use crate::pass::{Pass, PassState};

const SHADER: &str = r#"
struct VsOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VsOut {
    let x = f32(i32(index / 2u) * 4 - 1);
    let y = f32(i32(index & 1u) * 4 - 1);
    var out: VsOut;
    out.position = vec4<f32>(x, y, 0.0, 1.0);
    out.uv = vec2<f32>((x + 1.0) * 0.5, 1.0 - (y + 1.0) * 0.5);
    return out;
}

struct BloomParams {
    inv_size: vec2<f32>,
    strength: f32,
    radius: f32,
    threshold: vec4<f32>,
    weights: vec4<f32>,
    tint0: vec4<f32>,
    tint1: vec4<f32>,
    tint2: vec4<f32>,
};

@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var samp: sampler;
@group(0) @binding(2) var<uniform> params: BloomParams;

fn bright(color: vec3<f32>) -> vec3<f32> {
    let lum = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
    return color * max(lum - params.threshold.x, 0.0) / max(lum, 1e-4);
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let base = textureSample(src, samp, in.uv);

    var bloom = vec3<f32>(0.0);
    for (var ring = 0; ring < 3; ring = ring + 1) {
        let scale = params.radius * f32(ring + 1) * 8.0;
        var ring_sum = vec3<f32>(0.0);
        for (var i = 0; i < 8; i = i + 1) {
            let angle = 6.2831853 * f32(i) / 8.0;
            let offset = vec2<f32>(cos(angle), sin(angle)) * params.inv_size * scale;
            ring_sum = ring_sum + bright(textureSample(src, samp, in.uv + offset).rgb);
        }
        var tint = params.tint0.rgb;
        if (ring == 1) { tint = params.tint1.rgb; }
        if (ring == 2) { tint = params.tint2.rgb; }
        bloom = bloom + ring_sum * tint / 24.0;
    }

    let glow = bloom * params.weights.rgb * params.strength;
    return vec4<f32>(base.rgb + glow, base.a);
}
"#;

/// Bloom parameters, serialized per pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BloomSettings {
    /// Glow intensity
    pub strength: f32,
    /// Spread of the glow in texels, scaled by the kernel rings
    pub radius: f32,
    /// Luminance threshold below which pixels contribute no glow
    pub threshold: f32,
    /// Per-channel weighting of the composited glow
    pub channel_weights: [f32; 3],
    /// Per-ring tint colors, inner to outer
    pub tint_colors: [[f32; 3]; 3],
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            strength: 1.5,
            radius: 0.4,
            threshold: 0.85,
            channel_weights: [1.0, 1.0, 1.0],
            tint_colors: [[1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BloomUniform {
    inv_size: [f32; 2],
    strength: f32,
    radius: f32,
    threshold: [f32; 4],
    weights: [f32; 4],
    tint0: [f32; 4],
    tint1: [f32; 4],
    tint2: [f32; 4],
}

struct GpuState {
    shader: wgpu::ShaderModule,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    uniforms: wgpu::Buffer,
    pipelines: [Option<wgpu::RenderPipeline>; 3],
}

impl GpuState {
    fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bloom Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bloom Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Bloom Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bloom Uniform Buffer"),
            size: std::mem::size_of::<BloomUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            shader,
            layout,
            pipeline_layout,
            sampler,
            uniforms,
            pipelines: [None, None, None],
        }
    }
}

/// Thresholded glow pass
pub struct BloomPass {
    state: PassState,
    /// Parameters
    pub settings: BloomSettings,
    gpu: Option<GpuState>,
}

impl BloomPass {
    /// Serialization tag
    pub const TYPE_TAG: &'static str = "UnrealBloom";

    /// Create a bloom pass with default settings
    pub fn new() -> Self {
        Self::with_settings(BloomSettings::default())
    }

    /// Create a bloom pass with the given settings
    pub fn with_settings(settings: BloomSettings) -> Self {
        Self {
            state: PassState::new(true),
            settings,
            gpu: None,
        }
    }
}

impl Default for BloomPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass<WgpuContext> for BloomPass {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn state(&self) -> &PassState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    fn render(
        &mut self,
        backend: &mut WgpuContext,
        write: &ColorTarget,
        read: &ColorTarget,
        _scene: &SceneInput,
        _camera: &CameraState,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), ComposerError> {
        let frame = backend.frame().ok_or(ComposerError::NoActiveFrame)?;
        let dest = frame.color_attachment(&self.state, write)?;

        let gpu = self.gpu.get_or_insert_with(|| GpuState::new(frame.device));

        let (width, height) = read.size();
        let s = &self.settings;
        let tint = |i: usize| {
            let [r, g, b] = s.tint_colors[i];
            [r, g, b, 1.0]
        };
        let uniform = BloomUniform {
            inv_size: [1.0 / width as f32, 1.0 / height as f32],
            strength: s.strength,
            radius: s.radius,
            threshold: [s.threshold, 0.0, 0.0, 0.0],
            weights: [
                s.channel_weights[0],
                s.channel_weights[1],
                s.channel_weights[2],
                1.0,
            ],
            tint0: tint(0),
            tint1: tint(1),
            tint2: tint(2),
        };
        frame
            .queue
            .write_buffer(&gpu.uniforms, 0, bytemuck::bytes_of(&uniform));

        let index = stencil_index(frame.stencil_func);
        let pipeline = gpu.pipelines[index].get_or_insert_with(|| {
            fullscreen_pipeline(
                frame.device,
                "Bloom Pipeline",
                &gpu.shader,
                &gpu.pipeline_layout,
                frame.format,
                frame.stencil_func,
            )
        });

        let bind_group = frame.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Bind Group"),
            layout: &gpu.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(read.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&gpu.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: gpu.uniforms.as_entire_binding(),
                },
            ],
        });

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Bloom Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dest,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: if self.state.clear {
                        wgpu::LoadOp::Clear(wgpu::Color::BLACK)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: frame.stencil_attachment(),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        if frame.stencil_func != StencilFunc::Always {
            pass.set_stencil_reference(1);
        }
        pass.draw(0..3, 0..1);

        Ok(())
    }

    fn params_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.settings).unwrap_or_default()
    }

    fn apply_params(&mut self, params: &serde_json::Value) {
        if let Ok(settings) = serde_json::from_value(params.clone()) {
            self.settings = settings;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_serialize_with_camel_case_keys() {
        let pass = BloomPass::new();
        let value = pass.params_json();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("strength"));
        assert!(object.contains_key("radius"));
        assert!(object.contains_key("threshold"));
        assert!(object.contains_key("channelWeights"));
        assert!(object.contains_key("tintColors"));
    }

    #[test]
    fn apply_params_overwrites_and_defaults_missing() {
        let mut pass = BloomPass::new();
        pass.apply_params(&serde_json::json!({
            "strength": 2.5,
            "tintColors": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }));
        assert_eq!(pass.settings.strength, 2.5);
        assert_eq!(pass.settings.tint_colors[2], [0.0, 0.0, 1.0]);
        // Fields absent from the record take their defaults.
        assert_eq!(pass.settings.radius, BloomSettings::default().radius);
    }
}
