//! SSAO pass: screen-space ambient occlusion from the scene depth buffer

use serde::{Deserialize, Serialize};
use tracing::debug;

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

struct SsaoParams {
    inv_size: vec2<f32>,
    radius: f32,
    ao_clamp: f32,
    lum_influence: f32,
    ao_only: u32,
    near: f32,
    far: f32,
};

@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var samp: sampler;
@group(0) @binding(2) var<uniform> params: SsaoParams;
@group(0) @binding(3) var depth: texture_depth_2d;

fn linearize(d: f32) -> f32 {
    return (2.0 * params.near) / (params.far + params.near - d * (params.far - params.near));
}

fn read_depth(coord: vec2<i32>, dims: vec2<i32>) -> f32 {
    let clamped = clamp(coord, vec2<i32>(0), dims - vec2<i32>(1));
    return linearize(textureLoad(depth, clamped, 0));
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let base = textureSample(src, samp, in.uv);
    let dims = vec2<i32>(textureDimensions(depth));
    let coord = vec2<i32>(in.uv * vec2<f32>(dims));
    let center = read_depth(coord, dims);

    var occlusion = 0.0;
    for (var i = 0; i < 16; i = i + 1) {
        let angle = f32(i) * 2.399963;
        let dist = params.radius * (f32(i) + 1.0) / 16.0;
        let offset = vec2<f32>(cos(angle), sin(angle)) * dist;
        let neighbor = read_depth(coord + vec2<i32>(offset), dims);
        let diff = center - neighbor;
        if (diff > 0.0002 && diff < 0.02) {
            occlusion = occlusion + 1.0;
        }
    }

    var ao = 1.0 - min(occlusion / 16.0, params.ao_clamp);
    let lum = dot(base.rgb, vec3<f32>(0.299, 0.587, 0.114));
    ao = mix(ao, 1.0, lum * params.lum_influence);

    if (params.ao_only != 0u) {
        return vec4<f32>(vec3<f32>(ao), 1.0);
    }
    return vec4<f32>(base.rgb * ao, base.a);
}
"#;

/// SSAO parameters, serialized per pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SsaoSettings {
    /// Occlusion sampling radius in texels
    pub radius: f32,
    /// Upper bound on accumulated occlusion
    pub clamp: f32,
    /// How much surface brightness fades the occlusion
    pub luminance_influence: f32,
    /// Output the occlusion term alone instead of modulating the scene
    pub ao_only: bool,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            radius: 32.0,
            clamp: 0.25,
            luminance_influence: 0.7,
            ao_only: false,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SsaoUniform {
    inv_size: [f32; 2],
    radius: f32,
    ao_clamp: f32,
    lum_influence: f32,
    ao_only: u32,
    near: f32,
    far: f32,
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
            label: Some("SSAO Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SSAO Bind Group Layout"),
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
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Depth,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("SSAO Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("SSAO Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SSAO Uniform Buffer"),
            size: std::mem::size_of::<SsaoUniform>() as u64,
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

/// Ambient-occlusion pass
pub struct SsaoPass {
    state: PassState,
    /// Parameters
    pub settings: SsaoSettings,
    gpu: Option<GpuState>,
}

impl SsaoPass {
    /// Serialization tag
    pub const TYPE_TAG: &'static str = "SSAO";

    /// Create an SSAO pass with default settings
    pub fn new() -> Self {
        Self::with_settings(SsaoSettings::default())
    }

    /// Create an SSAO pass with the given settings
    pub fn with_settings(settings: SsaoSettings) -> Self {
        Self {
            state: PassState::new(true),
            settings,
            gpu: None,
        }
    }
}

impl Default for SsaoPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass<WgpuContext> for SsaoPass {
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
        scene: &SceneInput,
        camera: &CameraState,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), ComposerError> {
        let frame = backend.frame().ok_or(ComposerError::NoActiveFrame)?;
        let dest = frame.color_attachment(&self.state, write)?;

        let Some(depth) = scene.depth.as_ref() else {
            // Without scene depth there is nothing to occlude; pass the
            // image through so the chain stays intact.
            debug!("SSAO skipped: scene input has no depth");
            frame.blit.blit(
                frame.device,
                frame.encoder,
                read.view(),
                dest,
                frame.stencil_func,
                Some(frame.stencil_view),
                None,
            );
            return Ok(());
        };

        let gpu = self.gpu.get_or_insert_with(|| GpuState::new(frame.device));

        let (width, height) = read.size();
        let uniform = SsaoUniform {
            inv_size: [1.0 / width as f32, 1.0 / height as f32],
            radius: self.settings.radius,
            ao_clamp: self.settings.clamp,
            lum_influence: self.settings.luminance_influence,
            ao_only: self.settings.ao_only as u32,
            near: camera.near,
            far: camera.far,
        };
        frame
            .queue
            .write_buffer(&gpu.uniforms, 0, bytemuck::bytes_of(&uniform));

        let index = stencil_index(frame.stencil_func);
        let pipeline = gpu.pipelines[index].get_or_insert_with(|| {
            fullscreen_pipeline(
                frame.device,
                "SSAO Pipeline",
                &gpu.shader,
                &gpu.pipeline_layout,
                frame.format,
                frame.stencil_func,
            )
        });

        let bind_group = frame.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSAO Bind Group"),
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
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(depth),
                },
            ],
        });

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("SSAO Pass"),
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
        let pass = SsaoPass::new();
        let value = pass.params_json();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("radius"));
        assert!(object.contains_key("clamp"));
        assert!(object.contains_key("luminanceInfluence"));
        assert!(object.contains_key("aoOnly"));
    }

    #[test]
    fn apply_params_overwrites_fields() {
        let mut pass = SsaoPass::new();
        pass.apply_params(&serde_json::json!({
            "radius": 8.0,
            "aoOnly": true,
        }));
        assert_eq!(pass.settings.radius, 8.0);
        assert!(pass.settings.ao_only);
        assert_eq!(
            pass.settings.luminance_influence,
            SsaoSettings::default().luminance_influence
        );
    }
}
