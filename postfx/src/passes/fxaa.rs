//! FXAA pass: fast approximate anti-aliasing over the read buffer

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

struct FxaaParams {
    inv_size: vec2<f32>,
    _pad: vec2<f32>,
};

@group(0) @binding(0) var src: texture_2d<f32>;
@group(0) @binding(1) var samp: sampler;
@group(0) @binding(2) var<uniform> params: FxaaParams;

fn luma(color: vec3<f32>) -> f32 {
    return dot(color, vec3<f32>(0.299, 0.587, 0.114));
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let px = params.inv_size;
    let center = textureSampleLevel(src, samp, in.uv, 0.0);

    let nw = luma(textureSampleLevel(src, samp, in.uv + vec2<f32>(-px.x, -px.y), 0.0).rgb);
    let ne = luma(textureSampleLevel(src, samp, in.uv + vec2<f32>(px.x, -px.y), 0.0).rgb);
    let sw = luma(textureSampleLevel(src, samp, in.uv + vec2<f32>(-px.x, px.y), 0.0).rgb);
    let se = luma(textureSampleLevel(src, samp, in.uv + vec2<f32>(px.x, px.y), 0.0).rgb);
    let mid = luma(center.rgb);

    let luma_min = min(mid, min(min(nw, ne), min(sw, se)));
    let luma_max = max(mid, max(max(nw, ne), max(sw, se)));

    if (luma_max - luma_min < max(0.0312, luma_max * 0.125)) {
        return center;
    }

    var dir = vec2<f32>(-((nw + ne) - (sw + se)), (nw + sw) - (ne + se));
    let reduce = max((nw + ne + sw + se) * 0.25 * 0.125, 1.0 / 128.0);
    let scale = 1.0 / (min(abs(dir.x), abs(dir.y)) + reduce);
    dir = clamp(dir * scale, vec2<f32>(-8.0), vec2<f32>(8.0)) * px;

    let a = 0.5 * (textureSampleLevel(src, samp, in.uv + dir * (1.0 / 3.0 - 0.5), 0.0).rgb
        + textureSampleLevel(src, samp, in.uv + dir * (2.0 / 3.0 - 0.5), 0.0).rgb);
    let b = a * 0.5 + 0.25 * (textureSampleLevel(src, samp, in.uv + dir * -0.5, 0.0).rgb
        + textureSampleLevel(src, samp, in.uv + dir * 0.5, 0.0).rgb);

    let luma_b = luma(b);
    if (luma_b < luma_min || luma_b > luma_max) {
        return vec4<f32>(a, center.a);
    }
    return vec4<f32>(b, center.a);
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct FxaaUniform {
    inv_size: [f32; 2],
    _pad: [f32; 2],
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
            label: Some("FXAA Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("FXAA Bind Group Layout"),
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
            label: Some("FXAA Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("FXAA Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FXAA Uniform Buffer"),
            size: std::mem::size_of::<FxaaUniform>() as u64,
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

/// Anti-aliasing pass
pub struct FxaaPass {
    state: PassState,
    gpu: Option<GpuState>,
}

impl FxaaPass {
    /// Serialization tag
    pub const TYPE_TAG: &'static str = "FXAA";

    /// Create an FXAA pass
    pub fn new() -> Self {
        Self {
            state: PassState::new(true),
            gpu: None,
        }
    }
}

impl Default for FxaaPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass<WgpuContext> for FxaaPass {
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
        let uniform = FxaaUniform {
            inv_size: [1.0 / width as f32, 1.0 / height as f32],
            _pad: [0.0; 2],
        };
        frame
            .queue
            .write_buffer(&gpu.uniforms, 0, bytemuck::bytes_of(&uniform));

        let index = stencil_index(frame.stencil_func);
        let pipeline = gpu.pipelines[index].get_or_insert_with(|| {
            fullscreen_pipeline(
                frame.device,
                "FXAA Pipeline",
                &gpu.shader,
                &gpu.pipeline_layout,
                frame.format,
                frame.stencil_func,
            )
        });

        let bind_group = frame.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("FXAA Bind Group"),
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
            label: Some("FXAA Pass"),
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
}
