//! Mask bracket passes: constrain following passes to a stencil region
//!
//! `MaskPass` writes 1 into the shared stencil buffer — everywhere, or where
//! a host-provided coverage texture is opaque — and arms the `EqualOne`
//! comparison. Passes that run until the matching `ClearMaskPass` only
//! affect the masked region; the composer's gated copy-back composites the
//! rest.

use tracing::debug;

use crate::backend::{RenderBackend, StencilFunc};
use crate::error::ComposerError;
use crate::graphics::blit::STENCIL_FORMAT;
use crate::graphics::{CameraState, ColorTarget, SceneInput, WgpuContext};
use crate::pass::{MaskRole, Pass, PassState};

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

@group(0) @binding(0) var coverage: texture_2d<f32>;
@group(0) @binding(1) var samp: sampler;

@fragment
fn fs_coverage(in: VsOut) {
    if (textureSample(coverage, samp, in.uv).a < 0.5) {
        discard;
    }
}

@fragment
fn fs_fill() {}
"#;

fn stencil_write_state() -> wgpu::DepthStencilState {
    let face = wgpu::StencilFaceState {
        compare: wgpu::CompareFunction::Always,
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op: wgpu::StencilOperation::Replace,
    };
    wgpu::DepthStencilState {
        format: STENCIL_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Always,
        stencil: wgpu::StencilState {
            front: face,
            back: face,
            read_mask: 0xff,
            write_mask: 0xff,
        },
        bias: wgpu::DepthBiasState::default(),
    }
}

fn stencil_write_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: &wgpu::ShaderModule,
    pipeline_layout: &wgpu::PipelineLayout,
    fs_entry: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fs_entry),
            targets: &[],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(stencil_write_state()),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

struct GpuState {
    coverage_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    coverage_pipeline: wgpu::RenderPipeline,
    fill_pipeline: wgpu::RenderPipeline,
}

impl GpuState {
    fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mask Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let coverage_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mask Bind Group Layout"),
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
            ],
        });

        let coverage_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Mask Coverage Pipeline Layout"),
                bind_group_layouts: &[&coverage_layout],
                push_constant_ranges: &[],
            });

        let fill_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mask Fill Pipeline Layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mask Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let coverage_pipeline = stencil_write_pipeline(
            device,
            "Mask Coverage Pipeline",
            &shader,
            &coverage_pipeline_layout,
            "fs_coverage",
        );
        let fill_pipeline = stencil_write_pipeline(
            device,
            "Mask Fill Pipeline",
            &shader,
            &fill_pipeline_layout,
            "fs_fill",
        );

        Self {
            coverage_layout,
            sampler,
            coverage_pipeline,
            fill_pipeline,
        }
    }
}

/// Opens a mask bracket by writing the stencil region
pub struct MaskPass {
    state: PassState,
    coverage: Option<wgpu::TextureView>,
    gpu: Option<GpuState>,
}

impl MaskPass {
    /// Serialization tag
    pub const TYPE_TAG: &'static str = "Mask";

    /// Create a mask pass covering the full screen
    pub fn new() -> Self {
        Self {
            state: PassState::with_clear(false),
            coverage: None,
            gpu: None,
        }
    }

    /// Constrain the mask to where `coverage` is opaque (alpha ≥ 0.5)
    ///
    /// The coverage view is runtime state supplied by the host and is not
    /// serialized.
    pub fn set_coverage(&mut self, coverage: Option<wgpu::TextureView>) {
        self.coverage = coverage;
    }
}

impl Default for MaskPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass<WgpuContext> for MaskPass {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn state(&self) -> &PassState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    fn mask_role(&self) -> MaskRole {
        MaskRole::Begin
    }

    fn render(
        &mut self,
        backend: &mut WgpuContext,
        _write: &ColorTarget,
        _read: &ColorTarget,
        _scene: &SceneInput,
        _camera: &CameraState,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), ComposerError> {
        {
            let frame = backend.frame().ok_or(ComposerError::NoActiveFrame)?;
            let gpu = self.gpu.get_or_insert_with(|| GpuState::new(frame.device));

            let bind_group = self.coverage.as_ref().map(|view| {
                frame.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Mask Bind Group"),
                    layout: &gpu.coverage_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&gpu.sampler),
                        },
                    ],
                })
            });

            let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mask Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: frame.stencil_view,
                    depth_ops: Some(wgpu::Operations {
                        load: if self.state.clear {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: if self.state.clear {
                            wgpu::LoadOp::Clear(0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            match bind_group.as_ref() {
                Some(bind_group) => {
                    pass.set_pipeline(&gpu.coverage_pipeline);
                    pass.set_bind_group(0, bind_group, &[]);
                }
                None => pass.set_pipeline(&gpu.fill_pipeline),
            }
            pass.set_stencil_reference(1);
            pass.draw(0..3, 0..1);
        }

        debug!("Mask armed");
        backend.set_stencil_func(StencilFunc::EqualOne);
        Ok(())
    }
}

/// Closes the current mask bracket
pub struct ClearMaskPass {
    state: PassState,
}

impl ClearMaskPass {
    /// Serialization tag
    pub const TYPE_TAG: &'static str = "ClearMask";

    /// Create a clear-mask pass
    pub fn new() -> Self {
        Self {
            state: PassState::new(false),
        }
    }
}

impl Default for ClearMaskPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass<WgpuContext> for ClearMaskPass {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn state(&self) -> &PassState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    fn mask_role(&self) -> MaskRole {
        MaskRole::End
    }

    fn render(
        &mut self,
        backend: &mut WgpuContext,
        _write: &ColorTarget,
        _read: &ColorTarget,
        _scene: &SceneInput,
        _camera: &CameraState,
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), ComposerError> {
        backend.set_stencil_func(StencilFunc::Always);
        Ok(())
    }
}
