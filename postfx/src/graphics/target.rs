//! Off-screen color target backing the composer's buffer pair

use crate::backend::ColorBuffer;

/// A color texture the composer renders into and passes sample from
///
/// Targets carry no depth or stencil channel of their own; stencil state for
/// mask bracketing lives on the shared [`WgpuContext`](super::WgpuContext).
#[derive(Debug)]
pub struct ColorTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    size: (u32, u32),
}

impl ColorTarget {
    /// Create a new target with the given dimensions and format
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Composer Color Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            format,
            size: (width, height),
        }
    }

    /// Recreate the underlying texture at a new size, discarding contents
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if self.size == (width, height) {
            return;
        }

        let old = std::mem::replace(
            self,
            Self::new(device, width, height, self.format),
        );
        old.texture.destroy();
    }

    /// View for attachments and bind groups
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Underlying texture, e.g. for readback copies
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Texture format
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Release the native texture ahead of drop
    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

impl ColorBuffer for ColorTarget {
    fn size(&self) -> (u32, u32) {
        self.size
    }
}
