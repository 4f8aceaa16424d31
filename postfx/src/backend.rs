//! Rendering backend contract consumed by the composer
//!
//! The composer itself never talks to a graphics API directly. Everything it
//! needs from one — allocating and releasing off-screen color targets and
//! flipping the stencil comparison used for mask bracketing — goes through
//! the [`RenderBackend`] trait. The crate ships a wgpu implementation in
//! [`crate::graphics`] and a GPU-free recording implementation in
//! [`crate::headless`].

use crate::pass::Pass;

/// Stencil comparison applied to draws while a mask bracket is active.
///
/// `EqualOne` constrains rendering to the masked region, `NotEqualOne` to its
/// complement (used for the gated copy-back), and `Always` is the resting
/// state with no mask in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StencilFunc {
    /// No stencil constraint
    #[default]
    Always,
    /// Pass only where the stencil value equals 1
    EqualOne,
    /// Pass only where the stencil value differs from 1
    NotEqualOne,
}

/// An off-screen color buffer allocated by a backend
pub trait ColorBuffer {
    /// Current size of the buffer (width, height)
    fn size(&self) -> (u32, u32);
}

/// Contract between the composer and a rendering backend
///
/// Targets are 4-channel color buffers with linear filtering and no
/// depth/stencil channel of their own; stencil state lives on the backend,
/// shared by every draw of a frame.
pub trait RenderBackend: Sized {
    /// Off-screen color target type
    type Target: ColorBuffer;
    /// Per-frame scene input forwarded to passes uninterpreted
    type Scene;
    /// Per-frame camera input forwarded to passes uninterpreted
    type Camera;

    /// Allocate an off-screen color target
    fn create_target(&mut self, width: u32, height: u32) -> Self::Target;

    /// Resize a target in place, discarding its contents
    fn resize_target(&mut self, target: &mut Self::Target, width: u32, height: u32);

    /// Release a target's native resources
    fn dispose_target(&mut self, target: Self::Target);

    /// Set the stencil comparison applied to subsequent draws
    fn set_stencil_func(&mut self, func: StencilFunc);

    /// Build the internal copy pass used for mask compositing
    ///
    /// Returning `None` signals that the backend has no copy capability; the
    /// composer reports this once at construction and skips mask compositing
    /// rather than failing.
    fn create_copy_pass(&mut self) -> Option<Box<dyn Pass<Self>>>;
}
