//! GPU-free backend that records what the composer asks of it
//!
//! Buffer lifecycle, stencil transitions, and copy-pass invocations are
//! appended to an event log instead of touching a device. The test suite is
//! built on this backend; host applications can also use it for CI dry-runs
//! of pipeline documents.

use crate::backend::{ColorBuffer, RenderBackend, StencilFunc};
use crate::error::ComposerError;
use crate::pass::{Pass, PassState};

/// One recorded backend operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A target was allocated
    TargetCreated { id: u64, width: u32, height: u32 },
    /// A target was resized in place
    TargetResized { id: u64, width: u32, height: u32 },
    /// A target's resources were released
    TargetDisposed { id: u64 },
    /// The stencil comparison changed
    StencilFunc(StencilFunc),
    /// The internal copy pass composited `source` onto `dest`
    CopyRun { dest: u64, source: u64 },
}

/// A recorded stand-in for an off-screen color target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessTarget {
    id: u64,
    width: u32,
    height: u32,
}

impl HeadlessTarget {
    /// Identity of this allocation; survives resizes, not disposal
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl ColorBuffer for HeadlessTarget {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Recording implementation of [`RenderBackend`]
#[derive(Debug)]
pub struct HeadlessBackend {
    next_target: u64,
    copy_support: bool,
    events: Vec<BackendEvent>,
}

impl HeadlessBackend {
    /// Backend with full copy support
    pub fn new() -> Self {
        Self {
            next_target: 0,
            copy_support: true,
            events: Vec::new(),
        }
    }

    /// Backend that reports no copy capability
    ///
    /// Composers built on it log a diagnostic once and skip mask
    /// compositing.
    pub fn without_copy() -> Self {
        Self {
            copy_support: false,
            ..Self::new()
        }
    }

    /// Everything recorded so far, in order
    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }

    /// Drop the recorded events, keeping allocation identities
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    fn record(&mut self, event: BackendEvent) {
        self.events.push(event);
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for HeadlessBackend {
    type Target = HeadlessTarget;
    type Scene = ();
    type Camera = ();

    fn create_target(&mut self, width: u32, height: u32) -> HeadlessTarget {
        let id = self.next_target;
        self.next_target += 1;
        self.record(BackendEvent::TargetCreated { id, width, height });
        HeadlessTarget { id, width, height }
    }

    fn resize_target(&mut self, target: &mut HeadlessTarget, width: u32, height: u32) {
        target.width = width;
        target.height = height;
        self.record(BackendEvent::TargetResized {
            id: target.id,
            width,
            height,
        });
    }

    fn dispose_target(&mut self, target: HeadlessTarget) {
        self.record(BackendEvent::TargetDisposed { id: target.id });
    }

    fn set_stencil_func(&mut self, func: StencilFunc) {
        self.record(BackendEvent::StencilFunc(func));
    }

    fn create_copy_pass(&mut self) -> Option<Box<dyn Pass<Self>>> {
        if self.copy_support {
            Some(Box::new(HeadlessCopyPass::new()))
        } else {
            None
        }
    }
}

/// Copy pass for the headless backend; records instead of blitting
pub struct HeadlessCopyPass {
    state: PassState,
}

impl HeadlessCopyPass {
    fn new() -> Self {
        Self {
            state: PassState::new(false),
        }
    }
}

impl Pass<HeadlessBackend> for HeadlessCopyPass {
    fn type_tag(&self) -> &'static str {
        "Copy"
    }

    fn state(&self) -> &PassState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PassState {
        &mut self.state
    }

    fn render(
        &mut self,
        backend: &mut HeadlessBackend,
        write: &HeadlessTarget,
        read: &HeadlessTarget,
        _scene: &(),
        _camera: &(),
        _delta: f32,
        _mask_active: bool,
    ) -> Result<(), ComposerError> {
        backend.record(BackendEvent::CopyRun {
            dest: write.id,
            source: read.id,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_ids_are_unique_and_sizes_tracked() {
        let mut backend = HeadlessBackend::new();
        let a = backend.create_target(4, 4);
        let mut b = backend.create_target(4, 4);
        assert_ne!(a.id(), b.id());

        backend.resize_target(&mut b, 8, 2);
        assert_eq!(b.size(), (8, 2));

        backend.dispose_target(a);
        assert_eq!(
            backend.events().last(),
            Some(&BackendEvent::TargetDisposed { id: 0 })
        );
    }

    #[test]
    fn copy_support_flag_controls_copy_pass() {
        let mut with = HeadlessBackend::new();
        assert!(with.create_copy_pass().is_some());

        let mut without = HeadlessBackend::without_copy();
        assert!(without.create_copy_pass().is_none());
    }
}
