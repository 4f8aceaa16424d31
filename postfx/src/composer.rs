//! Effect composer: ordered pass chain over a ping-pong buffer pair

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::backend::{RenderBackend, StencilFunc};
use crate::error::ComposerError;
use crate::pass::{MaskRole, Pass};

/// Two equally-sized targets plus a 1-bit which-is-which indirection.
///
/// Swapping flips the bit; the targets themselves never move, so the write
/// and read roles always reference two distinct buffers.
struct PingPong<T> {
    first: T,
    second: T,
    flipped: bool,
}

impl<T> PingPong<T> {
    fn new(first: T, second: T) -> Self {
        Self {
            first,
            second,
            flipped: false,
        }
    }

    fn write(&self) -> &T {
        if self.flipped {
            &self.second
        } else {
            &self.first
        }
    }

    fn read(&self) -> &T {
        if self.flipped {
            &self.first
        } else {
            &self.second
        }
    }

    fn swap(&mut self) {
        self.flipped = !self.flipped;
    }

    fn both_mut(&mut self) -> (&mut T, &mut T) {
        (&mut self.first, &mut self.second)
    }

    fn into_parts(self) -> (T, T) {
        (self.first, self.second)
    }
}

/// Manages an ordered chain of post-processing passes
///
/// The composer owns two off-screen color buffers of equal size. Each frame
/// it feeds every enabled pass the current write/read pair in list order,
/// swapping the pair after passes that request it, and tracking whether a
/// stencil mask bracket is active to special-case the copy-back step.
///
/// Passes are attached with [`add_pass`](Self::add_pass) /
/// [`insert_pass`](Self::insert_pass) and detached with
/// [`remove_pass`](Self::remove_pass), which hands the pass back to the
/// caller; the composer never owns a pass's internal resources, only the
/// buffer pair it allocated itself.
pub struct EffectComposer<B: RenderBackend> {
    uuid: Uuid,
    width: u32,
    height: u32,
    passes: Vec<Box<dyn Pass<B>>>,
    buffers: Option<PingPong<B::Target>>,
    copy_pass: Option<Box<dyn Pass<B>>>,
}

impl<B: RenderBackend> EffectComposer<B> {
    /// Create a composer with the default 1×1 buffers
    ///
    /// Callers normally follow up with [`set_size`](Self::set_size) once the
    /// output dimensions are known.
    pub fn new(backend: &mut B) -> Self {
        Self::with_size(backend, 1, 1)
    }

    /// Create a composer with buffers of the given size
    pub fn with_size(backend: &mut B, width: u32, height: u32) -> Self {
        let first = backend.create_target(width, height);
        let second = backend.create_target(width, height);

        let copy_pass = backend.create_copy_pass();
        if copy_pass.is_none() {
            error!("backend provides no copy pass; mask compositing is disabled");
        }

        let uuid = Uuid::new_v4();
        debug!(uuid = %uuid, width, height, "Created effect composer");

        Self {
            uuid,
            width,
            height,
            passes: Vec::new(),
            buffers: Some(PingPong::new(first, second)),
            copy_pass,
        }
    }

    /// Stable identifier, preserved across serialization
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub(crate) fn restore_uuid(&mut self, uuid: Uuid) {
        self.uuid = uuid;
    }

    /// Current buffer size (width, height)
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether [`dispose`](Self::dispose) released the buffers
    pub fn is_disposed(&self) -> bool {
        self.buffers.is_none()
    }

    /// Current write buffer, if not disposed
    pub fn write_buffer(&self) -> Option<&B::Target> {
        self.buffers.as_ref().map(PingPong::write)
    }

    /// Current read buffer, if not disposed
    pub fn read_buffer(&self) -> Option<&B::Target> {
        self.buffers.as_ref().map(PingPong::read)
    }

    /// Attached passes in execution order
    pub fn passes(&self) -> &[Box<dyn Pass<B>>] {
        &self.passes
    }

    /// Number of attached passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Whether the pass list is empty
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Append a pass to the end of the chain
    ///
    /// No duplicate check is made; two entries may share a uuid and both
    /// will execute.
    pub fn add_pass(&mut self, pass: Box<dyn Pass<B>>) {
        debug!(pass = pass.type_tag(), uuid = %pass.uuid(), "Added pass");
        self.passes.push(pass);
    }

    /// Insert a pass at `index`, shifting subsequent entries
    ///
    /// An index beyond the end is clamped to the list length, so this never
    /// panics.
    pub fn insert_pass(&mut self, pass: Box<dyn Pass<B>>, index: usize) {
        let index = index.min(self.passes.len());
        debug!(pass = pass.type_tag(), uuid = %pass.uuid(), index, "Inserted pass");
        self.passes.insert(index, pass);
    }

    /// Remove and return the first pass with the given uuid
    ///
    /// Returns `None` without error if no pass matches. Ownership of the
    /// pass (and any GPU resources it holds) transfers back to the caller.
    pub fn remove_pass(&mut self, uuid: Uuid) -> Option<Box<dyn Pass<B>>> {
        let index = self.passes.iter().position(|p| p.uuid() == uuid)?;
        debug!(uuid = %uuid, index, "Removed pass");
        Some(self.passes.remove(index))
    }

    /// Find a pass by uuid
    pub fn pass(&self, uuid: Uuid) -> Option<&dyn Pass<B>> {
        self.passes
            .iter()
            .find(|p| p.uuid() == uuid)
            .map(|p| p.as_ref())
    }

    /// Find a pass by uuid, mutably
    pub fn pass_mut(&mut self, uuid: Uuid) -> Option<&mut Box<dyn Pass<B>>> {
        self.passes.iter_mut().find(|p| p.uuid() == uuid)
    }

    /// Resize both buffers and notify every pass, in list order
    ///
    /// Zero dimensions are rejected with a warning and no state change. If
    /// the composer is disposed the new size is recorded and propagated to
    /// passes; buffers reappear on [`reset`](Self::reset).
    pub fn set_size(&mut self, backend: &mut B, width: u32, height: u32) {
        if width == 0 || height == 0 {
            warn!(width, height, "Ignoring set_size with zero dimension");
            return;
        }

        self.width = width;
        self.height = height;

        if let Some(buffers) = self.buffers.as_mut() {
            let (first, second) = buffers.both_mut();
            backend.resize_target(first, width, height);
            backend.resize_target(second, width, height);
        }

        for pass in &mut self.passes {
            pass.set_size(backend, width, height);
        }

        debug!(width, height, "Resized composer");
    }

    /// Release both buffers' native resources
    ///
    /// Rendering afterwards returns [`ComposerError::Disposed`] until
    /// [`reset`](Self::reset) recreates the buffers. A second call is a
    /// no-op.
    pub fn dispose(&mut self, backend: &mut B) {
        if let Some(buffers) = self.buffers.take() {
            let (first, second) = buffers.into_parts();
            backend.dispose_target(first);
            backend.dispose_target(second);
            debug!("Disposed composer buffers");
        }
    }

    /// Dispose any current buffers and reallocate both at the current size
    pub fn reset(&mut self, backend: &mut B) {
        self.dispose(backend);
        let first = backend.create_target(self.width, self.height);
        let second = backend.create_target(self.width, self.height);
        self.buffers = Some(PingPong::new(first, second));
        debug!(width = self.width, height = self.height, "Reset composer buffers");
    }

    /// Run every enabled pass in order for one frame
    ///
    /// Each pass receives the current write/read pair. After a pass that
    /// requests a swap, the pair's roles are exchanged; if a mask bracket is
    /// active at that point, the write buffer is first composited onto the
    /// read buffer through the internal copy pass, gated to the stencil
    /// region. Pass failures propagate immediately; the composer performs no
    /// recovery.
    pub fn render(
        &mut self,
        backend: &mut B,
        scene: &B::Scene,
        camera: &B::Camera,
        delta: f32,
    ) -> Result<(), ComposerError> {
        let buffers = self.buffers.as_mut().ok_or(ComposerError::Disposed)?;

        let mut mask_active = false;

        for pass in &mut self.passes {
            if !pass.enabled() {
                continue;
            }

            pass.render(
                backend,
                buffers.write(),
                buffers.read(),
                scene,
                camera,
                delta,
                mask_active,
            )?;

            if pass.needs_swap() {
                if mask_active {
                    if let Some(copy) = self.copy_pass.as_mut() {
                        backend.set_stencil_func(StencilFunc::NotEqualOne);
                        copy.render(
                            backend,
                            buffers.read(),
                            buffers.write(),
                            scene,
                            camera,
                            delta,
                            mask_active,
                        )?;
                        backend.set_stencil_func(StencilFunc::EqualOne);
                    }
                }
                buffers.swap();
            }

            match pass.mask_role() {
                MaskRole::Begin => mask_active = true,
                MaskRole::End => mask_active = false,
                MaskRole::None => {}
            }
        }

        Ok(())
    }
}

impl<B: RenderBackend> std::fmt::Debug for EffectComposer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectComposer")
            .field("uuid", &self.uuid)
            .field("width", &self.width)
            .field("height", &self.height)
            .field(
                "passes",
                &self.passes.iter().map(|p| p.type_tag()).collect::<Vec<_>>(),
            )
            .field("disposed", &self.buffers.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::backend::ColorBuffer;
    use crate::headless::{BackendEvent, HeadlessBackend, HeadlessTarget};
    use crate::pass::PassState;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum ProbeEvent {
        Render {
            label: &'static str,
            write: u64,
            read: u64,
            mask_active: bool,
        },
        Resize {
            label: &'static str,
            width: u32,
            height: u32,
        },
    }

    type ProbeLog = Rc<RefCell<Vec<ProbeEvent>>>;

    struct ProbePass {
        label: &'static str,
        state: PassState,
        role: MaskRole,
        log: ProbeLog,
    }

    impl ProbePass {
        fn boxed(label: &'static str, needs_swap: bool, log: &ProbeLog) -> Box<Self> {
            Box::new(Self {
                label,
                state: PassState::new(needs_swap),
                role: MaskRole::None,
                log: Rc::clone(log),
            })
        }

        fn mask(label: &'static str, role: MaskRole, log: &ProbeLog) -> Box<Self> {
            Box::new(Self {
                label,
                state: PassState::new(false),
                role,
                log: Rc::clone(log),
            })
        }
    }

    impl Pass<HeadlessBackend> for ProbePass {
        fn type_tag(&self) -> &'static str {
            self.label
        }

        fn state(&self) -> &PassState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut PassState {
            &mut self.state
        }

        fn render(
            &mut self,
            _backend: &mut HeadlessBackend,
            write: &HeadlessTarget,
            read: &HeadlessTarget,
            _scene: &(),
            _camera: &(),
            _delta: f32,
            mask_active: bool,
        ) -> Result<(), ComposerError> {
            self.log.borrow_mut().push(ProbeEvent::Render {
                label: self.label,
                write: write.id(),
                read: read.id(),
                mask_active,
            });
            Ok(())
        }

        fn set_size(&mut self, _backend: &mut HeadlessBackend, width: u32, height: u32) {
            self.log.borrow_mut().push(ProbeEvent::Resize {
                label: self.label,
                width,
                height,
            });
        }

        fn mask_role(&self) -> MaskRole {
            self.role
        }
    }

    fn render_events(log: &ProbeLog) -> Vec<ProbeEvent> {
        log.borrow()
            .iter()
            .filter(|e| matches!(e, ProbeEvent::Render { .. }))
            .cloned()
            .collect()
    }

    #[test]
    fn buffers_start_distinct_and_sized() {
        let mut backend = HeadlessBackend::new();
        let composer = EffectComposer::with_size(&mut backend, 64, 32);

        let write = composer.write_buffer().unwrap();
        let read = composer.read_buffer().unwrap();
        assert_ne!(write.id(), read.id());
        assert_eq!(write.size(), (64, 32));
        assert_eq!(read.size(), (64, 32));
    }

    #[test]
    fn set_size_resizes_buffers_and_notifies_passes_in_order() {
        let mut backend = HeadlessBackend::new();
        let mut composer = EffectComposer::new(&mut backend);
        let log: ProbeLog = Rc::new(RefCell::new(Vec::new()));

        composer.add_pass(ProbePass::boxed("a", true, &log));
        composer.add_pass(ProbePass::boxed("b", false, &log));
        composer.set_size(&mut backend, 320, 240);

        assert_eq!(composer.size(), (320, 240));
        assert_eq!(composer.write_buffer().unwrap().size(), (320, 240));
        assert_eq!(composer.read_buffer().unwrap().size(), (320, 240));

        let notifications: Vec<_> = log
            .borrow()
            .iter()
            .filter(|e| matches!(e, ProbeEvent::Resize { .. }))
            .cloned()
            .collect();
        assert_eq!(
            notifications,
            vec![
                ProbeEvent::Resize {
                    label: "a",
                    width: 320,
                    height: 240
                },
                ProbeEvent::Resize {
                    label: "b",
                    width: 320,
                    height: 240
                },
            ]
        );
    }

    #[test]
    fn set_size_rejects_zero_dimensions() {
        let mut backend = HeadlessBackend::new();
        let mut composer = EffectComposer::with_size(&mut backend, 16, 16);
        let log: ProbeLog = Rc::new(RefCell::new(Vec::new()));
        composer.add_pass(ProbePass::boxed("a", true, &log));

        composer.set_size(&mut backend, 0, 240);
        composer.set_size(&mut backend, 320, 0);

        assert_eq!(composer.size(), (16, 16));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn swap_exchanges_roles_after_swapping_passes_only() {
        let mut backend = HeadlessBackend::new();
        let mut composer = EffectComposer::with_size(&mut backend, 8, 8);
        let log: ProbeLog = Rc::new(RefCell::new(Vec::new()));

        composer.add_pass(ProbePass::boxed("render", true, &log));
        composer.add_pass(ProbePass::boxed("fxaa", false, &log));

        let write_before = composer.write_buffer().unwrap().id();
        let read_before = composer.read_buffer().unwrap().id();

        composer.render(&mut backend, &(), &(), 0.016).unwrap();

        // One swapping pass: roles exchanged exactly once.
        assert_eq!(composer.write_buffer().unwrap().id(), read_before);
        assert_eq!(composer.read_buffer().unwrap().id(), write_before);

        let events = render_events(&log);
        assert_eq!(
            events,
            vec![
                ProbeEvent::Render {
                    label: "render",
                    write: write_before,
                    read: read_before,
                    mask_active: false
                },
                // The second pass sees the pair post-swap.
                ProbeEvent::Render {
                    label: "fxaa",
                    write: read_before,
                    read: write_before,
                    mask_active: false
                },
            ]
        );
    }

    #[test]
    fn swap_parity_is_odd_per_swapping_pass() {
        let mut backend = HeadlessBackend::new();
        let mut composer = EffectComposer::with_size(&mut backend, 8, 8);
        let log: ProbeLog = Rc::new(RefCell::new(Vec::new()));

        composer.add_pass(ProbePass::boxed("a", true, &log));
        composer.add_pass(ProbePass::boxed("b", true, &log));

        let write_before = composer.write_buffer().unwrap().id();

        composer.render(&mut backend, &(), &(), 0.016).unwrap();

        // Two swaps: identities are back where they started, still distinct.
        assert_eq!(composer.write_buffer().unwrap().id(), write_before);
        assert_ne!(
            composer.write_buffer().unwrap().id(),
            composer.read_buffer().unwrap().id()
        );
    }

    #[test]
    fn disabled_passes_are_skipped_entirely() {
        let mut backend = HeadlessBackend::new();
        let mut composer = EffectComposer::with_size(&mut backend, 8, 8);
        let log: ProbeLog = Rc::new(RefCell::new(Vec::new()));

        let mut skipped = ProbePass::boxed("skipped", true, &log);
        skipped.state_mut().enabled = false;
        composer.add_pass(skipped);
        composer.add_pass(ProbePass::boxed("ran", false, &log));

        let write_before = composer.write_buffer().unwrap().id();
        composer.render(&mut backend, &(), &(), 0.016).unwrap();

        // The disabled pass neither rendered nor triggered a swap.
        assert_eq!(composer.write_buffer().unwrap().id(), write_before);
        let events = render_events(&log);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ProbeEvent::Render { label: "ran", .. }));
    }

    #[test]
    fn mask_bracket_gates_copy_back_exactly_once() {
        let mut backend = HeadlessBackend::new();
        let mut composer = EffectComposer::with_size(&mut backend, 8, 8);
        let log: ProbeLog = Rc::new(RefCell::new(Vec::new()));

        composer.add_pass(ProbePass::boxed("outside", true, &log));
        composer.add_pass(ProbePass::mask("mask", MaskRole::Begin, &log));
        composer.add_pass(ProbePass::boxed("inside", true, &log));
        composer.add_pass(ProbePass::mask("clear-mask", MaskRole::End, &log));
        composer.add_pass(ProbePass::boxed("after", true, &log));

        composer.render(&mut backend, &(), &(), 0.016).unwrap();

        let copies: Vec<_> = backend
            .events()
            .iter()
            .filter(|e| matches!(e, BackendEvent::CopyRun { .. }))
            .collect();
        assert_eq!(copies.len(), 1, "copy-back must run for the bracketed pass only");

        let stencil: Vec<_> = backend
            .events()
            .iter()
            .filter_map(|e| match e {
                BackendEvent::StencilFunc(func) => Some(*func),
                _ => None,
            })
            .collect();
        assert_eq!(
            stencil,
            vec![StencilFunc::NotEqualOne, StencilFunc::EqualOne],
            "copy-back is bracketed by the two stencil states"
        );

        // Inside the bracket the pass observed mask_active.
        let events = render_events(&log);
        assert!(events.iter().any(|e| matches!(
            e,
            ProbeEvent::Render {
                label: "inside",
                mask_active: true,
                ..
            }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ProbeEvent::Render {
                label: "after",
                mask_active: false,
                ..
            }
        )));
    }

    #[test]
    fn copy_back_composites_write_onto_read() {
        let mut backend = HeadlessBackend::new();
        let mut composer = EffectComposer::with_size(&mut backend, 8, 8);
        let log: ProbeLog = Rc::new(RefCell::new(Vec::new()));

        composer.add_pass(ProbePass::mask("mask", MaskRole::Begin, &log));
        composer.add_pass(ProbePass::boxed("inside", true, &log));

        let write_before = composer.write_buffer().unwrap().id();
        let read_before = composer.read_buffer().unwrap().id();

        composer.render(&mut backend, &(), &(), 0.016).unwrap();

        let copy = backend
            .events()
            .iter()
            .find_map(|e| match e {
                BackendEvent::CopyRun { dest, source } => Some((*dest, *source)),
                _ => None,
            })
            .expect("copy-back ran");
        assert_eq!(copy, (read_before, write_before));
    }

    #[test]
    fn missing_copy_support_skips_compositing_but_still_swaps() {
        let mut backend = HeadlessBackend::without_copy();
        let mut composer = EffectComposer::with_size(&mut backend, 8, 8);
        let log: ProbeLog = Rc::new(RefCell::new(Vec::new()));

        composer.add_pass(ProbePass::mask("mask", MaskRole::Begin, &log));
        composer.add_pass(ProbePass::boxed("inside", true, &log));

        let write_before = composer.write_buffer().unwrap().id();
        composer.render(&mut backend, &(), &(), 0.016).unwrap();

        assert!(backend
            .events()
            .iter()
            .all(|e| !matches!(e, BackendEvent::CopyRun { .. })));
        assert_eq!(composer.read_buffer().unwrap().id(), write_before);
    }

    #[test]
    fn insert_and_remove_maintain_order() {
        let mut backend = HeadlessBackend::new();
        let mut composer = EffectComposer::with_size(&mut backend, 8, 8);
        let log: ProbeLog = Rc::new(RefCell::new(Vec::new()));

        composer.add_pass(ProbePass::boxed("a", false, &log));
        composer.add_pass(ProbePass::boxed("c", false, &log));
        composer.insert_pass(ProbePass::boxed("b", false, &log), 1);
        // Out-of-bounds index clamps to the end.
        composer.insert_pass(ProbePass::boxed("z", false, &log), 99);

        let order: Vec<_> = composer.passes().iter().map(|p| p.type_tag()).collect();
        assert_eq!(order, vec!["a", "b", "c", "z"]);

        let b_uuid = composer.passes()[1].uuid();
        let removed = composer.remove_pass(b_uuid).expect("pass present");
        assert_eq!(removed.type_tag(), "b");
        assert!(composer.remove_pass(b_uuid).is_none());

        let order: Vec<_> = composer.passes().iter().map(|p| p.type_tag()).collect();
        assert_eq!(order, vec!["a", "c", "z"]);

        composer.render(&mut backend, &(), &(), 0.016).unwrap();
        let labels: Vec<_> = render_events(&log)
            .iter()
            .map(|e| match e {
                ProbeEvent::Render { label, .. } => *label,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(labels, vec!["a", "c", "z"]);
    }

    #[test]
    fn render_after_dispose_errors_until_reset() {
        let mut backend = HeadlessBackend::new();
        let mut composer = EffectComposer::with_size(&mut backend, 32, 32);

        composer.dispose(&mut backend);
        assert!(composer.is_disposed());
        assert!(matches!(
            composer.render(&mut backend, &(), &(), 0.016),
            Err(ComposerError::Disposed)
        ));

        // Second dispose is a no-op.
        composer.dispose(&mut backend);

        composer.reset(&mut backend);
        assert!(!composer.is_disposed());
        assert_eq!(composer.write_buffer().unwrap().size(), (32, 32));
        assert_ne!(
            composer.write_buffer().unwrap().id(),
            composer.read_buffer().unwrap().id()
        );
        composer.render(&mut backend, &(), &(), 0.016).unwrap();
    }

    #[test]
    fn reset_reallocates_at_current_size_without_dispose() {
        let mut backend = HeadlessBackend::new();
        let mut composer = EffectComposer::with_size(&mut backend, 16, 16);
        composer.set_size(&mut backend, 128, 64);

        let old_write = composer.write_buffer().unwrap().id();
        composer.reset(&mut backend);

        let write = composer.write_buffer().unwrap();
        assert_ne!(write.id(), old_write, "reset allocates fresh buffers");
        assert_eq!(write.size(), (128, 64));

        let disposals = backend
            .events()
            .iter()
            .filter(|e| matches!(e, BackendEvent::TargetDisposed { .. }))
            .count();
        assert_eq!(disposals, 2, "reset disposes the old pair");
    }
}
