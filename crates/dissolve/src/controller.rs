//! Cross-thread handle for triggering dissolves.
//!
//! [`DissolveController`] is what hosts hold on to. It can be cloned and sent
//! to any thread; every call turns into a [`DissolveCommand`] on a channel that
//! the render thread drains (through [`DissolveInbox`]) at the start of each
//! frame. A wake hook nudges the render loop so an idle window notices new
//! commands without polling.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};
use effectconfig::Color;
use tracing::{debug, warn};

use crate::animator::{Animator, CompletionCallback, DissolveRequest};
use crate::source::SourceImage;
use crate::types::{EffectSettings, Placement};

/// Wakes the render loop after a command has been queued.
pub type WakeFn = Box<dyn Fn() + Send + Sync + 'static>;

pub enum DissolveCommand {
    Start(DissolveRequest),
    Reset,
}

impl fmt::Debug for DissolveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DissolveCommand::Start(request) => f.debug_tuple("Start").field(request).finish(),
            DissolveCommand::Reset => f.write_str("Reset"),
        }
    }
}

/// Last captured content plus the defaults applied by [`DissolveController::vanish`].
#[derive(Debug, Default)]
struct CaptureSlots {
    image: Option<SourceImage>,
    placement: Placement,
    background: Option<Color>,
    settings: EffectSettings,
}

struct Shared {
    commands: Sender<DissolveCommand>,
    wake: WakeFn,
    animating: Arc<AtomicBool>,
    capture: Mutex<CaptureSlots>,
}

impl Shared {
    fn capture(&self) -> MutexGuard<'_, CaptureSlots> {
        self.capture.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, command: DissolveCommand) -> bool {
        match self.commands.send(command) {
            Ok(()) => {
                (self.wake)();
                true
            }
            Err(err) => {
                debug!(command = ?err.0, "render thread is gone; dropping dissolve command");
                false
            }
        }
    }
}

#[derive(Clone)]
pub struct DissolveController {
    shared: Option<Arc<Shared>>,
}

/// Render-thread end of a controller channel.
pub struct DissolveInbox {
    commands: Receiver<DissolveCommand>,
    animating: Arc<AtomicBool>,
}

/// Creates a connected controller/inbox pair.
pub fn channel(settings: EffectSettings, wake: WakeFn) -> (DissolveController, DissolveInbox) {
    let (tx, rx) = unbounded();
    let animating = Arc::new(AtomicBool::new(false));
    let shared = Shared {
        commands: tx,
        wake,
        animating: animating.clone(),
        capture: Mutex::new(CaptureSlots {
            settings,
            ..CaptureSlots::default()
        }),
    };
    (
        DissolveController {
            shared: Some(Arc::new(shared)),
        },
        DissolveInbox {
            commands: rx,
            animating,
        },
    )
}

impl DissolveController {
    /// A controller wired to nothing. Every call is accepted and ignored,
    /// which lets hosts hold a handle before any render surface exists.
    pub fn detached() -> Self {
        Self { shared: None }
    }

    pub fn is_detached(&self) -> bool {
        self.shared.is_none()
    }

    /// Stores the content that the next [`vanish`](Self::vanish) will dissolve.
    pub fn capture(&self, image: SourceImage) {
        if let Some(shared) = &self.shared {
            shared.capture().image = Some(image);
        }
    }

    /// Pins captured content to a viewport offset instead of centring it.
    pub fn set_bounds(&self, left: f32, top: f32) {
        if let Some(shared) = &self.shared {
            shared.capture().placement = Placement::at(left, top);
        }
    }

    pub fn set_placement(&self, placement: Placement) {
        if let Some(shared) = &self.shared {
            shared.capture().placement = placement;
        }
    }

    /// Colour composited under transparent captures; `None` keeps their alpha.
    pub fn set_background(&self, background: Option<Color>) {
        if let Some(shared) = &self.shared {
            shared.capture().background = background;
        }
    }

    /// Replaces the settings used by later `vanish` calls. Runs already
    /// queued or in flight keep the settings they were started with.
    pub fn configure(&self, settings: EffectSettings) {
        if let Some(shared) = &self.shared {
            shared.capture().settings = settings;
        }
    }

    pub fn settings(&self) -> EffectSettings {
        self.shared
            .as_ref()
            .map(|shared| shared.capture().settings)
            .unwrap_or_default()
    }

    /// Dissolves the last captured image with the current placement and settings.
    pub fn vanish<F>(&self, on_complete: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue_capture(Some(Box::new(on_complete)))
    }

    /// Same as [`vanish`](Self::vanish) without a completion callback.
    pub fn vanish_silently(&self) -> bool {
        self.queue_capture(None)
    }

    fn queue_capture(&self, on_complete: Option<CompletionCallback>) -> bool {
        let Some(shared) = &self.shared else {
            return false;
        };
        let (image, placement, settings) = {
            let slots = shared.capture();
            let Some(image) = slots.image.clone() else {
                debug!("vanish called before anything was captured");
                return false;
            };
            (image, slots.placement, slots.settings)
        };
        self.queue(DissolveRequest::new(image, placement, settings).with_callback(on_complete))
    }

    /// Starts a dissolve of `image`. Returns `false` when nothing was queued:
    /// the image has no area, the particle size is out of range, the
    /// controller is detached, or the render thread has shut down.
    pub fn vanish_with<F>(
        &self,
        image: SourceImage,
        placement: Placement,
        settings: EffectSettings,
        on_complete: F,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue(DissolveRequest::new(image, placement, settings).on_complete(on_complete))
    }

    fn queue(&self, mut request: DissolveRequest) -> bool {
        let Some(shared) = &self.shared else {
            return false;
        };
        if request.image.is_empty() {
            debug!(
                width = request.image.width(),
                height = request.image.height(),
                "skipping dissolve of empty image"
            );
            return false;
        }
        if !request.settings.is_usable() {
            warn!(
                particle_size = request.settings.particle_size,
                "skipping dissolve with out-of-range particle size"
            );
            return false;
        }
        let background = shared.capture().background;
        if let Some(background) = background {
            if request.image.has_transparency() {
                request.image = request.image.composite_over(background);
            }
        }
        shared.send(DissolveCommand::Start(request))
    }

    /// Aborts any pending or running dissolve. Its callback is dropped unrun.
    pub fn reset(&self) {
        if let Some(shared) = &self.shared {
            shared.send(DissolveCommand::Reset);
        }
    }

    /// True from the frame a dissolve is picked up until the frame it completes.
    pub fn is_animating(&self) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|shared| shared.animating.load(Ordering::Acquire))
    }
}

impl fmt::Debug for DissolveController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DissolveController")
            .field("detached", &self.is_detached())
            .field("animating", &self.is_animating())
            .finish()
    }
}

impl DissolveInbox {
    /// Applies queued commands to the animator in the order they were sent.
    /// Returns the number of commands applied.
    pub fn drain(&self, animator: &mut Animator) -> usize {
        let mut applied = 0;
        for command in self.commands.try_iter() {
            match command {
                DissolveCommand::Start(request) => {
                    animator.request(request);
                }
                DissolveCommand::Reset => animator.reset(),
            }
            applied += 1;
        }
        applied
    }

    /// Publishes the animator's state for [`DissolveController::is_animating`].
    pub fn publish(&self, animating: bool) {
        self.animating.store(animating, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::animator::{FrameStep, Phase};
    use crate::types::Viewport;

    fn counting_wake() -> (Arc<AtomicUsize>, WakeFn) {
        let wakes = Arc::new(AtomicUsize::new(0));
        let handle = wakes.clone();
        (
            wakes,
            Box::new(move || {
                handle.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn settings() -> EffectSettings {
        EffectSettings::new(Duration::from_millis(200), 2.0)
    }

    /// One render-thread frame: drain, activate, advance, publish.
    fn frame(inbox: &DissolveInbox, animator: &mut Animator, now: Instant) -> FrameStep {
        inbox.drain(animator);
        if let Some(mut request) = animator.take_pending() {
            let plan = request.plan(Viewport::new(64, 64));
            animator.start(plan, request.take_callback());
        }
        let step = animator.advance(now);
        inbox.publish(animator.is_busy());
        step
    }

    #[test]
    fn detached_controller_ignores_everything() {
        let controller = DissolveController::detached();
        controller.capture(SourceImage::solid(4, 4, Color::WHITE));
        assert!(!controller.vanish(|| panic!("detached controllers never run callbacks")));
        controller.reset();
        assert!(!controller.is_animating());
        assert_eq!(controller.settings(), EffectSettings::default());
    }

    #[test]
    fn vanish_needs_a_capture() {
        let (wakes, wake) = counting_wake();
        let (controller, inbox) = channel(settings(), wake);
        assert!(!controller.vanish_silently());
        assert_eq!(wakes.load(Ordering::SeqCst), 0);

        controller.capture(SourceImage::solid(8, 8, Color::WHITE));
        assert!(controller.vanish_silently());
        assert_eq!(wakes.load(Ordering::SeqCst), 1);

        let mut animator = Animator::new();
        assert_eq!(inbox.drain(&mut animator), 1);
        assert_eq!(animator.phase(), Phase::PendingStart);
    }

    #[test]
    fn empty_images_are_rejected_before_queueing() {
        let (wakes, wake) = counting_wake();
        let (controller, inbox) = channel(settings(), wake);
        let queued = controller.vanish_with(
            SourceImage::solid(0, 0, Color::WHITE),
            Placement::Centered,
            settings(),
            || {},
        );
        assert!(!queued);
        assert_eq!(wakes.load(Ordering::SeqCst), 0);
        assert_eq!(inbox.drain(&mut Animator::new()), 0);
    }

    #[test]
    fn sub_pixel_particle_sizes_are_rejected_before_queueing() {
        let (wakes, wake) = counting_wake();
        let (controller, inbox) = channel(settings(), wake);
        let queued = controller.vanish_with(
            SourceImage::solid(300, 200, Color::WHITE),
            Placement::at(0.0, 0.0),
            EffectSettings::new(Duration::from_millis(1800), 0.001),
            || {},
        );
        assert!(!queued);

        controller.capture(SourceImage::solid(300, 200, Color::WHITE));
        controller.configure(EffectSettings::new(Duration::from_millis(1800), 0.5));
        assert!(!controller.vanish_silently());

        assert_eq!(wakes.load(Ordering::SeqCst), 0);
        assert_eq!(inbox.drain(&mut Animator::new()), 0);
    }

    #[test]
    fn callback_fires_once_and_status_tracks_the_run() {
        let fired = Arc::new(AtomicUsize::new(0));
        let (_, wake) = counting_wake();
        let (controller, inbox) = channel(settings(), wake);
        let mut animator = Animator::new();

        let handle = fired.clone();
        controller.capture(SourceImage::solid(16, 16, Color::WHITE));
        assert!(controller.vanish(move || {
            handle.fetch_add(1, Ordering::SeqCst);
        }));

        let start = Instant::now();
        assert!(matches!(frame(&inbox, &mut animator, start), FrameStep::Draw(_)));
        assert!(controller.is_animating());

        let end = start + Duration::from_millis(201);
        assert_eq!(frame(&inbox, &mut animator, end), FrameStep::Completed);
        assert!(!controller.is_animating());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        frame(&inbox, &mut animator, end + Duration::from_millis(500));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_after_start_drops_the_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let (_, wake) = counting_wake();
        let (controller, inbox) = channel(settings(), wake);
        let mut animator = Animator::new();

        let handle = fired.clone();
        controller.vanish_with(
            SourceImage::solid(16, 16, Color::WHITE),
            Placement::Centered,
            settings(),
            move || {
                handle.fetch_add(1, Ordering::SeqCst);
            },
        );
        let start = Instant::now();
        frame(&inbox, &mut animator, start);

        controller.reset();
        let later = start + Duration::from_secs(1);
        assert_eq!(frame(&inbox, &mut animator, later), FrameStep::Idle);
        assert!(!controller.is_animating());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn commands_apply_in_send_order() {
        let fired = Arc::new(AtomicUsize::new(0));
        let (_, wake) = counting_wake();
        let (controller, inbox) = channel(settings(), wake);
        let mut animator = Animator::new();
        controller.capture(SourceImage::solid(16, 16, Color::WHITE));

        // Start then reset within one frame: nothing runs.
        let handle = fired.clone();
        controller.vanish(move || {
            handle.fetch_add(1, Ordering::SeqCst);
        });
        controller.reset();
        assert_eq!(frame(&inbox, &mut animator, Instant::now()), FrameStep::Idle);

        // Reset then start: the start survives.
        controller.reset();
        let handle = fired.clone();
        controller.vanish(move || {
            handle.fetch_add(1, Ordering::SeqCst);
        });
        let start = Instant::now();
        assert!(matches!(frame(&inbox, &mut animator, start), FrameStep::Draw(_)));
        frame(&inbox, &mut animator, start + Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn background_is_composited_under_transparent_captures() {
        let (_, wake) = counting_wake();
        let (controller, inbox) = channel(settings(), wake);
        controller.set_background(Some(Color::BLACK));
        controller.set_bounds(3.0, 4.0);
        controller.capture(SourceImage::solid(4, 4, Color::TRANSPARENT));
        assert!(controller.vanish_silently());

        let mut animator = Animator::new();
        inbox.drain(&mut animator);
        let request = animator.take_pending().expect("queued request");
        assert_eq!(request.image.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(request.placement, Placement::at(3.0, 4.0));
    }

    #[test]
    fn configure_applies_to_later_requests() {
        let (_, wake) = counting_wake();
        let (controller, inbox) = channel(settings(), wake);
        controller.capture(SourceImage::solid(4, 4, Color::WHITE));
        controller.vanish_silently();

        let slower = EffectSettings::new(Duration::from_secs(3), 4.0);
        controller.configure(slower);
        assert_eq!(controller.settings(), slower);
        controller.vanish_silently();

        let mut seen = Vec::new();
        for command in inbox.commands.try_iter() {
            if let DissolveCommand::Start(request) = command {
                seen.push(request.settings);
            }
        }
        assert_eq!(seen, vec![settings(), slower]);
    }

    #[test]
    fn closed_inbox_reports_failure() {
        let (_, wake) = counting_wake();
        let (controller, inbox) = channel(settings(), wake);
        drop(inbox);
        controller.capture(SourceImage::solid(4, 4, Color::WHITE));
        assert!(!controller.vanish_silently());
    }

    #[test]
    fn controller_is_shareable_across_threads() {
        let (_, wake) = counting_wake();
        let (controller, inbox) = channel(settings(), wake);
        let remote = controller.clone();
        let queued = std::thread::spawn(move || {
            remote.capture(SourceImage::solid(4, 4, Color::WHITE));
            remote.vanish_silently()
        })
        .join()
        .expect("thread");
        assert!(queued);
        let mut animator = Animator::new();
        assert_eq!(inbox.drain(&mut animator), 1);
    }
}
