//! Timing state machine for dissolve runs.
//!
//! The animator never touches the GPU. The render thread drives it once per
//! frame:
//!
//! ```text
//!   request() ──▶ PendingStart ──take_pending()──▶ (upload) ──start()──▶ Animating
//!                                                                          │ advance(now)
//!   reset() ◀── any phase                         Idle ◀── elapsed > duration
//! ```
//!
//! The pending slot holds at most one request; a second `request` before the
//! render thread drains the slot replaces the first outright, callback
//! included. The completion callback is taken out of its slot before it runs,
//! so it can fire at most once.

use std::fmt;
use std::time::Instant;

use tracing::{debug, warn};

use crate::grid::ParticleGrid;
use crate::source::SourceImage;
use crate::types::{EffectSettings, Placement, Viewport};

/// Invoked on the render thread once a dissolve has fully played out.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Everything a host supplies to start one dissolve.
pub struct DissolveRequest {
    pub image: SourceImage,
    pub placement: Placement,
    pub settings: EffectSettings,
    on_complete: Option<CompletionCallback>,
}

impl DissolveRequest {
    pub fn new(image: SourceImage, placement: Placement, settings: EffectSettings) -> Self {
        Self {
            image,
            placement,
            settings,
            on_complete: None,
        }
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub(crate) fn with_callback(mut self, callback: Option<CompletionCallback>) -> Self {
        self.on_complete = callback;
        self
    }

    pub fn has_callback(&self) -> bool {
        self.on_complete.is_some()
    }

    /// Resolves placement and grid against the viewport current at activation.
    pub fn plan(&self, viewport: Viewport) -> SessionPlan {
        SessionPlan {
            grid: ParticleGrid::new(
                self.image.width(),
                self.image.height(),
                self.settings.particle_size,
            ),
            origin: self
                .placement
                .resolve(viewport, self.image.width(), self.image.height()),
            settings: self.settings,
        }
    }

    pub fn take_callback(&mut self) -> Option<CompletionCallback> {
        self.on_complete.take()
    }
}

impl fmt::Debug for DissolveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DissolveRequest")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("placement", &self.placement)
            .field("settings", &self.settings)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

/// Layout of an activated run: which particles exist and where they start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionPlan {
    pub grid: ParticleGrid,
    /// Top-left corner of the image in viewport pixels.
    pub origin: [f32; 2],
    pub settings: EffectSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    PendingStart,
    Animating,
}

/// Uniform inputs for one frame of an active run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    pub elapsed_ms: f32,
    pub duration_ms: f32,
    pub particle_size: f32,
    pub grid: ParticleGrid,
    pub origin: [f32; 2],
}

/// What the render thread should do with the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameStep {
    /// Nothing to draw; the surface only needs clearing.
    Idle,
    Draw(FrameParams),
    /// The run just finished and its callback has been invoked. Nothing is drawn.
    Completed,
}

struct ActiveSession {
    plan: SessionPlan,
    started_at: Option<Instant>,
}

#[derive(Default)]
pub struct Animator {
    pending: Option<DissolveRequest>,
    active: Option<ActiveSession>,
    on_complete: Option<CompletionCallback>,
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        if self.pending.is_some() {
            Phase::PendingStart
        } else if self.active.is_some() {
            Phase::Animating
        } else {
            Phase::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.phase(), Phase::Idle)
    }

    /// Queues a run for the next frame. Zero-area images and unusable
    /// particle sizes are ignored.
    pub fn request(&mut self, request: DissolveRequest) -> bool {
        if request.image.is_empty() {
            debug!(
                width = request.image.width(),
                height = request.image.height(),
                "ignoring dissolve request for empty image"
            );
            return false;
        }
        if !request.settings.is_usable() {
            warn!(
                particle_size = request.settings.particle_size,
                "ignoring dissolve request with out-of-range particle size"
            );
            return false;
        }
        if let Some(previous) = self.pending.replace(request) {
            debug!(?previous, "replaced dissolve request that was never applied");
        }
        true
    }

    /// Drains the pending slot; called at the top of a frame.
    pub fn take_pending(&mut self) -> Option<DissolveRequest> {
        self.pending.take()
    }

    /// Arms a run whose GPU resources are in place. The start timestamp is
    /// left unset so the first frame that draws it becomes `elapsed == 0`.
    pub fn start(&mut self, plan: SessionPlan, on_complete: Option<CompletionCallback>) {
        if self.active.is_some() {
            debug!("new dissolve preempts the one in flight");
        }
        self.active = Some(ActiveSession {
            plan,
            started_at: None,
        });
        self.on_complete = on_complete;
    }

    /// Settles a drained request once its GPU resources have been built (or
    /// failed to build). On success the run starts and the resources are
    /// handed back. On failure the animator is reset and the request's
    /// callback is dropped unrun.
    pub fn activate<T, E>(
        &mut self,
        mut request: DissolveRequest,
        plan: SessionPlan,
        uploaded: Result<T, E>,
    ) -> Option<T>
    where
        E: fmt::Display,
    {
        match uploaded {
            Ok(resources) => {
                debug!(
                    particles = plan.grid.count(),
                    grid_width = plan.grid.width(),
                    grid_height = plan.grid.height(),
                    origin = ?plan.origin,
                    duration_ms = plan.settings.duration.as_millis() as u64,
                    "dissolve activated"
                );
                self.start(plan, request.take_callback());
                Some(resources)
            }
            Err(err) => {
                warn!(error = %err, "dropping dissolve request");
                self.reset();
                None
            }
        }
    }

    /// Drops pending and active runs. The callback is discarded, never invoked.
    pub fn reset(&mut self) {
        self.pending = None;
        self.active = None;
        self.on_complete = None;
    }

    /// Computes this frame's step, finishing the run once `now` passes its duration.
    pub fn advance(&mut self, now: Instant) -> FrameStep {
        let Some(session) = self.active.as_mut() else {
            return FrameStep::Idle;
        };

        let started_at = *session.started_at.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started_at);
        let plan = session.plan;

        if elapsed > plan.settings.duration {
            self.active = None;
            debug!(
                particles = plan.grid.count(),
                elapsed_ms = elapsed.as_millis() as u64,
                "dissolve complete"
            );
            if let Some(callback) = self.on_complete.take() {
                callback();
            }
            return FrameStep::Completed;
        }

        FrameStep::Draw(FrameParams {
            elapsed_ms: elapsed.as_secs_f32() * 1000.0,
            duration_ms: plan.settings.duration_ms(),
            particle_size: plan.settings.particle_size,
            grid: plan.grid,
            origin: plan.origin,
        })
    }
}
