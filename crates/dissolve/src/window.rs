use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, error, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::animator::FrameStep;
use crate::controller::{self, DissolveController, DissolveInbox};
use crate::gpu::{AdapterProfile, GpuState};
use crate::types::{PreviewConfig, SurfaceAlpha, Viewport};

/// Render-thread state for the preview window.
struct WindowState {
    // Declared before `window` so the surface is dropped first.
    gpu: GpuState,
    inbox: DissolveInbox,
    window: Arc<Window>,
}

impl WindowState {
    fn new(window: Arc<Window>, config: &PreviewConfig, inbox: DissolveInbox) -> Result<Self> {
        let size = window.inner_size();
        let gpu = GpuState::new(
            window.as_ref(),
            Viewport::new(size.width, size.height),
            config,
        )?;
        Ok(Self { gpu, inbox, window })
    }

    fn window(&self) -> &Window {
        self.window.as_ref()
    }

    fn adapter_profile(&self) -> &AdapterProfile {
        self.gpu.adapter_profile()
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.gpu.resize(Viewport::new(size.width, size.height));
    }

    fn render_frame(&mut self) -> Result<FrameStep, wgpu::SurfaceError> {
        self.inbox.drain(self.gpu.animator_mut());
        let result = self.gpu.render(Instant::now());
        self.inbox.publish(self.gpu.is_animating());
        result
    }

    fn wants_frames(&self) -> bool {
        self.gpu.is_animating()
    }
}

#[derive(Debug, Clone, Copy)]
enum WindowCommand {
    Wake,
    Shutdown,
}

/// Input the window forwards to its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSignal {
    /// Space was pressed.
    Trigger,
    /// `R` was pressed.
    Reset,
    /// The window was closed or Escape was pressed.
    Closed,
}

/// Preview window running on its own thread, rendering dissolves queued
/// through its [`DissolveController`].
pub struct WindowRuntime {
    proxy: EventLoopProxy<WindowCommand>,
    controller: DissolveController,
    signals: Receiver<WindowSignal>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

type ReadyMessage = Result<(EventLoopProxy<WindowCommand>, DissolveController)>;

impl WindowRuntime {
    pub fn spawn(config: PreviewConfig) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded(1);
        let (signal_tx, signal_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("dissolve-window".into())
            .spawn(move || run_window_thread(config, ready_tx, signal_tx))
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let (proxy, controller) = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread failed to initialise: {err}"))??;

        Ok(Self {
            proxy,
            controller,
            signals: signal_rx,
            join_handle: Some(handle),
        })
    }

    /// Handle for queueing dissolves on this window; clone it freely.
    pub fn controller(&self) -> DissolveController {
        self.controller.clone()
    }

    pub fn signals(&self) -> &Receiver<WindowSignal> {
        &self.signals
    }

    pub fn shutdown(mut self) -> Result<()> {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(WindowCommand::Shutdown);
            handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))??;
        }
        Ok(())
    }
}

impl Drop for WindowRuntime {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(WindowCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_window_thread(
    config: PreviewConfig,
    ready_tx: Sender<ReadyMessage>,
    signal_tx: Sender<WindowSignal>,
) -> Result<()> {
    let mut builder = EventLoopBuilder::<WindowCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }

    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }
    let event_loop = match builder.build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            let message = format!("failed to create event loop: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };
    let proxy = event_loop.create_proxy();

    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title(config.title.clone())
        .with_inner_size(window_size)
        .with_transparent(config.surface_alpha == SurfaceAlpha::Transparent)
        .with_visible(config.show_window)
        .build(&event_loop);
    let window = match window {
        Ok(window) => Arc::new(window),
        Err(err) => {
            let message = format!("failed to create preview window: {err}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };

    let waker = Mutex::new(proxy.clone());
    let (controller, inbox) = controller::channel(
        config.settings,
        Box::new(move || {
            let proxy = waker.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = proxy.send_event(WindowCommand::Wake);
        }),
    );
    if config.composite_background {
        controller.set_background(Some(config.background_color));
    }

    let mut state = match WindowState::new(window.clone(), &config, inbox) {
        Ok(state) => state,
        Err(err) => {
            let wrapped = anyhow!("failed to initialise window renderer: {err}");
            let message = wrapped.to_string();
            let _ = ready_tx.send(Err(anyhow!(message)));
            return Err(wrapped);
        }
    };

    let profile = state.adapter_profile();
    if profile.is_software() {
        warn!(
            adapter = %profile.name,
            backend = ?profile.backend,
            "software rasterizer detected; large images will dissolve slowly"
        );
    }

    let _ = ready_tx.send(Ok((proxy, controller)));
    state.window().request_redraw();

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::UserEvent(WindowCommand::Wake) => {
            state.window().request_redraw();
        }
        Event::UserEvent(WindowCommand::Shutdown) => {
            elwt.exit();
        }
        Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
            match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    let _ = signal_tx.send(WindowSignal::Closed);
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if let Some(signal) = signal_for_key(&event) {
                        let _ = signal_tx.send(signal);
                        if signal == WindowSignal::Closed {
                            elwt.exit();
                        }
                    }
                }
                WindowEvent::Resized(new_size) => {
                    state.resize(new_size);
                    state.window().request_redraw();
                }
                WindowEvent::RedrawRequested => match state.render_frame() {
                    Ok(FrameStep::Completed) => debug!("dissolve finished"),
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        state.gpu.reconfigure();
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        error!("surface out of memory; closing preview");
                        let _ = signal_tx.send(WindowSignal::Closed);
                        elwt.exit();
                    }
                    Err(other) => {
                        warn!("surface error: {other:?}; retrying next frame");
                    }
                },
                _ => {}
            }
        }
        Event::AboutToWait => {
            if state.wants_frames() {
                tracing::trace!("dissolve in flight; requesting redraw");
                state.window().request_redraw();
            }
            elwt.set_control_flow(ControlFlow::Wait);
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

fn signal_for_key(event: &KeyEvent) -> Option<WindowSignal> {
    if event.state != ElementState::Pressed || event.repeat {
        return None;
    }
    match &event.logical_key {
        Key::Named(NamedKey::Space) => Some(WindowSignal::Trigger),
        Key::Named(NamedKey::Escape) => Some(WindowSignal::Closed),
        Key::Character(value) if value.as_str() == " " => Some(WindowSignal::Trigger),
        Key::Character(value) if value.eq_ignore_ascii_case("r") => Some(WindowSignal::Reset),
        _ => None,
    }
}
