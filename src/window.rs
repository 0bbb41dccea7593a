//! The application window, backed by winit
//!
//! The window is the surface provider: it reports the drawable size and resize events,
//! which the application forwards to [`Engine::resize`](crate::Engine::resize).

use crate::backend::{BackendError, BackendResult, Extent2d};
use winit::{
    dpi::PhysicalSize,
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{Window as WinitWindow, WindowBuilder},
};

/// What the run loop hands to the application callback
#[derive(Debug)]
pub enum WindowCallback<'a> {
    /// A window event, delivered before the window's own bookkeeping reacts to it
    Event(&'a WindowEvent),
    /// Time to render a frame
    Frame,
    /// The loop is exiting; release GPU resources now
    Exiting,
}

/// A winit window plus the size and close state the frame loop polls
pub struct Window {
    window: WinitWindow,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
}

impl Window {
    /// Open a window whose drawable area is `width` x `height` physical pixels
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> BackendResult<Self> {
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(event_loop)
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;
        let size = window.inner_size();

        Ok(Self {
            window,
            width: size.width,
            height: size.height,
            resized: false,
            close_requested: false,
        })
    }

    /// The winit window, for surface creation and egui
    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Current drawable size; zero while minimized on some platforms
    pub fn extent(&self) -> Extent2d {
        Extent2d::new(self.width, self.height)
    }

    pub fn is_minimized(&self) -> bool {
        self.extent().is_empty() || self.window.is_minimized().unwrap_or(false)
    }

    /// Size reported since the last call, if the window was resized
    pub fn take_resize(&mut self) -> Option<Extent2d> {
        std::mem::take(&mut self.resized).then(|| self.extent())
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    /// Handle window events
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = self.window.inner_size();
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    /// Request a redraw
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

pub fn create_event_loop() -> BackendResult<EventLoop<()>> {
    EventLoop::new().map_err(|e| BackendError::InitializationFailed(e.to_string()))
}

/// Run the event loop until the window closes.
///
/// The callback sees every window event, one `Frame` per loop iteration, and a final
/// `Exiting`.
pub fn run<F>(event_loop: EventLoop<()>, mut window: Window, mut callback: F) -> BackendResult<()>
where
    F: FnMut(&mut Window, WindowCallback<'_>) + 'static,
{
    event_loop
        .run(move |event, elwt: &EventLoopWindowTarget<()>| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => {
                    callback(&mut window, WindowCallback::Event(&event));
                    window.handle_event(&event);
                }
                Event::AboutToWait => {
                    if window.should_close() {
                        elwt.exit();
                        return;
                    }
                    callback(&mut window, WindowCallback::Frame);
                    window.request_redraw();
                }
                Event::LoopExiting => {
                    callback(&mut window, WindowCallback::Exiting);
                }
                _ => {}
            }
        })
        .map_err(|e| BackendError::InitializationFailed(format!("event loop: {e}")))
}
