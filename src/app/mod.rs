use super::renderer::Renderer;
use color_eyre::Result;
use color_eyre::eyre::Report;
use color_eyre::eyre::WrapErr;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

const WINDOW_TITLE: &str = "Vulkan";
const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;

pub struct App {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,

    // State
    init_error: Option<Report>,
    close_requested: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            window: None,
            renderer: None,

            init_error: None,
            close_requested: false,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(self)?;

        // A renderer construction failure exits the event loop; surface it
        // as the process error instead of swallowing it
        match self.init_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn initialize(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_none() {
            let window_attributes = Window::default_attributes()
                .with_title(WINDOW_TITLE)
                .with_inner_size(PhysicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT))
                .with_resizable(false);
            self.window = Some(Arc::new(
                event_loop
                    .create_window(window_attributes)
                    .wrap_err("Failed to create window")?
            ));
        }

        if self.renderer.is_none() {
            let window = self.window.as_ref().cloned().unwrap();
            self.renderer = Some(Renderer::new(window)?);
        }

        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.initialize(event_loop) {
            log::error!("Failed to initialize renderer: {:#}", err);
            self.init_error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
        }
    }
}
