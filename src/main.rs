// =============================================================================
// TRIANGLE RENDERER
// =============================================================================
//
// Opens a fixed-size window and draws one hard-coded triangle with Vulkan.
//
// FRAME FLOW (one per loop iteration):
// 1. Acquire the next swapchain image
// 2. Submit the command buffer pre-recorded for that image
// 3. Present the image
//
// On close the device is drained and every Vulkan object is destroyed in
// reverse creation order before the window goes away.
//
// =============================================================================

mod backend;
mod config;
mod frame;
mod renderer;
mod teardown;

use anyhow::Result;
use config::Config;
use renderer::Renderer;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

fn main() -> Result<()> {
    let (config, source) = Config::load();

    init_logging(&config);
    log::info!("Starting triangle renderer");
    source.report();
    if config.get_log_level().is_none() {
        log::warn!(
            "Unknown log level '{}', defaulting to info",
            config.debug.log_level
        );
    }
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{} \"{}\"",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    log::info!("Exited cleanly");
    Ok(())
}

/// Log to stdout at the configured level; RUST_LOG takes precedence
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    Builder::new()
        .filter_level(config.get_log_level().unwrap_or(LevelFilter::Info))
        .parse_default_env()
        .target(Target::Stdout)
        .init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the renderer must go before the window.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Window>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.teardown();
        }
        if self.window.take().is_some() {
            log::info!("Window closed");
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => w,
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&self.config, &window) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {:?}", e);
                event_loop.exit();
            }
        }

        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(e) = renderer.draw_frame() {
                        log::error!("Frame error: {}", e);
                    }
                }
            }

            _ => {}
        }
    }

    /// Keep the loop spinning: one frame per iteration.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown();
    }
}
