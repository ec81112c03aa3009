use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::info;
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{
    ElementState, Event, KeyEvent, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent,
};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{KeyCode as WinitKeyCode, PhysicalKey};
use winit::platform::run_on_demand::EventLoopExtRunOnDemand;
use winit::window::{CursorGrabMode, WindowBuilder};

use sphere_shading::{
    HeadlessDevice, InputState, KeyCode, MouseButton, NamedKey, Settings, ShadingMode,
    ShadingSession, WgpuDevice,
};

/// Pixels per scroll line for touchpads reporting pixel deltas.
const PIXELS_PER_LINE: f32 = 40.0;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let settings = options.settings()?;

    if options.headless {
        run_headless(settings, options.frames)
    } else {
        match run_interactive(settings.clone()) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --headless mode (set DISPLAY or install X11 libs to enable rendering)."
                    );
                    run_headless(settings, options.frames)
                } else {
                    Err(err)
                }
            }
        }
    }
}

fn run_headless(settings: Settings, frames: u32) -> Result<()> {
    let mut device = HeadlessDevice::new();
    let (width, height) = settings.window_size;
    let aspect = width as f32 / height.max(1) as f32;
    let mut session = ShadingSession::new(&mut device, settings)?;
    for _ in 0..frames {
        session.render(&mut device, aspect);
    }

    println!("{}", session.summary());
    println!(
        "Rendered {} frame(s), {} draw call(s)",
        session.frames_rendered(),
        device.draw_count()
    );
    Ok(())
}

fn run_interactive(settings: Settings) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let mut event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    let (width, height) = settings.window_size;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Sphere Shading")
            .with_inner_size(LogicalSize::new(width as f64, height as f64))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let mut device = block_on(WgpuDevice::new(Arc::clone(&window)))?;
    let session = ShadingSession::new(&mut device, settings)?;

    let mut app = AppState {
        device,
        session,
        input: InputState::new(),
        last_frame: Instant::now(),
        steering: false,
        last_error: None,
    };

    event_loop
        .run_on_demand(|event, target| {
            target.set_control_flow(ControlFlow::Poll);
            if let Err(err) = app.process_event(event, target) {
                app.last_error = Some(err);
                target.exit();
            }
        })
        .context("event loop failed")?;

    println!("{}", app.session.summary());

    if let Some(err) = app.last_error {
        return Err(err);
    }

    Ok(())
}

struct AppState {
    device: WgpuDevice,
    session: ShadingSession<WgpuDevice>,
    input: InputState,
    last_frame: Instant,
    steering: bool,
    last_error: Option<anyhow::Error>,
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

impl AppState {
    fn process_event(
        &mut self,
        event: Event<()>,
        target: &EventLoopWindowTarget<()>,
    ) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if window_id == self.device.window_id() => {
                match event {
                    WindowEvent::CloseRequested => target.exit(),
                    WindowEvent::Resized(size) => self.device.resize(size),
                    WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(&event),
                    WindowEvent::MouseInput { state, button, .. } => {
                        self.handle_mouse_button(state, button);
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        let pos = Vec2::new(position.x as f32, position.y as f32);
                        self.input.set_mouse_position(pos);
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        let lines = match delta {
                            MouseScrollDelta::LineDelta(_, y) => y,
                            MouseScrollDelta::PixelDelta(position) => {
                                position.y as f32 / PIXELS_PER_LINE
                            }
                        };
                        self.input.add_scroll(lines);
                    }
                    WindowEvent::RedrawRequested => self.redraw(target)?,
                    _ => {}
                }
            }
            Event::AboutToWait => {
                self.device.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    fn redraw(&mut self, target: &EventLoopWindowTarget<()>) -> Result<()> {
        let now = Instant::now();
        let delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        if !self.session.handle_keys(&mut self.device, &self.input) {
            target.exit();
            return Ok(());
        }
        let steering = self.session.update_camera(&self.input, delta_time);
        self.set_cursor_captured(steering);

        if let Err(err) = self.device.begin_frame() {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = self.device.window().inner_size();
                    self.device.resize(size);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => {
                    info!("Surface unavailable; retrying next frame");
                }
            }
            return Ok(());
        }
        let aspect = self.device.aspect();
        self.session.render(&mut self.device, aspect);
        self.device.end_frame();
        Ok(())
    }

    /// Hides and confines the cursor while the camera is steered.
    fn set_cursor_captured(&mut self, captured: bool) {
        if captured == self.steering {
            return;
        }
        self.steering = captured;
        let window = self.device.window();
        window.set_cursor_visible(!captured);
        let mode = if captured {
            CursorGrabMode::Confined
        } else {
            CursorGrabMode::None
        };
        if let Err(err) = window.set_cursor_grab(mode) {
            info!("cursor grab unavailable: {err}");
        }
    }

    fn handle_keyboard(&self, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let Some(keycode) = map_keycode(code) else {
            return;
        };
        match event.state {
            ElementState::Pressed => self.input.set_key_down(keycode),
            ElementState::Released => self.input.set_key_up(keycode),
        }
    }

    fn handle_mouse_button(&self, state: ElementState, button: WinitMouseButton) {
        let button = match button {
            WinitMouseButton::Left => MouseButton::LEFT,
            WinitMouseButton::Right => MouseButton::RIGHT,
            WinitMouseButton::Middle => MouseButton::new(2),
            WinitMouseButton::Back => MouseButton::new(3),
            WinitMouseButton::Forward => MouseButton::new(4),
            WinitMouseButton::Other(value) => MouseButton::new(value.min(u8::MAX as u16) as u8),
        };
        match state {
            ElementState::Pressed => self.input.set_mouse_button_down(button),
            ElementState::Released => self.input.set_mouse_button_up(button),
        }
    }
}

fn map_keycode(code: WinitKeyCode) -> Option<KeyCode> {
    use WinitKeyCode as Key;
    Some(match code {
        Key::ArrowLeft => KeyCode::Named(NamedKey::Left),
        Key::ArrowRight => KeyCode::Named(NamedKey::Right),
        Key::ArrowUp => KeyCode::Named(NamedKey::Up),
        Key::ArrowDown => KeyCode::Named(NamedKey::Down),
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::Equal | Key::NumpadAdd => KeyCode::Named(NamedKey::Plus),
        Key::Minus | Key::NumpadSubtract => KeyCode::Named(NamedKey::Minus),
        Key::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        Key::ShiftRight => KeyCode::Named(NamedKey::RightShift),
        Key::Digit1 | Key::Numpad1 => KeyCode::Digit(1),
        Key::Digit2 | Key::Numpad2 => KeyCode::Digit(2),
        Key::Digit3 | Key::Numpad3 => KeyCode::Digit(3),
        Key::KeyA => KeyCode::Character('A'),
        Key::KeyC => KeyCode::Character('C'),
        Key::KeyD => KeyCode::Character('D'),
        Key::KeyP => KeyCode::Character('P'),
        Key::KeyS => KeyCode::Character('S'),
        Key::KeyW => KeyCode::Character('W'),
        _ => return None,
    })
}

const USAGE: &str = "Usage: sphere-shading [--preset <file.xml>] [--shaders <dir>] [--radius <r>] \
[--longitude <n>] [--latitude <n>] [--mode lit|unlit|wireframe] [--blinn] [--headless] [--frames <n>]";

#[derive(Debug, Default)]
struct CliOptions {
    preset: Option<PathBuf>,
    shaders: Option<PathBuf>,
    radius: Option<f32>,
    longitude: Option<u32>,
    latitude: Option<u32>,
    mode: Option<ShadingMode>,
    blinn: bool,
    headless: bool,
    frames: u32,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            frames: 1,
            ..Self::default()
        };
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{name} expects a value.\n{USAGE}"))
            };
            match arg.as_str() {
                "--preset" => options.preset = Some(value("--preset")?.into()),
                "--shaders" => options.shaders = Some(value("--shaders")?.into()),
                "--radius" => {
                    options.radius = Some(
                        value("--radius")?
                            .parse()
                            .context("--radius expects a number")?,
                    );
                }
                "--longitude" => {
                    options.longitude = Some(
                        value("--longitude")?
                            .parse()
                            .context("--longitude expects a positive integer")?,
                    );
                }
                "--latitude" => {
                    options.latitude = Some(
                        value("--latitude")?
                            .parse()
                            .context("--latitude expects a positive integer")?,
                    );
                }
                "--mode" => options.mode = Some(value("--mode")?.parse()?),
                "--blinn" => options.blinn = true,
                "--headless" => options.headless = true,
                "--frames" => {
                    options.frames = value("--frames")?
                        .parse()
                        .context("--frames expects a non-negative integer")?;
                }
                "--help" | "-h" => return Err(anyhow!("{USAGE}")),
                other => return Err(anyhow!("Unknown argument: {other}.\n{USAGE}")),
            }
        }
        Ok(options)
    }

    /// Preset (or defaults) with the command-line overrides applied.
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.preset {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        if let Some(shaders) = &self.shaders {
            settings.shader_dir = shaders.clone();
        }
        if let Some(radius) = self.radius {
            settings.sphere.radius = radius;
        }
        if let Some(longitude) = self.longitude {
            settings.sphere.longitude = longitude;
        }
        if let Some(latitude) = self.latitude {
            settings.sphere.latitude = latitude;
        }
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if self.blinn {
            settings.phong = false;
        }
        settings.sphere.validate()?;
        Ok(settings)
    }
}
