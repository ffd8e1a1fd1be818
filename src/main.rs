use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{WindowAttributes, WindowId};

use penumbra::app::{camera_for, light_for, load_scene, run_headless, upload_scene};
use penumbra::config::{FrustumFit, OrthoBounds, ShadowConfig, ShadowFilter};
use penumbra::input::{cycle_filter, LightControls};
use penumbra::render::{Light, NativeDevice, Viewport};
use penumbra::{MeshInstance, RenderError, Scene, ShadowRenderer};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

const USAGE: &str = "Usage: penumbra [scene.xml] [--headless] [--frames N] [--resolution N] \
[--edge-samples N] [--filter binary|pcf|stochastic] [--bias F] [--frustum fixed|scene]";

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let (scene, base_dir) = load_scene(options.scene.as_deref())?;
    let config = options.apply(scene.shadow.clone())?;

    println!(
        "Loaded scene with {} objects ({})",
        scene.objects.len(),
        config.filter
    );
    for object in &scene.objects {
        println!(" - {} ({:?})", object.name, object.kind);
    }

    if options.headless {
        return headless(&scene, &base_dir, config, options.frames);
    }
    match run_interactive(scene.clone(), base_dir.clone(), config.clone()) {
        Ok(()) => Ok(()),
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!("{err}. Falling back to --headless mode (set DISPLAY to enable rendering).");
            headless(&scene, &base_dir, config, options.frames)
        }
        Err(err) => Err(err),
    }
}

fn headless(scene: &Scene, base_dir: &Path, config: ShadowConfig, frames: u32) -> Result<()> {
    let summary = run_headless(scene, base_dir, config, frames, HEADLESS_VIEWPORT)?;
    println!("{summary}");
    Ok(())
}

const HEADLESS_VIEWPORT: Viewport = Viewport {
    width: 320,
    height: 240,
};

#[derive(Debug, Default)]
struct CliOptions {
    scene: Option<PathBuf>,
    headless: bool,
    frames: u32,
    resolution: Option<u32>,
    edge_samples: Option<u32>,
    filter: Option<ShadowFilter>,
    bias: Option<f32>,
    frustum: Option<String>,
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
                    .ok_or_else(|| anyhow!("{name} expects a value\n{USAGE}"))
            };
            match arg.as_str() {
                "--headless" => options.headless = true,
                "--frames" => options.frames = parse_value("--frames", &value("--frames")?)?,
                "--resolution" => {
                    options.resolution = Some(parse_value("--resolution", &value("--resolution")?)?)
                }
                "--edge-samples" => {
                    options.edge_samples =
                        Some(parse_value("--edge-samples", &value("--edge-samples")?)?)
                }
                "--filter" => options.filter = Some(value("--filter")?.parse::<ShadowFilter>()?),
                "--bias" => options.bias = Some(parse_value("--bias", &value("--bias")?)?),
                "--frustum" => options.frustum = Some(value("--frustum")?),
                "-h" | "--help" => return Err(anyhow!(USAGE)),
                other if other.starts_with('-') => {
                    return Err(anyhow!("Unknown argument: {other}\n{USAGE}"));
                }
                path if options.scene.is_none() => options.scene = Some(PathBuf::from(path)),
                extra => return Err(anyhow!("Unexpected argument: {extra}\n{USAGE}")),
            }
        }
        Ok(options)
    }

    /// Layers the command line over the scene's shadow settings.
    fn apply(&self, mut config: ShadowConfig) -> Result<ShadowConfig> {
        if let Some(resolution) = self.resolution {
            config.resolution = resolution;
        }
        if let Some(filter) = self.filter {
            config.filter = filter;
        }
        if let Some(samples) = self.edge_samples {
            match &mut config.filter {
                ShadowFilter::StochasticEdge { edge_samples } => *edge_samples = samples,
                other => warn!("--edge-samples has no effect on the {other} filter"),
            }
        }
        if let Some(value) = self.bias {
            match &mut config.filter {
                ShadowFilter::Pcf { bias } => *bias = value,
                other => warn!("--bias has no effect on the {other} filter"),
            }
        }
        match self.frustum.as_deref() {
            None => {}
            Some("fixed") => config.frustum = FrustumFit::Fixed(OrthoBounds::default()),
            Some("scene") => config.frustum = FrustumFit::Scene { padding: 1.0 },
            Some(other) => return Err(anyhow!("unknown frustum fit `{other}`\n{USAGE}")),
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_value<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid value `{value}` for {name}"))
}

fn run_interactive(scene: Scene, base_dir: PathBuf, config: ShadowConfig) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    let mut app = ShadowApp::Pending {
        scene,
        base_dir,
        config,
    };
    let mut last_error = None;
    let mut runner = AppRunner {
        app: &mut app,
        last_error: &mut last_error,
    };
    event_loop
        .run_app(&mut runner)
        .context("event loop terminated abnormally")?;

    if let ShadowApp::Running(state) = app {
        let state = *state;
        state.shutdown();
    }
    match last_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

enum ShadowApp {
    Pending {
        scene: Scene,
        base_dir: PathBuf,
        config: ShadowConfig,
    },
    Running(Box<AppState>),
    Finished,
}

struct AppState {
    device: NativeDevice,
    renderer: ShadowRenderer,
    scene: Scene,
    meshes: Vec<MeshInstance>,
    light: Light,
    controls: LightControls,
    last_frame: Instant,
}

impl AppState {
    fn start(
        event_loop: &ActiveEventLoop,
        scene: Scene,
        base_dir: &Path,
        config: ShadowConfig,
    ) -> Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title("penumbra")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        let mut device = block_on(NativeDevice::new(Arc::clone(&window)))?;
        let renderer = ShadowRenderer::setup(&mut device, config)
            .context("failed to set up the shadow renderer")?;
        let meshes = upload_scene(&mut device, &scene, base_dir)?;
        let light = light_for(&scene);
        info!("Interactive renderer ready with {} meshes", meshes.len());
        Ok(Self {
            device,
            renderer,
            scene,
            meshes,
            light,
            controls: LightControls::default(),
            last_frame: Instant::now(),
        })
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode, state: ElementState) {
        match (key, state) {
            (KeyCode::Escape, ElementState::Pressed) => event_loop.exit(),
            (KeyCode::KeyF, ElementState::Pressed) => {
                let filter = cycle_filter(self.renderer.config().filter);
                self.renderer.set_filter(filter);
                info!("Shadow filter: {filter}");
            }
            (_, ElementState::Pressed) => self.controls.set_key_down(key),
            (_, ElementState::Released) => self.controls.set_key_up(key),
        }
    }

    fn redraw(&mut self) -> Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        if self.controls.apply(&mut self.light, dt) {
            info!("Light moved to {:?}", self.light.position);
        }

        let size = self.device.size();
        let viewport = Viewport::new(size.width, size.height);
        let camera = camera_for(&self.scene, viewport);
        let result = self.renderer.render_frame(
            &mut self.device,
            &camera,
            &self.light,
            viewport,
            &self.meshes,
        );
        match result {
            Ok(_) => {}
            Err(RenderError::Surface(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                let size = self.device.window().inner_size();
                self.device.resize(size);
            }
            Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                return Err(anyhow!("GPU is out of memory"));
            }
            Err(RenderError::Surface(err)) => {
                info!("Surface unavailable ({err}); retrying next frame");
            }
            Err(err) => return Err(err.into()),
        }
        self.device.window().request_redraw();
        Ok(())
    }

    fn shutdown(self) {
        let Self {
            mut device,
            renderer,
            ..
        } = self;
        renderer.cleanup(&mut device);
    }
}

struct AppRunner<'a> {
    app: &'a mut ShadowApp,
    last_error: &'a mut Option<anyhow::Error>,
}

impl AppRunner<'_> {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        *self.last_error = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for AppRunner<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !matches!(self.app, ShadowApp::Pending { .. }) {
            return;
        }
        let ShadowApp::Pending {
            scene,
            base_dir,
            config,
        } = std::mem::replace(self.app, ShadowApp::Finished)
        else {
            return;
        };
        match AppState::start(event_loop, scene, &base_dir, config) {
            Ok(state) => {
                state.device.window().request_redraw();
                *self.app = ShadowApp::Running(Box::new(state));
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let ShadowApp::Running(state) = &mut *self.app else {
            return;
        };
        if id != state.device.window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => state.device.resize(size),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    state.handle_key(event_loop, code, event.state);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = state.redraw() {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        CliOptions::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn flags_override_scene_settings() {
        let options = parse(&["scene.xml", "--headless", "--resolution", "512", "--edge-samples", "8"])
            .unwrap();
        assert_eq!(options.scene, Some(PathBuf::from("scene.xml")));
        assert!(options.headless);
        let config = options.apply(ShadowConfig::default()).unwrap();
        assert_eq!(config.resolution, 512);
        assert_eq!(config.filter, ShadowFilter::StochasticEdge { edge_samples: 8 });
    }

    #[test]
    fn pcf_bias_applies_to_pcf() {
        let options = parse(&["--filter", "pcf", "--bias", "0.01", "--frustum", "scene"]).unwrap();
        let config = options.apply(ShadowConfig::default()).unwrap();
        assert_eq!(config.filter, ShadowFilter::Pcf { bias: 0.01 });
        assert_eq!(config.frustum, FrustumFit::Scene { padding: 1.0 });
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse(&["--frames"]).is_err());
        assert!(parse(&["--frames", "many"]).is_err());
        assert!(parse(&["--wat"]).is_err());
        assert!(parse(&["a.xml", "b.xml"]).is_err());
        assert!(parse(&["--filter", "gaussian"]).is_err());
        let options = parse(&["--frustum", "cascaded"]).unwrap();
        assert!(options.apply(ShadowConfig::default()).is_err());
    }
}
