mod preview;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use smile_capture_core::capture::domain::capture_sink::{CaptureFormat, CaptureSink};
use smile_capture_core::capture::infrastructure::image_file_sink::ImageFileSink;
use smile_capture_core::detection::infrastructure::cascade_resolver;
use smile_capture_core::detection::infrastructure::cascade_smile_detector::CascadeSmileDetector;
use smile_capture_core::pipeline::session_controller::{
    RunState, SessionController, SessionEvent, SinkFactory,
};
use smile_capture_core::pipeline::smile_capture_loop::LoopExit;
use smile_capture_core::shared::constants::PREVIEW_SIZE;
use smile_capture_core::shared::settings::Settings;
use smile_capture_core::video::infrastructure::ffmpeg_camera_source::{
    CameraConfig, FfmpegCameraOpener,
};

use preview::PreviewWriter;

/// Watches a camera and saves a photo each time a smile appears.
#[derive(Parser, Debug)]
#[command(name = "smile-capture")]
struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera device, or any file/URL ffmpeg can open.
    #[arg(long)]
    device: Option<String>,

    /// ffmpeg input format (v4l2, avfoundation, dshow). Use "auto" to let
    /// ffmpeg probe, e.g. for video files.
    #[arg(long)]
    input_format: Option<String>,

    /// Directory captured photos are written to.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Capture image format: jpg or png.
    #[arg(long)]
    format: Option<CaptureFormat>,

    /// Minimum smile votes; higher is stricter.
    #[arg(long)]
    smile_confidence: Option<u32>,

    /// Minimum neighbouring face hits for a face to count.
    #[arg(long)]
    face_min_neighbors: Option<u32>,

    /// Requested capture width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Requested capture height in pixels.
    #[arg(long)]
    height: Option<u32>,

    /// Requested frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Directory holding the Haar cascade XML files.
    #[arg(long)]
    cascade_dir: Option<PathBuf>,

    /// Keep this image file updated with the annotated camera view.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Update the preview every Nth frame.
    #[arg(long, default_value = "5")]
    preview_every: usize,

    /// Stop after this many photos have been saved.
    #[arg(long)]
    max_captures: Option<usize>,

    /// Write the effective settings to the settings file and exit.
    #[arg(long)]
    save_settings: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };
    apply_overrides(&cli, &mut settings);
    settings.validate()?;

    if cli.save_settings {
        let path = cli
            .config
            .clone()
            .or_else(Settings::config_path)
            .ok_or("could not determine settings path")?;
        settings.save_to(&path)?;
        log::info!("Settings written to {}", path.display());
        return Ok(());
    }

    let detector = build_detector(&settings)?;
    let opener = FfmpegCameraOpener::new(camera_config(&settings));
    let output_dir = settings.output_directory.clone();
    let format = settings.capture_format;
    let sink_dir = output_dir.clone();
    let sink_factory: SinkFactory = Arc::new(move || -> Box<dyn CaptureSink> {
        Box::new(ImageFileSink::new(sink_dir.clone(), format))
    });

    let mut controller =
        SessionController::new(Box::new(opener), Arc::new(detector), sink_factory, &output_dir);
    let events = controller.events();
    let frames = controller.frames();

    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })?;

    controller.start()?;
    log::info!(
        "Watching {} for smiles; photos go to {} (Ctrl-C to quit)",
        settings.device,
        output_dir.display()
    );

    let mut preview = cli
        .preview
        .clone()
        .map(|path| PreviewWriter::new(path, PREVIEW_SIZE, cli.preview_every));
    let mut saved = 0usize;

    loop {
        crossbeam_channel::select! {
            recv(interrupt_rx) -> _ => {
                log::info!("Interrupted, shutting down");
                break;
            }
            recv(frames) -> frame => {
                if let (Ok(frame), Some(p)) = (frame, preview.as_mut()) {
                    p.offer(&frame);
                }
            }
            recv(events) -> event => {
                let Ok(event) = event else { break };
                match event {
                    SessionEvent::CaptureSaved(id) => {
                        saved += 1;
                        log::info!("SMILE! Photo saved → {id}");
                        if cli.max_captures.is_some_and(|max| saved >= max) {
                            log::info!("Reached {saved} captures, stopping");
                            controller.stop();
                        }
                    }
                    SessionEvent::CaptureFailed(reason) => {
                        log::warn!("Photo not saved: {reason}");
                    }
                    SessionEvent::StateChanged(RunState::Running) => log::info!("Camera running"),
                    SessionEvent::StateChanged(RunState::Stopped) => log::info!("Camera stopped"),
                    SessionEvent::SessionEnded(exit) => {
                        match exit {
                            LoopExit::SourceEnded(reason) => {
                                log::warn!("Camera ended the session: {reason}")
                            }
                            LoopExit::Aborted(reason) => {
                                log::error!("Capture session aborted: {reason}")
                            }
                            LoopExit::StopRequested => {}
                        }
                        break;
                    }
                }
            }
        }
    }

    controller.shutdown();
    log::info!("{saved} photo(s) saved to {}", output_dir.display());
    Ok(())
}

fn apply_overrides(cli: &Cli, settings: &mut Settings) {
    if let Some(device) = &cli.device {
        settings.device = device.clone();
    }
    if let Some(fmt) = &cli.input_format {
        settings.input_format = (fmt != "auto").then(|| fmt.clone());
    }
    if let Some(dir) = &cli.output_dir {
        settings.output_directory = dir.clone();
    }
    if let Some(format) = cli.format {
        settings.capture_format = format;
    }
    if let Some(v) = cli.smile_confidence {
        settings.smile_confidence = v;
    }
    if let Some(v) = cli.face_min_neighbors {
        settings.face_min_neighbors = v;
    }
    if let Some(v) = cli.width {
        settings.capture_width = v;
    }
    if let Some(v) = cli.height {
        settings.capture_height = v;
    }
    if let Some(v) = cli.fps {
        settings.frame_rate = v;
    }
    if let Some(dir) = &cli.cascade_dir {
        settings.cascade_dir = Some(dir.clone());
    }
}

fn camera_config(settings: &Settings) -> CameraConfig {
    CameraConfig {
        device: settings.device.clone(),
        input_format: settings.input_format.clone(),
        width: settings.capture_width,
        height: settings.capture_height,
        frame_rate: settings.frame_rate,
    }
}

fn build_detector(settings: &Settings) -> Result<CascadeSmileDetector, Box<dyn std::error::Error>> {
    let paths = cascade_resolver::resolve_default_cascades(
        settings.cascade_dir.as_deref(),
        Some(download_progress),
    )?;
    log::debug!(
        "Using cascades {} and {}",
        paths.face.display(),
        paths.smile.display()
    );
    Ok(CascadeSmileDetector::from_files(
        &paths.face,
        &paths.smile,
        settings.detection_params(),
    )?)
}

fn download_progress(name: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {name}... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading {name}... {downloaded} bytes");
    }
}
