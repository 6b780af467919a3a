use punchguard::{
    backend::HttpBackend,
    biometrics::{Biometrics, ModelLoader, ModelRegistry},
    camera::{SharedCamera, StillImageCamera},
    cli::{self, StdinLines, TerminalInteraction},
    common::{Config, DevMode},
    core::classifier::ClassifiedError,
    core::quality,
    flow::{enrollment, Direction, Enroller, PunchOrchestrator, PunchRequest, PunchServices},
    location::{Coordinates, FixedLocation, LocationProvider, NoLocation},
    storage::{CaptureArchive, ProfileStore},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "punchguard")]
#[command(about = "Attendance punch authorization with face verification")]
struct Cli {
    /// Enable development mode (local profiles, saved captures)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file (default: ./configs/punchguard.toml, then /etc/punchguard)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Replay image files from this directory instead of a camera
    #[arg(long, global = true)]
    frames: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Punch in or out
    Punch {
        #[arg(value_enum)]
        direction: Direction,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        /// User id (default: $USER)
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Enroll a face from an image or the camera
    Enroll {
        #[arg(short, long)]
        user: String,
        #[arg(long, conflicts_with = "camera", required_unless_present = "camera")]
        image: Option<PathBuf>,
        #[arg(long)]
        camera: bool,
    },
    /// Show today's attendance
    Status,
    /// Classify a failure message and print its remediation
    Classify { message: String },
    /// Score the face in an image
    CheckQuality {
        #[arg(long)]
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let dev_mode = DevMode::new(cli.dev)?;
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Punch { direction, lat, lon, user } => {
            let user = match user {
                Some(user) => user,
                None => std::env::var("USER").context("No --user given and $USER is not set")?,
            };
            let location = location_provider(&config, lat.zip(lon));
            let backend = Arc::new(HttpBackend::new(&config.api)?);
            let profiles: Arc<dyn punchguard::backend::ProfileApi> = if dev_mode.is_enabled() {
                Arc::new(ProfileStore::new_with_dev_mode(&dev_mode)?)
            } else {
                backend.clone()
            };

            let services = PunchServices {
                attendance: backend.clone(),
                leaves: backend,
                profiles,
                location,
                camera: camera(&config, cli.frames.as_deref())?,
            };
            let orchestrator = PunchOrchestrator::new(services, biometrics(&config, cli.dev), config, user)
                .with_archive(CaptureArchive::new(dev_mode.clone()));

            let interaction = TerminalInteraction::new(StdinLines::spawn());
            let outcome = orchestrator.punch(PunchRequest::new(direction), &interaction).await?;
            cli::print_outcome(&outcome);
        }
        Commands::Enroll { user, image, camera: use_camera } => {
            let store = ProfileStore::new_with_dev_mode(&dev_mode)?;
            let enroller = Enroller::new(biometrics(&config, cli.dev), config.clone())
                .with_archive(CaptureArchive::new(dev_mode.clone()));

            let enrollment = match image {
                Some(path) if !use_camera => enroller.enroll(enrollment::load_still(&path)?).await?,
                _ => {
                    println!("Look at the camera...");
                    let camera = camera(&config, cli.frames.as_deref())?;
                    enroller.capture_from_camera(camera.as_ref()).await?
                }
            };

            store.save_enrollment(&user, &enrollment.descriptor, &enrollment.cropped_image)?;

            println!("Enrolled {} ({}% quality)", user, enrollment.quality.overall_score);
        }
        Commands::Status => {
            let backend = HttpBackend::new(&config.api)?;
            match punchguard::backend::AttendanceApi::today_status(&backend).await {
                Ok(status) => {
                    println!("Date:      {}", status.date.map(|d| d.to_string()).unwrap_or_else(|| "-".into()));
                    println!("Punch in:  {}", status.punch_in.as_deref().unwrap_or("-"));
                    println!("Punch out: {}", status.punch_out.as_deref().unwrap_or("-"));
                    if let Some(state) = &status.status {
                        println!("Status:    {}", state);
                    }
                    if status.is_wfh {
                        println!("Working from home");
                    }
                }
                Err(e) => cli::print_remediation(&ClassifiedError::from_error(&e)),
            }
        }
        Commands::Classify { message } => {
            let classified = ClassifiedError::from_message(message);
            println!("Category: {:?}", classified.category);
            cli::print_remediation(&classified);
        }
        Commands::CheckQuality { image } => {
            let frame = enrollment::load_still(&image)?;
            let embedder = biometrics(&config, cli.dev).acquire().await?;
            let detection = embedder.detect_face(frame.clone()).await?;
            let report = quality::score(detection.as_ref(), frame.width(), frame.height());

            cli::print_quality(&report);
            println!(
                "Enrollment eligible: {} (need {})",
                report.meets_minimum(config.enrollment.min_quality),
                config.enrollment.min_quality
            );
            println!(
                "Live capture eligible: {} (need {})",
                report.meets_minimum(config.capture.live_min_quality),
                config.capture.live_min_quality
            );
        }
    }

    ModelRegistry::global().shutdown().await;
    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}

fn location_provider(config: &Config, manual: Option<(f64, f64)>) -> Arc<dyn LocationProvider> {
    match manual {
        Some((latitude, longitude)) => Arc::new(FixedLocation(Coordinates { latitude, longitude })),
        None => match FixedLocation::from_config(&config.location) {
            Some(fixed) => Arc::new(fixed),
            None => Arc::new(NoLocation),
        },
    }
}

fn camera(config: &Config, frames: Option<&Path>) -> Result<SharedCamera> {
    if let Some(dir) = frames {
        return Ok(Arc::new(StillImageCamera::from_dir(dir)?));
    }

    #[cfg(feature = "v4l-camera")]
    {
        Ok(Arc::new(punchguard::camera::V4lCamera::new(
            config.camera.device_index,
            config.camera.warmup_frames,
        )))
    }

    #[cfg(not(feature = "v4l-camera"))]
    {
        let _ = config;
        Ok(Arc::new(StillImageCamera::failing(punchguard::common::CameraError::Unavailable(
            "no camera backend built in; pass --frames DIR".to_string(),
        ))))
    }
}

fn biometrics(config: &Config, dev: bool) -> Biometrics {
    let models_base = if dev {
        PathBuf::from(".")
    } else {
        punchguard::common::system_models_dir()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    };

    #[cfg(feature = "onnx")]
    let loader: Arc<dyn ModelLoader> = Arc::new(punchguard::biometrics::onnx::OnnxModelLoader::new(
        config.clone(),
        models_base,
    ));

    #[cfg(not(feature = "onnx"))]
    let loader: Arc<dyn ModelLoader> = {
        let _ = (config, models_base);
        Arc::new(punchguard::biometrics::NoModels)
    };

    Biometrics::new(ModelRegistry::global(), loader)
}
