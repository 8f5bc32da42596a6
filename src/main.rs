use anyhow::{Context, Result};
use detect::{BlazePose, Mode};
#[cfg(not(feature = "gui"))]
use indicatif::{ProgressBar, ProgressStyle};
use render::{Overlay, Surface};
use source::{Camera, FrameSource, Prefetch, VideoFile};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use structopt::StructOpt;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;

mod angle;
mod classify;
mod detect;
mod error;
mod frame_loop;
mod landmark;
mod render;
mod source;
mod tflite;
mod tflite_sys;

const WINDOW_NAME: &str = "yoga-pose";
#[cfg(feature = "gui")]
const IMAGE_WAIT_KEY_MS: i32 = 50;

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(flatten)]
    model: ModelOpt,

    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(structopt::StructOpt)]
struct ModelOpt {
    /// Path to a MediaPipe pose landmark model in TensorFlow Lite format.
    #[structopt(short, long, parse(from_os_str))]
    model: PathBuf,

    /// Number of threads the interpreter may use.
    #[structopt(short = "-j", long, default_value = "1")]
    num_threads: usize,
}

impl ModelOpt {
    fn load(&self, mode: Mode, min_detection_confidence: f32) -> Result<BlazePose> {
        BlazePose::new(&self.model, mode, min_detection_confidence, self.num_threads)
            .with_context(|| format!("failed loading {}", self.model.display()))
    }
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Classify the pose in each of a set of still images.
    Image(ImageOpt),
    /// Classify poses frame by frame from a camera or a video file.
    Video(VideoOpt),
}

#[derive(structopt::StructOpt)]
struct ImageOpt {
    #[structopt(required = true, parse(from_os_str))]
    paths: Vec<PathBuf>,

    /// Directory to write annotated images to.
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Minimum person presence score for a detection to count.
    #[structopt(short = "-c", long, default_value = "0.3")]
    min_detection_confidence: f32,
}

#[derive(structopt::StructOpt)]
struct VideoOpt {
    /// A capture device index: /dev/videoDEVICE. Defaults to 0.
    #[structopt(short, long)]
    device: Option<i32>,

    /// Read frames from a video file instead of a camera.
    #[structopt(short, long, parse(from_os_str), conflicts_with = "device")]
    file: Option<PathBuf>,

    /// The width to request from the camera.
    #[structopt(long, default_value = "1280")]
    frame_width: u16,

    /// The height to request from the camera.
    #[structopt(long, default_value = "960")]
    frame_height: u16,

    /// Frames are scaled to this height, keeping their aspect ratio.
    #[structopt(short = "-H", long, default_value = "640")]
    output_height: i32,

    /// Minimum person presence score for a detection to count.
    #[structopt(short = "-c", long, default_value = "0.5")]
    min_detection_confidence: f32,

    #[structopt(short = "-W", long, default_value = "1")]
    wait_key_ms: i32,

    /// Read frames ahead on a separate thread, buffering at most this many.
    #[structopt(short, long)]
    prefetch: Option<usize>,

    #[structopt(short, long)]
    show_progress: bool,

    /// Only draw landmarks, without classifying the pose.
    #[structopt(long)]
    landmarks_only: bool,
}

fn prefetched<S>(source: S, depth: Option<usize>) -> Box<dyn FrameSource>
where
    S: FrameSource + Send + 'static,
{
    match depth {
        Some(depth) if depth > 0 => Box::new(Prefetch::spawn(source, depth)),
        _ => Box::new(source),
    }
}

#[cfg(feature = "gui")]
fn video_surface(opt: &VideoOpt, running: Arc<AtomicBool>) -> Result<Box<dyn Surface>> {
    if opt.show_progress {
        debug!("progress spinner is not shown alongside a window");
    }
    Ok(Box::new(
        render::Window::open(WINDOW_NAME, opt.wait_key_ms, running)
            .context("failed opening window")?,
    ))
}

#[cfg(not(feature = "gui"))]
fn video_surface(opt: &VideoOpt, running: Arc<AtomicBool>) -> Result<Box<dyn Surface>> {
    debug!(
        wait_key_ms = opt.wait_key_ms,
        "no window to poll for keys, press Ctrl-C to stop"
    );
    let progress = if opt.show_progress {
        Some(
            ProgressBar::new_spinner().with_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                    .template("{prefix:.bold.dim} {spinner} {wide_msg}"),
            ),
        )
    } else {
        None
    };
    Ok(Box::new(render::Headless::new(running, progress)))
}

fn run_video(model: &ModelOpt, video: &VideoOpt, running: Arc<AtomicBool>) -> Result<()> {
    let mut source = match video.file.as_ref() {
        Some(path) => prefetched(
            VideoFile::open(path).with_context(|| format!("failed opening {}", path.display()))?,
            video.prefetch,
        ),
        None => prefetched(
            Camera::open(
                video.device.unwrap_or(0),
                Some(video.frame_width),
                Some(video.frame_height),
            )
            .context("failed opening camera")?,
            video.prefetch,
        ),
    };

    let mut detector = model.load(Mode::Video, video.min_detection_confidence)?;

    let mut surface = video_surface(video, running)?;

    let summary = frame_loop::run(
        &mut *source,
        &mut detector,
        &mut *surface,
        frame_loop::Settings {
            output_height: video.output_height,
            classify: !video.landmarks_only,
        },
    )
    .context("frame loop failed")?;

    info!(
        message = "done",
        frames = summary.frames,
        detections = summary.detections,
        skipped = summary.skipped,
        mean_inference = ?detector.timing.mean_inference(),
    );
    Ok(())
}

fn annotated_path(output: &Path, image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map_or_else(|| "image".into(), |stem| stem.to_string_lossy());
    output.join(format!("{}.annotated.png", stem))
}

fn run_images(model: &ModelOpt, images: &ImageOpt, running: Arc<AtomicBool>) -> Result<()> {
    let mut detector = model.load(Mode::Static, images.min_detection_confidence)?;

    if let Some(output) = images.output.as_ref() {
        std::fs::create_dir_all(output)
            .with_context(|| format!("failed creating {}", output.display()))?;
    }

    #[cfg(feature = "gui")]
    let mut window = render::Window::open(WINDOW_NAME, IMAGE_WAIT_KEY_MS, running.clone())
        .context("failed opening window")?;

    for path in images.paths.iter() {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let mut frame = source::read_image(path)?;
        let outcome = frame_loop::process_frame(&mut frame, &mut detector, true)
            .with_context(|| format!("failed processing {}", path.display()))?;

        if let Some(landmarks) = outcome.landmarks.as_ref() {
            for (index, landmark) in landmarks.iter().take(2).enumerate() {
                debug!(
                    kind = ?landmark::LandmarkKind::from_idx(index)?,
                    x = landmark.x,
                    y = landmark.y,
                    z = landmark.z,
                    visibility = landmark.visibility,
                );
            }
        }

        let overlay = Overlay {
            label: outcome.label,
            frames_per_second: None,
        };
        render::draw_overlay(&mut frame, &overlay)?;
        info!(path = %path.display(), pose = %overlay);

        if let Some(output) = images.output.as_ref() {
            let annotated = annotated_path(output, path);
            render::write_image(&annotated, &frame)?;
            debug!(annotated = %annotated.display(), "wrote annotated image");
        }

        #[cfg(feature = "gui")]
        window.show_until_key(&frame)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let Opt {
        model,
        log_level,
        command,
    } = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(log_level),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrl_c = running.clone();

    ctrlc::set_handler(move || {
        running_ctrl_c.store(false, Ordering::SeqCst);
    })
    .context("failed setting Ctrl-C handler")?;

    match command {
        Command::Image(images) => run_images(&model, &images, running),
        Command::Video(video) => run_video(&model, &video, running),
    }
}
