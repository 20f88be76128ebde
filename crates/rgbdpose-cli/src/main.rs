//! rgbdpose CLI — live or recorded RGB-D object pose demo.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use rgbdpose::{
    run_display_loop, CameraSession, FrameSink, FrameSource, ImageDirSink, LoopOptions,
    ModelPaths, NullSink, ObjectCatalog, PipelineConfig, PosePipeline, SequenceSource,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "rgbdpose")]
#[command(about = "Segment, estimate and overlay 6-DoF object poses on RGB-D streams")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pose pipeline on a camera or a recorded sequence.
    Run(CliRunArgs),

    /// List the object classes of a classes.txt file.
    Classes {
        /// Path to classes.txt (one object name per line).
        #[arg(long)]
        classes: PathBuf,
    },

    /// Print the default pipeline configuration as JSON.
    DefaultConfig,

    /// Record color+depth frames from a live device into a sequence directory.
    #[cfg(feature = "opencv")]
    Record {
        /// OpenNI2 device index.
        #[arg(long, default_value = "0")]
        device: i32,

        /// Output sequence directory.
        #[arg(long)]
        out: PathBuf,

        /// Number of frames to record.
        #[arg(long, default_value = "300")]
        frames: u64,
    },
}

#[derive(Debug, Clone, Args)]
struct CliRunArgs {
    /// Recorded sequence directory (camera.json, color/, depth/).
    #[arg(long)]
    sequence: Option<PathBuf>,

    /// OpenNI2 device index for live capture.
    #[cfg(feature = "opencv")]
    #[arg(long, conflicts_with = "sequence")]
    device: Option<i32>,

    /// Segmentation network (ONNX).
    #[arg(long)]
    segmenter: PathBuf,

    /// Pose estimator network (ONNX).
    #[arg(long)]
    estimator: PathBuf,

    /// Pose refiner network (ONNX).
    #[arg(long)]
    refiner: PathBuf,

    /// Target object model point cloud (.xyz).
    #[arg(long)]
    model_points: PathBuf,

    /// Object class list (classes.txt).
    #[arg(long)]
    classes: PathBuf,

    /// Pipeline configuration (JSON). Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target object, matched by substring (e.g. "mug").
    #[arg(long)]
    target: Option<String>,

    /// Points sampled per object.
    #[arg(long)]
    num_points: Option<usize>,

    /// Refinement iterations.
    #[arg(long)]
    refine_iterations: Option<usize>,

    /// Seed for point sampling and the class palette.
    #[arg(long)]
    seed: Option<u64>,

    /// Grey out pixels beyond the clipping distance.
    #[arg(long)]
    remove_background: bool,

    /// Write display frames as PNGs into this directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Show frames in a window (q or ESC quits).
    #[cfg(feature = "opencv")]
    #[arg(long)]
    window: bool,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Write per-frame detection and pose records (JSON lines).
    #[arg(long)]
    poses: Option<PathBuf>,
}

impl CliRunArgs {
    fn build_config(&self) -> CliResult<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path).map_err(|e| -> CliError {
                format!("Failed to load config {}: {}", path.display(), e).into()
            })?,
            None => PipelineConfig::default(),
        };
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(n) = self.num_points {
            config.sampler.num_points = n;
        }
        if let Some(n) = self.refine_iterations {
            config.refine_iterations = n;
        }
        if let Some(seed) = self.seed {
            config.sampler.seed = Some(seed);
            config.overlay.palette_seed = Some(seed);
        }
        if self.remove_background {
            config.overlay.remove_background = true;
        }
        config.validate()?;
        Ok(config)
    }

    fn open_source(&self) -> CliResult<Box<dyn FrameSource>> {
        if let Some(device) = self.open_device()? {
            return Ok(device);
        }
        match &self.sequence {
            Some(dir) => Ok(Box::new(SequenceSource::open(dir).map_err(|e| -> CliError {
                format!("Failed to open sequence {}: {}", dir.display(), e).into()
            })?)),
            None => Err("no input: pass --sequence <dir> (or --device with the opencv feature)"
                .into()),
        }
    }

    #[cfg(feature = "opencv")]
    fn open_device(&self) -> CliResult<Option<Box<dyn FrameSource>>> {
        match self.device {
            Some(index) => Ok(Some(Box::new(rgbdpose::OpenNiSource::open(index)?))),
            None => Ok(None),
        }
    }

    #[cfg(not(feature = "opencv"))]
    fn open_device(&self) -> CliResult<Option<Box<dyn FrameSource>>> {
        Ok(None)
    }

    fn open_sink(&self) -> CliResult<Box<dyn FrameSink>> {
        if let Some(window) = self.open_window()? {
            return Ok(window);
        }
        match &self.out_dir {
            Some(dir) => Ok(Box::new(ImageDirSink::create(dir)?)),
            None => {
                tracing::warn!("no display sink selected; frames are processed but not shown");
                Ok(Box::new(NullSink))
            }
        }
    }

    #[cfg(feature = "opencv")]
    fn open_window(&self) -> CliResult<Option<Box<dyn FrameSink>>> {
        if self.window {
            Ok(Some(Box::new(rgbdpose::HighGuiSink::open("rgbdpose")?)))
        } else {
            Ok(None)
        }
    }

    #[cfg(not(feature = "opencv"))]
    fn open_window(&self) -> CliResult<Option<Box<dyn FrameSink>>> {
        Ok(None)
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_pipeline(&args),
        Commands::Classes { classes } => run_classes(&classes),
        Commands::DefaultConfig => run_default_config(),
        #[cfg(feature = "opencv")]
        Commands::Record {
            device,
            out,
            frames,
        } => run_record(device, &out, frames),
    }
}

// ── classes ───────────────────────────────────────────────────────────

fn run_classes(path: &std::path::Path) -> CliResult<()> {
    let catalog = ObjectCatalog::from_classes_file(path)?;
    println!("{} object classes (0 = background)", catalog.num_objects());
    for (id, name) in catalog.objects() {
        println!("  {:>3}  {}", id, name);
    }
    Ok(())
}

// ── default-config ────────────────────────────────────────────────────

fn run_default_config() -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
    Ok(())
}

// ── record ────────────────────────────────────────────────────────────

#[cfg(feature = "opencv")]
fn run_record(device: i32, out: &std::path::Path, frames: u64) -> CliResult<()> {
    let mut source = rgbdpose::OpenNiSource::open(device)?;
    let mut writer = rgbdpose::SequenceWriter::create(out, source.stream_info())?;
    while writer.frames_written() < frames {
        let Some(frame) = source.next_frame()? else {
            break;
        };
        writer.write(&frame.color, &frame.depth)?;
    }
    source.stop();
    tracing::info!(
        "Recorded {} frames to {}",
        writer.frames_written(),
        out.display()
    );
    Ok(())
}

// ── run ───────────────────────────────────────────────────────────────

fn run_pipeline(args: &CliRunArgs) -> CliResult<()> {
    let config = args.build_config()?;
    let catalog = ObjectCatalog::from_classes_file(&args.classes).map_err(|e| -> CliError {
        format!("Failed to read classes {}: {}", args.classes.display(), e).into()
    })?;
    tracing::info!("Loaded {} object classes", catalog.num_objects());

    let paths = ModelPaths {
        segmenter: args.segmenter.clone(),
        estimator: args.estimator.clone(),
        refiner: args.refiner.clone(),
        model_points: args.model_points.clone(),
    };
    let mut pipeline = PosePipeline::from_models(config, catalog, &paths)?;

    let mut session = CameraSession::open(args.open_source()?)?;
    let intr = session.intrinsics();
    tracing::info!(
        "Stream {}x{}, fx={:.1} fy={:.1}, depth scale {} m",
        intr.width,
        intr.height,
        intr.fx,
        intr.fy,
        session.depth_scale()
    );

    let mut sink = args.open_sink()?;
    let opts = LoopOptions {
        max_frames: args.max_frames,
        records: args.poses.clone(),
    };
    let summary = run_display_loop(&mut session, &mut pipeline, sink.as_mut(), &opts)?;

    tracing::info!(
        "Processed {} frames ({} with pose, {} failed)",
        summary.frames,
        summary.frames_with_pose,
        summary.frames_failed
    );
    if let Some(path) = &args.poses {
        tracing::info!("Pose records written to {}", path.display());
    }
    Ok(())
}
