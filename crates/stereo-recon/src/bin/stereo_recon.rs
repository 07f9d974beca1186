use clap::{Args, Parser, Subcommand};
use log::{info, warn, LevelFilter};
use std::error::Error;
use std::path::{Path, PathBuf};
use stereo_recon::{calib, cloud, io, pipeline, PipelineConfig};

/// Stereo rig calibration and reconstruction from side-by-side captures.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Common {
    /// JSON pipeline configuration. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug messages.
    #[arg(short, long)]
    verbose: bool,

    /// Emit structured JSON logs (requires the `tracing` feature).
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Calibrate the rig from a directory of checkerboard captures.
    Calibrate {
        /// Directory with *.jpg, *.jpeg or *.png side-by-side captures.
        dir: PathBuf,
        /// Calibration JSON to write.
        out: PathBuf,
        #[command(flatten)]
        common: Common,
    },
    /// Rectify one capture and write both halves side by side.
    Rectify {
        image: PathBuf,
        calibration: PathBuf,
        out: PathBuf,
        #[command(flatten)]
        common: Common,
    },
    /// Dense block matching and triangulation of one capture.
    Dense {
        image: PathBuf,
        calibration: PathBuf,
        out: PathBuf,
        /// Also write the normalised disparity image here.
        #[arg(long)]
        disparity: Option<PathBuf>,
        #[command(flatten)]
        common: Common,
    },
    /// Sparse keypoint matching and triangulation of one capture.
    Sparse {
        image: PathBuf,
        calibration: PathBuf,
        out: PathBuf,
        #[command(flatten)]
        common: Common,
    },
}

impl Command {
    fn common(&self) -> &Common {
        match self {
            Command::Calibrate { common, .. }
            | Command::Rectify { common, .. }
            | Command::Dense { common, .. }
            | Command::Sparse { common, .. } => common,
        }
    }
}

fn init_logging(common: &Common) {
    let level = if common.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    #[cfg(feature = "tracing")]
    {
        // Bridge `log` records before the subscriber is installed.
        let _ = tracing_log::LogTracer::builder()
            .with_max_level(level)
            .init();
        stereo_recon::core::init_tracing(level, common.json_logs);
    }

    #[cfg(not(feature = "tracing"))]
    {
        let _ = stereo_recon::core::init_with_level(level);
        if common.json_logs {
            warn!("--json-logs needs the `tracing` feature; using plain logs");
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn Error>> {
    Ok(match path {
        Some(path) => PipelineConfig::load_json(path)?,
        None => PipelineConfig::default(),
    })
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let common = cli.command.common();
    init_logging(common);
    let config = load_config(common.config.as_deref())?;

    match &cli.command {
        Command::Calibrate { dir, out, .. } => {
            let paths = io::list_images(dir)?;
            info!("{} calibration images in {}", paths.len(), dir.display());
            let mut images = Vec::with_capacity(paths.len());
            for path in &paths {
                match io::load_gray(path) {
                    Ok(img) => images.push(img),
                    Err(err) => warn!("skipping unreadable calibration image: {err}"),
                }
            }
            let calibration = pipeline::calibrate_images(&images, &config)?;
            calib::save_calibration(out, &calibration.result)?;
            info!(
                "rms {:.4}px after {} evaluations, written to {}",
                calibration.report.final_rms(),
                calibration.report.iterations,
                out.display()
            );
        }
        Command::Rectify {
            image,
            calibration,
            out,
            ..
        } => {
            let calib = calib::load_calibration(calibration)?;
            let capture = io::load_gray(image)?;
            let joined = pipeline::rectify_side_by_side(&capture, &calib, &config)?;
            io::save_gray(out, &joined)?;
        }
        Command::Dense {
            image,
            calibration,
            out,
            disparity,
            ..
        } => {
            let calib = calib::load_calibration(calibration)?;
            let capture = io::load_gray(image)?;
            let dense = pipeline::reconstruct_dense(&capture, &calib, &config)?;
            if let Some(path) = disparity {
                io::save_gray(path, &dense.disparity.to_gray())?;
            }
            let n = cloud::write_points(out, dense.points, config.point_format)?;
            info!("{} points written to {}", n, out.display());
        }
        Command::Sparse {
            image,
            calibration,
            out,
            ..
        } => {
            let calib = calib::load_calibration(calibration)?;
            let capture = io::load_gray(image)?;
            let sparse = pipeline::reconstruct_sparse(&capture, &calib, &config)?;
            let n = cloud::write_points(out, sparse.points, config.point_format)?;
            info!(
                "{} kept, {} discarded matches; {} points written to {}",
                sparse.correspondences.kept.len(),
                sparse.correspondences.discarded.len(),
                n,
                out.display()
            );
        }
    }
    Ok(())
}
