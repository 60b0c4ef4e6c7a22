mod cli;
mod pipeline;
mod run_artifacts;
mod run_context;
mod video;

use anyhow::{Context, Result};
use cli::Args;
use pipeline::detection::OnnxHeatmapDetector;
use pipeline::finalize::{frame_time_for, writer_for, BvhHierarchy};
use pipeline::heatmap::{ArgmaxPeakExtractor, HeatmapAssembler};
use pipeline::orchestrator::{Collaborators, PipelineDriver};
use pipeline::preview::{LogSink, PreviewSink, VisualizationSink};
use pipeline::regressor::OnnxPoseRegressor;
use pipeline::stabilizer::POSE_ROOT;
use run_context::{prepare_output, RunConfig};
use video::opencv_reader::OpencvSource;
use video::CaptureSource;

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    if let Some(dir) = &args.dir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Failed to change directory to {}", dir.display()))?;
    }

    let config = args.into_run_config()?;
    run(config)
}

fn run(config: RunConfig) -> Result<()> {
    let preset = config.preset.spec();

    // Model loading failures are fatal before any frame is grabbed.
    let detector = OnnxHeatmapDetector::new(
        &config.detector_model,
        &preset,
        &config.geometry,
        config.detector_device,
    )?;
    let regressor = OnnxPoseRegressor::new(&config.regressor_model, config.regressor_device)?;

    let source = OpencvSource::open(&config.source, config.capture_size)?;

    let hierarchy = load_hierarchy(&config)?;
    let writer = if config.live {
        None
    } else {
        prepare_output(&config.output_path)?;
        let frame_time = frame_time_for(source.source_fps());
        Some(writer_for(&config.output_path, hierarchy, frame_time)?)
    };

    let assembler = HeatmapAssembler::new(
        config.geometry.heatmap.height as usize,
        config.geometry.heatmap.width as usize,
        config.geometry.heatmap_count,
        Box::new(ArgmaxPeakExtractor),
    );

    let parts = Collaborators {
        source: Box::new(source),
        detector: Box::new(detector),
        assembler,
        regressor: Box::new(regressor),
        sink: open_sink(config.visualize),
        writer,
    };

    let outcome = PipelineDriver::new(&config, parts).run()?;

    if config.write_summary && !config.live {
        let path = outcome.summary.save()?;
        tracing::info!("Run summary saved to {}", path.display());
    }

    if !outcome.summary.output_written {
        anyhow::bail!(
            "Motion output {} was not written",
            config.output_path.display()
        );
    }

    Ok(())
}

/// Reads the BVH header and checks the root channels line up with the pose
/// layout. A missing header is only an error when BVH output needs it.
fn load_hierarchy(config: &RunConfig) -> Result<Option<BvhHierarchy>> {
    if !config.bvh_header.exists() {
        tracing::debug!("No BVH header at {}", config.bvh_header.display());
        return Ok(None);
    }

    let hierarchy = BvhHierarchy::load(&config.bvh_header)?;
    if !hierarchy.matches_root(&POSE_ROOT) {
        tracing::warn!(
            "Root channels in {} do not match the pose layout, forced view and BVH output may be wrong",
            config.bvh_header.display()
        );
    }
    tracing::info!(
        "Loaded BVH hierarchy with {} channels",
        hierarchy.channel_count()
    );
    Ok(Some(hierarchy))
}

fn open_sink(visualize: bool) -> Box<dyn VisualizationSink> {
    if !visualize {
        return Box::new(LogSink);
    }
    match PreviewSink::open() {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            tracing::warn!("Failed to open preview window: {}. Running headless.", e);
            Box::new(LogSink)
        }
    }
}
