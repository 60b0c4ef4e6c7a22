use crate::pipeline::skeleton::COCO_MIN_JOINTS;
use crate::pipeline::types::{Controls, FrameSize};
use crate::run_context::{
    ComputeDevice, DetectorGeometry, DetectorPreset, RunConfig, SourceSpec,
    DEFAULT_MAX_SKIPPED_FRAMES,
};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera index, video file or stream URL
    #[arg(long, default_value = "0", env = "DEEPJOINT_FROM")]
    pub from: String,

    /// Requested capture width (cameras only)
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Requested capture height (cameras only)
    #[arg(long, requires = "width")]
    pub height: Option<u32>,

    /// Working directory to switch to before resolving any path
    #[arg(long, env = "DEEPJOINT_DIR")]
    pub dir: Option<PathBuf>,

    /// 2D detector preset
    #[arg(long, value_enum, default_value = "forth", env = "DEEPJOINT_PRESET")]
    pub preset: DetectorPreset,

    /// Override the preset's 2D model file
    #[arg(long = "2d-model", env = "DEEPJOINT_2D_MODEL")]
    pub detector_model: Option<PathBuf>,

    /// 3D pose regressor model file
    #[arg(
        long = "3d-model",
        default_value = "combinedModel/mocapnet.onnx",
        env = "DEEPJOINT_3D_MODEL"
    )]
    pub regressor_model: PathBuf,

    /// Detector input size, WIDTHxHEIGHT
    #[arg(long, default_value = "368x368", value_parser = parse_size)]
    pub input_size: FrameSize,

    /// Heatmap grid size, COLSxROWS
    #[arg(long, default_value = "46x46", value_parser = parse_size)]
    pub heatmap_size: FrameSize,

    /// Number of heatmaps the detector emits
    #[arg(long, default_value_t = 19)]
    pub heatmap_count: usize,

    /// Motion output file (.bvh or .csv)
    #[arg(short, long, default_value = "out.bvh", env = "DEEPJOINT_OUTPUT")]
    pub output: PathBuf,

    /// BVH hierarchy used as the output header
    #[arg(long, default_value = "dataset/header.bvh", env = "DEEPJOINT_BVH_HEADER")]
    pub bvh_header: PathBuf,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<usize>,

    /// Run without a frame limit and without recording
    #[arg(long)]
    pub live: bool,

    /// Always give the detector the whole frame
    #[arg(long)]
    pub no_crop: bool,

    /// Use the largest crop window that fits the frame
    #[arg(long)]
    pub maximize_crop: bool,

    /// Failed grabs tolerated before giving up on the source
    #[arg(long, default_value_t = DEFAULT_MAX_SKIPPED_FRAMES, env = "DEEPJOINT_MAX_SKIPPED_FRAMES")]
    pub max_skipped_frames: usize,

    /// Run both estimators on the CPU
    #[arg(long, conflicts_with = "gpu")]
    pub cpu: bool,

    /// Run both estimators on the GPU
    #[arg(long)]
    pub gpu: bool,

    #[arg(long, value_enum, default_value = "gpu")]
    pub detector_device: ComputeDevice,

    #[arg(long, value_enum, default_value = "cpu")]
    pub regressor_device: ComputeDevice,

    /// Show the pose as estimated instead of from a fixed viewpoint
    #[arg(long)]
    pub unconstrained: bool,

    /// Extra viewing distance for the fixed viewpoint
    #[arg(long, default_value_t = 0.0)]
    pub distance: f32,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub yaw: f32,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub pitch: f32,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub roll: f32,

    /// Weight of the previous pose when smoothing, 0 disables it
    #[arg(long, default_value_t = 0.3, env = "DEEPJOINT_SMOOTHING")]
    pub smoothing: f32,

    /// Headless run, per-frame diagnostics go to the log
    #[arg(long)]
    pub no_visualization: bool,

    /// Write `<output>.summary.json` (default)
    #[arg(long, overrides_with = "no_summary")]
    pub summary: bool,

    #[arg(long, overrides_with = "summary")]
    pub no_summary: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validates the arguments into the configuration the loop runs on.
    pub fn into_run_config(self) -> Result<RunConfig> {
        if !(0.0..=1.0).contains(&self.smoothing) {
            anyhow::bail!("--smoothing must be within [0, 1], got {}", self.smoothing);
        }
        if self.input_size.is_empty() || self.heatmap_size.is_empty() {
            anyhow::bail!("Detector input and heatmap sizes must be non-zero");
        }
        if self.heatmap_count < COCO_MIN_JOINTS {
            anyhow::bail!(
                "--heatmap-count {} is too small, the skeleton needs {} joints",
                self.heatmap_count,
                COCO_MIN_JOINTS
            );
        }
        if self.frames == Some(0) {
            anyhow::bail!("--frames must be at least 1");
        }
        if self.live && self.frames.is_some() {
            tracing::warn!("--frames is ignored in live mode");
        }

        let (detector_device, regressor_device) = if self.cpu {
            (ComputeDevice::Cpu, ComputeDevice::Cpu)
        } else if self.gpu {
            (ComputeDevice::Gpu, ComputeDevice::Gpu)
        } else {
            (self.detector_device, self.regressor_device)
        };

        let preset = self.preset.spec();
        let capture_size = match (self.width, self.height) {
            (Some(w), Some(h)) => Some(FrameSize::new(w, h)),
            _ => None,
        };

        Ok(RunConfig {
            source: SourceSpec::parse(&self.from),
            capture_size,
            preset: self.preset,
            detector_model: self
                .detector_model
                .unwrap_or_else(|| PathBuf::from(preset.model_path)),
            regressor_model: self.regressor_model,
            detector_device,
            regressor_device,
            geometry: DetectorGeometry {
                input: self.input_size,
                heatmap: self.heatmap_size,
                heatmap_count: self.heatmap_count,
            },
            sensitivity: preset.sensitivity,
            output_path: self.output,
            bvh_header: self.bvh_header,
            frame_limit: self.frames,
            live: self.live,
            max_skipped_frames: self.max_skipped_frames,
            visualize: !self.no_visualization,
            write_summary: !self.no_summary,
            controls: Controls {
                crop_enabled: !self.no_crop,
                maximize_crop: self.maximize_crop,
                smoothing: self.smoothing,
                constrain_view: !self.unconstrained,
                distance: self.distance,
                yaw: self.yaw,
                pitch: self.pitch,
                roll: self.roll,
            },
        })
    }
}

fn parse_size(raw: &str) -> Result<FrameSize, String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", raw))?;
    let w = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
    let h = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
    Ok(FrameSize::new(w, h))
}
