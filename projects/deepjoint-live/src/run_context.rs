use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::pipeline::types::{Controls, FrameSize};

/// Frame limit used when neither `--frames` nor the source says otherwise.
pub const DEFAULT_FRAME_LIMIT: usize = 5000;

/// Failed grabs tolerated by default. Webcams drop frames in bursts.
pub const DEFAULT_MAX_SKIPPED_FRAMES: usize = 10_000;

/// Where an estimator should run.
#[derive(ValueEnum, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    Gpu,
}

/// The 2D detectors the demo knows how to drive.
#[derive(ValueEnum, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPreset {
    Forth,
    Openpose,
    Vnect,
}

/// Everything a preset pins down about its detector.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetSpec {
    pub model_path: &'static str,
    /// Minimum heatmap peak for a joint to count as detected.
    pub sensitivity: f32,
    /// Number of output tensors the exported graph carries.
    pub output_tensors: usize,
    /// Which of those outputs holds the heatmaps.
    pub heatmap_output: usize,
}

impl DetectorPreset {
    pub fn spec(self) -> PresetSpec {
        match self {
            DetectorPreset::Forth => PresetSpec {
                model_path: "combinedModel/mobnet2_tiny_vnect_sm_1.9k.onnx",
                sensitivity: 0.35,
                output_tensors: 3,
                heatmap_output: 0,
            },
            DetectorPreset::Openpose => PresetSpec {
                model_path: "combinedModel/openpose_model.onnx",
                sensitivity: 0.4,
                output_tensors: 4,
                heatmap_output: 1,
            },
            DetectorPreset::Vnect => PresetSpec {
                model_path: "combinedModel/vnect_sm_pafs_8.1k.onnx",
                sensitivity: 0.20,
                output_tensors: 4,
                heatmap_output: 1,
            },
        }
    }
}

/// Capture source: a device index or a file / stream URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SourceSpec {
    Device(i32),
    Path(String),
}

impl SourceSpec {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i32>() {
            Ok(index) => SourceSpec::Device(index),
            Err(_) => SourceSpec::Path(raw.to_string()),
        }
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Device(i) => write!(f, "device {}", i),
            SourceSpec::Path(p) => write!(f, "{}", p),
        }
    }
}

/// Shape of the detector's input and output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorGeometry {
    pub input: FrameSize,
    pub heatmap: FrameSize,
    pub heatmap_count: usize,
}

impl Default for DetectorGeometry {
    fn default() -> Self {
        Self {
            input: FrameSize::new(368, 368),
            heatmap: FrameSize::new(46, 46),
            heatmap_count: 19,
        }
    }
}

/// Validated run configuration. Built once at startup; the frame loop never
/// looks at command-line tokens.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: SourceSpec,
    pub capture_size: Option<FrameSize>,
    pub preset: DetectorPreset,
    pub detector_model: PathBuf,
    pub regressor_model: PathBuf,
    pub detector_device: ComputeDevice,
    pub regressor_device: ComputeDevice,
    pub geometry: DetectorGeometry,
    pub sensitivity: f32,
    pub output_path: PathBuf,
    pub bvh_header: PathBuf,
    /// Explicit `--frames`; `None` lets the source's frame count decide.
    pub frame_limit: Option<usize>,
    pub live: bool,
    pub max_skipped_frames: usize,
    pub visualize: bool,
    pub write_summary: bool,
    pub controls: Controls,
}

impl RunConfig {
    /// Frames to process before stopping, or `None` for an unbounded live run.
    pub fn effective_frame_limit(&self, source_frames: Option<usize>) -> Option<usize> {
        if self.live {
            return None;
        }
        Some(
            self.frame_limit
                .or(source_frames.filter(|&n| n > 0))
                .unwrap_or(DEFAULT_FRAME_LIMIT),
        )
    }
}

/// Makes sure the directory an output file goes into exists.
pub fn prepare_output(output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config() -> RunConfig {
    RunConfig {
        source: SourceSpec::Device(0),
        capture_size: None,
        preset: DetectorPreset::Forth,
        detector_model: PathBuf::from("detector.onnx"),
        regressor_model: PathBuf::from("regressor.onnx"),
        detector_device: ComputeDevice::Gpu,
        regressor_device: ComputeDevice::Cpu,
        geometry: DetectorGeometry::default(),
        sensitivity: 0.35,
        output_path: PathBuf::from("out.bvh"),
        bvh_header: PathBuf::from("header.bvh"),
        frame_limit: None,
        live: false,
        max_skipped_frames: 10,
        visualize: false,
        write_summary: false,
        controls: Controls::default(),
    }
}
