// Pipeline driver: runs the capture loop
//
// One frame in flight at a time. Each iteration goes acquire, crop, 2D, 3D,
// smooth, record, present, and the loop checks its stop conditions once the
// sink has seen the frame.

use crate::pipeline::crop::{crop_frame, CropController};
use crate::pipeline::detection::JointDetector;
use crate::pipeline::finalize::MotionWriter;
use crate::pipeline::health::{HealthState, StreamHealth};
use crate::pipeline::heatmap::HeatmapAssembler;
use crate::pipeline::preview::VisualizationSink;
use crate::pipeline::regressor::PoseRegressor;
use crate::pipeline::skeleton::{normalize_skeleton, NormalizedSkeleton};
use crate::pipeline::stabilizer::{forced_view, stabilize, POSE_ROOT};
use crate::pipeline::types::{
    BoundingBox, Controls, CropWindow, FrameReport, FrameSize, PoseSequence, PoseVector,
    Skeleton2D, StageTimings,
};
use crate::run_artifacts::{RunSummary, Termination};
use crate::run_context::RunConfig;
use crate::video::CaptureSource;
use anyhow::{anyhow, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use opencv::core::Mat;
use opencv::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Lets code outside the loop ask it to stop after the current frame.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The only state carried from one frame to the next.
#[derive(Debug)]
pub struct LoopState {
    pub bbox: BoundingBox,
    pub previous_pose: Option<PoseVector>,
    pub health: StreamHealth,
}

impl LoopState {
    pub fn new(health: StreamHealth) -> Self {
        Self {
            bbox: BoundingBox::default(),
            previous_pose: None,
            health,
        }
    }
}

/// Everything the driver talks to.
pub struct Collaborators {
    pub source: Box<dyn CaptureSource>,
    pub detector: Box<dyn JointDetector>,
    pub assembler: HeatmapAssembler,
    pub regressor: Box<dyn PoseRegressor>,
    pub sink: Box<dyn VisualizationSink>,
    /// Absent in live mode.
    pub writer: Option<Box<dyn MotionWriter>>,
}

/// What a finished run hands back.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub sequence: PoseSequence,
}

pub struct PipelineDriver {
    parts: Collaborators,
    crop: CropController,
    controls: Controls,
    sensitivity: f32,
    live: bool,
    frame_limit: Option<usize>,
    source_label: String,
    output_path: PathBuf,
    stop: StopHandle,
    progress: ProgressBar,
    state: LoopState,
}

impl PipelineDriver {
    pub fn new(config: &RunConfig, parts: Collaborators) -> Self {
        let total_frames = parts.source.frame_count();
        let frame_limit = config.effective_frame_limit(total_frames);

        let progress = match frame_limit {
            Some(limit) if !config.visualize => new_progress_bar(limit),
            _ => ProgressBar::hidden(),
        };

        Self {
            parts,
            crop: CropController::new(config.geometry.input),
            controls: config.controls.clone(),
            sensitivity: config.sensitivity,
            live: config.live,
            frame_limit,
            source_label: config.source.to_string(),
            output_path: config.output_path.clone(),
            stop: StopHandle::new(),
            progress,
            state: LoopState::new(StreamHealth::new(config.max_skipped_frames, total_frames)),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Replaces the progress bar, e.g. with a hidden one.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(mut self) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let total_frames = self.parts.source.frame_count();
        let mut sequence = PoseSequence::new();
        let mut processed = 0usize;

        tracing::info!(
            "Processing {} (frame limit {}, {})",
            self.source_label,
            self.frame_limit
                .map(|n| n.to_string())
                .unwrap_or_else(|| "none".into()),
            if self.live { "live" } else { "recording" }
        );

        let termination = loop {
            if self.frame_limit.is_some_and(|limit| processed >= limit) {
                break Termination::FrameLimit;
            }

            let frame_start = Instant::now();
            let (frame, frame_size) = match self.acquire() {
                Ok(acquired) => acquired,
                Err(e) => {
                    tracing::debug!("Acquisition error: {:#}", e);
                    if let HealthState::Terminated(reason) = self.state.health.record_failure(processed) {
                        break reason;
                    }
                    continue;
                }
            };
            let acquisition_ms = elapsed_ms(frame_start);

            let report = self.process_frame(
                &frame,
                frame_size,
                processed,
                total_frames,
                frame_start,
                acquisition_ms,
            );

            if !self.live {
                sequence.push(report.recorded.clone());
            }
            processed += 1;
            self.progress.inc(1);

            if let Err(e) = self.parts.sink.frame(&frame) {
                tracing::warn!("Frame {}: visualization failed: {:#}", report.frame_index, e);
            }
            match self.parts.sink.present(&report, &mut self.controls) {
                Ok(true) => self.stop.request_stop(),
                Ok(false) => {}
                Err(e) => tracing::warn!("Frame {}: visualization failed: {:#}", report.frame_index, e),
            }

            if self.stop.is_requested() {
                break Termination::Stopped;
            }
        };

        self.progress.finish_and_clear();

        let skipped = self.state.health.skipped();
        match termination {
            Termination::BudgetExhausted => tracing::error!(
                "Stopped after {} frames: {} skipped frames exceeded the budget",
                processed,
                skipped
            ),
            _ => tracing::info!(
                "Finished after {} frames ({:?}), {} skipped",
                processed,
                termination,
                skipped
            ),
        }

        let mut output_written = self.live;
        if !self.live {
            if let Some(writer) = &self.parts.writer {
                match writer.write(&self.output_path, &sequence) {
                    Ok(()) => {
                        output_written = true;
                        tracing::info!(
                            "Wrote {} frames ({} with a pose) to {}",
                            sequence.len(),
                            sequence.detected_count(),
                            self.output_path.display()
                        );
                    }
                    Err(e) => tracing::error!(
                        "Failed to write {} ({} frames recorded, {} skipped): {:#}",
                        self.output_path.display(),
                        sequence.len(),
                        skipped,
                        e
                    ),
                }
            }
        }

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            source: self.source_label.clone(),
            output_path: self.output_path.clone(),
            processed_frames: processed,
            skipped_frames: skipped,
            recorded_frames: sequence.len(),
            detected_frames: sequence.detected_count(),
            termination,
            output_written,
        };

        Ok(RunOutcome { summary, sequence })
    }

    fn acquire(&mut self) -> Result<(Mat, FrameSize)> {
        let frame = self.parts.source.next_frame()?;
        let size = frame.size()?;
        if size.width <= 0 || size.height <= 0 {
            return Err(anyhow!("Source returned a {}x{} frame", size.width, size.height));
        }
        Ok((frame, FrameSize::new(size.width as u32, size.height as u32)))
    }

    fn process_frame(
        &mut self,
        frame: &Mat,
        frame_size: FrameSize,
        frame_index: usize,
        total_frames: Option<usize>,
        frame_start: Instant,
        acquisition_ms: f64,
    ) -> FrameReport {
        let crop = self
            .crop
            .decide(&mut self.state.bbox, frame_size, &self.controls, frame_index);

        let detector_start = Instant::now();
        let raw_joints = match self.detect(frame, &crop) {
            Ok(joints) => joints,
            Err(e) => {
                tracing::warn!("Frame {}: 2D detection failed: {:#}", frame_index, e);
                Vec::new()
            }
        };
        let detector_ms = elapsed_ms(detector_start);

        let normalized = if raw_joints.is_empty() {
            NormalizedSkeleton::default()
        } else {
            normalize_skeleton(&raw_joints, &crop, frame_size, &mut self.state.bbox)
        };

        let regressor_start = Instant::now();
        let pose = match self.parts.regressor.infer(&normalized.input) {
            Ok(pose) => pose,
            Err(e) => {
                tracing::warn!("Frame {}: 3D regression failed: {:#}", frame_index, e);
                Vec::new()
            }
        };
        let regressor_ms = elapsed_ms(regressor_start);

        let recorded = stabilize(&mut self.state.previous_pose, pose, self.controls.smoothing);
        let display = forced_view(&recorded, &self.controls, &POSE_ROOT);

        FrameReport {
            frame_index,
            skipped_frames: self.state.health.skipped(),
            total_frames,
            frame_limit: self.frame_limit,
            frame_size,
            crop,
            timings: StageTimings {
                acquisition_ms,
                detector_ms,
                regressor_ms,
                total_ms: elapsed_ms(frame_start),
            },
            raw_joints,
            joints: normalized.joints,
            regressor_input: normalized.input,
            recorded,
            display,
        }
    }

    fn detect(&mut self, frame: &Mat, crop: &CropWindow) -> Result<Skeleton2D> {
        let image = crop_frame(frame, crop)?;
        let outputs = self.parts.detector.infer(&image)?;
        Ok(self
            .parts
            .assembler
            .detect_skeleton(&outputs, crop.size(), self.sensitivity))
    }
}

fn new_progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow}, {eta})")
    {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => tracing::debug!("Falling back to the default progress style: {}", e),
    }
    pb
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
