use super::CaptureSource;
use crate::pipeline::types::FrameSize;
use crate::run_context::SourceSpec;
use anyhow::{anyhow, Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{
        VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
        CAP_PROP_FRAME_WIDTH,
    },
};

/// Capture through OpenCV's videoio: device indices, files and stream URLs.
pub struct OpencvSource {
    capture: VideoCapture,
    fps: Option<f64>,
    total_frames: Option<usize>,
}

impl OpencvSource {
    /// Opens `source`. `capture_size` is requested from devices only; files
    /// keep their native resolution.
    pub fn open(source: &SourceSpec, capture_size: Option<FrameSize>) -> Result<Self> {
        let mut capture = match source {
            SourceSpec::Device(index) => VideoCapture::new(*index, CAP_ANY)
                .with_context(|| format!("Failed to open camera {}", index))?,
            SourceSpec::Path(path) => VideoCapture::from_file(path, CAP_ANY)
                .with_context(|| format!("Failed to open video source '{}'", path))?,
        };

        if !capture.is_opened()? {
            return Err(anyhow!("Could not open input source ({})", source));
        }

        if let (SourceSpec::Device(_), Some(size)) = (source, capture_size) {
            capture.set(CAP_PROP_FRAME_WIDTH, size.width as f64)?;
            capture.set(CAP_PROP_FRAME_HEIGHT, size.height as f64)?;
        }

        let fps = Some(capture.get(CAP_PROP_FPS)?).filter(|f| *f > 0.0);
        // Cameras report 0 or -1 here.
        let raw_count = capture.get(CAP_PROP_FRAME_COUNT)?;
        let total_frames = (raw_count >= 1.0).then_some(raw_count as usize);

        tracing::info!(
            "Opened {}: {}x{}, fps={}, frames={}",
            source,
            capture.get(CAP_PROP_FRAME_WIDTH)?,
            capture.get(CAP_PROP_FRAME_HEIGHT)?,
            fps.map(|f| format!("{:.2}", f)).unwrap_or_else(|| "unknown".into()),
            total_frames
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".into())
        );

        Ok(Self {
            capture,
            fps,
            total_frames,
        })
    }
}

impl CaptureSource for OpencvSource {
    fn next_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Err(anyhow!("Failed to read frame"));
        }
        Ok(frame)
    }

    fn frame_count(&self) -> Option<usize> {
        self.total_frames
    }

    fn source_fps(&self) -> Option<f64> {
        self.fps
    }
}
