pub mod opencv_reader;

use anyhow::Result;
use opencv::core::Mat;

/// A stream of BGR frames: a camera, a video file or a network stream.
pub trait CaptureSource {
    /// Grabs the next frame. Any failure, including an empty frame, is an
    /// acquisition failure the caller may skip over.
    fn next_frame(&mut self) -> Result<Mat>;

    /// Total number of frames, when the source knows it.
    fn frame_count(&self) -> Option<usize>;

    fn source_fps(&self) -> Option<f64>;
}
