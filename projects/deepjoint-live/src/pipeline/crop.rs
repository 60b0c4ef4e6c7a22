use crate::pipeline::geometry::fit_crop_window;
use crate::pipeline::types::{BoundingBox, Controls, CropWindow, FrameSize};
use anyhow::Result;
use opencv::core;
use opencv::prelude::*;

/// Decides the region of each frame the 2D detector gets to see.
///
/// The detector has no memory of earlier frames, so the controller steers it
/// with the subject's last bounding box. The box itself is owned by the
/// pipeline driver and lent to [`CropController::decide`] for one call.
#[derive(Debug, Clone)]
pub struct CropController {
    detector_input: FrameSize,
}

impl CropController {
    pub fn new(detector_input: FrameSize) -> Self {
        Self { detector_input }
    }

    /// Returns this frame's ROI. A populated `bbox` is consumed (invalidated)
    /// once it has been turned into a crop, so a stale box never drives more
    /// than one decision.
    pub fn decide(
        &self,
        bbox: &mut BoundingBox,
        frame: FrameSize,
        controls: &Controls,
        frame_index: usize,
    ) -> CropWindow {
        if !controls.crop_enabled {
            return CropWindow::full(frame);
        }

        if !bbox.populated {
            tracing::debug!(
                "Frame {}: subject not localized yet, searching the full image",
                frame_index
            );
            return CropWindow::full(frame);
        }

        match fit_crop_window(bbox, frame, self.detector_input, controls.maximize_crop) {
            Some(window) => {
                if window.width != window.height {
                    tracing::warn!(
                        "Frame {}: crop window is not square ({}x{})",
                        frame_index,
                        window.width,
                        window.height
                    );
                }
                bbox.invalidate();
                window
            }
            None => {
                tracing::warn!(
                    "Frame {}: could not fit a crop window around {:?}, using full frame",
                    frame_index,
                    bbox
                );
                CropWindow::full(frame)
            }
        }
    }
}

/// Copies the ROI out of `img`. A full-frame window still yields an owned copy.
pub fn crop_frame(img: &core::Mat, window: &CropWindow) -> Result<core::Mat> {
    let size = img.size()?;

    let x = window.x as i32;
    let y = window.y as i32;
    let w = (window.width as i32).min(size.width - x);
    let h = (window.height as i32).min(size.height - y);

    if x < 0 || y < 0 || w <= 0 || h <= 0 {
        anyhow::bail!(
            "Invalid crop dimensions: {}x{} at ({}, {}) for a {}x{} frame",
            w,
            h,
            x,
            y,
            size.width,
            size.height
        );
    }

    let roi = core::Rect::new(x, y, w, h);
    let cropped = core::Mat::roi(img, roi)?;

    let mut out = core::Mat::default();
    cropped.copy_to(&mut out)?;

    Ok(out)
}
