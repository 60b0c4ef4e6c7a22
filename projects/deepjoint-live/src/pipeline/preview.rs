use crate::pipeline::stabilizer::POSE_ROOT;
use crate::pipeline::types::{Controls, FrameReport, StageTimings};
use crate::run_artifacts::Joint2D;
use anyhow::Result;
use opencv::core::{self, Mat, Point, Rect, Scalar};
use opencv::highgui;
use opencv::imgproc::{self, LINE_8};
use opencv::prelude::*;

const WINDOW_NAME: &str = "deepjoint-live";
const SMOOTHING_STEP: f32 = 0.05;
const ANGLE_STEP: f32 = 5.0;
const DISTANCE_STEP: f32 = 10.0;

/// Receives every processed frame and may adjust the run's controls.
pub trait VisualizationSink {
    /// The source image for the frame about to be reported. Sinks that do
    /// not draw ignore it.
    fn frame(&mut self, _image: &Mat) -> Result<()> {
        Ok(())
    }

    /// Returns `true` when the operator asked to stop.
    fn present(&mut self, report: &FrameReport, controls: &mut Controls) -> Result<bool>;
}

/// Headless sink: per-frame diagnostics go to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl VisualizationSink for LogSink {
    fn present(&mut self, report: &FrameReport, _controls: &mut Controls) -> Result<bool> {
        let t = &report.timings;
        tracing::debug!(
            "Frame {}: acquisition {:.1}ms, 2D {:.1}ms ({:.1} fps), 3D {:.1}ms ({:.1} fps), total {:.1} fps",
            report.frame_index,
            t.acquisition_ms,
            t.detector_ms,
            StageTimings::fps(t.detector_ms),
            t.regressor_ms,
            StageTimings::fps(t.regressor_ms),
            StageTimings::fps(t.total_ms)
        );

        if report.has_detection() {
            tracing::debug!(
                "Frame {}: root {:?}, {}",
                report.frame_index,
                root_values(&report.recorded),
                view_summary(report)
            );
        } else {
            tracing::debug!("Frame {}: no skeleton", report.frame_index);
        }

        Ok(false)
    }
}

/// OpenCV window showing the frame with the crop window and detected joints.
pub struct PreviewSink {
    image: Mat,
}

impl PreviewSink {
    pub fn open() -> Result<Self> {
        highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;
        tracing::info!(
            "Preview keys: q quit, c crop, m maximize crop, v forced view, +/- smoothing, a/d yaw, w/s pitch, z/x roll, [/] distance"
        );
        Ok(Self {
            image: Mat::default(),
        })
    }
}

impl VisualizationSink for PreviewSink {
    fn frame(&mut self, image: &Mat) -> Result<()> {
        self.image = image.try_clone()?;
        Ok(())
    }

    fn present(&mut self, report: &FrameReport, controls: &mut Controls) -> Result<bool> {
        if self.image.empty() {
            return Ok(false);
        }

        draw_report(&mut self.image, report, controls)?;
        highgui::imshow(WINDOW_NAME, &self.image)?;

        let key = highgui::wait_key(1)? & 0xFF;
        Ok(apply_key(key, controls))
    }
}

fn draw_report(image: &mut Mat, report: &FrameReport, controls: &Controls) -> Result<()> {
    let crop_color = if controls.crop_enabled {
        Scalar::new(0.0, 165.0, 255.0, 0.0) // Orange
    } else {
        Scalar::new(128.0, 128.0, 128.0, 0.0) // Gray
    };
    let c = report.crop;
    let rect = Rect::new(c.x as i32, c.y as i32, c.width as i32, c.height as i32);
    imgproc::rectangle(image, rect, crop_color, 2, LINE_8, 0)?;

    let joint_color = Scalar::new(0.0, 255.0, 0.0, 0.0);
    for joint in report.joints.iter().flatten() {
        imgproc::circle(image, to_point(joint), 4, joint_color, -1, LINE_8, 0)?;
    }

    let hud = format!(
        "Frame {} | skipped {} | {:.1} fps | smoothing {:.2}{}",
        report.frame_index,
        report.skipped_frames,
        StageTimings::fps(report.timings.total_ms),
        controls.smoothing,
        if controls.constrain_view { "" } else { " | free view" }
    );
    for (row, text) in [hud, view_summary(report)].iter().enumerate() {
        imgproc::put_text(
            image,
            text,
            core::Point::new(10, 24 + 24 * row as i32),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.6,
            joint_color,
            2,
            LINE_8,
            false,
        )?;
    }
    Ok(())
}

fn root_values(pose: &[f32]) -> Vec<f32> {
    POSE_ROOT
        .indices()
        .iter()
        .filter_map(|&i| pose.get(i).copied())
        .collect()
}

/// Root of the pose as it is shown: position and Z/Y/X rotation after the
/// forced view.
pub fn view_summary(report: &FrameReport) -> String {
    match root_values(&report.display).as_slice() {
        [x, y, z, roll, yaw, pitch] => format!(
            "view pos {:.1} {:.1} {:.1} | roll {:.1} yaw {:.1} pitch {:.1}",
            x, y, z, roll, yaw, pitch
        ),
        _ => "view: no pose".to_string(),
    }
}

fn to_point(joint: &Joint2D) -> Point {
    Point::new(joint.x.round() as i32, joint.y.round() as i32)
}

/// Applies one key press to the controls. Returns `true` for quit.
pub fn apply_key(key: i32, controls: &mut Controls) -> bool {
    let Some(key) = u8::try_from(key).ok().map(char::from) else {
        return false;
    };

    match key {
        'q' | 'Q' => {
            tracing::info!("Stopping after keypress");
            return true;
        }
        'c' => controls.crop_enabled = !controls.crop_enabled,
        'm' => controls.maximize_crop = !controls.maximize_crop,
        'v' => controls.constrain_view = !controls.constrain_view,
        '+' | '=' => controls.smoothing = (controls.smoothing + SMOOTHING_STEP).min(1.0),
        '-' => controls.smoothing = (controls.smoothing - SMOOTHING_STEP).max(0.0),
        'a' => controls.yaw -= ANGLE_STEP,
        'd' => controls.yaw += ANGLE_STEP,
        'w' => controls.pitch -= ANGLE_STEP,
        's' => controls.pitch += ANGLE_STEP,
        'z' => controls.roll -= ANGLE_STEP,
        'x' => controls.roll += ANGLE_STEP,
        '[' => controls.distance -= DISTANCE_STEP,
        ']' => controls.distance += DISTANCE_STEP,
        _ => return false,
    }

    tracing::debug!("Controls now {:?}", controls);
    false
}
