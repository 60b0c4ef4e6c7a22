use serde::Serialize;

pub use crate::run_artifacts::Joint2D;

/// One 3D pose frame in the regressor's fixed channel layout.
pub type PoseVector = Vec<f32>;

/// A skeleton in some joint ordering; `None` marks a joint the detector did not find.
pub type Skeleton2D = Vec<Option<Joint2D>>;

/// Width and height of an image in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Last known subject extent in full-frame pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    pub populated: bool,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn invalidate(&mut self) {
        self.populated = false;
    }
}

/// Region of the full frame handed to the 2D detector this iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropWindow {
    pub fn full(frame: FrameSize) -> Self {
        Self {
            x: 0,
            y: 0,
            width: frame.width,
            height: frame.height,
        }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn is_full(&self, frame: FrameSize) -> bool {
        *self == Self::full(frame)
    }

    /// Pixels removed by cropping along each axis.
    pub fn stolen(&self, frame: FrameSize) -> (u32, u32) {
        (
            frame.width.saturating_sub(self.width),
            frame.height.saturating_sub(self.height),
        )
    }
}

/// Recorded poses in arrival order. Frames without a detection are kept as
/// empty vectors so the sequence stays aligned with the input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseSequence {
    frames: Vec<PoseVector>,
}

impl PoseSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pose: PoseVector) {
        self.frames.push(pose);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[PoseVector] {
        &self.frames
    }

    pub fn detected_count(&self) -> usize {
        self.frames.iter().filter(|f| !f.is_empty()).count()
    }

    /// Every frame at exactly `channels` values. Frames without a usable pose
    /// repeat the last good one, or are all zeros before the first.
    pub fn held_frames(&self, channels: usize) -> Vec<PoseVector> {
        let mut last = vec![0.0; channels];
        self.frames
            .iter()
            .map(|frame| {
                if frame.len() == channels {
                    last.clone_from(frame);
                }
                last.clone()
            })
            .collect()
    }
}

/// Operator-adjustable knobs, seeded from the run config and mutated by the
/// visualization sink between frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Controls {
    pub crop_enabled: bool,
    pub maximize_crop: bool,
    /// Blend weight of the previous pose, 0 disables smoothing.
    pub smoothing: f32,
    pub constrain_view: bool,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            crop_enabled: true,
            maximize_crop: false,
            smoothing: 0.3,
            constrain_view: true,
            distance: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
        }
    }
}

/// Per-stage durations for one iteration, in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StageTimings {
    pub acquisition_ms: f64,
    pub detector_ms: f64,
    pub regressor_ms: f64,
    pub total_ms: f64,
}

impl StageTimings {
    pub fn fps(ms: f64) -> f64 {
        if ms > 0.0 {
            1000.0 / ms
        } else {
            0.0
        }
    }
}

/// Everything the visualization collaborator gets to see about one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub frame_index: usize,
    pub skipped_frames: usize,
    pub total_frames: Option<usize>,
    pub frame_limit: Option<usize>,
    pub frame_size: FrameSize,
    pub crop: CropWindow,
    pub timings: StageTimings,
    /// Detector joints in cropped image space.
    pub raw_joints: Skeleton2D,
    /// Canonical joints in full-frame space.
    pub joints: Skeleton2D,
    pub regressor_input: Vec<f32>,
    pub recorded: PoseVector,
    pub display: PoseVector,
}

impl FrameReport {
    pub fn has_detection(&self) -> bool {
        !self.recorded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_window_stolen_dimensions() {
        let frame = FrameSize::new(640, 480);
        let full = CropWindow::full(frame);
        assert!(full.is_full(frame));
        assert_eq!(full.stolen(frame), (0, 0));

        let crop = CropWindow {
            x: 100,
            y: 20,
            width: 400,
            height: 400,
        };
        assert!(!crop.is_full(frame));
        assert_eq!(crop.stolen(frame), (240, 80));
    }

    #[test]
    fn test_held_frames_repeat_last_detection() {
        let mut seq = PoseSequence::new();
        seq.push(Vec::new());
        seq.push(vec![1.0, 2.0]);
        seq.push(Vec::new());
        seq.push(vec![9.0]);
        seq.push(vec![3.0, 4.0]);

        assert_eq!(seq.len(), 5);
        assert_eq!(seq.detected_count(), 3);
        assert_eq!(
            seq.held_frames(2),
            vec![
                vec![0.0, 0.0],
                vec![1.0, 2.0],
                vec![1.0, 2.0],
                vec![1.0, 2.0],
                vec![3.0, 4.0],
            ]
        );
    }

    #[test]
    fn test_bounding_box_center() {
        let bbox = BoundingBox {
            populated: true,
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
        };
        assert_eq!(bbox.center(), (60.0, 45.0));
    }

    #[test]
    fn test_stage_timings_fps() {
        assert_eq!(StageTimings::fps(0.0), 0.0);
        assert!((StageTimings::fps(40.0) - 25.0).abs() < 1e-9);
    }
}
