use crate::pipeline::types::{Controls, PoseVector};

/// Indices of the root (hip) channels in the regressor's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootChannels {
    pub x_position: usize,
    pub y_position: usize,
    pub z_position: usize,
    pub z_rotation: usize,
    pub y_rotation: usize,
    pub x_rotation: usize,
}

impl RootChannels {
    /// Root channel names in output order, as they appear in a BVH hierarchy.
    pub const BVH_NAMES: [&'static str; 6] = [
        "Xposition",
        "Yposition",
        "Zposition",
        "Zrotation",
        "Yrotation",
        "Xrotation",
    ];

    pub fn indices(&self) -> [usize; 6] {
        [
            self.x_position,
            self.y_position,
            self.z_position,
            self.z_rotation,
            self.y_rotation,
            self.x_rotation,
        ]
    }
}

/// The regressor emits the hip's position followed by its Z/Y/X rotation.
pub const POSE_ROOT: RootChannels = RootChannels {
    x_position: 0,
    y_position: 1,
    z_position: 2,
    z_rotation: 3,
    y_rotation: 4,
    x_rotation: 5,
};

/// Depth the forced view places the subject at before the operator's distance.
pub const BASE_VIEW_DEPTH: f32 = 160.0;

/// Blends `current` towards `previous` with weight `strength` and advances the
/// smoothing state.
///
/// `result = current * (1 - strength) + previous * strength`. With a zero
/// strength, a missing previous pose, or vectors of different lengths the
/// current pose passes through unchanged. Whatever is returned becomes the
/// next call's `previous`.
pub fn stabilize(previous: &mut Option<PoseVector>, current: PoseVector, strength: f32) -> PoseVector {
    let w = strength.clamp(0.0, 1.0);

    let output = match previous.as_ref() {
        Some(prev) if w > 0.0 && !current.is_empty() && prev.len() == current.len() => current
            .iter()
            .zip(prev.iter())
            .map(|(c, p)| c * (1.0 - w) + p * w)
            .collect(),
        _ => current,
    };

    *previous = if output.is_empty() {
        None
    } else {
        Some(output.clone())
    };

    output
}

/// Display-only copy of `pose` with the root placed in front of a fixed camera.
/// Returns the pose untouched when the view is unconstrained or the pose is
/// shorter than the root layout.
pub fn forced_view(pose: &[f32], controls: &Controls, root: &RootChannels) -> PoseVector {
    let mut display = pose.to_vec();
    if !controls.constrain_view || root.indices().iter().any(|&i| i >= display.len()) {
        return display;
    }

    display[root.x_position] = 0.0;
    display[root.y_position] = 0.0;
    display[root.z_position] = -BASE_VIEW_DEPTH - controls.distance;
    display[root.z_rotation] = controls.roll;
    display[root.y_rotation] = controls.yaw;
    display[root.x_rotation] = controls.pitch;
    display
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(values: &[f32]) -> PoseVector {
        values.to_vec()
    }

    #[test]
    fn test_first_frame_passthrough_seeds_state() {
        let mut previous = None;
        let current = pose(&[1.0, 2.0, 3.0]);
        let out = stabilize(&mut previous, current.clone(), 0.3);
        assert_eq!(out, current);
        assert_eq!(previous, Some(current));
    }

    #[test]
    fn test_zero_strength_is_identity() {
        let mut previous = Some(pose(&[10.0, -4.0, 8.5, 0.25]));
        let current = pose(&[1.0, 2.0, 3.0, 4.0]);
        let out = stabilize(&mut previous, current.clone(), 0.0);
        assert_eq!(out, current);
        assert_eq!(previous, Some(current));
    }

    #[test]
    fn test_blend_convention() {
        let mut previous = Some(pose(&[0.0, 10.0]));
        let out = stabilize(&mut previous, pose(&[10.0, 20.0]), 0.3);
        assert!((out[0] - 7.0).abs() < 1e-5);
        assert!((out[1] - 17.0).abs() < 1e-5);

        // The blended frame is what the next call smooths against.
        let out = stabilize(&mut previous, pose(&[3.0, 13.0]), 0.5);
        assert!((out[0] - 5.0).abs() < 1e-5);
        assert!((out[1] - 15.0).abs() < 1e-5);
    }

    #[test]
    fn test_full_strength_holds_previous() {
        let mut previous = Some(pose(&[1.0, 2.0]));
        let out = stabilize(&mut previous, pose(&[5.0, 6.0]), 1.0);
        assert_eq!(out, pose(&[1.0, 2.0]));
    }

    #[test]
    fn test_mismatched_length_passes_through() {
        let mut previous = Some(pose(&[1.0, 2.0]));
        let current = pose(&[5.0, 6.0, 7.0]);
        let out = stabilize(&mut previous, current.clone(), 0.5);
        assert_eq!(out, current);
        assert_eq!(previous, Some(current));
    }

    #[test]
    fn test_empty_frame_resets_state() {
        let mut previous = Some(pose(&[1.0, 2.0]));
        let out = stabilize(&mut previous, Vec::new(), 0.5);
        assert!(out.is_empty());
        assert!(previous.is_none());

        let next = pose(&[7.0, 8.0]);
        assert_eq!(stabilize(&mut previous, next.clone(), 0.5), next);
    }

    #[test]
    fn test_forced_view_overwrites_exactly_root_channels() {
        let stabilized: PoseVector = (0..40).map(|i| i as f32 * 1.5 - 7.0).collect();
        let controls = Controls {
            constrain_view: true,
            distance: 20.0,
            yaw: 90.0,
            pitch: 0.0,
            roll: 0.0,
            ..Controls::default()
        };

        let display = forced_view(&stabilized, &controls, &POSE_ROOT);
        assert_eq!(display.len(), stabilized.len());
        assert_eq!(display[POSE_ROOT.x_position], 0.0);
        assert_eq!(display[POSE_ROOT.y_position], 0.0);
        assert_eq!(display[POSE_ROOT.z_position], -180.0);
        assert_eq!(display[POSE_ROOT.z_rotation], 0.0);
        assert_eq!(display[POSE_ROOT.y_rotation], 90.0);
        assert_eq!(display[POSE_ROOT.x_rotation], 0.0);

        let root = POSE_ROOT.indices();
        for (i, (d, s)) in display.iter().zip(stabilized.iter()).enumerate() {
            if !root.contains(&i) {
                assert_eq!(d.to_bits(), s.to_bits(), "channel {} changed", i);
            }
        }
    }

    #[test]
    fn test_forced_view_respects_unconstrained_and_short_poses() {
        let stabilized = pose(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let controls = Controls {
            constrain_view: false,
            ..Controls::default()
        };
        assert_eq!(forced_view(&stabilized, &controls, &POSE_ROOT), stabilized);

        let short = pose(&[1.0, 2.0]);
        assert_eq!(forced_view(&short, &Controls::default(), &POSE_ROOT), short);
        assert!(forced_view(&[], &Controls::default(), &POSE_ROOT).is_empty());
    }
}
