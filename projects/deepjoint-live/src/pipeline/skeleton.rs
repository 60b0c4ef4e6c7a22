use crate::pipeline::geometry::bounding_box_from_joints;
use crate::pipeline::types::{BoundingBox, CropWindow, FrameSize, Joint2D, Skeleton2D};

/// Joint order produced by the COCO-style 2D detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum CocoJoint {
    Nose = 0,
    Neck = 1,
    RShoulder = 2,
    RElbow = 3,
    RWrist = 4,
    LShoulder = 5,
    LElbow = 6,
    LWrist = 7,
    RHip = 8,
    RKnee = 9,
    RAnkle = 10,
    LHip = 11,
    LKnee = 12,
    LAnkle = 13,
    REye = 14,
    LEye = 15,
    REar = 16,
    LEar = 17,
}

/// Joints a detector has to report for a skeleton to be usable. Detectors emit
/// one extra background channel after these.
pub const COCO_MIN_JOINTS: usize = 18;

/// Canonical joint layout fed to the 3D regressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Body25Joint {
    Nose = 0,
    Neck = 1,
    RShoulder = 2,
    RElbow = 3,
    RWrist = 4,
    LShoulder = 5,
    LElbow = 6,
    LWrist = 7,
    MidHip = 8,
    RHip = 9,
    RKnee = 10,
    RAnkle = 11,
    LHip = 12,
    LKnee = 13,
    LAnkle = 14,
    REye = 15,
    LEye = 16,
    REar = 17,
    LEar = 18,
    LBigToe = 19,
    LSmallToe = 20,
    LHeel = 21,
    RBigToe = 22,
    RSmallToe = 23,
    RHeel = 24,
}

impl Body25Joint {
    pub const COUNT: usize = 25;
}

/// Values emitted per canonical joint: x, y, visibility.
pub const VALUES_PER_JOINT: usize = 3;

const COCO_TO_BODY25: [(CocoJoint, Body25Joint); COCO_MIN_JOINTS] = [
    (CocoJoint::Nose, Body25Joint::Nose),
    (CocoJoint::Neck, Body25Joint::Neck),
    (CocoJoint::RShoulder, Body25Joint::RShoulder),
    (CocoJoint::RElbow, Body25Joint::RElbow),
    (CocoJoint::RWrist, Body25Joint::RWrist),
    (CocoJoint::LShoulder, Body25Joint::LShoulder),
    (CocoJoint::LElbow, Body25Joint::LElbow),
    (CocoJoint::LWrist, Body25Joint::LWrist),
    (CocoJoint::RHip, Body25Joint::RHip),
    (CocoJoint::RKnee, Body25Joint::RKnee),
    (CocoJoint::RAnkle, Body25Joint::RAnkle),
    (CocoJoint::LHip, Body25Joint::LHip),
    (CocoJoint::LKnee, Body25Joint::LKnee),
    (CocoJoint::LAnkle, Body25Joint::LAnkle),
    (CocoJoint::REye, Body25Joint::REye),
    (CocoJoint::LEye, Body25Joint::LEye),
    (CocoJoint::REar, Body25Joint::REar),
    (CocoJoint::LEar, Body25Joint::LEar),
];

/// Result of normalizing one detection. Both fields are empty when the
/// detection was rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSkeleton {
    /// Canonical joints in full-frame pixel coordinates.
    pub joints: Skeleton2D,
    /// Flattened, resolution-normalized regressor input.
    pub input: Vec<f32>,
}

impl NormalizedSkeleton {
    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }
}

/// Re-orders COCO joints into the BODY25 layout. Joints COCO does not have stay
/// `None`, except MidHip which is the midpoint of both hips when both exist.
pub fn coco_to_body25(coco: &[Option<Joint2D>]) -> Skeleton2D {
    let mut body = vec![None; Body25Joint::COUNT];
    for (from, to) in COCO_TO_BODY25 {
        body[to as usize] = coco.get(from as usize).copied().flatten();
    }

    if let (Some(r), Some(l)) = (
        body[Body25Joint::RHip as usize],
        body[Body25Joint::LHip as usize],
    ) {
        body[Body25Joint::MidHip as usize] = Some(Joint2D::new((r.x + l.x) / 2.0, (r.y + l.y) / 2.0));
    }

    body
}

/// Flattens a canonical skeleton into `[x/width, y/height, visibility]` triplets.
pub fn flatten_skeleton(joints: &[Option<Joint2D>], width: f32, height: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(joints.len() * VALUES_PER_JOINT);
    for joint in joints {
        match joint {
            Some(j) => {
                out.push(j.x / width);
                out.push(j.y / height);
                out.push(1.0);
            }
            None => out.extend_from_slice(&[0.0, 0.0, 0.0]),
        }
    }
    out
}

fn is_in_range(joint: &Joint2D, size: FrameSize) -> bool {
    joint.x.is_finite()
        && joint.y.is_finite()
        && joint.x >= 0.0
        && joint.y >= 0.0
        && joint.x <= size.width as f32
        && joint.y <= size.height as f32
}

/// Turns raw detector joints (cropped image space) into regressor input.
///
/// On success `bbox` is overwritten with the subject's extent in full-frame
/// coordinates. A detection with too few (or no) joints, or with any joint
/// outside the cropped image, is rejected as a whole and leaves `bbox` untouched.
pub fn normalize_skeleton(
    raw: &[Option<Joint2D>],
    crop: &CropWindow,
    frame: FrameSize,
    bbox: &mut BoundingBox,
) -> NormalizedSkeleton {
    if raw.len() < COCO_MIN_JOINTS {
        tracing::warn!(
            "Cannot flatten skeleton: got {} joints, need at least {}",
            raw.len(),
            COCO_MIN_JOINTS
        );
        return NormalizedSkeleton::default();
    }

    let coco = &raw[..COCO_MIN_JOINTS];
    if coco.iter().all(Option::is_none) {
        tracing::debug!("No joints cleared the detection threshold");
        return NormalizedSkeleton::default();
    }

    if let Some(bad) = coco.iter().flatten().find(|j| !is_in_range(j, crop.size())) {
        tracing::warn!(
            "Rejecting skeleton: joint ({}, {}) lies outside the {}x{} detector image",
            bad.x,
            bad.y,
            crop.width,
            crop.height
        );
        return NormalizedSkeleton::default();
    }

    // Extent first: the joints below get shifted in place.
    if let Some(found) = bounding_box_from_joints(coco, crop.x as f32, crop.y as f32) {
        *bbox = found;
    }

    let shifted: Skeleton2D = coco
        .iter()
        .map(|j| j.map(|j| Joint2D::new(j.x + crop.x as f32, j.y + crop.y as f32)))
        .collect();

    let joints = coco_to_body25(&shifted);

    let (stolen_w, stolen_h) = crop.stolen(frame);
    let width = (crop.width + stolen_w) as f32;
    let height = (crop.height + stolen_h) as f32;
    let input = flatten_skeleton(&joints, width, height);

    NormalizedSkeleton { joints, input }
}
