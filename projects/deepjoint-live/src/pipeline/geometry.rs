use crate::pipeline::types::{BoundingBox, CropWindow, FrameSize, Joint2D};

/// Margin added around the subject's extent when sizing the crop window.
pub const CROP_PADDING: f32 = 1.25;

/// Min/max extent of the detected joints, or `None` with fewer than two joints.
pub fn joint_extent(joints: &[Option<Joint2D>]) -> Option<(f32, f32, f32, f32)> {
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    let mut count = 0usize;

    for j in joints.iter().flatten() {
        min_x = min_x.min(j.x);
        max_x = max_x.max(j.x);
        min_y = min_y.min(j.y);
        max_y = max_y.max(j.y);
        count += 1;
    }

    if count < 2 {
        return None;
    }

    Some((min_x, min_y, max_x, max_y))
}

/// Bounding box of the joints, shifted by the crop offset into full-frame space.
pub fn bounding_box_from_joints(
    joints: &[Option<Joint2D>],
    offset_x: f32,
    offset_y: f32,
) -> Option<BoundingBox> {
    let (min_x, min_y, max_x, max_y) = joint_extent(joints)?;
    Some(BoundingBox {
        populated: true,
        x: min_x + offset_x,
        y: min_y + offset_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

/// Computes a window with the detector's aspect ratio that contains `bbox`
/// (padded by [`CROP_PADDING`]), or the largest such window when `maximize`
/// is set. The window is centered on the box and shifted back inside the
/// frame; it shrinks only when the frame itself is too small.
///
/// Returns `None` when no non-empty rectangle fits inside the frame.
pub fn fit_crop_window(
    bbox: &BoundingBox,
    frame: FrameSize,
    detector_input: FrameSize,
    maximize: bool,
) -> Option<CropWindow> {
    if frame.is_empty() || detector_input.is_empty() {
        return None;
    }
    if !(bbox.x.is_finite() && bbox.y.is_finite() && bbox.width.is_finite() && bbox.height.is_finite()) {
        return None;
    }

    let fw = frame.width as f32;
    let fh = frame.height as f32;
    let aspect = detector_input.width as f32 / detector_input.height as f32;

    let mut h = if maximize {
        fh.min(fw / aspect)
    } else {
        let padded_h = bbox.height * CROP_PADDING;
        let padded_w = bbox.width * CROP_PADDING;
        // Never ask the detector to upsample below its native input size.
        padded_h
            .max(padded_w / aspect)
            .max(detector_input.height as f32)
    };
    let mut w = h * aspect;

    let scale = (fw / w).min(fh / h).min(1.0);
    w *= scale;
    h *= scale;

    let (cx, cy) = bbox.center();
    let x = (cx - w / 2.0).clamp(0.0, (fw - w).max(0.0));
    let y = (cy - h / 2.0).clamp(0.0, (fh - h).max(0.0));

    let rx = (x.round() as u32).min(frame.width);
    let ry = (y.round() as u32).min(frame.height);
    let rw = (w.round() as u32).min(frame.width - rx);
    let rh = (h.round() as u32).min(frame.height - ry);

    if rw == 0 || rh == 0 {
        return None;
    }

    Some(CropWindow {
        x: rx,
        y: ry,
        width: rw,
        height: rh,
    })
}
