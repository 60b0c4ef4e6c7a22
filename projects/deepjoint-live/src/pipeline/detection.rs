use crate::pipeline::types::FrameSize;
use crate::run_context::{ComputeDevice, DetectorGeometry, PresetSpec};
use anyhow::{anyhow, Context, Result};
use ndarray::Array4;
use opencv::core::{self, Mat};
use opencv::imgproc;
use opencv::prelude::*;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// Opens an ONNX Runtime session on the requested device.
pub fn build_session(model_path: &Path, device: ComputeDevice) -> Result<Session> {
    let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    let builder = match device {
        ComputeDevice::Cpu => builder,
        #[cfg(feature = "cuda")]
        ComputeDevice::Gpu => {
            tracing::info!("Attempting CUDA execution provider for {}", model_path.display());
            builder.with_execution_providers([
                ort::execution_providers::CUDAExecutionProvider::default().build(),
            ])?
        }
        #[cfg(not(feature = "cuda"))]
        ComputeDevice::Gpu => {
            tracing::warn!(
                "GPU requested for {} but this build has no CUDA support, running on CPU",
                model_path.display()
            );
            builder
        }
    };

    builder
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model {}", model_path.display()))
}

/// A 2D joint detector seen from the outside: an image goes in, a list of
/// logical outputs comes out. Outputs are expected to be heatmap planes.
pub trait JointDetector {
    fn infer(&mut self, image: &Mat) -> Result<Vec<Vec<f32>>>;
}

/// Heatmap-producing network exported to ONNX. Takes an NHWC float BGR image
/// and returns one plane per channel of the configured heatmap output.
pub struct OnnxHeatmapDetector {
    session: Session,
    input_size: FrameSize,
    heatmap: FrameSize,
    heatmap_output: usize,
}

impl OnnxHeatmapDetector {
    pub fn new(
        model_path: &Path,
        preset: &PresetSpec,
        geometry: &DetectorGeometry,
        device: ComputeDevice,
    ) -> Result<Self> {
        tracing::info!("Loading 2D joint detector: {}", model_path.display());
        let session = build_session(model_path, device)?;

        let outputs = session.outputs.len();
        if preset.heatmap_output >= outputs {
            anyhow::bail!(
                "2D model {} has {} outputs, heatmaps are expected at output {}",
                model_path.display(),
                outputs,
                preset.heatmap_output
            );
        }
        if outputs != preset.output_tensors {
            tracing::warn!(
                "2D model {} has {} outputs, preset expects {}",
                model_path.display(),
                outputs,
                preset.output_tensors
            );
        }

        // Dynamic dimensions are reported as -1 and only get checked per frame.
        if let Some(shape) = session.outputs[preset.heatmap_output].output_type.tensor_shape() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            if dims.iter().all(|&d| d > 0) {
                heatmap_layout(&dims, geometry.heatmap).with_context(|| {
                    format!("2D model {} does not fit the heatmap geometry", model_path.display())
                })?;
            }
        }

        Ok(Self {
            session,
            input_size: geometry.input,
            heatmap: geometry.heatmap,
            heatmap_output: preset.heatmap_output,
        })
    }
}

impl JointDetector for OnnxHeatmapDetector {
    fn infer(&mut self, image: &Mat) -> Result<Vec<Vec<f32>>> {
        let input = mat_to_input_tensor(image, self.input_size)?;
        let input_name = self.session.inputs[0].name.clone();
        let heatmap_output = self.heatmap_output;
        let heatmap = self.heatmap;

        let outputs = self
            .session
            .run(ort::inputs![input_name.as_str() => Tensor::from_array(input)?])
            .context("2D inference failed")?;

        let (shape, data) = outputs[heatmap_output]
            .try_extract_tensor::<f32>()
            .context("Failed to extract heatmap tensor")?;
        let dims: Vec<i64> = shape.iter().copied().collect();

        let (rows, cols, channels) = heatmap_layout(&dims, heatmap)?;
        split_nhwc(data, rows, cols, channels)
    }
}

/// Reads `[1, rows, cols, channels]` out of a heatmap tensor shape, insisting
/// that the grid matches the configured heatmap size (`width` = cols).
pub fn heatmap_layout(dims: &[i64], heatmap: FrameSize) -> Result<(usize, usize, usize)> {
    let (rows, cols) = (heatmap.height as i64, heatmap.width as i64);
    match dims {
        [1, r, c, ch] if *r == rows && *c == cols && *ch > 0 => {
            Ok((rows as usize, cols as usize, *ch as usize))
        }
        [1, ch, r, c] if *r == rows && *c == cols => Err(anyhow!(
            "Heatmap tensor {:?} is channels-first, expected [1, {}, {}, {}]",
            dims,
            rows,
            cols,
            ch
        )),
        other => Err(anyhow!(
            "Unexpected heatmap tensor shape {:?}, expected [1, {}, {}, channels]",
            other,
            rows,
            cols
        )),
    }
}

/// Resizes a BGR frame to the detector input and lays it out as `[1, h, w, 3]`
/// floats in 0..255.
pub fn mat_to_input_tensor(image: &Mat, input_size: FrameSize) -> Result<Array4<f32>> {
    let mut resized = Mat::default();
    imgproc::resize(
        image,
        &mut resized,
        core::Size::new(input_size.width as i32, input_size.height as i32),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    if resized.typ() != core::CV_8UC3 {
        return Err(anyhow!("Expected an 8-bit 3-channel frame, got type {}", resized.typ()));
    }
    if !resized.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let bytes = resized.data_bytes()?;
    let h = input_size.height as usize;
    let w = input_size.width as usize;
    let values: Vec<f32> = bytes.iter().map(|&b| b as f32).collect();

    Array4::from_shape_vec((1, h, w, 3), values)
        .map_err(|e| anyhow!("Failed to shape detector input: {}", e))
}

/// Splits an interleaved `rows x cols x channels` buffer into one row-major
/// plane per channel.
pub fn split_nhwc(data: &[f32], rows: usize, cols: usize, channels: usize) -> Result<Vec<Vec<f32>>> {
    let cells = rows * cols;
    if cells == 0 || channels == 0 {
        return Err(anyhow!(
            "Heatmap tensor is empty: {}x{}x{}",
            rows,
            cols,
            channels
        ));
    }
    if data.len() < cells * channels {
        return Err(anyhow!(
            "Heatmap buffer holds {} values, expected {}x{}x{}",
            data.len(),
            rows,
            cols,
            channels
        ));
    }

    let mut planes = vec![Vec::with_capacity(cells); channels];
    for cell in data[..cells * channels].chunks_exact(channels) {
        for (plane, value) in planes.iter_mut().zip(cell) {
            plane.push(*value);
        }
    }
    Ok(planes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_nhwc_deinterleaves() {
        // 1x2 grid, 3 channels
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let planes = split_nhwc(&data, 1, 2, 3).unwrap();
        assert_eq!(planes, vec![vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]);
    }

    #[test]
    fn test_split_nhwc_rejects_short_buffer() {
        assert!(split_nhwc(&[0.0; 5], 1, 2, 3).is_err());
    }

    #[test]
    fn test_split_nhwc_rejects_zero_channels() {
        assert!(split_nhwc(&[], 46, 46, 0).is_err());
        assert!(split_nhwc(&[], 0, 46, 19).is_err());
    }

    #[test]
    fn test_heatmap_layout_checks_grid() {
        let grid = FrameSize::new(46, 46);
        assert_eq!(heatmap_layout(&[1, 46, 46, 19], grid).unwrap(), (46, 46, 19));

        let err = heatmap_layout(&[1, 19, 46, 46], grid).unwrap_err();
        assert!(err.to_string().contains("channels-first"));

        assert!(heatmap_layout(&[1, 23, 23, 19], grid).is_err());
        assert!(heatmap_layout(&[1, 46, 46, 0], grid).is_err());
        assert!(heatmap_layout(&[46, 46, 19], grid).is_err());
    }

    #[test]
    fn test_heatmap_layout_non_square_grid() {
        // width is columns
        let grid = FrameSize::new(32, 24);
        assert_eq!(heatmap_layout(&[1, 24, 32, 19], grid).unwrap(), (24, 32, 19));
        assert!(heatmap_layout(&[1, 32, 24, 19], grid).is_err());
    }

    #[test]
    fn test_input_tensor_shape_and_values() {
        let img = Mat::new_rows_cols_with_default(
            30,
            40,
            core::CV_8UC3,
            core::Scalar::new(10.0, 20.0, 30.0, 0.0),
        )
        .unwrap();
        let tensor = mat_to_input_tensor(&img, FrameSize::new(16, 8)).unwrap();
        assert_eq!(tensor.shape(), &[1, 8, 16, 3]);
        assert_eq!(tensor[[0, 3, 5, 0]], 10.0);
        assert_eq!(tensor[[0, 3, 5, 2]], 30.0);
    }

    #[test]
    fn test_input_tensor_rejects_gray_frames() {
        let img = Mat::new_rows_cols_with_default(8, 8, core::CV_8UC1, core::Scalar::all(0.0)).unwrap();
        assert!(mat_to_input_tensor(&img, FrameSize::new(8, 8)).is_err());
    }
}
