use crate::pipeline::detection::build_session;
use crate::pipeline::types::PoseVector;
use crate::run_context::ComputeDevice;
use anyhow::{Context, Result};
use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// Lifts a flattened 2D skeleton into a 3D pose vector.
pub trait PoseRegressor {
    /// An empty input means "nothing detected" and yields an empty pose.
    fn infer(&mut self, input: &[f32]) -> Result<PoseVector>;
}

/// 2D-to-3D regressor exported to ONNX, taking a `[1, n]` input.
pub struct OnnxPoseRegressor {
    session: Session,
    input_len: Option<usize>,
}

impl OnnxPoseRegressor {
    pub fn new(model_path: &Path, device: ComputeDevice) -> Result<Self> {
        tracing::info!("Loading 3D pose regressor: {}", model_path.display());
        let session = build_session(model_path, device)?;

        // A dynamic last dimension is reported as -1.
        let input_len = session.inputs[0]
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.last().copied())
            .filter(|&d| d > 0)
            .map(|d| d as usize);

        Ok(Self { session, input_len })
    }
}

impl PoseRegressor for OnnxPoseRegressor {
    fn infer(&mut self, input: &[f32]) -> Result<PoseVector> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let padded = fit_input(input, self.input_len)?;
        let n = padded.len();
        let array = Array2::from_shape_vec((1, n), padded)?;
        let input_name = self.session.inputs[0].name.clone();

        let outputs = self
            .session
            .run(ort::inputs![input_name.as_str() => Tensor::from_array(array)?])
            .context("3D inference failed")?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract pose tensor")?;

        Ok(data.to_vec())
    }
}

/// Pads the skeleton with zeros (joints we never detect) up to the model's
/// input width. A model that takes fewer values than we produce cannot be fed.
pub fn fit_input(input: &[f32], expected: Option<usize>) -> Result<Vec<f32>> {
    let mut out = input.to_vec();
    if let Some(expected) = expected {
        if out.len() > expected {
            anyhow::bail!(
                "3D model takes {} inputs but the skeleton has {} values",
                expected,
                out.len()
            );
        }
        out.resize(expected, 0.0);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_input_pads_with_zeros() {
        let out = fit_input(&[1.0, 2.0], Some(5)).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_fit_input_dynamic_width_is_untouched() {
        assert_eq!(fit_input(&[1.0, 2.0], None).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_fit_input_rejects_oversized_skeleton() {
        assert!(fit_input(&[0.0; 10], Some(4)).is_err());
    }
}
