use crate::pipeline::types::{FrameSize, Joint2D, Skeleton2D};

/// Detectors must hand back at least this many logical outputs for their
/// result to be read as a heatmap stack.
pub const MIN_LOGICAL_OUTPUTS: usize = 3;

/// A single joint's confidence grid, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Heatmap {
    pub fn at(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    /// Position and value of the strongest cell.
    pub fn peak(&self) -> Option<(usize, usize, f32)> {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(pos, v)| (pos / self.cols, pos % self.cols, *v))
    }
}

/// One heatmap per detector channel; channel i belongs to joint i.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeatmapStack {
    pub channels: Vec<Heatmap>,
}

impl HeatmapStack {
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Turns a stack of heatmaps into joint positions.
pub trait PeakExtractor {
    /// Returns one entry per heatmap channel, in pixel coordinates of an image
    /// of `frame` size. Channels without a confident peak are `None`.
    fn extract(&self, frame: FrameSize, stack: &HeatmapStack, threshold: f32) -> Skeleton2D;
}

/// Takes the strongest cell of each channel and keeps it when it clears the
/// threshold. Good enough for a single subject in frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgmaxPeakExtractor;

impl PeakExtractor for ArgmaxPeakExtractor {
    fn extract(&self, frame: FrameSize, stack: &HeatmapStack, threshold: f32) -> Skeleton2D {
        stack
            .channels
            .iter()
            .map(|hm| {
                let (r, c, v) = hm.peak()?;
                if v < threshold {
                    return None;
                }
                // Cell centers, scaled up to the image the detector looked at.
                let x = (c as f32 + 0.5) * frame.width as f32 / hm.cols as f32;
                let y = (r as f32 + 0.5) * frame.height as f32 / hm.rows as f32;
                Some(Joint2D::new(x, y))
            })
            .collect()
    }
}

/// Builds heatmap stacks out of raw detector output and hands them to a
/// [`PeakExtractor`].
pub struct HeatmapAssembler {
    rows: usize,
    cols: usize,
    count: usize,
    extractor: Box<dyn PeakExtractor>,
}

impl HeatmapAssembler {
    pub fn new(rows: usize, cols: usize, count: usize, extractor: Box<dyn PeakExtractor>) -> Self {
        Self {
            rows,
            cols,
            count,
            extractor,
        }
    }

    /// Reshapes each logical output into a rows×cols grid. Returns `None` for
    /// output that cannot be a heatmap stack of the declared shape.
    pub fn assemble(&self, outputs: &[Vec<f32>]) -> Option<HeatmapStack> {
        if outputs.len() < MIN_LOGICAL_OUTPUTS {
            tracing::warn!(
                "2D detector produced {} outputs instead of an array of heatmaps",
                outputs.len()
            );
            return None;
        }
        if outputs.len() < self.count {
            tracing::warn!(
                "2D detector produced {} heatmaps, expected {}",
                outputs.len(),
                self.count
            );
            return None;
        }

        let cells = self.rows * self.cols;
        let mut channels = Vec::with_capacity(self.count);
        for (i, output) in outputs.iter().take(self.count).enumerate() {
            if output.len() < cells {
                tracing::warn!(
                    "Heatmap {} holds {} values, expected {}x{}",
                    i,
                    output.len(),
                    self.rows,
                    self.cols
                );
                return None;
            }
            channels.push(Heatmap {
                rows: self.rows,
                cols: self.cols,
                data: output[..cells].to_vec(),
            });
        }

        Some(HeatmapStack { channels })
    }

    /// Assembles and extracts in one go. Malformed output yields an empty skeleton.
    pub fn detect_skeleton(&self, outputs: &[Vec<f32>], frame: FrameSize, threshold: f32) -> Skeleton2D {
        match self.assemble(outputs) {
            Some(stack) => self.extractor.extract(frame, &stack, threshold),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(rows: usize, cols: usize, hot: Option<(usize, usize, f32)>) -> Vec<f32> {
        let mut v = vec![0.0; rows * cols];
        if let Some((r, c, value)) = hot {
            v[r * cols + c] = value;
        }
        v
    }

    fn assembler(count: usize) -> HeatmapAssembler {
        HeatmapAssembler::new(4, 4, count, Box::new(ArgmaxPeakExtractor))
    }

    #[test]
    fn test_too_few_outputs_yield_empty_skeleton() {
        let a = assembler(2);
        for n in 0..MIN_LOGICAL_OUTPUTS {
            let outputs: Vec<Vec<f32>> = (0..n).map(|_| plane(4, 4, Some((1, 1, 1.0)))).collect();
            assert!(a.assemble(&outputs).is_none());
            assert!(a.detect_skeleton(&outputs, FrameSize::new(40, 40), 0.1).is_empty());
        }
    }

    #[test]
    fn test_short_buffers_yield_empty_skeleton() {
        let a = assembler(3);
        let outputs = vec![plane(4, 4, None), vec![0.5; 3], plane(4, 4, None)];
        assert!(a.detect_skeleton(&outputs, FrameSize::new(40, 40), 0.1).is_empty());

        let missing_channels = vec![plane(4, 4, None); 3];
        assert!(assembler(5).assemble(&missing_channels).is_none());
    }

    #[test]
    fn test_assemble_is_row_major() {
        let a = HeatmapAssembler::new(2, 3, 3, Box::new(ArgmaxPeakExtractor));
        let outputs = vec![vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 99.0]; 3];
        let stack = a.assemble(&outputs).unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.channels[0].at(0, 2), 2.0);
        assert_eq!(stack.channels[0].at(1, 0), 3.0);
        assert_eq!(stack.channels[0].data.len(), 6);
    }

    #[test]
    fn test_argmax_scales_to_frame_and_thresholds() {
        let a = assembler(3);
        let outputs = vec![
            plane(4, 4, Some((1, 2, 0.9))),
            plane(4, 4, Some((3, 0, 0.2))),
            plane(4, 4, None),
        ];
        let skeleton = a.detect_skeleton(&outputs, FrameSize::new(80, 40), 0.35);
        assert_eq!(skeleton.len(), 3);

        let j = skeleton[0].unwrap();
        assert_eq!((j.x, j.y), (50.0, 15.0));
        assert!(skeleton[1].is_none());
        assert!(skeleton[2].is_none());
    }

    #[test]
    fn test_peak_skips_nan_cells() {
        let hm = Heatmap {
            rows: 1,
            cols: 3,
            data: vec![f32::NAN, 0.4, 0.1],
        };
        assert_eq!(hm.peak(), Some((0, 1, 0.4)));
    }
}
