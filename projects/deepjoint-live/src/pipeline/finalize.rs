use crate::pipeline::stabilizer::RootChannels;
use crate::pipeline::types::PoseSequence;
use anyhow::{Context, Result};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Frame time written when the source does not report a frame rate.
pub const DEFAULT_FRAME_TIME: f32 = 0.04;

/// One animated channel of a skeleton hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLabel {
    pub joint: String,
    pub channel: String,
}

impl ChannelLabel {
    pub fn column_name(&self) -> String {
        format!("{}_{}", self.joint, self.channel)
    }
}

/// The HIERARCHY half of a BVH file, used as the header for recorded motion.
#[derive(Debug, Clone)]
pub struct BvhHierarchy {
    text: String,
    channels: Vec<ChannelLabel>,
}

impl BvhHierarchy {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read BVH header {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid BVH header {}", path.display()))
    }

    /// Parses a hierarchy, ignoring any MOTION section that follows it.
    pub fn parse(content: &str) -> Result<Self> {
        let mut text = String::new();
        let mut channels = Vec::new();
        let mut joint: Option<String> = None;

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("MOTION") {
                break;
            }
            text.push_str(line.trim_end());
            text.push('\n');

            let mut tokens = trimmed.split_whitespace();
            match tokens.next() {
                Some("ROOT") | Some("JOINT") => {
                    joint = tokens.next().map(str::to_string);
                }
                Some("CHANNELS") => {
                    let name = joint
                        .clone()
                        .ok_or_else(|| anyhow::anyhow!("CHANNELS before any joint"))?;
                    let count: usize = tokens
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("CHANNELS without a count for {}", name))?
                        .parse()
                        .with_context(|| format!("Bad channel count for {}", name))?;
                    let names: Vec<&str> = tokens.collect();
                    if names.len() != count {
                        anyhow::bail!(
                            "Joint {} declares {} channels but names {}",
                            name,
                            count,
                            names.len()
                        );
                    }
                    channels.extend(names.into_iter().map(|c| ChannelLabel {
                        joint: name.clone(),
                        channel: c.to_string(),
                    }));
                }
                _ => {}
            }
        }

        if !text.trim_start().starts_with("HIERARCHY") {
            anyhow::bail!("Missing HIERARCHY section");
        }
        if channels.is_empty() {
            anyhow::bail!("Hierarchy declares no channels");
        }

        Ok(Self { text, channels })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[ChannelLabel] {
        &self.channels
    }

    /// Whether the hierarchy's channels sit where the forced view expects the root.
    pub fn matches_root(&self, root: &RootChannels) -> bool {
        let Some(root_joint) = self.channels.first().map(|c| c.joint.as_str()) else {
            return false;
        };
        root.indices()
            .iter()
            .zip(RootChannels::BVH_NAMES)
            .all(|(&i, expected)| {
                self.channels.get(i).is_some_and(|c| {
                    c.joint == root_joint && c.channel.eq_ignore_ascii_case(expected)
                })
            })
    }
}

/// Persists a finished pose sequence.
pub trait MotionWriter {
    fn write(&self, path: &Path, sequence: &PoseSequence) -> Result<()>;
}

/// Writes a BVH file: the hierarchy template followed by a MOTION block.
pub struct BvhWriter {
    hierarchy: BvhHierarchy,
    frame_time: f32,
}

impl BvhWriter {
    pub fn new(hierarchy: BvhHierarchy, frame_time: f32) -> Self {
        Self {
            hierarchy,
            frame_time,
        }
    }
}

impl MotionWriter for BvhWriter {
    fn write(&self, path: &Path, sequence: &PoseSequence) -> Result<()> {
        let channels = self.hierarchy.channel_count();
        check_frame_width(sequence, channels)?;

        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut out = BufWriter::new(file);

        out.write_all(self.hierarchy.text.as_bytes())?;
        writeln!(out, "MOTION")?;
        writeln!(out, "Frames: {}", sequence.len())?;
        writeln!(out, "Frame Time: {:.6}", self.frame_time)?;

        for frame in sequence.held_frames(channels) {
            let line: Vec<String> = frame.iter().map(|v| format!("{:.4}", v)).collect();
            writeln!(out, "{}", line.join(" "))?;
        }

        out.flush()?;
        Ok(())
    }
}

/// Writes one CSV row per frame, one column per channel.
pub struct CsvWriter {
    labels: Option<Vec<String>>,
}

impl CsvWriter {
    pub fn new(hierarchy: Option<&BvhHierarchy>) -> Self {
        Self {
            labels: hierarchy.map(|h| h.channels().iter().map(ChannelLabel::column_name).collect()),
        }
    }
}

impl MotionWriter for CsvWriter {
    fn write(&self, path: &Path, sequence: &PoseSequence) -> Result<()> {
        let channels = match &self.labels {
            Some(labels) => labels.len(),
            None => sequence
                .frames()
                .iter()
                .map(Vec::len)
                .find(|&n| n > 0)
                .unwrap_or(0),
        };
        check_frame_width(sequence, channels)?;

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let header: Vec<String> = match &self.labels {
            Some(labels) => labels.clone(),
            None => (0..channels).map(|i| format!("c{}", i)).collect(),
        };
        writer.write_record(&header)?;

        for frame in sequence.held_frames(channels) {
            writer.write_record(frame.iter().map(|v| v.to_string()))?;
        }

        writer.flush()?;
        Ok(())
    }
}

fn check_frame_width(sequence: &PoseSequence, channels: usize) -> Result<()> {
    if let Some(bad) = sequence
        .frames()
        .iter()
        .find(|f| !f.is_empty() && f.len() != channels)
    {
        anyhow::bail!(
            "Pose frames carry {} channels but the output expects {}",
            bad.len(),
            channels
        );
    }
    Ok(())
}

/// Picks the writer for an output path: `.csv` gets CSV, anything else BVH.
pub fn writer_for(
    output_path: &Path,
    hierarchy: Option<BvhHierarchy>,
    frame_time: f32,
) -> Result<Box<dyn MotionWriter>> {
    let is_csv = output_path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        return Ok(Box::new(CsvWriter::new(hierarchy.as_ref())));
    }

    let hierarchy = hierarchy
        .ok_or_else(|| anyhow::anyhow!("BVH output needs a hierarchy header (--bvh-header)"))?;
    Ok(Box::new(BvhWriter::new(hierarchy, frame_time)))
}

/// Frame time for a source frame rate, falling back to [`DEFAULT_FRAME_TIME`].
pub fn frame_time_for(fps: Option<f64>) -> f32 {
    match fps {
        Some(fps) if fps > 0.0 => (1.0 / fps) as f32,
        _ => DEFAULT_FRAME_TIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stabilizer::POSE_ROOT;

    const HEADER: &str = "HIERARCHY
ROOT hip
{
  OFFSET 0 0 0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Yrotation Xrotation
  JOINT abdomen
  {
    OFFSET 0 20 0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0 10 0
    }
  }
}
MOTION
Frames: 1
Frame Time: 0.04
0 0 0 0 0 0 0 0 0
";

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("deepjoint-{}-{}", std::process::id(), name))
    }

    fn sequence() -> PoseSequence {
        let mut seq = PoseSequence::new();
        seq.push(Vec::new());
        seq.push((0..9).map(|i| i as f32).collect());
        seq.push(Vec::new());
        seq
    }

    #[test]
    fn test_parse_hierarchy_channels() {
        let h = BvhHierarchy::parse(HEADER).unwrap();
        assert_eq!(h.channel_count(), 9);
        assert_eq!(h.channels()[0].column_name(), "hip_Xposition");
        assert_eq!(h.channels()[8].column_name(), "abdomen_Yrotation");
        assert!(!h.text.contains("MOTION"));
        assert!(h.matches_root(&POSE_ROOT));
    }

    #[test]
    fn test_root_mismatch_detected() {
        let swapped = HEADER.replace(
            "CHANNELS 6 Xposition Yposition Zposition Zrotation Yrotation Xrotation",
            "CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation",
        );
        let h = BvhHierarchy::parse(&swapped).unwrap();
        assert!(!h.matches_root(&POSE_ROOT));
    }

    #[test]
    fn test_parse_rejects_bad_headers() {
        assert!(BvhHierarchy::parse("ROOT hip\n{\n}\n").is_err());
        assert!(BvhHierarchy::parse("HIERARCHY\nROOT hip\n{\n}\n").is_err());
        assert!(BvhHierarchy::parse("HIERARCHY\nROOT hip\nCHANNELS 2 Xposition\n").is_err());
    }

    #[test]
    fn test_bvh_writer_holds_frames() {
        let path = temp_path("out.bvh");
        let writer = BvhWriter::new(BvhHierarchy::parse(HEADER).unwrap(), 0.04);
        writer.write(&path, &sequence()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let motion: Vec<&str> = content.split("MOTION\n").nth(1).unwrap().lines().collect();
        assert_eq!(motion[0], "Frames: 3");
        assert_eq!(motion[1], "Frame Time: 0.040000");
        assert_eq!(motion.len(), 5);
        assert!(motion[2].split(' ').all(|v| v == "0.0000"));
        assert_eq!(motion[3], motion[4]);
        assert!(motion[3].starts_with("0.0000 1.0000 2.0000"));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_bvh_writer_rejects_wrong_width() {
        let path = temp_path("wrong.bvh");
        let writer = BvhWriter::new(BvhHierarchy::parse(HEADER).unwrap(), 0.04);
        let mut seq = PoseSequence::new();
        seq.push(vec![1.0; 4]);
        assert!(writer.write(&path, &seq).is_err());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_csv_writer_uses_hierarchy_labels() {
        let path = temp_path("out.csv");
        let h = BvhHierarchy::parse(HEADER).unwrap();
        CsvWriter::new(Some(&h)).write(&path, &sequence()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "hip_Xposition");
        assert_eq!(headers.len(), 9);
        assert_eq!(reader.records().count(), 3);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_csv_writer_without_hierarchy() {
        let path = temp_path("bare.csv");
        CsvWriter::new(None).write(&path, &sequence()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(&reader.headers().unwrap()[8], "c8");
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_writer_for_extension() {
        assert!(writer_for(Path::new("take.CSV"), None, 0.04).is_ok());
        assert!(writer_for(Path::new("take.bvh"), None, 0.04).is_err());
        let h = BvhHierarchy::parse(HEADER).unwrap();
        assert!(writer_for(Path::new("take.bvh"), Some(h), 0.04).is_ok());
    }

    #[test]
    fn test_frame_time_for() {
        assert_eq!(frame_time_for(None), DEFAULT_FRAME_TIME);
        assert_eq!(frame_time_for(Some(0.0)), DEFAULT_FRAME_TIME);
        assert!((frame_time_for(Some(25.0)) - 0.04).abs() < 1e-6);
    }
}
