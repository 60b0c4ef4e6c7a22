// Run artifact struct definitions
//
// Structs that are persisted next to a run's motion output, plus the small
// value types they embed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A 2D joint position in pixel coordinates
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Joint2D {
    pub x: f32,
    pub y: f32,
}

impl Joint2D {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Why the capture loop stopped
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The configured frame limit was reached.
    FrameLimit,
    /// The operator asked to stop.
    Stopped,
    /// The source reported all of its frames as consumed.
    EndOfStream,
    /// Too many consecutive acquisition failures.
    BudgetExhausted,
}

/// Summary written as `<output>.summary.json` after a recorded run
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source: String,
    pub output_path: PathBuf,
    pub processed_frames: usize,
    pub skipped_frames: usize,
    pub recorded_frames: usize,
    pub detected_frames: usize,
    pub termination: Termination,
    /// False when recording was expected but the motion file could not be written.
    pub output_written: bool,
}

impl RunSummary {
    /// Path of the summary file for a given motion output path.
    pub fn path_for(output_path: &std::path::Path) -> PathBuf {
        let stem = output_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("out");
        output_path.with_file_name(format!("{}.summary.json", stem))
    }

    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::path_for(&self.output_path);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_summary_path_for() {
        assert_eq!(
            RunSummary::path_for(Path::new("captures/out.bvh")),
            PathBuf::from("captures/out.summary.json")
        );
        assert_eq!(
            RunSummary::path_for(Path::new("take.csv")),
            PathBuf::from("take.summary.json")
        );
    }

    #[test]
    fn test_termination_serializes_snake_case() {
        let json = serde_json::to_string(&Termination::BudgetExhausted).unwrap();
        assert_eq!(json, "\"budget_exhausted\"");
    }

    #[test]
    fn test_summary_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("deepjoint-summary-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let summary = RunSummary {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            source: "0".to_string(),
            output_path: dir.join("out.bvh"),
            processed_frames: 12,
            skipped_frames: 1,
            recorded_frames: 12,
            detected_frames: 9,
            termination: Termination::EndOfStream,
            output_written: true,
        };

        let path = summary.save().unwrap();
        let loaded: RunSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.processed_frames, 12);
        assert_eq!(loaded.termination, Termination::EndOfStream);
        assert!(loaded.output_written);

        std::fs::remove_dir_all(&dir).ok();
    }
}
