// Per-frame pose pipeline and its collaborators

pub mod crop;
pub mod detection;
pub mod finalize;
pub mod geometry;
pub mod health;
pub mod heatmap;
pub mod orchestrator;
pub mod preview;
pub mod regressor;
pub mod skeleton;
pub mod stabilizer;
pub mod types;
