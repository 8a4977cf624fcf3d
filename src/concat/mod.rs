// Concatenation strategies
//
// - Manifest: ordered input list in ffmpeg concat demuxer format
// - Fast: container-level stream copy, expected to fail on mismatched inputs
// - Graph: single-pass decode/rescale/merge filter graph, the last resort

pub mod fast;
pub mod graph;
pub mod manifest;

pub use fast::{FastConcatenator, FastOutcome};
pub use graph::{GraphConcatenator, GraphInput};
pub use manifest::ConcatManifest;
