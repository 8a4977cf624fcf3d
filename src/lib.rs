//! Splicer - concatenate remote videos of mixed formats
//!
//! Downloads a list of video URLs and merges them into one playable file,
//! driving ffmpeg through an escalating ladder of strategies: stream copy,
//! per-file normalization followed by stream copy, and finally a single-pass
//! filter graph.

pub mod cli;
pub mod concat;
pub mod config;
pub mod error;
pub mod fetch;
pub mod media;
pub mod normalize;
pub mod pipeline;
pub mod probe;
pub mod server;
pub mod store;
