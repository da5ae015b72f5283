pub mod encoder;
pub mod engine;
pub mod ladder;
pub mod manifest;

pub use encoder::{EncodeError, FfmpegEncoder, RungEncoder};
pub use engine::{TranscodeEngine, TranscodeError, check_container};
pub use ladder::{ResolutionLadder, Rung};
