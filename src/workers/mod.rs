pub mod transcoder;

pub use transcoder::{JobError, JobReport, JobRunner};
