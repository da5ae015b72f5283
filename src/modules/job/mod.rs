pub mod status;
pub mod workspace;

pub use status::{JobStatus, LogStatusSink, PgStatusSink, StatusSink, StatusUpdate};
pub use workspace::LocalWorkspace;

/// One fetch → transcode → promote → delete unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    pub transient_key: String,
    pub output_prefix: String,
}

impl TranscodeJob {
    pub fn new(transient_key: impl Into<String>, output_prefix: impl Into<String>) -> Self {
        Self {
            transient_key: transient_key.into(),
            output_prefix: output_prefix.into(),
        }
    }
}

/// Where the job reads its source and publishes its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets {
    pub transient: String,
    pub durable: String,
}
