pub mod dispatch;
pub mod intake;
pub mod job;
pub mod storage;
pub mod transcode;
