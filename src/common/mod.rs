pub mod retry;
pub mod telemetry;
