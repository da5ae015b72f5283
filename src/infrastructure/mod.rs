pub mod db;
pub mod launcher;
pub mod queue;
pub mod storage;
