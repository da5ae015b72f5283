pub mod ecs;
pub mod process;

pub use ecs::EcsLauncher;
pub use process::ProcessLauncher;
