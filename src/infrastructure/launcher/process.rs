use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info};
use uuid::Uuid;

use crate::modules::dispatch::{DispatchError, LaunchRequest, TaskHandle, TaskLauncher};

/// Runs each worker as a local child process. Meant for development against
/// MinIO; network parameters in the request are ignored.
pub struct ProcessLauncher {
    program: String,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl TaskLauncher for ProcessLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<TaskHandle, DispatchError> {
        let task_id = Uuid::new_v4().to_string();

        let mut child = Command::new(&self.program)
            .envs(request.environment)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| DispatchError::Unavailable(format!("failed to start {}: {}", self.program, e)))?;

        let id = task_id.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => info!(task = %id, "✅ Worker finished"),
                Ok(status) => error!(task = %id, "❌ Worker exited with {}", status),
                Err(e) => error!(task = %id, "❌ Failed to wait for worker: {}", e),
            }
        });

        Ok(TaskHandle(task_id))
    }
}
