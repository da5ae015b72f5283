use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch tree (`input/`, `output/`) owned by a single job. Removed on drop.
pub struct LocalWorkspace {
    root: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl LocalWorkspace {
    pub fn create(parent: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(parent)?;
        let root = tempfile::Builder::new().prefix("transcode-").tempdir_in(parent)?;

        let input = root.path().join("input");
        let output = root.path().join("output");
        std::fs::create_dir_all(&input)?;
        std::fs::create_dir_all(&output)?;

        Ok(Self { root, input, output })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn input_dir(&self) -> &Path {
        &self.input
    }

    pub fn output_dir(&self) -> &Path {
        &self.output
    }

    /// Local path for a transient key: its last path segment under `input/`.
    pub fn input_path_for(&self, key: &str) -> Option<PathBuf> {
        let name = key.rsplit('/').next()?;
        if name.is_empty() || name == "." || name == ".." {
            return None;
        }
        Some(self.input.join(name))
    }
}
