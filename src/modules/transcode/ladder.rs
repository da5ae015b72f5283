use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LadderError {
    #[error("ladder must contain at least one rung")]
    Empty,
    #[error("invalid rung name '{0}': use letters, digits, '-' or '_'")]
    InvalidName(String),
    #[error("duplicate rung name '{0}'")]
    DuplicateName(String),
    #[error("rung '{0}' has a zero dimension or bandwidth")]
    ZeroValue(String),
    #[error("malformed ladder: {0}")]
    Malformed(String),
}

/// One target encode. Immutable once the ladder is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rung {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bandwidth: u64,
}

impl Rung {
    pub fn new(name: &str, width: u32, height: u32, bandwidth: u64) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            bandwidth,
        }
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Ordered set of rungs. Order only affects master manifest presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionLadder {
    rungs: Vec<Rung>,
}

impl ResolutionLadder {
    pub fn new(rungs: Vec<Rung>) -> Result<Self, LadderError> {
        if rungs.is_empty() {
            return Err(LadderError::Empty);
        }

        let mut seen = std::collections::HashSet::new();
        for rung in &rungs {
            let valid_name = !rung.name.is_empty()
                && rung
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid_name {
                return Err(LadderError::InvalidName(rung.name.clone()));
            }
            if !seen.insert(rung.name.as_str()) {
                return Err(LadderError::DuplicateName(rung.name.clone()));
            }
            if rung.width == 0 || rung.height == 0 || rung.bandwidth == 0 {
                return Err(LadderError::ZeroValue(rung.name.clone()));
            }
        }

        Ok(Self { rungs })
    }

    /// Parses a JSON array of `{name, width, height, bandwidth}` objects.
    pub fn from_json(json: &str) -> Result<Self, LadderError> {
        let rungs: Vec<Rung> =
            serde_json::from_str(json).map_err(|e| LadderError::Malformed(e.to_string()))?;
        Self::new(rungs)
    }

    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }
}

impl Default for ResolutionLadder {
    fn default() -> Self {
        Self {
            rungs: vec![
                Rung::new("720p", 1280, 720, 3_000_000),
                Rung::new("480p", 854, 480, 1_600_000),
                Rung::new("360p", 640, 360, 800_000),
                Rung::new("144p", 256, 144, 400_000),
            ],
        }
    }
}
