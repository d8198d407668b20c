//! Phase Checkpointing
//!
//! Save and load the phase controller state as JSON so a restarted loop
//! resumes in the same phase with the same exploration rate.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::phase::PhaseState;
use crate::error::Result;

/// JSON checkpoint file for `PhaseState`
#[derive(Debug, Clone)]
pub struct PhaseCheckpointer {
    path: PathBuf,
}

impl PhaseCheckpointer {
    /// Create a checkpointer, creating the parent directory if needed
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    warn!("Failed to create checkpoint directory: {}", e);
                }
            }
        }

        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the state. Goes through a temporary file so a crash never
    /// leaves a truncated checkpoint.
    pub fn save(&self, state: &PhaseState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        debug!(
            path = ?self.path,
            phase = %state.phase,
            ticks = state.ticks,
            "phase checkpoint saved"
        );
        Ok(())
    }

    /// Saved state, or `None` when no checkpoint exists yet
    pub fn load(&self) -> Result<Option<PhaseState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let state: PhaseState = serde_json::from_str(&raw)?;

        info!(
            path = ?self.path,
            phase = %state.phase,
            epsilon = state.epsilon,
            "phase checkpoint loaded"
        );
        Ok(Some(state))
    }

    /// Remove the checkpoint
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            info!(path = ?self.path, "phase checkpoint removed");
        }
        Ok(())
    }
}
