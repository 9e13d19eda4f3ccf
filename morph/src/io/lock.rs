//! Per-target execution lock.
//!
//! Two executions mutating the same target would corrupt each other's baseline,
//! so each execution holds `<work_dir>/locks/<sha256(target)>.lock` for its lifetime.
//! A crashed process leaves its lock behind; the file records the owning pid so it can
//! be removed by hand.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::EngineError;

#[derive(Debug)]
pub struct TargetLock {
    path: PathBuf,
}

impl TargetLock {
    pub fn acquire(work_dir: &Path, target: &Path) -> Result<Self, EngineError> {
        let dir = work_dir.join("locks");
        fs::create_dir_all(&dir)
            .map_err(|err| EngineError::filesystem("create lock directory", &dir, err))?;
        let path = dir.join(format!("{}.lock", lock_key(target)));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let owner = format!("pid={}\ntarget={}\n", std::process::id(), target.display());
                if let Err(err) = file.write_all(owner.as_bytes()) {
                    warn!(err = %err, path = %path.display(), "failed to record lock owner");
                }
                debug!(path = %path.display(), "target lock acquired");
                Ok(Self { path })
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(EngineError::TargetBusy {
                target: target.to_path_buf(),
                lock: path,
            }),
            Err(err) => Err(EngineError::filesystem("create lock", &path, err)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(err = %err, path = %self.path.display(), "failed to release target lock");
        }
    }
}

/// Stable key for a target; canonicalised when the file exists so aliases collide.
fn lock_key(target: &Path) -> String {
    let canonical = fs::canonicalize(target).unwrap_or_else(|_| target.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    hex::encode(&digest[..16])
}
