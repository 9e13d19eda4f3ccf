//! Filesystem side of an execution: working directory, baseline capture,
//! transform script files and target restoration.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, instrument};

use crate::error::EngineError;

static SCRIPT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Workspace root plus the dedicated working directory inside it.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    work_dir: PathBuf,
}

impl Workspace {
    /// Create the working directory (relative paths resolve against `root`) if absent.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn prepare(root: &Path, work_dir: &Path) -> Result<Self, EngineError> {
        let work_dir = root.join(work_dir);
        fs::create_dir_all(&work_dir)
            .map_err(|err| EngineError::filesystem("create working directory", &work_dir, err))?;
        debug!(work_dir = %work_dir.display(), "working directory ready");
        Ok(Self {
            root: root.to_path_buf(),
            work_dir,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Resolve a target path against the workspace root.
    pub fn resolve_target(&self, target: &Path) -> PathBuf {
        self.root.join(target)
    }

    /// Read the full target content. The target must be UTF-8 text.
    pub fn read_baseline(&self, target: &Path) -> Result<String, EngineError> {
        let bytes = fs::read(target).map_err(|source| EngineError::TargetUnreadable {
            path: target.to_path_buf(),
            source,
        })?;
        String::from_utf8(bytes).map_err(|_| EngineError::TargetNotUtf8 {
            path: target.to_path_buf(),
        })
    }

    /// Write `content` to a freshly named script file inside the working directory.
    pub fn write_new_script(&self, extension: &str, content: &str) -> Result<PathBuf, EngineError> {
        loop {
            let path = self.work_dir.join(fresh_script_name(extension));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(content.as_bytes())
                        .map_err(|err| EngineError::filesystem("write script", &path, err))?;
                    debug!(path = %path.display(), bytes = content.len(), "script written");
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(EngineError::filesystem("create script", &path, err)),
            }
        }
    }

    pub fn overwrite_script(&self, path: &Path, content: &str) -> Result<(), EngineError> {
        fs::write(path, content).map_err(|err| EngineError::filesystem("overwrite script", path, err))
    }

    /// Put the target back to its captured baseline, byte for byte.
    pub fn restore_target(&self, target: &Path, baseline: &str) -> Result<(), EngineError> {
        fs::write(target, baseline)
            .map_err(|err| EngineError::filesystem("restore target", target, err))?;
        debug!(target = %target.display(), "target restored to baseline");
        Ok(())
    }
}

fn fresh_script_name(extension: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let seq = SCRIPT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("transform-{millis}-{seq}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_creates_nested_work_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::prepare(temp.path(), Path::new(".morph/scripts")).expect("prepare");
        assert!(ws.work_dir().is_dir());
        assert!(ws.work_dir().starts_with(temp.path()));
    }

    #[test]
    fn scripts_get_distinct_names() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::prepare(temp.path(), Path::new(".morph")).expect("prepare");
        let a = ws.write_new_script("js", "a").expect("a");
        let b = ws.write_new_script("js", "b").expect("b");
        assert_ne!(a, b);
        assert_eq!(fs::read_to_string(&a).expect("read a"), "a");
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("js"));
    }

    #[test]
    fn baseline_read_and_restore_are_exact() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::prepare(temp.path(), Path::new(".morph")).expect("prepare");
        let target = ws.resolve_target(Path::new("App.jsx"));
        fs::write(&target, "line one\r\nline two\n\n").expect("write");

        let baseline = ws.read_baseline(&target).expect("baseline");
        fs::write(&target, "mangled").expect("mangle");
        ws.restore_target(&target, &baseline).expect("restore");
        assert_eq!(
            fs::read(&target).expect("read"),
            b"line one\r\nline two\n\n".to_vec()
        );
    }

    #[test]
    fn non_utf8_target_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::prepare(temp.path(), Path::new(".morph")).expect("prepare");
        let target = temp.path().join("bin.dat");
        fs::write(&target, [0xff, 0xfe, 0x00]).expect("write");
        assert!(matches!(
            ws.read_baseline(&target),
            Err(EngineError::TargetNotUtf8 { .. })
        ));
        assert!(matches!(
            ws.read_baseline(&temp.path().join("missing.js")),
            Err(EngineError::TargetUnreadable { .. })
        ));
    }
}
