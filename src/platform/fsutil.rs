//! Small filesystem and wall-clock utilities.

use std::path::{Path, PathBuf};

use crate::GrackleResult;

/// A per-session temp directory, removed on drop unless kept. Workers place
/// their trace, captured streams, and stats record here.
#[derive(Debug)]
pub struct TmpDir {
    path: PathBuf,
    keep: bool,
}

impl TmpDir {
    pub fn create(base: &Path) -> GrackleResult<Self> {
        let path = base.join(format!(
            "grackle-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path, keep: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarms cleanup, e.g. when the user asked to inspect artifacts.
    pub fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for TmpDir {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

/// `foo.trace` -> `foo.min.trace`; other names get `.min.trace` appended.
pub fn default_min_trace_path(input: &Path) -> PathBuf {
    let parent = input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("repro.trace");

    let out_name = if let Some(stem) = file_name.strip_suffix(".trace") {
        format!("{stem}.min.trace")
    } else {
        format!("{file_name}.min.trace")
    };

    parent.join(out_name)
}

/// Metadata timestamps (session start/end), never an input to deterministic
/// execution decisions.
pub fn wall_time_iso_utc() -> String {
    let now = std::time::SystemTime::now();
    let dt: time::OffsetDateTime = now.into();
    dt.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
