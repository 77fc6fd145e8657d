//! Completion tracking: which documents already have a durable artifact.
//!
//! The output directory is the only state. A document is complete when its
//! final artifact exists and is non-empty; there is no journal to keep in
//! sync. Writes go through a staging file that is fsynced and then renamed
//! over the final name, so a crash at any point leaves either the previous
//! state or the finished artifact, never a truncated file under the final
//! name.
//!
//! ```text
//! out/
//!   letters%2Fa.pdf.txt          complete
//!   .letters%2Fb.pdf.txt.tmp     staged, crash before commit: not complete
//!   scans%2Fc.partial            some pages failed: not complete
//! ```
//!
//! The three suffixes never overlap and [`DocumentId::artifact_name`] is
//! one-to-one, so no two documents share any of these files.

use crate::document::DocumentId;
use crate::error::PersistenceError;
use crate::output::DocumentArtifact;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Records and answers which documents are done.
pub trait WorkUnitTracker: Send + Sync {
    /// True when a non-empty final artifact exists for `document`.
    fn is_complete(&self, document: &DocumentId) -> bool;

    /// Durably write `artifact` to a staging location. Does not make the
    /// document complete.
    fn stage(&self, artifact: &DocumentArtifact) -> Result<(), PersistenceError>;

    /// Atomically promote the staged artifact to its final name.
    fn mark_complete(&self, document: &DocumentId) -> Result<PathBuf, PersistenceError>;

    /// Persist an artifact with failed pages without marking it complete.
    fn record_partial(&self, artifact: &DocumentArtifact) -> Result<PathBuf, PersistenceError>;

    /// Text of an earlier partial artifact, if one exists.
    fn load_partial(&self, document: &DocumentId) -> Option<String>;
}

/// [`WorkUnitTracker`] backed by artifact files in one output directory.
#[derive(Debug, Clone)]
pub struct FsTracker {
    root: PathBuf,
}

impl FsTracker {
    /// Track artifacts under `root`. The directory must already exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, document: &DocumentId) -> PathBuf {
        self.root.join(format!("{}.txt", document.artifact_name()))
    }

    pub fn partial_path(&self, document: &DocumentId) -> PathBuf {
        self.root.join(format!("{}.partial", document.artifact_name()))
    }

    fn staging_path(&self, document: &DocumentId) -> PathBuf {
        self.root.join(format!(".{}.txt.tmp", document.artifact_name()))
    }

    fn sync_root(&self) {
        // Persists the rename itself; not every platform allows opening a
        // directory, so failure here is ignored.
        if let Ok(dir) = File::open(&self.root) {
            let _ = dir.sync_all();
        }
    }
}

/// Create `path`, write `text`, and fsync before returning.
fn write_synced(path: &Path, text: &str) -> Result<(), PersistenceError> {
    let mut file = File::create(path).map_err(|e| PersistenceError::new(path, e))?;
    file.write_all(text.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| PersistenceError::new(path, e))
}

impl WorkUnitTracker for FsTracker {
    fn is_complete(&self, document: &DocumentId) -> bool {
        fs::metadata(self.artifact_path(document))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    fn stage(&self, artifact: &DocumentArtifact) -> Result<(), PersistenceError> {
        let staging = self.staging_path(&artifact.document);
        write_synced(&staging, &artifact.text)?;
        debug!(document = %artifact.document, "Staged {}", staging.display());
        Ok(())
    }

    fn mark_complete(&self, document: &DocumentId) -> Result<PathBuf, PersistenceError> {
        let staging = self.staging_path(document);
        let final_path = self.artifact_path(document);
        fs::rename(&staging, &final_path).map_err(|e| PersistenceError::new(&final_path, e))?;
        self.sync_root();

        let partial = self.partial_path(document);
        if partial.exists() {
            fs::remove_file(&partial).map_err(|e| PersistenceError::new(&partial, e))?;
        }
        debug!(document = %document, "Committed {}", final_path.display());
        Ok(final_path)
    }

    fn record_partial(&self, artifact: &DocumentArtifact) -> Result<PathBuf, PersistenceError> {
        let staging = self.staging_path(&artifact.document);
        let partial = self.partial_path(&artifact.document);
        write_synced(&staging, &artifact.text)?;
        fs::rename(&staging, &partial).map_err(|e| PersistenceError::new(&partial, e))?;
        self.sync_root();
        Ok(partial)
    }

    fn load_partial(&self, document: &DocumentId) -> Option<String> {
        fs::read_to_string(self.partial_path(document)).ok()
    }
}
