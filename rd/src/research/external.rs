//! User-uploaded external files
//!
//! Stored verbatim under the research's `_ExternalFiles/` directory and
//! exposed to the interface as external artifacts. Commands never mutate
//! them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use eyre::Result;
use tracing::{debug, warn};

use crate::store::{create_dir_all, read_to_string, write_file};

use super::artifact::Artifact;

pub const EXTERNAL_FILES_DIR: &str = "_ExternalFiles";

#[derive(Debug)]
pub struct ExternalFilesManager {
    dir: PathBuf,
    files: Mutex<BTreeMap<String, String>>,
}

impl ExternalFilesManager {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: Mutex::new(BTreeMap::new()),
        }
    }

    /// Read every file in `_ExternalFiles/` into memory.
    pub fn load_external_files(&self) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        let mut files = self.files.lock().expect("external files lock poisoned");
        for path in entries.filter_map(|e| e.ok().map(|e| e.path())) {
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().unwrap_or_default().to_string_lossy().to_string();
            match read_to_string(&path) {
                Ok(content) => {
                    files.insert(name, content);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable external file"),
            }
        }
        debug!(count = files.len(), "external files loaded");
    }

    /// Store an uploaded file verbatim.
    pub fn add_external_file(&self, name: &str, content: &str) -> Result<()> {
        create_dir_all(&self.dir)?;
        write_file(&self.dir.join(name), content)?;
        self.files
            .lock()
            .expect("external files lock poisoned")
            .insert(name.to_string(), content.to_string());
        Ok(())
    }

    /// External files as read-only artifacts for interface rendering.
    pub fn as_artifacts(&self) -> Vec<Artifact> {
        self.files
            .lock()
            .expect("external files lock poisoned")
            .iter()
            .map(|(name, content)| Artifact::external(name.clone(), content.clone(), self.dir.join(name)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_add_and_reload() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(EXTERNAL_FILES_DIR);

        let manager = ExternalFilesManager::new(dir.clone());
        manager.add_external_file("notes.txt", "raw content").unwrap();
        assert!(dir.join("notes.txt").exists());

        let reloaded = ExternalFilesManager::new(dir);
        reloaded.load_external_files();
        let artifacts = reloaded.as_artifacts();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "notes.txt");
        assert_eq!(artifacts[0].content, "raw content");
        assert!(artifacts[0].is_external);
    }
}
