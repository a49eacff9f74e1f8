//! Research-level permanent log
//!
//! Append-only `[iso-timestamp] line` entries in `_permanent_logs.txt`.
//! Newlines inside an entry collapse to `; ` so each entry stays one line.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use tracing::warn;

use crate::store::read_to_string;

#[derive(Debug)]
pub struct PermanentLogs {
    path: PathBuf,
    entries: Mutex<Vec<String>>,
}

impl PermanentLogs {
    pub fn open(path: PathBuf) -> Self {
        let mut entries = Vec::new();
        if path.exists() {
            match read_to_string(&path) {
                Ok(raw) => {
                    entries = raw.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
                }
                Err(e) => warn!(path = %path.display(), error = %e, "unreadable permanent log"),
            }
        }
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Append a timestamped entry and flush it to disk.
    pub fn add_log(&self, content: &str) {
        let flattened = content.replace('\n', "; ");
        let entry = format!("[{}] {}", Utc::now().to_rfc3339(), flattened);

        let mut entries = self.entries.lock().expect("permanent log lock poisoned");
        entries.push(entry.clone());
        drop(entries);

        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{}", entry));
        if let Err(e) = appended {
            warn!(path = %self.path.display(), error = %e, "failed to append permanent log entry");
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("permanent log lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_entries_are_timestamped_single_lines() {
        let temp = tempdir().unwrap();
        let logs = PermanentLogs::open(temp.path().join("_permanent_logs.txt"));

        logs.add_log("multi\nline\nentry");

        let entries = logs.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with('['));
        assert!(entries[0].contains("multi; line; entry"));
    }

    #[test]
    fn test_reload_preserves_entries() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("_permanent_logs.txt");

        {
            let logs = PermanentLogs::open(path.clone());
            logs.add_log("first");
            logs.add_log("second");
        }

        let reloaded = PermanentLogs::open(path);
        let entries = reloaded.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].contains("first"));
        assert!(entries[1].contains("second"));
    }
}
