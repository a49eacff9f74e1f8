//! Shared knowledge base
//!
//! Repository-global notes keyed by unique title, one markdown file per
//! entry under `Knowledgebase/`. Every research instance in a repository
//! writes to the same store, so mutations are serialized by a mutex.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use eyre::{Result, bail};
use serde_yaml::Value;
use tracing::{debug, warn};

use crate::store::{MarkdownFile, create_dir_all, sanitize_filename};

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeEntry {
    pub title: String,
    pub content: String,
    pub author_node_title: String,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub importance: i64,
    pub confidence: i64,
}

impl KnowledgeEntry {
    pub fn new(title: impl Into<String>, content: impl Into<String>, author_node_title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            author_node_title: author_node_title.into(),
            timestamp: Utc::now(),
            tags: Vec::new(),
            source: None,
            importance: 1,
            confidence: 1,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    fn to_markdown(&self) -> MarkdownFile {
        let mut file = MarkdownFile::new(&self.title, self.content.clone());
        file.set("timestamp", self.timestamp.to_rfc3339());
        file.set("author_node_title", self.author_node_title.clone());
        file.set("tags", self.tags.clone());
        if let Some(source) = &self.source {
            file.set("source", source.clone());
        }
        file.set("importance", self.importance);
        file.set("confidence", self.confidence);
        file
    }

    fn from_markdown(file: &MarkdownFile) -> Self {
        let timestamp = file
            .get_str("timestamp")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let tags = file
            .get("tags")
            .and_then(Value::as_sequence)
            .map(|seq| seq.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            title: file.name().unwrap_or("Untitled Entry").to_string(),
            content: file.content.clone(),
            author_node_title: file.get_str("author_node_title").unwrap_or("unknown author").to_string(),
            timestamp,
            tags,
            source: file.get_str("source").map(str::to_string),
            importance: file.get("importance").and_then(Value::as_i64).unwrap_or(1),
            confidence: file.get("confidence").and_then(Value::as_i64).unwrap_or(1),
        }
    }
}

/// The knowledge store shared by all researches under one repository root
#[derive(Debug)]
pub struct KnowledgeBase {
    dir: PathBuf,
    entries: Mutex<BTreeMap<String, KnowledgeEntry>>,
}

impl KnowledgeBase {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Load every `.md` entry from disk, skipping unreadable files.
    pub fn load_entries(&self) {
        let Ok(dir_entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        let mut entries = self.entries.lock().expect("knowledge base lock poisoned");
        for path in dir_entries.filter_map(|e| e.ok().map(|e| e.path())) {
            if path.extension().is_none_or(|ext| ext != "md") {
                continue;
            }
            match MarkdownFile::load(&path) {
                Ok(file) => {
                    let entry = KnowledgeEntry::from_markdown(&file);
                    entries.insert(entry.title.clone(), entry);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable knowledge entry"),
            }
        }
        debug!(count = entries.len(), "knowledge base loaded");
    }

    fn persist(&self, entry: &KnowledgeEntry) -> Result<()> {
        create_dir_all(&self.dir)?;
        entry.to_markdown().save_in(&self.dir)?;
        Ok(())
    }

    /// Add a new entry. Titles are unique across the repository.
    pub fn add_entry(&self, entry: KnowledgeEntry) -> Result<()> {
        let mut entries = self.entries.lock().expect("knowledge base lock poisoned");
        if entries.contains_key(&entry.title) {
            bail!("Knowledge entry with title '{}' already exists", entry.title);
        }
        self.persist(&entry)?;
        entries.insert(entry.title.clone(), entry);
        Ok(())
    }

    /// Append content to an existing entry, refreshing its timestamp.
    /// Returns false if the title is unknown.
    pub fn append_content(&self, title: &str, content: &str) -> Result<bool> {
        let mut entries = self.entries.lock().expect("knowledge base lock poisoned");
        let Some(entry) = entries.get_mut(title) else {
            return Ok(false);
        };
        entry.content.push_str("\n\n");
        entry.content.push_str(content);
        entry.timestamp = Utc::now();
        let snapshot = entry.clone();
        drop(entries);
        self.persist(&snapshot)?;
        Ok(true)
    }

    /// Rewrite an entry's content, optionally renaming it and replacing its
    /// tags. Returns false if the title is unknown.
    pub fn update_entry(
        &self,
        title: &str,
        new_content: &str,
        new_title: Option<&str>,
        new_tags: Option<Vec<String>>,
    ) -> Result<bool> {
        let mut entries = self.entries.lock().expect("knowledge base lock poisoned");
        let Some(mut entry) = entries.remove(title) else {
            return Ok(false);
        };
        if let Some(new_title) = new_title {
            if entries.contains_key(new_title) {
                entries.insert(entry.title.clone(), entry);
                bail!("Knowledge entry with title '{}' already exists", new_title);
            }
            self.remove_file(title);
            entry.title = new_title.to_string();
        }
        entry.content = new_content.to_string();
        if let Some(tags) = new_tags {
            entry.tags = tags;
        }
        entry.timestamp = Utc::now();
        self.persist(&entry)?;
        entries.insert(entry.title.clone(), entry);
        Ok(true)
    }

    /// Delete an entry and its file. Returns false if the title is unknown.
    pub fn delete_entry(&self, title: &str) -> bool {
        let mut entries = self.entries.lock().expect("knowledge base lock poisoned");
        if entries.remove(title).is_none() {
            return false;
        }
        self.remove_file(title);
        true
    }

    fn remove_file(&self, title: &str) {
        let path = self.dir.join(sanitize_filename(title));
        if path.exists()
            && let Err(e) = std::fs::remove_file(&path)
        {
            warn!(path = %path.display(), error = %e, "failed to delete knowledge entry file");
        }
    }

    pub fn get_entry(&self, title: &str) -> Option<KnowledgeEntry> {
        self.entries.lock().expect("knowledge base lock poisoned").get(title).cloned()
    }

    /// All entries, newest first.
    pub fn entries(&self) -> Vec<KnowledgeEntry> {
        let mut all: Vec<KnowledgeEntry> = self
            .entries
            .lock()
            .expect("knowledge base lock poisoned")
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("knowledge base lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
