// src/memory/store.rs
// Markdown-backed stores. Two layouts share one capability: append a bullet
// unless an equivalent one exists, read everything, replace atomically.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::utils::atomic_write;

use super::text::bullets_equivalent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    Duplicate,
}

/// A markdown file with fixed level-2 sections, each a bullet list.
pub struct SectionedStore {
    path: PathBuf,
    title: String,
    sections: Vec<String>,
}

/// Parsed view of a sectioned file.
#[derive(Debug, Default, Clone)]
pub struct Document {
    /// section -> bullets, in file order
    pub sections: BTreeMap<String, Vec<String>>,
}

impl Document {
    pub fn all_bullets(&self) -> impl Iterator<Item = &String> {
        self.sections.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(|b| b.is_empty())
    }
}

impl SectionedStore {
    pub fn new(path: PathBuf, title: &str, sections: &[&str]) -> Self {
        Self {
            path,
            title: title.to_string(),
            sections: sections.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.iter().any(|s| s == section)
    }

    pub fn default_section(&self) -> &str {
        &self.sections[0]
    }

    /// Parse the file. A missing or unreadable file is an empty document.
    pub async fn load(&self) -> Document {
        let mut doc = Document::default();
        for section in &self.sections {
            doc.sections.insert(section.clone(), Vec::new());
        }

        let Ok(content) = tokio::fs::read_to_string(&self.path).await else {
            return doc;
        };

        let mut current: Option<String> = None;
        for line in content.lines() {
            if let Some(heading) = line.strip_prefix("## ") {
                let heading = heading.trim().to_string();
                doc.sections.entry(heading.clone()).or_default();
                current = Some(heading);
            } else if let Some(bullet) = line.trim().strip_prefix("- ") {
                if let Some(section) = &current {
                    doc.sections
                        .get_mut(section)
                        .expect("section registered above")
                        .push(bullet.trim().to_string());
                }
            }
        }

        doc
    }

    fn render(&self, doc: &Document) -> String {
        let mut out = format!("# {}\n", self.title);

        // Fixed sections first, in declared order; then any extra headings
        // found in the file.
        let mut ordered: Vec<&String> = self.sections.iter().collect();
        for heading in doc.sections.keys() {
            if !self.sections.contains(heading) {
                ordered.push(heading);
            }
        }

        for heading in ordered {
            out.push_str(&format!("\n## {}\n", heading));
            if let Some(bullets) = doc.sections.get(heading) {
                for bullet in bullets {
                    out.push_str(&format!("- {}\n", bullet));
                }
            }
        }
        out
    }

    /// Append `bullet` to `section` unless an equivalent bullet already
    /// exists in any section of this file.
    pub async fn append_unique(&self, section: &str, bullet: &str) -> Result<AppendOutcome> {
        let bullet = bullet.trim();
        if bullet.is_empty() {
            return Ok(AppendOutcome::Duplicate);
        }

        let mut doc = self.load().await;

        if doc.all_bullets().any(|b| bullets_equivalent(b, bullet)) {
            debug!("[MEM] duplicate bullet skipped in {}", self.path.display());
            return Ok(AppendOutcome::Duplicate);
        }

        doc.sections
            .entry(section.to_string())
            .or_default()
            .push(bullet.to_string());

        atomic_write(&self.path, &self.render(&doc))
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        Ok(AppendOutcome::Appended)
    }

    /// Raw file contents, empty when absent.
    pub async fn read_all(&self) -> String {
        tokio::fs::read_to_string(&self.path).await.unwrap_or_default()
    }
}

/// Append-only per-day episodic log.
pub struct EpisodicStore {
    dir: PathBuf,
}

impl EpisodicStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn day_path(&self, date: chrono::NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    /// Append a timestamped entry to today's file unless a normalized match
    /// already exists in it.
    pub async fn append_unique(&self, entry: &str) -> Result<AppendOutcome> {
        let now = chrono::Utc::now();
        let path = self.day_path(now.date_naive());

        let existing = tokio::fs::read_to_string(&path).await.unwrap_or_default();
        let already_there = existing
            .lines()
            .filter_map(|l| l.trim().strip_prefix("- "))
            .map(strip_timestamp)
            .any(|line| bullets_equivalent(line, entry));
        if already_there {
            return Ok(AppendOutcome::Duplicate);
        }

        let mut content = if existing.is_empty() {
            format!("# Episodes {}\n\n", now.format("%Y-%m-%d"))
        } else {
            existing
        };
        content.push_str(&format!("- [{}] {}\n", now.format("%H:%M:%S"), entry.trim()));

        atomic_write(&path, &content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(AppendOutcome::Appended)
    }

    /// Most-recent-first contents of up to `limit` episodic day files,
    /// as (date, contents) pairs.
    pub async fn recent(&self, limit: usize) -> Vec<(String, String)> {
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return Vec::new();
        };

        let mut days: Vec<String> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(stem) = name.strip_suffix(".md") {
                days.push(stem.to_string());
            }
        }
        // YYYY-MM-DD sorts chronologically as text
        days.sort();
        days.reverse();

        let mut out = Vec::new();
        for day in days.into_iter().take(limit) {
            let path = self.dir.join(format!("{}.md", day));
            if let Ok(content) = tokio::fs::read_to_string(&path).await {
                out.push((day, content));
            }
        }
        out
    }
}

fn strip_timestamp(line: &str) -> &str {
    let trimmed = line.trim();
    if trimmed.starts_with('[') {
        if let Some(end) = trimmed.find(']') {
            return trimmed[end + 1..].trim();
        }
    }
    trimmed
}
