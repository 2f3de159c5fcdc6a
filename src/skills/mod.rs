// src/skills/mod.rs
// Skill catalogue: markdown-with-frontmatter files loaded once at startup,
// scored against the user text to pick an active skill for the system prompt.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub triggers: Vec<String>,
    pub priority: i64,
    pub body: String,
}

impl Skill {
    /// Load a skill from a markdown file
    pub async fn load_from_file(path: PathBuf) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read skill file: {}", path.display()))?;

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid skill file name"))?
            .to_string();

        let (metadata, body) = parse_markdown(&content);

        let name = metadata.get("name").cloned().unwrap_or_else(|| id.clone());
        let description = metadata
            .get("description")
            .cloned()
            .unwrap_or_else(|| "No description".to_string());
        let triggers = metadata
            .get("triggers")
            .map(|v| {
                v.trim_matches(|c| c == '[' || c == ']')
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let priority = metadata
            .get("priority")
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            id,
            name,
            description,
            triggers,
            priority,
            body,
        })
    }

    /// Match score for a user text (already lowercased):
    /// +20 name substring, +10 per trigger hit, +1 per description word
    /// (length >= 3) present in the text.
    pub fn score(&self, normalized_text: &str) -> i64 {
        let mut score = 0;

        if normalized_text.contains(&self.name.to_lowercase()) {
            score += 20;
        }
        for trigger in &self.triggers {
            if normalized_text.contains(&trigger.to_lowercase()) {
                score += 10;
            }
        }
        for word in self.description.to_lowercase().split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.len() >= 3 && normalized_text.contains(word) {
                score += 1;
            }
        }

        score
    }
}

/// Parse markdown with `---`-fenced frontmatter (simple key: value lines).
fn parse_markdown(content: &str) -> (BTreeMap<String, String>, String) {
    let mut metadata = BTreeMap::new();
    let mut body_lines = Vec::new();
    let mut in_frontmatter = false;
    let mut frontmatter_seen = false;

    for line in content.lines() {
        if line.trim() == "---" && !frontmatter_seen {
            if !in_frontmatter {
                in_frontmatter = true;
            } else {
                in_frontmatter = false;
                frontmatter_seen = true;
            }
            continue;
        }

        if in_frontmatter {
            if let Some((key, value)) = line.split_once(':') {
                metadata.insert(key.trim().to_string(), value.trim().to_string());
            }
        } else {
            body_lines.push(line);
        }
    }

    (metadata, body_lines.join("\n").trim().to_string())
}

/// Read-only catalogue, id-keyed.
pub struct SkillCatalogue {
    skills: BTreeMap<String, Skill>,
}

impl SkillCatalogue {
    pub fn empty() -> Self {
        Self {
            skills: BTreeMap::new(),
        }
    }

    /// Load every `*.md` under `dir`. A missing directory is an empty
    /// catalogue, not an error.
    pub async fn load(dir: &Path) -> Self {
        let mut skills = BTreeMap::new();

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => {
                info!("No skills directory at {}, starting empty", dir.display());
                return Self::empty();
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            match Skill::load_from_file(path.clone()).await {
                Ok(skill) => {
                    info!("Loaded skill: {}", skill.id);
                    skills.insert(skill.id.clone(), skill);
                }
                Err(e) => {
                    warn!("Failed to load skill from {}: {}", path.display(), e);
                }
            }
        }

        info!("Loaded {} skills", skills.len());
        Self { skills }
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Highest-scoring skill with score >= 10. Ties break on higher
    /// priority, then lexicographic id.
    pub fn select(&self, user_text: &str) -> Option<&Skill> {
        let normalized = user_text.to_lowercase();

        self.skills
            .values()
            .map(|skill| (skill.score(&normalized), skill))
            .filter(|(score, _)| *score >= 10)
            .max_by(|(sa, a), (sb, b)| {
                sa.cmp(sb)
                    .then(a.priority.cmp(&b.priority))
                    // BTreeMap iterates ids ascending; prefer the earlier id
                    // on a full tie by treating later ids as smaller.
                    .then(b.id.cmp(&a.id))
            })
            .map(|(_, skill)| skill)
    }

    /// One-line-per-skill summary for the system prompt.
    pub fn summary(&self) -> String {
        self.skills
            .values()
            .map(|s| format!("- {}: {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
