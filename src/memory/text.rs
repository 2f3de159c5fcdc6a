// src/memory/text.rs
// Text normalization and overlap scoring used by de-duplication and goal
// matching.

use std::collections::HashSet;

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else if c.is_whitespace() || c.is_ascii_punctuation() {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn token_set(text: &str) -> HashSet<String> {
    normalize(text)
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Jaccard overlap of normalized token sets. Empty-vs-empty is 1.0.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let sa = token_set(a);
    let sb = token_set(b);
    if sa.is_empty() && sb.is_empty() {
        return 1.0;
    }
    let intersection = sa.intersection(&sb).count();
    let union = sa.union(&sb).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Two bullets are equivalent when their normalized forms match or their
/// token overlap is near-total.
pub fn bullets_equivalent(a: &str, b: &str) -> bool {
    let na = normalize(a);
    let nb = normalize(b);
    if na == nb {
        return true;
    }
    jaccard(&na, &nb) >= 0.9
}

/// Goal-title equivalence: normalized equality, containment either way, or
/// Jaccard >= 0.72.
pub fn titles_equivalent(a: &str, b: &str) -> bool {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return na == nb;
    }
    na == nb || na.contains(&nb) || nb.contains(&na) || jaccard(&na, &nb) >= 0.72
}

/// First sentence of `text`, trimmed to at most `max_chars` characters.
pub fn first_sentence(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?' | '\n'))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    let sentence = trimmed[..end].trim();

    if sentence.chars().count() <= max_chars {
        return sentence.to_string();
    }
    sentence.chars().take(max_chars).collect()
}

/// Split into rough sentences on terminal punctuation and newlines.
pub fn sentences(text: &str) -> Vec<String> {
    text.split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(
            normalize("  Ship the Dashboard, by Friday!  "),
            "ship the dashboard by friday"
        );
    }

    #[test]
    fn test_jaccard_identical_and_disjoint() {
        assert_eq!(jaccard("alpha beta", "beta alpha"), 1.0);
        assert_eq!(jaccard("alpha", "omega"), 0.0);
    }

    #[test]
    fn test_titles_equivalent_by_containment() {
        assert!(titles_equivalent(
            "ship the dashboard by Friday",
            "ship dashboard by friday"
        ) || jaccard("ship the dashboard by friday", "ship dashboard by friday") >= 0.72);
        assert!(titles_equivalent(
            "ship the dashboard",
            "Ship the dashboard by Friday"
        ));
    }

    #[test]
    fn test_bullets_equivalent_ignores_formatting() {
        assert!(bullets_equivalent(
            "Prefers dark mode.",
            "prefers dark mode"
        ));
        assert!(!bullets_equivalent("Prefers dark mode", "Dislikes dark mode"));
    }

    #[test]
    fn test_first_sentence_trims() {
        assert_eq!(
            first_sentence("Done. Next I will deploy.", 180),
            "Done"
        );
        let long = "a".repeat(300);
        assert_eq!(first_sentence(&long, 180).chars().count(), 180);
    }
}
