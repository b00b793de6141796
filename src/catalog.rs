//! Prompt catalog: the fixed set of "most likely to..." questions.

use crate::types::Prompt;
use serde::Deserialize;
use std::path::Path;

const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    ("Who is most likely to become famous?", "future"),
    ("Who is most likely to survive a zombie apocalypse?", "survival"),
    ("Who is most likely to forget their own birthday?", "silly"),
    ("Who is most likely to become a millionaire?", "future"),
    ("Who is most likely to get lost in their own neighbourhood?", "silly"),
    ("Who is most likely to start a band?", "hobbies"),
    ("Who is most likely to adopt ten cats?", "silly"),
    ("Who is most likely to move to another country on a whim?", "future"),
    ("Who is most likely to win a reality TV show?", "fame"),
    ("Who is most likely to cry at a commercial?", "feelings"),
];

/// A catalog entry as written in a prompts file
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    text: String,
    #[serde(default = "default_category")]
    category: String,
}

fn default_category() -> String {
    "general".to_string()
}

/// Errors that can occur while loading a catalog file
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read prompts file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse prompts file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Prompts file contains no prompts")]
    Empty,
}

/// Build prompts whose creation times descend in list order, so the
/// newest-first listing reproduces the order given here.
fn build(entries: impl IntoIterator<Item = (String, String)>) -> Vec<Prompt> {
    let base = chrono::Utc::now();
    entries
        .into_iter()
        .enumerate()
        .map(|(i, (text, category))| Prompt {
            id: ulid::Ulid::new().to_string(),
            text,
            category,
            created_at: (base - chrono::Duration::seconds(i as i64)).to_rfc3339(),
        })
        .collect()
}

pub fn builtin() -> Vec<Prompt> {
    build(
        BUILTIN_PROMPTS
            .iter()
            .map(|(text, category)| (text.to_string(), category.to_string())),
    )
}

/// Load a JSON array of `{ "text": ..., "category": ... }` entries
pub fn load(path: &Path) -> Result<Vec<Prompt>, CatalogError> {
    let raw = std::fs::read_to_string(path)?;
    let entries: Vec<CatalogEntry> = serde_json::from_str(&raw)?;

    let entries: Vec<_> = entries
        .into_iter()
        .map(|e| (e.text.trim().to_string(), e.category))
        .filter(|(text, _)| !text.is_empty())
        .collect();
    if entries.is_empty() {
        return Err(CatalogError::Empty);
    }
    Ok(build(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_catalog_is_newest_first_in_list_order() {
        let prompts = builtin();
        assert_eq!(prompts.len(), BUILTIN_PROMPTS.len());
        assert!(prompts
            .windows(2)
            .all(|w| w[0].created_at > w[1].created_at));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"text": "Who is most likely to sing karaoke?", "category": "party"}},
               {{"text": "  "}},
               {{"text": "Who is most likely to bake bread?"}}]"#
        )
        .unwrap();

        let prompts = load(file.path()).unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].category, "party");
        assert_eq!(prompts[1].category, "general");
    }

    #[test]
    fn test_load_rejects_empty_catalog() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        assert!(matches!(load(file.path()), Err(CatalogError::Empty)));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(load(file.path()), Err(CatalogError::Parse(_))));
    }
}
