//! Install-side snippet handling. Conflict detection is path-existence only:
//! a snippet whose path is free is written; one whose path already exists is
//! classified and handed back with its content grouped by strategy, so the
//! caller can merge or append as it sees fit.

use std::path::Path;

use serde::Serialize;

use super::{CodeSnippet, SnippetStrategy};

#[derive(Debug, Default, Serialize)]
pub struct SnippetReport {
    /// Paths written to the target directory.
    pub created: Vec<String>,
    /// Snippets whose paths already existed, grouped with their content.
    pub conflicted: Vec<ConflictedSnippet>,
}

#[derive(Debug, Serialize)]
pub struct ConflictedSnippet {
    pub path: String,
    pub strategy: SnippetStrategy,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub fn materialize_snippets(
    target_dir: &Path,
    snippets: &[CodeSnippet],
) -> std::io::Result<SnippetReport> {
    let mut report = SnippetReport::default();

    for snippet in snippets {
        let path = target_dir.join(&snippet.path);
        if path.exists() {
            report.conflicted.push(ConflictedSnippet {
                path: snippet.path.clone(),
                strategy: snippet.strategy,
                content: snippet.content.clone(),
                description: snippet.description.clone(),
            });
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &snippet.content)?;
        report.created.push(snippet.path.clone());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(path: &str, content: &str, strategy: SnippetStrategy) -> CodeSnippet {
        CodeSnippet {
            path: path.into(),
            content: content.into(),
            strategy,
            description: None,
        }
    }

    #[test]
    fn free_paths_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let report = materialize_snippets(
            dir.path(),
            &[snippet("src/lib/stripe.ts", "export {}", SnippetStrategy::Create)],
        )
        .unwrap();

        assert_eq!(report.created, vec!["src/lib/stripe.ts"]);
        assert!(report.conflicted.is_empty());
        let written = std::fs::read_to_string(dir.path().join("src/lib/stripe.ts")).unwrap();
        assert_eq!(written, "export {}");
    }

    #[test]
    fn existing_paths_are_classified_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "original").unwrap();

        let report = materialize_snippets(
            dir.path(),
            &[snippet("README.md", "replacement", SnippetStrategy::Merge)],
        )
        .unwrap();

        assert!(report.created.is_empty());
        assert_eq!(report.conflicted.len(), 1);
        assert_eq!(report.conflicted[0].path, "README.md");
        assert_eq!(report.conflicted[0].strategy, SnippetStrategy::Merge);
        assert_eq!(report.conflicted[0].content, "replacement");
        // Original file untouched.
        let on_disk = std::fs::read_to_string(dir.path().join("README.md")).unwrap();
        assert_eq!(on_disk, "original");
    }

    #[test]
    fn mixed_batch_is_split() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("existing.ts"), "x").unwrap();

        let report = materialize_snippets(
            dir.path(),
            &[
                snippet("existing.ts", "y", SnippetStrategy::Append),
                snippet("fresh.ts", "z", SnippetStrategy::Create),
            ],
        )
        .unwrap();

        assert_eq!(report.created, vec!["fresh.ts"]);
        assert_eq!(report.conflicted.len(), 1);
    }
}
