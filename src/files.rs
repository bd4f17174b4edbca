//! Path utilities and referenced-file reading.
//!
//! The orchestrator depends on a small capability ("given a user message,
//! try to read the file it references as text") and the platform provides
//! the converters. Text formats are read directly; spreadsheets and word
//! documents go through pluggable converter traits. Everything is bounded
//! by a timeout; a file nobody can convert is simply treated as unreadable.

use crate::error::{CurtainError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Parameter keys recognized as carrying a filesystem path.
pub(crate) const PATH_KEYS: &[&str] = &[
    "path", "file", "filepath", "filename", "dir", "directory", "target", "source",
];

/// Recognized reference extensions: xlsx, xls, csv, txt, docx, json, md.
static FILE_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_\-./~\\]+\.(?:xlsx|xls|csv|txt|docx|json|md)\b")
        .expect("file reference pattern")
});

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let home = home.to_string_lossy();
            return format!("{}{}", home, &path[1..]);
        }
    }
    path.to_string()
}

/// Normalize a path for set-membership comparison: tilde expansion, forward
/// slashes, no `./` prefix, no trailing slash.
pub(crate) fn normalize_path(path: &str) -> String {
    let mut p = expand_tilde(path.trim()).replace('\\', "/");
    while let Some(stripped) = p.strip_prefix("./") {
        p = stripped.to_string();
    }
    while p.len() > 1 && p.ends_with('/') {
        p.pop();
    }
    p
}

/// Recursively collect path-like string values out of tool parameters.
/// Recurses through nested objects but not into arrays.
pub(crate) fn collect_param_paths(params: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_into(params, &mut out);
    out
}

fn collect_into(value: &Value, out: &mut Vec<String>) {
    if let Value::Object(map) = value {
        for (key, inner) in map {
            match inner {
                Value::String(s) if PATH_KEYS.contains(&key.as_str()) => out.push(s.clone()),
                Value::Object(_) => collect_into(inner, out),
                _ => {}
            }
        }
    }
}

/// Extract file references (path-like tokens with a known extension) from a
/// message, in order of appearance.
pub(crate) fn extract_file_references(message: &str) -> Vec<String> {
    FILE_REFERENCE_RE
        .find_iter(message)
        .map(|m| m.as_str().to_string())
        .collect()
}

// ── Converter capabilities ───────────────────────────────────────

/// Converts a spreadsheet file to CSV text.
#[async_trait]
pub trait SpreadsheetConverter: Send + Sync {
    async fn to_csv(&self, path: &Path) -> Result<String>;
}

/// Extracts plain text from a word-processing document.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn to_text(&self, path: &Path) -> Result<String>;
}

/// A file reference successfully resolved and read as text.
#[derive(Debug, Clone)]
pub struct ReferencedFile {
    /// The reference exactly as it appeared in the message.
    pub reference: String,
    /// Resolved absolute or workspace-relative path.
    pub path: PathBuf,
    pub content: String,
}

/// Reads files referenced in user messages, going through converters for
/// non-text formats.
pub struct FileReader {
    spreadsheet: Option<std::sync::Arc<dyn SpreadsheetConverter>>,
    document: Option<std::sync::Arc<dyn DocumentConverter>>,
    timeout: Duration,
}

impl Default for FileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FileReader {
    pub fn new() -> Self {
        Self {
            spreadsheet: None,
            document: None,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_spreadsheet_converter(
        mut self,
        converter: std::sync::Arc<dyn SpreadsheetConverter>,
    ) -> Self {
        self.spreadsheet = Some(converter);
        self
    }

    pub fn with_document_converter(
        mut self,
        converter: std::sync::Arc<dyn DocumentConverter>,
    ) -> Self {
        self.document = Some(converter);
        self
    }

    /// Try to read the first readable file referenced in `message`.
    ///
    /// Relative references resolve against `workspace`. Returns `None` when
    /// nothing is referenced, nothing exists, or no converter succeeds.
    pub async fn try_read_referenced_file(
        &self,
        message: &str,
        workspace: &Path,
    ) -> Option<ReferencedFile> {
        for reference in extract_file_references(message) {
            let expanded = expand_tilde(&reference);
            let mut path = PathBuf::from(&expanded);
            if path.is_relative() {
                path = workspace.join(&path);
            }
            if !path.is_file() {
                continue;
            }
            match self.read_as_text(&path).await {
                Ok(content) => {
                    return Some(ReferencedFile {
                        reference,
                        path,
                        content,
                    })
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "referenced file unreadable: {e}");
                }
            }
        }
        None
    }

    async fn read_as_text(&self, path: &Path) -> Result<String> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let read = async {
            match extension.as_str() {
                "txt" | "csv" | "json" | "md" => tokio::fs::read_to_string(path)
                    .await
                    .map_err(CurtainError::from),
                "xlsx" | "xls" => match &self.spreadsheet {
                    Some(converter) => converter.to_csv(path).await,
                    None => Err(CurtainError::FileRead {
                        path: path.display().to_string(),
                        message: "no spreadsheet converter available".into(),
                    }),
                },
                "docx" => match &self.document {
                    Some(converter) => converter.to_text(path).await,
                    None => Err(CurtainError::FileRead {
                        path: path.display().to_string(),
                        message: "no document converter available".into(),
                    }),
                },
                other => Err(CurtainError::FileRead {
                    path: path.display().to_string(),
                    message: format!("unsupported extension {other:?}"),
                }),
            }
        };

        tokio::time::timeout(self.timeout, read)
            .await
            .map_err(|_| CurtainError::FileRead {
                path: path.display().to_string(),
                message: format!("conversion timed out after {:?}", self.timeout),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_references_in_order() {
        let refs =
            extract_file_references("summarize invoices/Q3.csv and notes.md please");
        assert_eq!(refs, vec!["invoices/Q3.csv", "notes.md"]);
    }

    #[test]
    fn ignores_plain_words() {
        assert!(extract_file_references("just a normal sentence").is_empty());
    }

    #[test]
    fn collects_nested_paths_not_arrays() {
        let params = json!({
            "path": "/tmp/a.txt",
            "options": {"target": "~/b.csv"},
            "list": [{"file": "ignored.txt"}],
            "count": 3
        });
        let mut paths = collect_param_paths(&params);
        paths.sort();
        assert_eq!(paths, vec!["/tmp/a.txt", "~/b.csv"]);
    }

    #[test]
    fn normalize_strips_dots_and_slashes() {
        assert_eq!(normalize_path("./invoices/Q3.csv"), "invoices/Q3.csv");
        assert_eq!(normalize_path("a/b/"), "a/b");
        assert_eq!(normalize_path("a\\b.txt"), "a/b.txt");
    }

    #[tokio::test]
    async fn reads_text_file_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("invoices")).unwrap();
        std::fs::write(dir.path().join("invoices/Q3.csv"), "a,b,c").unwrap();

        let reader = FileReader::new();
        let found = reader
            .try_read_referenced_file("summarize invoices/Q3.csv", dir.path())
            .await
            .unwrap();
        assert_eq!(found.reference, "invoices/Q3.csv");
        assert_eq!(found.content, "a,b,c");
    }

    #[tokio::test]
    async fn spreadsheet_without_converter_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sheet.xlsx"), b"binary").unwrap();

        let reader = FileReader::new();
        let found = reader
            .try_read_referenced_file("open sheet.xlsx", dir.path())
            .await;
        assert!(found.is_none());
    }
}
