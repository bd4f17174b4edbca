//! Agent memory surfaces: a full view for the local model, a clean view for
//! the cloud model.
//!
//! The workspace carries two memory files and two dated-entry directories:
//! `MEMORY-FULL.md` + `memory-full/` (complete, local-only) and `MEMORY.md`
//! + `memory/` (projection, cloud-safe). The clean view is derived, never
//! written to directly by callers: at session end, guard-marked blocks are
//! filtered out of the full view and residual privacy entities redacted.

use crate::desensitize::Desensitizer;
use crate::error::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Cloud-safe memory file.
pub const MEMORY_CLEAN_FILE: &str = "MEMORY.md";
/// Local-only memory file.
pub const MEMORY_FULL_FILE: &str = "MEMORY-FULL.md";
/// Cloud-safe dated-entry directory.
pub const MEMORY_CLEAN_DIR: &str = "memory";
/// Local-only dated-entry directory.
pub const MEMORY_FULL_DIR: &str = "memory-full";

/// Case-insensitive markers whose surrounding block never reaches the clean
/// view.
const GUARD_MARKERS: &[&str] = &["[guard agent]", "guard:", "private context:"];

/// Options for a memory write.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryWriteOptions {
    /// Write a dated entry (`memory*/YYYY-MM-DD.md`) instead of the main file.
    pub daily: bool,
    /// Append instead of overwrite.
    pub append: bool,
}

/// Manages the four memory surfaces under one agent workspace.
pub struct MemoryManager {
    workspace: PathBuf,
    desensitizer: Arc<Desensitizer>,
}

impl MemoryManager {
    pub fn new(workspace: impl Into<PathBuf>, desensitizer: Arc<Desensitizer>) -> Self {
        Self {
            workspace: workspace.into(),
            desensitizer,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// The local-only memory file, a protected root for the guard.
    pub fn full_memory_file(&self) -> PathBuf {
        self.workspace.join(MEMORY_FULL_FILE)
    }

    /// The local-only dated-entry directory, a protected root for the guard.
    pub fn full_memory_dir(&self) -> PathBuf {
        self.workspace.join(MEMORY_FULL_DIR)
    }

    fn file_path(&self, is_cloud: bool) -> PathBuf {
        self.workspace.join(if is_cloud {
            MEMORY_CLEAN_FILE
        } else {
            MEMORY_FULL_FILE
        })
    }

    fn dir_path(&self, is_cloud: bool) -> PathBuf {
        self.workspace.join(if is_cloud {
            MEMORY_CLEAN_DIR
        } else {
            MEMORY_FULL_DIR
        })
    }

    /// Create the workspace and both dated-entry directories.
    pub async fn initialize_directories(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.dir_path(false)).await?;
        tokio::fs::create_dir_all(self.dir_path(true)).await?;
        Ok(())
    }

    /// Write to the full (`is_cloud = false`) or clean (`is_cloud = true`)
    /// memory surface. Returns the path written.
    pub async fn write_memory(
        &self,
        content: &str,
        is_cloud: bool,
        options: MemoryWriteOptions,
    ) -> Result<PathBuf> {
        let path = if options.daily {
            let day = Local::now().format("%Y-%m-%d");
            self.dir_path(is_cloud).join(format!("{day}.md"))
        } else {
            self.file_path(is_cloud)
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if options.append {
            let mut existing = match tokio::fs::read_to_string(&path).await {
                Ok(existing) => existing,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(e.into()),
            };
            if !existing.is_empty() && !existing.ends_with('\n') {
                existing.push('\n');
            }
            existing.push_str(content);
            tokio::fs::write(&path, existing).await?;
        } else {
            tokio::fs::write(&path, content).await?;
        }
        Ok(path)
    }

    /// Read the full or clean memory surface. Missing files read empty.
    pub async fn read_memory(&self, is_cloud: bool, daily: bool) -> Result<String> {
        let path = if daily {
            let day = Local::now().format("%Y-%m-%d");
            self.dir_path(is_cloud).join(format!("{day}.md"))
        } else {
            self.file_path(is_cloud)
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Derive the clean memory from the full memory: drop guard-marked
    /// blocks, redact residual entities, write the result. Dated entries
    /// are projected the same way, file by file.
    pub async fn sync_full_to_clean(&self) -> Result<()> {
        let full = self.read_memory(false, false).await?;
        if !full.is_empty() {
            let filtered = strip_guard_blocks(&full);
            let outcome = self.desensitizer.desensitize(&filtered).await;
            tokio::fs::write(self.file_path(true), outcome.text).await?;
            tracing::debug!(model_used = outcome.model_used, "memory file synced to clean");
        }

        let full_dir = self.dir_path(false);
        let mut entries = match tokio::fs::read_dir(&full_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let clean_dir = self.dir_path(true);
        tokio::fs::create_dir_all(&clean_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if !name.to_string_lossy().ends_with(".md") {
                continue;
            }
            let content = tokio::fs::read_to_string(entry.path()).await?;
            let filtered = strip_guard_blocks(&content);
            let outcome = self.desensitizer.desensitize(&filtered).await;
            tokio::fs::write(clean_dir.join(name), outcome.text).await?;
        }
        Ok(())
    }
}

/// Remove every line containing a guard marker together with its indented
/// continuation lines, up to (but not including) the next blank line or
/// `#` header. Top-level lines that merely follow a marker are kept.
pub(crate) fn strip_guard_blocks(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut skipping = false;

    for line in text.lines() {
        let lower = line.to_lowercase();
        if GUARD_MARKERS.iter().any(|m| lower.contains(m)) {
            skipping = true;
            continue;
        }
        if skipping {
            let trimmed = line.trim();
            let boundary = trimmed.is_empty() || trimmed.starts_with('#');
            if !boundary && (line.starts_with(' ') || line.starts_with('\t')) {
                continue;
            }
            skipping = false;
        }
        output.push_str(line);
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path) -> MemoryManager {
        MemoryManager::new(dir, Arc::new(Desensitizer::new(None)))
    }

    #[test]
    fn guard_marker_line_dropped_top_level_kept() {
        let full = "# Log\n[Guard Agent] user asked about payslip\nregular note\n";
        assert_eq!(strip_guard_blocks(full), "# Log\nregular note\n");
    }

    #[test]
    fn indented_continuation_dropped_until_boundary() {
        let text = "keep\nguard: payroll numbers\n  salary 80000\n  bonus 9000\n# Next\nkeep too\n";
        assert_eq!(strip_guard_blocks(text), "keep\n# Next\nkeep too\n");

        let with_break = "keep\nguard: secret\n  detail\n\nafter blank\n";
        assert_eq!(strip_guard_blocks(with_break), "keep\n\nafter blank\n");
    }

    #[test]
    fn guard_markers_case_insensitive() {
        let text = "keep\nPRIVATE CONTEXT: payroll numbers\nstill kept\n";
        assert_eq!(strip_guard_blocks(text), "keep\nstill kept\n");
    }

    #[tokio::test]
    async fn sync_filters_and_redacts() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.initialize_directories().await.unwrap();
        manager
            .write_memory(
                "# Log\nguard: user shared password=hunter2\n\nnote with password=hunter2\n",
                false,
                MemoryWriteOptions::default(),
            )
            .await
            .unwrap();

        manager.sync_full_to_clean().await.unwrap();

        let clean = manager.read_memory(true, false).await.unwrap();
        assert!(clean.contains("note with"));
        assert!(!clean.contains("hunter2"), "residue must be redacted: {clean}");
        assert!(!clean.to_lowercase().contains("guard:"));
    }

    #[tokio::test]
    async fn sync_projects_dated_entries() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.initialize_directories().await.unwrap();
        manager
            .write_memory(
                "daily note\n[guard agent] hidden\n",
                false,
                MemoryWriteOptions {
                    daily: true,
                    append: false,
                },
            )
            .await
            .unwrap();

        manager.sync_full_to_clean().await.unwrap();

        let clean_daily = manager.read_memory(true, true).await.unwrap();
        assert!(clean_daily.contains("daily note"));
        assert!(!clean_daily.contains("hidden"));
    }

    #[tokio::test]
    async fn append_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let options = MemoryWriteOptions {
            daily: false,
            append: true,
        };
        manager.write_memory("first", false, options).await.unwrap();
        manager.write_memory("second", false, options).await.unwrap();
        let full = manager.read_memory(false, false).await.unwrap();
        assert_eq!(full, "first\nsecond");
    }

    #[tokio::test]
    async fn missing_memory_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert_eq!(manager.read_memory(true, false).await.unwrap(), "");
    }
}
