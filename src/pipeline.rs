//! Batch orchestration: one pass over every mod archive in a directory.
//!
//! Each archive goes through
//! `Pending → Extracted → Located → Translated → Repackaged`, or stops early
//! as skipped (no localization file) or failed. Each archive is extracted
//! into its own freshly created scratch directory, which is removed before
//! the next archive starts whatever happens. A failure never stops the batch.

use crate::archive;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::jsonc;
use crate::locator;
use crate::progress::{ProgressEvent, ProgressLevel, ProgressSink};
use crate::translation::{reconcile, KeyDrift, KeyPolicy, Translator};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Settings that shape a run, independent of the translation backend
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Localization file to translate, matched by exact name
    pub source_file: String,
    /// Name of the translated sibling written next to the source file
    pub target_file: String,
    /// Archive extension without the dot, matched case-insensitively
    pub archive_extension: String,
    /// Root under which each archive gets its own scratch directory
    pub scratch_dir: PathBuf,
    pub key_policy: KeyPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&Config::with_api_key(String::new()))
    }
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            source_file: config.source_file.clone(),
            target_file: config.target_file.clone(),
            archive_extension: config.archive_extension.clone(),
            scratch_dir: config.scratch_dir.clone(),
            key_policy: config.key_policy,
        }
    }
}

/// Cooperative cancellation, checked between archives.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Last stage an archive reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStage {
    Pending,
    Extracted,
    Located,
    Translated,
    Repackaged,
}

impl fmt::Display for ArchiveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveStage::Pending => "pending",
            ArchiveStage::Extracted => "extracted",
            ArchiveStage::Located => "located",
            ArchiveStage::Translated => "translated",
            ArchiveStage::Repackaged => "repackaged",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveOutcome {
    Translated {
        output: PathBuf,
        entries: usize,
        /// Key drift tolerated under the best-effort policy
        drift: KeyDrift,
    },
    Skipped {
        reason: String,
    },
    Failed {
        /// Last stage completed before the error
        stage: ArchiveStage,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveReport {
    /// Archive file name
    pub archive: String,
    pub outcome: ArchiveOutcome,
}

/// Result of one batch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub reports: Vec<ArchiveReport>,
    /// True when the run stopped early because cancellation was requested
    pub cancelled: bool,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, ArchiveOutcome::Translated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ArchiveOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ArchiveOutcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn report_for(&self, archive: &str) -> Option<&ArchiveReport> {
        self.reports.iter().find(|r| r.archive == archive)
    }

    fn count(&self, pred: impl Fn(&ArchiveOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Done: {} translated, {} skipped, {} failed",
            self.succeeded(),
            self.skipped(),
            self.failed()
        )?;
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

/// `<stem>_modified.<ext>` for an input archive path
pub fn output_name(archive: &Path) -> String {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match archive.extension() {
        Some(ext) => format!("{}_modified.{}", stem, ext.to_string_lossy()),
        None => format!("{}_modified", stem),
    }
}

pub struct Pipeline {
    translator: Arc<dyn Translator>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(translator: Arc<dyn Translator>, options: PipelineOptions) -> Self {
        Self {
            translator,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Translate every archive in `input_dir` into `output_dir`.
    ///
    /// Only a failure to prepare the scratch or output directory, or to list
    /// `input_dir`, is returned as an error; per-archive failures end up in
    /// the summary.
    pub async fn run(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<RunSummary> {
        let scratch_root = &self.options.scratch_dir;
        let owns_scratch_root = !scratch_root.exists();
        fs::create_dir_all(scratch_root).map_err(|e| PipelineError::filesystem(scratch_root, e))?;
        fs::create_dir_all(output_dir).map_err(|e| PipelineError::filesystem(output_dir, e))?;

        let archives = self.list_archives(input_dir)?;
        sink.report(ProgressEvent::new(
            ProgressLevel::Info,
            None,
            format!(
                "Found {} .{} archives in {}",
                archives.len(),
                self.options.archive_extension,
                input_dir.display()
            ),
        ));

        let mut summary = RunSummary::default();
        let total = archives.len();

        for (index, archive_path) in archives.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                sink.report(ProgressEvent::new(
                    ProgressLevel::Warn,
                    None,
                    format!("Cancelled, {} archives left unprocessed", total - index),
                ));
                break;
            }

            let name = archive_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let report = self
                .run_one(archive_path, &name, index + 1, total, output_dir, sink)
                .await;
            summary.reports.push(report);
        }

        if owns_scratch_root {
            // Leaves the root in place when something else still lives there.
            let _ = fs::remove_dir(scratch_root);
        }

        sink.finished(&summary);
        Ok(summary)
    }

    /// Files in `input_dir` with the archive extension, sorted by name
    fn list_archives(&self, input_dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(input_dir).map_err(|e| PipelineError::filesystem(input_dir, e))?;

        let mut archives = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| PipelineError::filesystem(input_dir, e))?
                .path();
            let matches_ext = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.options.archive_extension));
            if matches_ext && path.is_file() {
                archives.push(path);
            }
        }

        archives.sort();
        Ok(archives)
    }

    async fn run_one(
        &self,
        archive_path: &Path,
        name: &str,
        position: usize,
        total: usize,
        output_dir: &Path,
        sink: &dyn ProgressSink,
    ) -> ArchiveReport {
        sink.report(ProgressEvent::new(
            ProgressLevel::Info,
            Some(name),
            format!("[{}/{}] Processing {}...", position, total, name),
        ));

        let mut stage = ArchiveStage::Pending;
        let outcome = match self.create_scratch(archive_path, name) {
            Ok(scratch) => {
                let result = self
                    .process(archive_path, name, scratch.path(), output_dir, sink, &mut stage)
                    .await;
                let outcome = settle(result, name, stage, sink);
                remove_scratch(scratch, name, sink);
                outcome
            }
            Err(e) => settle(Err(e), name, stage, sink),
        };

        ArchiveReport {
            archive: name.to_string(),
            outcome,
        }
    }

    /// Fresh, uniquely named scratch directory for one archive. Existing
    /// entries under the scratch root are never reused or deleted.
    fn create_scratch(&self, archive_path: &Path, name: &str) -> Result<TempDir> {
        let stem = archive_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let root = &self.options.scratch_dir;

        tempfile::Builder::new()
            .prefix(&format!("{}-", stem))
            .tempdir_in(root)
            .map_err(|e| PipelineError::filesystem(root, e))
    }

    async fn process(
        &self,
        archive_path: &Path,
        name: &str,
        scratch: &Path,
        output_dir: &Path,
        sink: &dyn ProgressSink,
        stage: &mut ArchiveStage,
    ) -> Result<ArchiveOutcome> {
        let report = |level, message: String| {
            sink.report(ProgressEvent::new(level, Some(name), message));
        };

        let stats = archive::extract(archive_path, scratch)?;
        *stage = ArchiveStage::Extracted;
        report(
            ProgressLevel::Info,
            format!(
                "Extracted {} to {} ({} files)",
                name,
                scratch.display(),
                stats.files
            ),
        );
        if stats.skipped_entries > 0 {
            report(
                ProgressLevel::Warn,
                format!(
                    "Ignored {} entries with unsafe paths in {}",
                    stats.skipped_entries, name
                ),
            );
        }

        let Some(source_path) = locator::find(scratch, &self.options.source_file) else {
            let reason = format!("{} not found in {}", self.options.source_file, name);
            report(ProgressLevel::Warn, reason.clone());
            return Ok(ArchiveOutcome::Skipped { reason });
        };
        *stage = ArchiveStage::Located;

        let source = jsonc::read_file(&source_path)?;
        let translated = self.translator.translate(&source).await?;
        let (translated, drift) = reconcile(&source, translated, self.options.key_policy)?;
        if !drift.is_empty() {
            report(
                ProgressLevel::Warn,
                format!(
                    "Key set drift in {} kept source text for {:?} and dropped {:?}",
                    name, drift.missing, drift.extra
                ),
            );
        }

        let target_path = source_path.with_file_name(&self.options.target_file);
        jsonc::write_file(&target_path, &translated)?;
        *stage = ArchiveStage::Translated;
        report(
            ProgressLevel::Info,
            format!("Translated JSON saved to {}", target_path.display()),
        );

        let output = output_dir.join(output_name(archive_path));
        archive::repackage(scratch, &output)?;
        *stage = ArchiveStage::Repackaged;
        report(
            ProgressLevel::Info,
            format!("Translated archive created: {}", output.display()),
        );

        Ok(ArchiveOutcome::Translated {
            output,
            entries: translated.len(),
            drift,
        })
    }
}

/// Turn a per-archive result into its outcome, reporting a failure once.
fn settle(
    result: Result<ArchiveOutcome>,
    name: &str,
    stage: ArchiveStage,
    sink: &dyn ProgressSink,
) -> ArchiveOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            sink.report(ProgressEvent::new(
                ProgressLevel::Error,
                Some(name),
                format!("An error occurred while processing {} ({}): {}", name, stage, e),
            ));
            ArchiveOutcome::Failed {
                stage,
                error: e.to_string(),
            }
        }
    }
}

fn remove_scratch(scratch: TempDir, name: &str, sink: &dyn ProgressSink) {
    let path = scratch.path().to_path_buf();
    let (level, message) = match scratch.close() {
        Ok(()) => (
            ProgressLevel::Info,
            format!("Cleaned up temporary directory: {}", path.display()),
        ),
        Err(e) => (
            ProgressLevel::Warn,
            format!("Failed to remove temporary directory {}: {}", path.display(), e),
        ),
    };
    sink.report(ProgressEvent::new(level, Some(name), message));
}
