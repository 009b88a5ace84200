//! Indexing pipeline orchestration
//!
//! One run moves through fixed phases: sync the content repository,
//! detect changes against the indexing history, reconcile each change,
//! then report. Files are isolated from each other: a failure on one file
//! is recorded in the report and the run continues, while a sync failure
//! aborts before anything is touched.

use crate::config::Config;
use crate::detect::detect_changes;
use crate::embed::{Embedder, RetryPolicy, Sleeper};
use crate::error::{Error, Result};
use crate::models::ActionKind;
use crate::reconcile::reconcile_change;
use crate::scan::scan_corpus;
use crate::stats::ChunkStats;
use crate::store::IndexStore;
use crate::sync::sync_repository;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Phases of one indexing run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Syncing,
    Detecting,
    Processing,
    Reporting,
    Done,
}

/// Summary of one indexing run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    /// Files present but rejected by glob/size rules
    pub skipped: usize,
    pub failed: usize,
    /// Aggregate statistics over all chunks created this run
    pub stats: ChunkStats,
    /// Paths that failed with their error messages
    pub failures: Vec<(String, String)>,
}

impl RunReport {
    pub fn processed(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

/// Everything one indexing run needs, assembled once at startup.
pub struct RunContext {
    pub config: Config,
    pub store: Arc<dyn IndexStore>,
    pub embedder: Arc<dyn Embedder>,
    pub sleeper: Arc<dyn Sleeper>,
    pub policy: RetryPolicy,
    /// Hide the progress bar (scheduled runs, tests)
    pub quiet: bool,
}

impl RunContext {
    /// Execute one full indexing run.
    ///
    /// Holds the store's run lock for the duration; a second concurrent
    /// run fails fast with `Error::RunLocked`.
    pub async fn run(&self) -> Result<RunReport> {
        if !self.store.try_acquire_run_lock().await? {
            return Err(Error::RunLocked);
        }
        let result = self.run_locked().await;
        if let Err(e) = self.store.release_run_lock().await {
            warn!("Failed to release run lock: {e}");
        }
        if result.is_ok() {
            info!(phase = ?RunPhase::Done, "Run finished");
        }
        result
    }

    async fn run_locked(&self) -> Result<RunReport> {
        let mut phase = RunPhase::Syncing;
        info!(phase = ?phase, "Starting indexing run");
        sync_repository(&self.config.indexer).await?;

        phase = RunPhase::Detecting;
        info!(phase = ?phase, "Scanning corpus");
        let current = scan_corpus(&self.config.indexer)?;
        let history = self.store.indexed_hashes().await?;
        let changes = detect_changes(&current, &history);

        let mut report = RunReport {
            skipped: current.skipped.len(),
            ..RunReport::default()
        };
        if changes.is_empty() {
            info!(files = current.files.len(), "No changes detected");
        } else {
            phase = RunPhase::Processing;
            info!(
                phase = ?phase,
                changes = changes.len(),
                files = current.files.len(),
                "Changes detected"
            );
            let progress = if self.quiet {
                ProgressBar::hidden()
            } else {
                let bar = ProgressBar::new(changes.len() as u64);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
                );
                bar
            };

            for change in &changes {
                progress.set_message(format!("{} {}", change.kind, change.file_path));
                match reconcile_change(
                    self.store.as_ref(),
                    self.embedder.as_ref(),
                    self.sleeper.as_ref(),
                    &self.policy,
                    &self.config,
                    change,
                )
                .await
                {
                    Ok(outcome) => {
                        match change.kind {
                            ActionKind::Add => report.added += 1,
                            ActionKind::Modify => report.modified += 1,
                            ActionKind::Delete => report.deleted += 1,
                        }
                        report.stats.merge(&outcome.stats);
                    }
                    Err(e) => {
                        error!(file = %change.file_path, "Reconciliation failed: {e}");
                        report.failed += 1;
                        report.failures.push((change.file_path.clone(), e.to_string()));
                    }
                }
                progress.inc(1);
            }
            progress.finish_and_clear();
        }

        phase = RunPhase::Reporting;
        info!(
            phase = ?phase,
            added = report.added,
            modified = report.modified,
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.failed,
            chunks = report.stats.total_chunks,
            words = report.stats.total_words,
            avg_words = format!("{:.1}", report.stats.avg_words),
            api_calls = report.stats.estimated_api_calls,
            "Indexing run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::Sleeper;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "unit-test"
        }
    }

    struct NoopSleeper;

    #[async_trait]
    impl Sleeper for NoopSleeper {
        async fn sleep(&self, _duration: Duration) {}
    }

    fn context(content_dir: std::path::PathBuf) -> RunContext {
        let mut config = Config::default();
        config.indexer.content_dir = content_dir;
        config.chunk.target_words = 40;
        config.chunk.max_words = 100;
        config.chunk.min_words = 3;
        config.chunk.overlap_words = 0;
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        RunContext {
            config,
            store: Arc::new(MemoryStore::new()),
            embedder: Arc::new(UnitEmbedder),
            sleeper: Arc::new(NoopSleeper),
            policy,
            quiet: true,
        }
    }

    /// Writer handing every formatted log line to a shared buffer.
    #[derive(Clone, Default)]
    struct CaptureWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_no_op_run_still_logs_the_summary() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path().to_path_buf());

        let capture = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let report = ctx.run().await.unwrap();
        assert_eq!(report.processed(), 0);

        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("No changes detected"));
        assert!(logs.contains("Indexing run complete"));
    }

    #[tokio::test]
    async fn test_concurrent_run_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path().to_path_buf());

        assert!(ctx.store.try_acquire_run_lock().await.unwrap());
        let err = ctx.run().await.unwrap_err();
        assert!(matches!(err, Error::RunLocked));

        ctx.store.release_run_lock().await.unwrap();
        ctx.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_released_after_failed_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path().join("missing"));
        ctx.config.indexer.repo_url = "file:///nonexistent/repo.git".to_string();

        assert!(ctx.run().await.is_err());
        // A failed run must not leave the lock held.
        assert!(ctx.store.try_acquire_run_lock().await.unwrap());
    }
}
