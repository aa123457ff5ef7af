use std::collections::BTreeSet;
use std::future::Future;

use color_eyre::eyre::Result;
use serde::Serialize;

use crate::services::pacing::Pacer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBatch {
    pub ids: Vec<String>,
    pub error: String,
}

/// Outcome of one batched mutation run. Partial success is normal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub action: String,
    pub requested: usize,
    pub dry_run: bool,
    pub succeeded_batches: Vec<Vec<String>>,
    pub failed_batches: Vec<FailedBatch>,
    /// Batches that would have been sent in a dry run.
    pub skipped_batches: Vec<Vec<String>>,
}

impl SyncReport {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn succeeded_ids(&self) -> usize {
        self.succeeded_batches.iter().map(Vec::len).sum()
    }

    pub fn failed_ids(&self) -> usize {
        self.failed_batches.iter().map(|batch| batch.ids.len()).sum()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_batches.is_empty()
    }
}

/// Applies a diff as a sequence of size-bounded, paced mutation calls.
pub struct BatchSyncExecutor<'a> {
    pacer: &'a Pacer,
    batch_size: usize,
    dry_run: bool,
}

impl<'a> BatchSyncExecutor<'a> {
    pub fn new(pacer: &'a Pacer, batch_size: usize) -> Self {
        Self {
            pacer,
            batch_size: batch_size.max(1),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Partition `to_add` into batches and call `mutate_batch` once per batch.
    ///
    /// A failing batch is recorded with its ids and the run moves on to the
    /// next one. Every id lands in exactly one batch.
    pub async fn apply<F, Fut>(
        &self,
        action: &str,
        to_add: &BTreeSet<String>,
        mutate_batch: F,
    ) -> SyncReport
    where
        F: FnMut(Vec<String>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let ids: Vec<String> = to_add.iter().cloned().collect();
        self.apply_in_order(action, &ids, mutate_batch).await
    }

    /// Like [`apply`](Self::apply), but keeps the caller's order and any
    /// repeated ids. Used for playlist contents.
    pub async fn apply_in_order<F, Fut>(
        &self,
        action: &str,
        ids: &[String],
        mut mutate_batch: F,
    ) -> SyncReport
    where
        F: FnMut(Vec<String>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut report = SyncReport {
            requested: ids.len(),
            dry_run: self.dry_run,
            ..SyncReport::new(action)
        };

        let total_batches = ids.len().div_ceil(self.batch_size);

        for (index, chunk) in ids.chunks(self.batch_size).enumerate() {
            let batch = chunk.to_vec();

            if self.dry_run {
                log::info!(
                    "[dry run] {}: batch {}/{} ({} ids)",
                    action,
                    index + 1,
                    total_batches,
                    batch.len()
                );
                report.skipped_batches.push(batch);
                continue;
            }

            log::info!(
                "{}: batch {}/{} ({} ids)",
                action,
                index + 1,
                total_batches,
                batch.len()
            );

            self.pacer.wait().await;
            match mutate_batch(batch.clone()).await {
                Ok(()) => report.succeeded_batches.push(batch),
                Err(e) => {
                    log::error!("{}: batch {} failed: {:#}", action, index + 1, e);
                    report.failed_batches.push(FailedBatch {
                        ids: batch,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        log::info!(
            "{}: {} ids requested, {} succeeded, {} failed",
            action,
            report.requested,
            report.succeeded_ids(),
            report.failed_ids()
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::eyre;
    use std::sync::Mutex;

    fn ids(count: usize) -> BTreeSet<String> {
        (0..count).map(|i| format!("id{i:03}")).collect()
    }

    #[tokio::test]
    async fn test_partitions_into_bounded_batches() {
        let pacer = Pacer::disabled();
        let executor = BatchSyncExecutor::new(&pacer, 50);
        let calls = Mutex::new(Vec::new());

        let report = executor
            .apply("follow artists", &ids(120), |batch| {
                calls.lock().unwrap().push(batch.len());
                async { Ok(()) }
            })
            .await;

        assert_eq!(*calls.lock().unwrap(), vec![50, 50, 20]);
        assert_eq!(report.succeeded_ids(), 120);
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_the_run() {
        let pacer = Pacer::disabled();
        let executor = BatchSyncExecutor::new(&pacer, 2);
        let mut call = 0;

        let report = executor
            .apply("favorite albums", &ids(5), |batch| {
                call += 1;
                let fail = call == 2;
                async move {
                    if fail {
                        Err(eyre!("429 Too Many Requests for {:?}", batch))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(report.succeeded_batches.len(), 2);
        assert_eq!(report.failed_batches.len(), 1);
        assert_eq!(report.failed_batches[0].ids, vec!["id002", "id003"]);
        assert!(report.failed_batches[0].error.contains("429"));
    }

    #[tokio::test]
    async fn test_every_id_in_exactly_one_batch() {
        let pacer = Pacer::disabled();
        for (count, size) in [(0, 3), (1, 1), (7, 3), (9, 3), (10, 100), (101, 100)] {
            let executor = BatchSyncExecutor::new(&pacer, size);
            let to_add = ids(count);
            let mut call = 0;

            let report = executor
                .apply("add", &to_add, |_| {
                    call += 1;
                    let fail = call % 2 == 0;
                    async move { if fail { Err(eyre!("boom")) } else { Ok(()) } }
                })
                .await;

            let mut seen: Vec<String> = report
                .succeeded_batches
                .iter()
                .flatten()
                .chain(report.failed_batches.iter().flat_map(|b| b.ids.iter()))
                .cloned()
                .collect();
            assert!(report.succeeded_batches.iter().all(|b| b.len() <= size));
            seen.sort();
            assert_eq!(seen, to_add.iter().cloned().collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_dry_run_issues_no_calls() {
        let pacer = Pacer::disabled();
        let executor = BatchSyncExecutor::new(&pacer, 2).dry_run(true);
        let mut calls = 0;

        let report = executor
            .apply("follow artists", &ids(3), |_| {
                calls += 1;
                async { Ok(()) }
            })
            .await;

        assert_eq!(calls, 0);
        assert!(report.dry_run);
        assert_eq!(report.skipped_batches.len(), 2);
        assert_eq!(report.succeeded_ids(), 0);
    }

    #[tokio::test]
    async fn test_in_order_keeps_sequence_and_repeats() {
        let pacer = Pacer::disabled();
        let executor = BatchSyncExecutor::new(&pacer, 2);
        let sent = Mutex::new(Vec::new());
        let ids: Vec<String> = ["t3", "t1", "t3"].iter().map(|s| s.to_string()).collect();

        executor
            .apply_in_order("add tracks", &ids, |batch| {
                sent.lock().unwrap().push(batch);
                async { Ok(()) }
            })
            .await;

        assert_eq!(
            *sent.lock().unwrap(),
            vec![vec!["t3".to_string(), "t1".to_string()], vec!["t3".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_clamped() {
        let pacer = Pacer::disabled();
        let executor = BatchSyncExecutor::new(&pacer, 0);
        let report = executor
            .apply("add", &ids(2), |_| async { Ok(()) })
            .await;
        assert_eq!(report.succeeded_batches.len(), 2);
    }
}
