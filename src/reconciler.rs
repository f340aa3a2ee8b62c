// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reconciliation loop
//!
//! Periodically drains the per-domain pending index, self-heals against
//! indexer ground truth and drives execution attempts for everything still
//! pending. Passes never overlap: one logical timer drives sequential
//! passes and a missed tick is skipped, not queued.

use crate::config::ReconcilerConfig;
use crate::executor::TransferExecutor;
use crate::indexer::Indexer;
use crate::metrics::RelayerMetrics;
use crate::retry_with_max_elapsed_time;
use crate::store::{KvStore, TransferStore};
use crate::types::{NewHighestNonce, TransferId, TransferRecord};
use anyhow::anyhow;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Summary of one reconciliation pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Domains with at least one configured asset that were scanned
    pub domains_scanned: usize,
    /// Pending records resolved from the index
    pub examined: usize,
    /// Pending ids dropped because no record resolved
    pub stale_dropped: usize,
    /// Records completed from indexer ground truth
    pub self_healed: usize,
    /// Execution attempts dispatched
    pub dispatched: usize,
    /// Execution attempts that failed
    pub failed: usize,
}

impl PassSummary {
    fn has_work(&self) -> bool {
        self.examined > 0 || self.stale_dropped > 0
    }
}

/// Drives pending transfers toward completion
pub struct Reconciler<K, I, E>
where
    K: KvStore,
    I: Indexer,
    E: TransferExecutor,
{
    store: Arc<TransferStore<K>>,
    indexer: Arc<I>,
    executor: Arc<E>,
    config: ReconcilerConfig,
    metrics: Arc<RelayerMetrics>,
    nonce_tx: broadcast::Sender<NewHighestNonce>,
}

impl<K, I, E> Reconciler<K, I, E>
where
    K: KvStore + 'static,
    I: Indexer + 'static,
    E: TransferExecutor + 'static,
{
    pub fn new(
        store: Arc<TransferStore<K>>,
        indexer: Arc<I>,
        executor: Arc<E>,
        config: ReconcilerConfig,
        metrics: Arc<RelayerMetrics>,
        nonce_tx: broadcast::Sender<NewHighestNonce>,
    ) -> Self {
        Self {
            store,
            indexer,
            executor,
            config,
            metrics,
            nonce_tx,
        }
    }

    /// Run until cancelled. Cancellation is cooperative and observed between
    /// passes, never preempting an in-flight pass.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "[Reconciler] Started: interval={:?}, domains={:?}",
            self.config.poll_interval,
            self.config.configured_domains().collect::<Vec<_>>()
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Reconciler] Cancelled, stopping");
                    break;
                }
                _ = interval.tick() => {}
            }

            match self.run_pass().await {
                Ok(summary) => {
                    self.metrics.reconcile_passes.inc();
                    if summary.has_work() {
                        info!(
                            "[Reconciler] Pass complete: domains={}, examined={}, stale={}, healed={}, dispatched={}, failed={}",
                            summary.domains_scanned,
                            summary.examined,
                            summary.stale_dropped,
                            summary.self_healed,
                            summary.dispatched,
                            summary.failed
                        );
                    } else {
                        debug!("[Reconciler] Pass complete: nothing pending");
                    }
                }
                Err(e) => {
                    // Retryable as a whole: pending state carries over unchanged
                    self.metrics.reconcile_pass_failures.inc();
                    error!("[Reconciler] Pass failed, retrying next wake-up: {:?}", e);
                }
            }
        }
    }

    /// One reconciliation pass
    async fn run_pass(&self) -> anyhow::Result<PassSummary> {
        let mut summary = PassSummary::default();

        // Domains with no configured assets are skipped, no work is possible
        // there, so their pending index is never read.
        let mut pending_ids: Vec<TransferId> = Vec::new();
        let mut seen: HashSet<TransferId> = HashSet::new();
        for domain in self.config.configured_domains() {
            let ids = self.store.get_pending(domain).await?;
            self.metrics
                .pending_transfers
                .with_label_values(&[&domain.to_string()])
                .set(ids.len() as i64);
            summary.domains_scanned += 1;
            for id in ids {
                if seen.insert(id.clone()) {
                    pending_ids.push(id);
                }
            }
        }

        let mut records: Vec<TransferRecord> = Vec::new();
        for id in &pending_ids {
            match self.store.get(id).await? {
                Some(record) if record.is_pending() => records.push(record),
                Some(record) => {
                    debug!(
                        "[Reconciler] {} already {}, nothing to do",
                        id,
                        record.status()
                    );
                }
                None => {
                    summary.stale_dropped += 1;
                    self.metrics.stale_pending_refs.inc();
                    debug!("[Reconciler] Dropping stale pending reference {}", id);
                }
            }
        }
        summary.examined = records.len();

        if records.is_empty() {
            return Ok(summary);
        }

        // One indexer query per pass for everything we resolved; transfers it
        // reports finalized are merged back so the index catches up with
        // ground truth before we dispatch anything.
        let ids: Vec<TransferId> = records.iter().map(|r| r.transfer_id.clone()).collect();
        let finalized = retry_with_max_elapsed_time!(
            self.indexer.get_finalized_transfers(&ids),
            self.config.indexer_retry_duration
        )
        .map_err(|e| anyhow!("indexer unavailable: {:?}", e))??;

        if !finalized.is_empty() {
            let outcome = self.store.merge(finalized).await?;
            summary.self_healed = outcome.stored;
            self.metrics
                .self_healed_transfers
                .inc_by(outcome.stored as u64);
            self.publish_nonce_events(outcome.nonce_events);
        }

        // Dispatch execution for whatever is still pending, exactly once per
        // transfer per pass. Dispatches are independent across ids.
        let mut to_execute: Vec<TransferRecord> = Vec::new();
        for record in records {
            if let Some(current) = self.store.get(&record.transfer_id).await? {
                if current.is_pending() {
                    to_execute.push(current);
                }
            }
        }

        let dispatches = to_execute.into_iter().map(|record| {
            let store = self.store.clone();
            let executor = self.executor.clone();
            let metrics = self.metrics.clone();
            async move {
                metrics.execution_dispatches.inc();
                match executor.execute(&record).await {
                    Ok(()) => {
                        // The on-chain event will drive merge to complete
                        // state and clear the pending entry.
                        debug!("[Reconciler] Dispatched execution for {}", record);
                        false
                    }
                    Err(e) => {
                        let message = e.to_string();
                        match store.save_error(&record.transfer_id, &message).await {
                            Ok(true) => {
                                metrics
                                    .execution_failures
                                    .with_label_values(&["new"])
                                    .inc();
                                warn!(
                                    "[Reconciler] Execution failed for {}: {}",
                                    record.transfer_id, message
                                );
                            }
                            Ok(false) => {
                                metrics
                                    .execution_failures
                                    .with_label_values(&["repeat"])
                                    .inc();
                                debug!(
                                    "[Reconciler] Execution failed again for {}: {}",
                                    record.transfer_id, message
                                );
                            }
                            Err(store_err) => {
                                error!(
                                    "[Reconciler] Failed to record error for {}: {}",
                                    record.transfer_id, store_err
                                );
                            }
                        }
                        true
                    }
                }
            }
        });

        let failures = futures::future::join_all(dispatches).await;
        summary.dispatched = failures.len();
        summary.failed = failures.into_iter().filter(|failed| *failed).count();

        Ok(summary)
    }

    fn publish_nonce_events(&self, events: Vec<NewHighestNonce>) {
        for event in events {
            self.metrics
                .nonce_advances
                .with_label_values(&[&event.domain.to_string()])
                .inc();
            info!("[Reconciler] New highest nonce: {}", event);
            // No subscribers is fine
            let _ = self.nonce_tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DomainConfig;
    use crate::store::MemoryKv;
    use crate::types::TxRef;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn tx_ref(hash: &str) -> TxRef {
        TxRef {
            tx_hash: hash.to_string(),
            block_number: 100,
            timestamp_ms: 1_000_000,
        }
    }

    fn xcalled(id: &str, domain: u32, nonce: u64) -> TransferRecord {
        TransferRecord {
            transfer_id: id.to_string(),
            origin_domain: domain,
            nonce,
            xcall: Some(tx_ref("0xcall")),
            execute: None,
            reconcile: None,
        }
    }

    #[derive(Default)]
    struct MockIndexer {
        /// Records to report as finalized
        finalized: Mutex<Vec<TransferRecord>>,
        /// Ids asked about, one entry per query
        queries: Mutex<Vec<Vec<TransferId>>>,
        /// Fail every query when set
        unavailable: bool,
    }

    #[async_trait]
    impl Indexer for MockIndexer {
        async fn get_finalized_transfers(
            &self,
            ids: &[TransferId],
        ) -> anyhow::Result<Vec<TransferRecord>> {
            if self.unavailable {
                return Err(anyhow!("subgraph down"));
            }
            self.queries.lock().await.push(ids.to_vec());
            let finalized = self.finalized.lock().await;
            Ok(finalized
                .iter()
                .filter(|r| ids.contains(&r.transfer_id))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct MockExecutor {
        executed: Mutex<Vec<TransferId>>,
        fail_with: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TransferExecutor for MockExecutor {
        async fn execute(&self, transfer: &TransferRecord) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.executed.lock().await.push(transfer.transfer_id.clone());
            match &self.fail_with {
                Some(message) => Err(anyhow!("{}", message)),
                None => Ok(()),
            }
        }
    }

    struct Harness {
        store: Arc<TransferStore<Arc<MemoryKv>>>,
        indexer: Arc<MockIndexer>,
        executor: Arc<MockExecutor>,
        reconciler: Reconciler<Arc<MemoryKv>, MockIndexer, MockExecutor>,
        nonce_rx: broadcast::Receiver<NewHighestNonce>,
    }

    fn harness(indexer: MockIndexer, executor: MockExecutor, domains: &[(u32, bool)]) -> Harness {
        crate::init_test_logging();
        let kv = Arc::new(MemoryKv::new());
        let store = Arc::new(TransferStore::new(kv));
        let indexer = Arc::new(indexer);
        let executor = Arc::new(executor);

        let mut config = ReconcilerConfig {
            poll_interval: Duration::from_millis(20),
            indexer_retry_duration: Duration::from_millis(50),
            ..Default::default()
        };
        for (domain, with_assets) in domains {
            let assets = if *with_assets {
                vec!["usdc".to_string()]
            } else {
                Vec::new()
            };
            config.domains.insert(*domain, DomainConfig { assets });
        }

        let (nonce_tx, nonce_rx) = broadcast::channel(64);
        let reconciler = Reconciler::new(
            store.clone(),
            indexer.clone(),
            executor.clone(),
            config,
            Arc::new(RelayerMetrics::new_for_testing()),
            nonce_tx,
        );
        Harness {
            store,
            indexer,
            executor,
            reconciler,
            nonce_rx,
        }
    }

    #[tokio::test]
    async fn test_pass_dispatches_each_pending_transfer_once() {
        let h = harness(MockIndexer::default(), MockExecutor::default(), &[(1234, true)]);
        h.store
            .merge(vec![xcalled("0xaa", 1234, 1), xcalled("0xbb", 1234, 2)])
            .await
            .unwrap();

        let summary = h.reconciler.run_pass().await.unwrap();
        assert_eq!(summary.examined, 2);
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.failed, 0);

        let mut executed = h.executor.executed.lock().await.clone();
        executed.sort();
        assert_eq!(executed, vec!["0xaa", "0xbb"]);
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_asset_domain_is_never_queried() {
        let h = harness(
            MockIndexer::default(),
            MockExecutor::default(),
            &[(1234, true), (9012, false)],
        );
        h.store
            .merge(vec![xcalled("0xaa", 1234, 1), xcalled("0xbb", 9012, 1)])
            .await
            .unwrap();

        let summary = h.reconciler.run_pass().await.unwrap();
        assert_eq!(summary.domains_scanned, 1);

        // Only domain 1234's transfer reaches the indexer and the executor
        let queries = h.indexer.queries.lock().await;
        assert_eq!(*queries, vec![vec!["0xaa".to_string()]]);
        assert_eq!(*h.executor.executed.lock().await, vec!["0xaa"]);
    }

    /// Records every key read from the backing store
    struct SpyKv {
        inner: MemoryKv,
        reads: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl crate::store::KvStore for SpyKv {
        async fn get(&self, key: &str) -> crate::error::StoreResult<Option<String>> {
            self.reads.lock().unwrap().push(key.to_string());
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> crate::error::StoreResult<()> {
            self.inner.set(key, value).await
        }

        async fn scan_prefix(
            &self,
            prefix: &str,
        ) -> crate::error::StoreResult<Vec<(String, String)>> {
            self.inner.scan_prefix(prefix).await
        }
    }

    #[tokio::test]
    async fn test_pending_index_of_zero_asset_domain_is_never_read() {
        crate::init_test_logging();
        let kv = Arc::new(SpyKv {
            inner: MemoryKv::new(),
            reads: std::sync::Mutex::new(Vec::new()),
        });
        let store = Arc::new(TransferStore::new(kv.clone()));
        store
            .merge(vec![xcalled("0xaa", 1234, 1), xcalled("0xbb", 9012, 1)])
            .await
            .unwrap();
        kv.reads.lock().unwrap().clear();

        let mut config = ReconcilerConfig {
            indexer_retry_duration: Duration::from_millis(50),
            ..Default::default()
        };
        config.domains.insert(
            1234,
            DomainConfig {
                assets: vec!["usdc".to_string()],
            },
        );
        config.domains.insert(9012, DomainConfig::default());

        let (nonce_tx, _nonce_rx) = broadcast::channel(64);
        let reconciler = Reconciler::new(
            store,
            Arc::new(MockIndexer::default()),
            Arc::new(MockExecutor::default()),
            config,
            Arc::new(RelayerMetrics::new_for_testing()),
            nonce_tx,
        );
        reconciler.run_pass().await.unwrap();

        let reads = kv.reads.lock().unwrap();
        assert!(reads.iter().any(|k| k == "transfers:pending:1234"));
        assert!(!reads.iter().any(|k| k == "transfers:pending:9012"));
    }

    #[tokio::test]
    async fn test_stale_pending_reference_is_dropped_silently() {
        crate::init_test_logging();
        let kv = Arc::new(MemoryKv::new());
        // A pending index entry with no backing record is stale data
        kv.set("transfers:pending:1234", r#"["0xdead"]"#)
            .await
            .unwrap();

        let store = Arc::new(TransferStore::new(kv));
        assert!(store.get_pending(1234).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execution_failure_recorded_once_and_still_pending() {
        let executor = MockExecutor {
            fail_with: Some("fail".to_string()),
            ..Default::default()
        };
        let h = harness(MockIndexer::default(), executor, &[(1234, true)]);
        h.store.merge(vec![xcalled("0xaa", 1234, 1)]).await.unwrap();

        let summary = h.reconciler.run_pass().await.unwrap();
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.failed, 1);

        assert_eq!(h.store.get_errors("0xaa").await.unwrap(), vec!["fail"]);
        // Pending membership untouched, eligible for retry next pass
        assert_eq!(h.store.get_pending(1234).await.unwrap(), vec!["0xaa"]);

        // Next pass retries, the identical error is not recorded twice
        h.reconciler.run_pass().await.unwrap();
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.store.get_errors("0xaa").await.unwrap(), vec!["fail"]);
    }

    #[tokio::test]
    async fn test_indexer_ground_truth_self_heals_before_dispatch() {
        let mut finalized = xcalled("0xaa", 1234, 1);
        finalized.execute = Some(tx_ref("0xexec"));
        let indexer = MockIndexer {
            finalized: Mutex::new(vec![finalized]),
            ..Default::default()
        };
        let h = harness(indexer, MockExecutor::default(), &[(1234, true)]);
        h.store
            .merge(vec![xcalled("0xaa", 1234, 1), xcalled("0xbb", 1234, 2)])
            .await
            .unwrap();

        let summary = h.reconciler.run_pass().await.unwrap();
        assert_eq!(summary.examined, 2);
        assert_eq!(summary.self_healed, 1);
        // Healed transfer is complete and was not dispatched
        assert_eq!(summary.dispatched, 1);
        assert_eq!(*h.executor.executed.lock().await, vec!["0xbb"]);
        assert_eq!(h.store.get_pending(1234).await.unwrap(), vec!["0xbb"]);
        assert!(h.store.get("0xaa").await.unwrap().unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_indexer_unavailable_fails_pass_without_corruption() {
        let indexer = MockIndexer {
            unavailable: true,
            ..Default::default()
        };
        let h = harness(indexer, MockExecutor::default(), &[(1234, true)]);
        h.store.merge(vec![xcalled("0xaa", 1234, 1)]).await.unwrap();

        let result = h.reconciler.run_pass().await;
        assert!(result.is_err());

        // No merge happened, nothing was dispatched, pending carries over
        assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.get_pending(1234).await.unwrap(), vec!["0xaa"]);
    }

    #[tokio::test]
    async fn test_nonce_events_published_on_self_heal() {
        let mut finalized = xcalled("0xaa", 1234, 9);
        finalized.execute = Some(tx_ref("0xexec"));
        let indexer = MockIndexer {
            finalized: Mutex::new(vec![finalized]),
            ..Default::default()
        };
        let mut h = harness(indexer, MockExecutor::default(), &[(1234, true)]);
        // Locally we only saw nonce 1
        h.store.merge(vec![xcalled("0xaa", 1234, 1)]).await.unwrap();

        h.reconciler.run_pass().await.unwrap();

        let event = h.nonce_rx.try_recv().unwrap();
        assert_eq!(event, NewHighestNonce { domain: 1234, nonce: 9 });
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let h = harness(MockIndexer::default(), MockExecutor::default(), &[(1234, true)]);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(h.reconciler.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reconciler should stop after cancellation")
            .unwrap();
    }
}
