// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node wiring
//!
//! Builds the memory-backed transfer store, couples the merge outbox to the
//! nonce broadcast channel, and spawns the reconciliation loop.

use crate::config::ReconcilerConfig;
use crate::error::StoreResult;
use crate::executor::TransferExecutor;
use crate::indexer::Indexer;
use crate::metrics::RelayerMetrics;
use crate::reconciler::Reconciler;
use crate::store::{MemoryKv, MergeOutcome, TransferStore};
use crate::types::{NewHighestNonce, TransferRecord};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Running node: ingestion entry point plus loop lifecycle
pub struct NodeHandle {
    store: Arc<TransferStore<Arc<MemoryKv>>>,
    metrics: Arc<RelayerMetrics>,
    nonce_tx: broadcast::Sender<NewHighestNonce>,
    cancel: CancellationToken,
    reconciler_handle: JoinHandle<()>,
}

impl NodeHandle {
    /// Ingest raw transfer events observed on some domain
    ///
    /// The single publication point for watermark advances: merge returns
    /// them as an outbox and they are forwarded to subscribers here.
    pub async fn ingest(&self, records: Vec<TransferRecord>) -> StoreResult<MergeOutcome> {
        let outcome = self.store.merge(records).await?;
        self.metrics.merged_records.inc_by(outcome.stored as u64);
        for event in &outcome.nonce_events {
            self.metrics
                .nonce_advances
                .with_label_values(&[&event.domain.to_string()])
                .inc();
            info!("[Node] New highest nonce: {}", event);
            let _ = self.nonce_tx.send(*event);
        }
        Ok(outcome)
    }

    pub fn store(&self) -> Arc<TransferStore<Arc<MemoryKv>>> {
        self.store.clone()
    }

    /// Subscribe to nonce watermark advances
    pub fn subscribe_nonces(&self) -> broadcast::Receiver<NewHighestNonce> {
        self.nonce_tx.subscribe()
    }

    /// Request cooperative shutdown and wait for the loop to stop
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.reconciler_handle.await;
    }
}

/// Build and start a relayer node
pub fn run_node<I, E>(
    config: ReconcilerConfig,
    indexer: Arc<I>,
    executor: Arc<E>,
    registry: &prometheus::Registry,
) -> anyhow::Result<NodeHandle>
where
    I: Indexer + 'static,
    E: TransferExecutor + 'static,
{
    let metrics = Arc::new(RelayerMetrics::new(registry));
    let store = Arc::new(TransferStore::new(Arc::new(MemoryKv::new())));
    let (nonce_tx, _) = broadcast::channel(1024);
    let cancel = CancellationToken::new();

    let reconciler = Reconciler::new(
        store.clone(),
        indexer,
        executor,
        config,
        metrics.clone(),
        nonce_tx.clone(),
    );
    let reconciler_handle = tokio::spawn(reconciler.run(cancel.clone()));
    info!("[Node] Relayer node started");

    Ok(NodeHandle {
        store,
        metrics,
        nonce_tx,
        cancel,
        reconciler_handle,
    })
}
