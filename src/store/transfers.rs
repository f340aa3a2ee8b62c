// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transfer-record store
//!
//! Owns the merge semantics for transfer lifecycle records and maintains,
//! as merge side effects, the per-domain pending index, the per-domain
//! nonce watermark and the per-transfer error ledger.

use super::kv::{decode, encode, KvStore};
use crate::error::StoreResult;
use crate::types::{merge_records, DomainId, NewHighestNonce, TransferId, TransferRecord};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const TRANSFER_PREFIX: &str = "transfers:transfers:";
const PENDING_PREFIX: &str = "transfers:pending:";
const NONCE_PREFIX: &str = "transfers:nonce:";
const ERRORS_PREFIX: &str = "transfers:errors:";

/// Result of one merge call
///
/// Watermark advances are returned as an outbox rather than published from
/// inside the merge, so the store stays unit-testable without a live
/// messaging channel. At most one event per domain per call.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Records persisted (new or changed)
    pub stored: usize,
    /// Records skipped because they were identical to the stored state
    pub skipped: usize,
    /// Watermark advances observed in this call
    pub nonce_events: Vec<NewHighestNonce>,
}

/// Keyed store of merged transfer lifecycle records
///
/// Records and index entries are created on first observation and mutated
/// only through [`merge`](TransferStore::merge); they are never deleted.
/// All mutation entry points serialize through a single writer lock, which
/// together with the convergent merge makes overlapping and duplicate
/// batches safe in any order.
pub struct TransferStore<K: KvStore> {
    kv: K,
    write_lock: Mutex<()>,
}

impl<K: KvStore> TransferStore<K> {
    pub fn new(kv: K) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Merge a batch of incoming records into the store
    ///
    /// Per record: fetch the existing state, apply the null-safe merge and
    /// persist. A record whose merge result equals the stored state adds no
    /// information and is skipped, not re-persisted. Side effects on the
    /// merged record:
    /// - transition into pending adds the id to the origin domain's pending
    ///   index (exactly once),
    /// - a complete record is removed from the pending index (idempotent),
    /// - the origin domain's nonce watermark is raised to the merged nonce
    ///   if higher, contributing one outbox event per domain per call.
    pub async fn merge(&self, incoming: Vec<TransferRecord>) -> StoreResult<MergeOutcome> {
        let _guard = self.write_lock.lock().await;

        let mut outcome = MergeOutcome::default();
        let mut nonce_candidates: HashMap<DomainId, u64> = HashMap::new();

        for record in incoming {
            let existing = self.read_record(&record.transfer_id).await?;

            let merged = match &existing {
                Some(prior) => merge_records(prior, &record),
                None => record,
            };

            // Uninformative updates (identical or a null-padded subset of the
            // stored state) are skipped, not re-persisted
            if existing.as_ref() == Some(&merged) {
                outcome.skipped += 1;
                continue;
            }

            self.kv
                .set(
                    &format!("{}{}", TRANSFER_PREFIX, merged.transfer_id),
                    &encode(&merged)?,
                )
                .await?;
            outcome.stored += 1;

            let was_pending = existing.as_ref().map(|r| r.is_pending()).unwrap_or(false);
            if merged.is_pending() && !was_pending {
                self.add_pending(merged.origin_domain, &merged.transfer_id)
                    .await?;
                debug!(
                    "[TransferStore] Pending: {} on domain {}",
                    merged.transfer_id, merged.origin_domain
                );
            } else if merged.is_complete() {
                self.remove_pending(merged.origin_domain, &merged.transfer_id)
                    .await?;
            }

            let candidate = nonce_candidates.entry(merged.origin_domain).or_insert(0);
            *candidate = (*candidate).max(merged.nonce);
        }

        for (domain, candidate) in nonce_candidates {
            let current = self.get_nonce(domain).await?;
            if candidate > current {
                self.kv
                    .set(&format!("{}{}", NONCE_PREFIX, domain), &candidate.to_string())
                    .await?;
                outcome.nonce_events.push(NewHighestNonce {
                    domain,
                    nonce: candidate,
                });
            }
        }

        if outcome.stored > 0 {
            info!(
                "[TransferStore] Merged batch: stored={}, skipped={}, nonce_advances={}",
                outcome.stored,
                outcome.skipped,
                outcome.nonce_events.len()
            );
        }

        Ok(outcome)
    }

    /// Get the merged record for a transfer id
    pub async fn get(&self, transfer_id: &str) -> StoreResult<Option<TransferRecord>> {
        self.read_record(transfer_id).await
    }

    /// Pending transfer ids for a domain
    ///
    /// Only ids whose backing record currently reports pending state are
    /// returned; an indexed id that cannot be resolved is stale data and is
    /// skipped, not an error.
    pub async fn get_pending(&self, domain: DomainId) -> StoreResult<Vec<TransferId>> {
        let indexed = self.read_pending_index(domain).await?;

        let mut pending = Vec::with_capacity(indexed.len());
        for id in indexed {
            match self.read_record(&id).await? {
                Some(record) if record.is_pending() => pending.push(id),
                Some(_) => {}
                None => {
                    warn!(
                        "[TransferStore] Stale pending entry {} on domain {} has no record, skipping",
                        id, domain
                    );
                }
            }
        }
        Ok(pending)
    }

    /// Highest nonce observed for a domain (0 if none)
    pub async fn get_nonce(&self, domain: DomainId) -> StoreResult<u64> {
        let raw = self.kv.get(&format!("{}{}", NONCE_PREFIX, domain)).await?;
        Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// Record an execution error for a transfer
    ///
    /// The per-transfer error set is append-only and deduplicated by exact
    /// string equality. Returns whether the message was newly added, so
    /// callers can suppress duplicate alerting.
    pub async fn save_error(&self, transfer_id: &str, error: &str) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;

        let key = format!("{}{}", ERRORS_PREFIX, transfer_id);
        let mut errors: Vec<String> = match self.kv.get(&key).await? {
            Some(raw) => decode(&raw)?,
            None => Vec::new(),
        };

        if errors.iter().any(|e| e == error) {
            return Ok(false);
        }

        errors.push(error.to_string());
        self.kv.set(&key, &encode(&errors)?).await?;
        info!(
            "[TransferStore] New error for {}: {} (total distinct: {})",
            transfer_id,
            error,
            errors.len()
        );
        Ok(true)
    }

    /// Distinct errors recorded for a transfer
    pub async fn get_errors(&self, transfer_id: &str) -> StoreResult<Vec<String>> {
        let key = format!("{}{}", ERRORS_PREFIX, transfer_id);
        match self.kv.get(&key).await? {
            Some(raw) => decode(&raw),
            None => Ok(Vec::new()),
        }
    }

    async fn read_record(&self, transfer_id: &str) -> StoreResult<Option<TransferRecord>> {
        match self
            .kv
            .get(&format!("{}{}", TRANSFER_PREFIX, transfer_id))
            .await?
        {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    async fn read_pending_index(&self, domain: DomainId) -> StoreResult<Vec<TransferId>> {
        match self.kv.get(&format!("{}{}", PENDING_PREFIX, domain)).await? {
            Some(raw) => decode(&raw),
            None => Ok(Vec::new()),
        }
    }

    async fn add_pending(&self, domain: DomainId, transfer_id: &str) -> StoreResult<()> {
        let mut index = self.read_pending_index(domain).await?;
        if !index.iter().any(|id| id == transfer_id) {
            index.push(transfer_id.to_string());
            self.kv
                .set(&format!("{}{}", PENDING_PREFIX, domain), &encode(&index)?)
                .await?;
        }
        Ok(())
    }

    // Removing an absent id is a no-op
    async fn remove_pending(&self, domain: DomainId, transfer_id: &str) -> StoreResult<()> {
        let index = self.read_pending_index(domain).await?;
        let before = index.len();
        let index: Vec<TransferId> = index.into_iter().filter(|id| id != transfer_id).collect();
        if index.len() != before {
            self.kv
                .set(&format!("{}{}", PENDING_PREFIX, domain), &encode(&index)?)
                .await?;
            debug!(
                "[TransferStore] Completed: {} removed from domain {} pending index",
                transfer_id, domain
            );
        }
        Ok(())
    }
}
