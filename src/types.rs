// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transfer data model and the null-safe record merge

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for one participating distributed ledger
pub type DomainId = u32;

/// Globally unique transfer identifier (content-derived, immutable)
pub type TransferId = String;

/// Presence + transaction reference for one lifecycle stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRef {
    /// Transaction hash on the chain where the stage happened
    pub tx_hash: String,
    /// Block number where the transaction was included
    pub block_number: u64,
    /// Timestamp (milliseconds)
    pub timestamp_ms: u64,
}

/// Lifecycle record for one cross-domain transfer
///
/// Tracks origination (`xcall`), destination settlement (`execute`) and
/// origin confirmation (`reconcile`). Sub-records are append-only: once
/// populated they are only ever replaced by a later non-null value, never
/// cleared (see [`merge_records`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Transfer identifier
    pub transfer_id: TransferId,
    /// Domain where the transfer was initiated
    pub origin_domain: DomainId,
    /// Sequence number, unique and strictly increasing per origin domain
    pub nonce: u64,
    /// Origination happened on the origin domain
    pub xcall: Option<TxRef>,
    /// Destination-side settlement happened
    pub execute: Option<TxRef>,
    /// Origin domain confirmed settlement
    pub reconcile: Option<TxRef>,
}

impl TransferRecord {
    /// A transfer is pending iff origination is recorded but neither
    /// settlement nor confirmation is
    pub fn is_pending(&self) -> bool {
        self.xcall.is_some() && self.execute.is_none() && self.reconcile.is_none()
    }

    /// A transfer is complete once either settlement or confirmation is recorded
    pub fn is_complete(&self) -> bool {
        self.execute.is_some() || self.reconcile.is_some()
    }

    /// Status name for logging
    pub fn status(&self) -> &'static str {
        if self.reconcile.is_some() {
            "reconciled"
        } else if self.execute.is_some() {
            "executed"
        } else if self.xcall.is_some() {
            "xcalled"
        } else {
            "unobserved"
        }
    }
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (origin={}, nonce={}, status={})",
            self.transfer_id,
            self.origin_domain,
            self.nonce,
            self.status()
        )
    }
}

/// Watermark advance notification, published when a domain's highest-seen
/// nonce strictly increases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHighestNonce {
    pub domain: DomainId,
    pub nonce: u64,
}

impl fmt::Display for NewHighestNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "domain {} nonce {}", self.domain, self.nonce)
    }
}

/// Null-safe structural merge of two records for the same transfer id
///
/// Precedence rule: an incoming non-null value wins (last write wins for the
/// unexpected case of two different non-null values), an absent incoming
/// value never overwrites a previously known one. Pure function over two
/// immutable values; idempotent and convergent for non-conflicting inputs.
pub fn merge_records(existing: &TransferRecord, incoming: &TransferRecord) -> TransferRecord {
    TransferRecord {
        transfer_id: existing.transfer_id.clone(),
        origin_domain: existing.origin_domain,
        nonce: existing.nonce.max(incoming.nonce),
        xcall: incoming.xcall.clone().or_else(|| existing.xcall.clone()),
        execute: incoming.execute.clone().or_else(|| existing.execute.clone()),
        reconcile: incoming
            .reconcile
            .clone()
            .or_else(|| existing.reconcile.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_ref(hash: &str) -> TxRef {
        TxRef {
            tx_hash: hash.to_string(),
            block_number: 100,
            timestamp_ms: 1_000_000,
        }
    }

    fn record(id: &str, xcall: Option<TxRef>, execute: Option<TxRef>) -> TransferRecord {
        TransferRecord {
            transfer_id: id.to_string(),
            origin_domain: 1337,
            nonce: 7,
            xcall,
            execute,
            reconcile: None,
        }
    }

    #[test]
    fn test_pending_and_complete_predicates() {
        let pending = record("0xaa", Some(tx_ref("0x01")), None);
        assert!(pending.is_pending());
        assert!(!pending.is_complete());

        let executed = record("0xbb", Some(tx_ref("0x01")), Some(tx_ref("0x02")));
        assert!(!executed.is_pending());
        assert!(executed.is_complete());

        let mut reconciled = record("0xcc", Some(tx_ref("0x01")), None);
        reconciled.reconcile = Some(tx_ref("0x03"));
        assert!(!reconciled.is_pending());
        assert!(reconciled.is_complete());

        // No origination observed yet: neither pending nor complete
        let bare = record("0xdd", None, None);
        assert!(!bare.is_pending());
        assert!(!bare.is_complete());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let r = record("0xaa", Some(tx_ref("0x01")), None);
        let merged = merge_records(&r, &r);
        assert_eq!(merged, r);
        assert_eq!(merge_records(&merged, &r), r);
    }

    #[test]
    fn test_merge_never_regresses_populated_fields() {
        let known = record("0xaa", Some(tx_ref("0x01")), Some(tx_ref("0x02")));
        // Incoming update knows nothing about execute
        let partial = record("0xaa", Some(tx_ref("0x01")), None);

        let merged = merge_records(&known, &partial);
        assert_eq!(merged.execute, Some(tx_ref("0x02")));
        assert_eq!(merged.xcall, Some(tx_ref("0x01")));
    }

    #[test]
    fn test_merge_incoming_non_null_fills_in() {
        let known = record("0xaa", Some(tx_ref("0x01")), None);
        let update = record("0xaa", None, Some(tx_ref("0x02")));

        let merged = merge_records(&known, &update);
        assert_eq!(merged.xcall, Some(tx_ref("0x01")));
        assert_eq!(merged.execute, Some(tx_ref("0x02")));
        assert!(merged.is_complete());
    }

    #[test]
    fn test_merge_conflict_last_write_wins() {
        let known = record("0xaa", Some(tx_ref("0x01")), None);
        let conflicting = record("0xaa", Some(tx_ref("0xff")), None);

        let merged = merge_records(&known, &conflicting);
        // Last write wins, but presence is never dropped
        assert_eq!(merged.xcall, Some(tx_ref("0xff")));
    }

    #[test]
    fn test_merge_keeps_highest_nonce() {
        let known = record("0xaa", Some(tx_ref("0x01")), None);
        let mut update = known.clone();
        update.nonce = 3;

        assert_eq!(merge_records(&known, &update).nonce, 7);
        update.nonce = 11;
        assert_eq!(merge_records(&known, &update).nonce, 11);
    }

    #[test]
    fn test_merge_order_independence() {
        let base = record("0xaa", None, None);
        let with_xcall = record("0xaa", Some(tx_ref("0x01")), None);
        let with_execute = record("0xaa", None, Some(tx_ref("0x02")));

        let ab = merge_records(&merge_records(&base, &with_xcall), &with_execute);
        let ba = merge_records(&merge_records(&base, &with_execute), &with_xcall);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_record_serde_round_trip() {
        let r = record("0xaa", Some(tx_ref("0x01")), None);
        let json = serde_json::to_string(&r).unwrap();
        let back: TransferRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
