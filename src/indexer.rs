// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! External indexer seam
//!
//! The indexer/subgraph service that supplies finalized-transfer facts is an
//! external collaborator; the reconciliation loop only needs this query.

use crate::types::{TransferId, TransferRecord};
use async_trait::async_trait;

/// Ground-truth source for transfers already finalized on-chain
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Returns execute/reconcile facts for the subset of `ids` that are
    /// already finalized on-chain. Ids with no finalized facts are simply
    /// absent from the result.
    async fn get_finalized_transfers(
        &self,
        ids: &[TransferId],
    ) -> anyhow::Result<Vec<TransferRecord>>;
}
