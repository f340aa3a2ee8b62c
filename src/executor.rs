// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Execution dispatch seam
//!
//! How a pending transfer is actually serviced (routing, pricing, signing,
//! submission) is an external collaborator. Timeout policy belongs to the
//! implementation, not to the reconciliation loop.

use crate::types::TransferRecord;
use async_trait::async_trait;

/// Attempts destination-side execution of one pending transfer
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    async fn execute(&self, transfer: &TransferRecord) -> anyhow::Result<()>;
}
