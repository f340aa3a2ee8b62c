// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_vec_with_registry, IntCounter, IntCounterVec, IntGaugeVec, Registry,
};

#[derive(Clone, Debug)]
pub struct RelayerMetrics {
    pub(crate) merged_records: IntCounter,
    pub(crate) nonce_advances: IntCounterVec,
    pub(crate) pending_transfers: IntGaugeVec,

    pub(crate) reconcile_passes: IntCounter,
    pub(crate) reconcile_pass_failures: IntCounter,
    pub(crate) stale_pending_refs: IntCounter,
    pub(crate) self_healed_transfers: IntCounter,
    pub(crate) execution_dispatches: IntCounter,
    pub(crate) execution_failures: IntCounterVec,
}

impl RelayerMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            merged_records: register_int_counter_with_registry!(
                "relayer_merged_records",
                "Total number of transfer records persisted by merge",
                registry,
            )
            .unwrap(),
            nonce_advances: register_int_counter_vec_with_registry!(
                "relayer_nonce_advances",
                "Total number of nonce watermark advances, by domain",
                &["domain"],
                registry,
            )
            .unwrap(),
            pending_transfers: register_int_gauge_vec_with_registry!(
                "relayer_pending_transfers",
                "Pending transfers observed in the last pass, by domain",
                &["domain"],
                registry,
            )
            .unwrap(),
            reconcile_passes: register_int_counter_with_registry!(
                "relayer_reconcile_passes",
                "Total number of completed reconciliation passes",
                registry,
            )
            .unwrap(),
            reconcile_pass_failures: register_int_counter_with_registry!(
                "relayer_reconcile_pass_failures",
                "Total number of reconciliation passes that failed as a whole",
                registry,
            )
            .unwrap(),
            stale_pending_refs: register_int_counter_with_registry!(
                "relayer_stale_pending_refs",
                "Total number of pending ids dropped because no record resolved",
                registry,
            )
            .unwrap(),
            self_healed_transfers: register_int_counter_with_registry!(
                "relayer_self_healed_transfers",
                "Total number of transfers completed from indexer ground truth",
                registry,
            )
            .unwrap(),
            execution_dispatches: register_int_counter_with_registry!(
                "relayer_execution_dispatches",
                "Total number of execution attempts dispatched",
                registry,
            )
            .unwrap(),
            execution_failures: register_int_counter_vec_with_registry!(
                "relayer_execution_failures",
                "Total number of failed execution attempts, by novelty of the error",
                &["novelty"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        Self::new(&Registry::new())
    }
}
