// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reconciliation configuration
//!
//! Loading from disk/environment is an external concern; these are the
//! deserialized shapes the node consumes.

use crate::types::DomainId;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-domain configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DomainConfig {
    /// Assets serviced on this domain. A domain with no configured assets is
    /// skipped entirely by the reconciliation loop.
    #[serde(default)]
    pub assets: Vec<String>,
}

impl DomainConfig {
    pub fn has_assets(&self) -> bool {
        !self.assets.is_empty()
    }
}

/// Configuration for the reconciliation loop
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReconcilerConfig {
    /// Interval between reconciliation passes
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Maximum retry duration for the per-pass indexer query
    #[serde(default = "default_indexer_retry_duration")]
    pub indexer_retry_duration: Duration,

    /// Domains the loop services, keyed by domain id
    #[serde(default)]
    pub domains: BTreeMap<DomainId, DomainConfig>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            indexer_retry_duration: default_indexer_retry_duration(),
            domains: BTreeMap::new(),
        }
    }
}

impl ReconcilerConfig {
    /// Domains eligible for reconciliation work
    pub fn configured_domains(&self) -> impl Iterator<Item = DomainId> + '_ {
        self.domains
            .iter()
            .filter(|(_, cfg)| cfg.has_assets())
            .map(|(domain, _)| *domain)
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_indexer_retry_duration() -> Duration {
    Duration::from_secs(30)
}
