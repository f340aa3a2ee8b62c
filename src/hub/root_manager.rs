// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Hub-resident root aggregator
//!
//! Owns the registry of domain/connector bindings, the latest outbound
//! commitment per domain, and the aggregate-and-propagate logic. All state
//! is explicit and instance-owned so multiple independent hubs can coexist
//! in-process.

use super::connector::Connector;
use crate::error::{HubError, HubResult};
use crate::types::DomainId;
use ethers::types::{Address, H256};
use ethers::utils::keccak256;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Deterministic aggregation over the registered domains' outbound roots
///
/// Pluggable so the hash fold below can be replaced by a real incremental
/// merkle tree without touching [`RootManager`]. Implementations must be
/// deterministic given the set of (domain, root) pairs.
pub trait RootAggregator: Send + Sync {
    fn aggregate(&self, roots: &[(DomainId, H256)]) -> H256;
}

/// keccak256 over the (domain, root) pairs in ascending domain order
pub struct KeccakAggregator;

impl RootAggregator for KeccakAggregator {
    fn aggregate(&self, roots: &[(DomainId, H256)]) -> H256 {
        let mut pairs = roots.to_vec();
        pairs.sort_by_key(|(domain, _)| *domain);

        let mut preimage = Vec::with_capacity(pairs.len() * 36);
        for (domain, root) in pairs {
            preimage.extend_from_slice(&domain.to_be_bytes());
            preimage.extend_from_slice(root.as_bytes());
        }
        H256::from(keccak256(preimage))
    }
}

/// Contract-log style event returned by hub operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    OutboundRootUpdated { domain: DomainId, root: H256 },
    ConnectorAdded { domain: DomainId, connector: Address },
    ConnectorRemoved { domain: DomainId, connector: Address },
    WatcherAdded(Address),
    WatcherRemoved(Address),
    AggregateRootPropagated { aggregate: H256, domains: Vec<DomainId> },
}

/// Binding of a domain to its hub-side connector
#[derive(Clone)]
pub struct ConnectorBinding {
    /// Connector address; the zero address disables the domain without
    /// removing it from the list
    pub address: Address,
    /// In-process handle used by `propagate`; absent handles are skipped
    pub handle: Option<Arc<dyn Connector>>,
}

impl ConnectorBinding {
    pub fn new(address: Address, handle: Option<Arc<dyn Connector>>) -> Self {
        Self { address, handle }
    }

    /// A disabled binding takes no part in aggregation traffic
    pub fn disabled() -> Self {
        Self {
            address: Address::zero(),
            handle: None,
        }
    }
}

struct RegistryState {
    /// Registered domains; a domain appears at most once. Order across
    /// domains carries no meaning, only presence does.
    domains: Vec<DomainId>,
    connectors: HashMap<DomainId, ConnectorBinding>,
    outbound_roots: HashMap<DomainId, H256>,
    watchers: HashSet<Address>,
}

/// Hub aggregator contract model
///
/// Collects one outbound commitment per domain, aggregates them into a
/// single root, and propagates the aggregate back down to every spoke.
/// Caller identity is an explicit argument on every gated operation;
/// authorization failures reject the call with no state mutation.
pub struct RootManager {
    address: Address,
    owner: Address,
    aggregator: Box<dyn RootAggregator>,
    state: RwLock<RegistryState>,
}

impl RootManager {
    pub fn new(address: Address, owner: Address, aggregator: Box<dyn RootAggregator>) -> Self {
        Self {
            address,
            owner,
            aggregator,
            state: RwLock::new(RegistryState {
                domains: Vec::new(),
                connectors: HashMap::new(),
                outbound_roots: HashMap::new(),
                watchers: HashSet::new(),
            }),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Record a domain's latest outbound commitment
    ///
    /// Callable only by the registered connector for `domain`. Last write
    /// wins; there is no ordering or versioning beyond the most recent call.
    pub fn set_outbound_root(
        &self,
        caller: Address,
        domain: DomainId,
        root: H256,
    ) -> HubResult<HubEvent> {
        let mut state = self.state.write().unwrap();

        let binding = state
            .connectors
            .get(&domain)
            .ok_or(HubError::UnknownDomain(domain))?;
        if binding.address == Address::zero() || binding.address != caller {
            warn!(
                "[RootManager] Rejected outbound root for domain {} from {:?}",
                domain, caller
            );
            return Err(HubError::NotConnector { domain, caller });
        }

        state.outbound_roots.insert(domain, root);
        debug!(
            "[RootManager] Outbound root updated: domain={}, root={:?}",
            domain, root
        );
        Ok(HubEvent::OutboundRootUpdated { domain, root })
    }

    /// Aggregate all registered domains' outbound roots and send the
    /// aggregate to every connector
    ///
    /// Domains bound to the zero address (or without an in-process handle)
    /// are skipped. Connector sends happen outside the registry lock.
    pub fn propagate(&self) -> HubResult<HubEvent> {
        let (pairs, targets) = {
            let state = self.state.read().unwrap();
            let pairs: Vec<(DomainId, H256)> = state
                .domains
                .iter()
                .map(|domain| {
                    (
                        *domain,
                        state
                            .outbound_roots
                            .get(domain)
                            .copied()
                            .unwrap_or_else(H256::zero),
                    )
                })
                .collect();
            let targets: Vec<(DomainId, Arc<dyn Connector>)> = state
                .domains
                .iter()
                .filter_map(|domain| {
                    let binding = state.connectors.get(domain)?;
                    if binding.address == Address::zero() {
                        return None;
                    }
                    let handle = binding.handle.clone()?;
                    Some((*domain, handle))
                })
                .collect();
            (pairs, targets)
        };

        let aggregate = self.aggregator.aggregate(&pairs);

        let mut propagated = Vec::with_capacity(targets.len());
        for (domain, connector) in targets {
            connector.send_commitment(self.address, aggregate.as_bytes())?;
            propagated.push(domain);
        }

        info!(
            "[RootManager] Propagated aggregate {:?} to {} domains",
            aggregate,
            propagated.len()
        );
        Ok(HubEvent::AggregateRootPropagated {
            aggregate,
            domains: propagated,
        })
    }

    /// Register or rebind a domain's connector (owner-only)
    ///
    /// Appends the domain if new, rebinds it otherwise; a domain never
    /// appears in the list twice. Binding the zero address disables the
    /// domain without delisting it.
    pub fn add_connector(
        &self,
        caller: Address,
        domain: DomainId,
        binding: ConnectorBinding,
    ) -> HubResult<HubEvent> {
        if caller != self.owner {
            return Err(HubError::NotOwner(caller));
        }

        let mut state = self.state.write().unwrap();
        if !state.domains.contains(&domain) {
            state.domains.push(domain);
        }
        let connector = binding.address;
        state.connectors.insert(domain, binding);
        info!(
            "[RootManager] Connector added: domain={}, connector={:?}",
            domain, connector
        );
        Ok(HubEvent::ConnectorAdded { domain, connector })
    }

    /// Forcibly disconnect a domain (watcher-only)
    ///
    /// Clears the binding and removes the domain's list entry via
    /// swap-with-last-and-pop; the relative order of remaining domains is
    /// not preserved and must not be relied upon.
    pub fn remove_connector(&self, caller: Address, domain: DomainId) -> HubResult<HubEvent> {
        let mut state = self.state.write().unwrap();
        if !state.watchers.contains(&caller) {
            warn!(
                "[RootManager] Rejected remove_connector for domain {} from non-watcher {:?}",
                domain, caller
            );
            return Err(HubError::NotWatcher(caller));
        }

        let binding = state
            .connectors
            .remove(&domain)
            .ok_or(HubError::UnknownDomain(domain))?;
        let index = state
            .domains
            .iter()
            .position(|d| *d == domain)
            .ok_or(HubError::UnknownDomain(domain))?;
        state.domains.swap_remove(index);
        state.outbound_roots.remove(&domain);

        info!(
            "[RootManager] Connector removed by watcher {:?}: domain={}",
            caller, domain
        );
        Ok(HubEvent::ConnectorRemoved {
            domain,
            connector: binding.address,
        })
    }

    /// Add a watcher identity (owner-only)
    pub fn add_watcher(&self, caller: Address, watcher: Address) -> HubResult<HubEvent> {
        if caller != self.owner {
            return Err(HubError::NotOwner(caller));
        }
        let mut state = self.state.write().unwrap();
        state.watchers.insert(watcher);
        info!("[RootManager] Watcher added: {:?}", watcher);
        Ok(HubEvent::WatcherAdded(watcher))
    }

    /// Remove a watcher identity (owner-only)
    pub fn remove_watcher(&self, caller: Address, watcher: Address) -> HubResult<HubEvent> {
        if caller != self.owner {
            return Err(HubError::NotOwner(caller));
        }
        let mut state = self.state.write().unwrap();
        state.watchers.remove(&watcher);
        info!("[RootManager] Watcher removed: {:?}", watcher);
        Ok(HubEvent::WatcherRemoved(watcher))
    }

    /// Registered domains (order carries no meaning)
    pub fn domains(&self) -> Vec<DomainId> {
        self.state.read().unwrap().domains.clone()
    }

    /// Connector address bound to a domain
    pub fn connector(&self, domain: DomainId) -> Option<Address> {
        self.state
            .read()
            .unwrap()
            .connectors
            .get(&domain)
            .map(|b| b.address)
    }

    /// Latest outbound commitment reported for a domain
    pub fn outbound_root(&self, domain: DomainId) -> Option<H256> {
        self.state
            .read()
            .unwrap()
            .outbound_roots
            .get(&domain)
            .copied()
    }

    pub fn is_watcher(&self, identity: Address) -> bool {
        self.state.read().unwrap().watchers.contains(&identity)
    }
}
