// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connector capability
//!
//! One connector instance per spoke domain: it sends the domain's outbound
//! commitment toward the hub and receives the propagated aggregate root.
//! Concrete variants differ only in how bytes move across the relay medium;
//! sender verification is shared and always precedes acting on a payload.

use super::root_manager::RootManager;
use crate::error::{HubError, HubResult};
use crate::types::DomainId;
use ethers::types::{Address, H256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Relays a commitment between a spoke domain and the hub
pub trait Connector: Send + Sync {
    fn address(&self) -> Address;

    fn domain(&self) -> DomainId;

    /// Transmit a commitment across the relay medium, authorized only for
    /// the entity this connector trusts for outbound
    fn send_commitment(&self, caller: Address, data: &[u8]) -> HubResult<()>;

    /// Verify the message originated from the expected mirror connector and
    /// apply the payload. Verification failure rejects the message without
    /// mutating any state.
    fn receive_and_apply(&self, sender: Address, data: &[u8]) -> HubResult<()>;
}

/// Shared sender-verification helper
pub fn verify_sender(expected: Address, actual: Address) -> HubResult<()> {
    if expected != actual {
        warn!(
            "[Connector] Sender verification failed: expected {:?}, got {:?}",
            expected, actual
        );
        return Err(HubError::SenderVerification { expected, actual });
    }
    Ok(())
}

/// Decode a 32-byte root payload
fn decode_root(data: &[u8]) -> HubResult<H256> {
    if data.len() != 32 {
        return Err(HubError::InvalidPayload(format!(
            "expected 32-byte root, got {} bytes",
            data.len()
        )));
    }
    Ok(H256::from_slice(data))
}

/// Byte movement across the underlying relay medium
pub trait Relay: Send + Sync {
    fn deliver(&self, from: Address, to: Address, data: &[u8]) -> HubResult<()>;
}

/// Relay that dispatches directly to registered in-process connectors
#[derive(Default)]
pub struct InProcessRelay {
    endpoints: RwLock<HashMap<Address, Arc<dyn Connector>>>,
}

impl InProcessRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connector: Arc<dyn Connector>) {
        let mut endpoints = self.endpoints.write().unwrap();
        endpoints.insert(connector.address(), connector);
    }
}

impl Relay for InProcessRelay {
    fn deliver(&self, from: Address, to: Address, data: &[u8]) -> HubResult<()> {
        let target = {
            let endpoints = self.endpoints.read().unwrap();
            endpoints.get(&to).cloned()
        };
        match target {
            Some(connector) => connector.receive_and_apply(from, data),
            None => Err(HubError::RelayFailure(format!(
                "no endpoint registered at {:?}",
                to
            ))),
        }
    }
}

/// Spoke-side connector
///
/// Sends its domain's outbound commitment toward the hub and stores a
/// received aggregate as the domain's current aggregate root.
pub struct SpokeConnector {
    domain: DomainId,
    address: Address,
    /// Hub-side mirror connector this instance exchanges messages with
    mirror: Address,
    /// Local entity trusted to initiate outbound commitments
    trusted_sender: Address,
    relay: Arc<dyn Relay>,
    aggregate_root: RwLock<Option<H256>>,
}

impl SpokeConnector {
    pub fn new(
        domain: DomainId,
        address: Address,
        mirror: Address,
        trusted_sender: Address,
        relay: Arc<dyn Relay>,
    ) -> Self {
        Self {
            domain,
            address,
            mirror,
            trusted_sender,
            relay,
            aggregate_root: RwLock::new(None),
        }
    }

    /// Aggregate root most recently propagated down from the hub
    pub fn aggregate_root(&self) -> Option<H256> {
        *self.aggregate_root.read().unwrap()
    }
}

impl Connector for SpokeConnector {
    fn address(&self) -> Address {
        self.address
    }

    fn domain(&self) -> DomainId {
        self.domain
    }

    fn send_commitment(&self, caller: Address, data: &[u8]) -> HubResult<()> {
        if caller != self.trusted_sender {
            return Err(HubError::UntrustedCaller(caller));
        }
        self.relay.deliver(self.address, self.mirror, data)
    }

    fn receive_and_apply(&self, sender: Address, data: &[u8]) -> HubResult<()> {
        verify_sender(self.mirror, sender)?;
        let root = decode_root(data)?;
        let mut current = self.aggregate_root.write().unwrap();
        *current = Some(root);
        debug!(
            "[Connector] Domain {} aggregate root updated: {:?}",
            self.domain, root
        );
        Ok(())
    }
}

/// Hub-side connector, the spoke's mirror
///
/// Forwards a received spoke commitment into the root manager and relays
/// the hub's aggregate back down when the root manager propagates.
pub struct HubConnector {
    domain: DomainId,
    address: Address,
    /// Spoke-side mirror connector this instance exchanges messages with
    mirror: Address,
    root_manager: Arc<RootManager>,
    relay: Arc<dyn Relay>,
}

impl HubConnector {
    pub fn new(
        domain: DomainId,
        address: Address,
        mirror: Address,
        root_manager: Arc<RootManager>,
        relay: Arc<dyn Relay>,
    ) -> Self {
        Self {
            domain,
            address,
            mirror,
            root_manager,
            relay,
        }
    }
}

impl Connector for HubConnector {
    fn address(&self) -> Address {
        self.address
    }

    fn domain(&self) -> DomainId {
        self.domain
    }

    fn send_commitment(&self, caller: Address, data: &[u8]) -> HubResult<()> {
        // Outbound from the hub side carries the aggregate; only the root
        // manager may trigger it
        if caller != self.root_manager.address() {
            return Err(HubError::UntrustedCaller(caller));
        }
        self.relay.deliver(self.address, self.mirror, data)
    }

    fn receive_and_apply(&self, sender: Address, data: &[u8]) -> HubResult<()> {
        verify_sender(self.mirror, sender)?;
        let root = decode_root(data)?;
        let event = self
            .root_manager
            .set_outbound_root(self.address, self.domain, root)?;
        debug!("[Connector] Forwarded spoke commitment: {:?}", event);
        Ok(())
    }
}
