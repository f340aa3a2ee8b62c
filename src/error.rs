// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::types::DomainId;
use ethers::types::Address;

/// Errors from the transfer store and its key-value backing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    // Failure in the underlying key-value engine
    Storage(String),
    // Failure to serialize or deserialize a stored value
    Serialization(String),
}

impl StoreError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            StoreError::Storage(_) => "storage_error",
            StoreError::Serialization(_) => "serialization_error",
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Storage(e) => write!(f, "storage error: {}", e),
            StoreError::Serialization(e) => write!(f, "serialization error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the hub contract surface and connectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    // Caller is not the owner
    NotOwner(Address),
    // Caller is not in the watcher set
    NotWatcher(Address),
    // Caller is not the registered connector for the domain
    NotConnector { domain: DomainId, caller: Address },
    // Domain has no registry entry
    UnknownDomain(DomainId),
    // Message sender does not match the expected mirror connector
    SenderVerification { expected: Address, actual: Address },
    // Caller is not the entity this connector trusts for outbound
    UntrustedCaller(Address),
    // Payload could not be decoded as a root
    InvalidPayload(String),
    // Relay medium failed to move the message
    RelayFailure(String),
}

impl HubError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            HubError::NotOwner(_) => "not_owner",
            HubError::NotWatcher(_) => "not_watcher",
            HubError::NotConnector { .. } => "not_connector",
            HubError::UnknownDomain(_) => "unknown_domain",
            HubError::SenderVerification { .. } => "sender_verification",
            HubError::UntrustedCaller(_) => "untrusted_caller",
            HubError::InvalidPayload(_) => "invalid_payload",
            HubError::RelayFailure(_) => "relay_failure",
        }
    }
}

impl std::fmt::Display for HubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubError::NotOwner(caller) => write!(f, "caller {:?} is not the owner", caller),
            HubError::NotWatcher(caller) => write!(f, "caller {:?} is not a watcher", caller),
            HubError::NotConnector { domain, caller } => write!(
                f,
                "caller {:?} is not the registered connector for domain {}",
                caller, domain
            ),
            HubError::UnknownDomain(domain) => write!(f, "domain {} is not registered", domain),
            HubError::SenderVerification { expected, actual } => write!(
                f,
                "sender verification failed: expected {:?}, got {:?}",
                expected, actual
            ),
            HubError::UntrustedCaller(caller) => {
                write!(f, "caller {:?} is not trusted for outbound", caller)
            }
            HubError::InvalidPayload(e) => write!(f, "invalid payload: {}", e),
            HubError::RelayFailure(e) => write!(f, "relay failure: {}", e),
        }
    }
}

impl std::error::Error for HubError {}

pub type HubResult<T> = Result<T, HubError>;
