// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Hub root-aggregation protocol
//!
//! The hub collects one outbound commitment per spoke domain, aggregates
//! them into a single root and propagates the aggregate back down to every
//! spoke via pluggable message-relay connectors.

pub mod connector;
pub mod root_manager;

pub use connector::{Connector, HubConnector, InProcessRelay, Relay, SpokeConnector};
pub use root_manager::{
    ConnectorBinding, HubEvent, KeccakAggregator, RootAggregator, RootManager,
};
