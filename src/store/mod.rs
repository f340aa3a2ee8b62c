// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Off-chain mirror of per-transfer lifecycle state

pub mod kv;
pub mod transfers;

pub use kv::{KvStore, MemoryKv};
pub use transfers::{MergeOutcome, TransferStore};
