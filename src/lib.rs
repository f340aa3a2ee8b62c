// Copyright (c) Crossroot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cross-domain root aggregation and transfer-state reconciliation
//!
//! Two tightly coupled pieces: the hub root-aggregation protocol (one
//! outbound commitment per domain, aggregated and propagated back to every
//! spoke via pluggable connectors) and the off-chain transfer-state cache
//! with its polling reconciliation loop.

pub mod config;
pub mod error;
pub mod executor;
pub mod hub;
pub mod indexer;
pub mod metrics;
pub mod node;
pub mod reconciler;
pub mod store;
pub mod types;

/// Install a fmt subscriber for test output, honoring `RUST_LOG`
///
/// Safe to call from every test; only the first call installs.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[macro_export]
macro_rules! retry_with_max_elapsed_time {
    ($func:expr, $max_elapsed_time:expr) => {{
        // The following delay sequence (in secs) will be used, applied with jitter
        // 0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 25.6, 30, 60, 120, 120 ...
        let backoff = backoff::ExponentialBackoff {
            initial_interval: std::time::Duration::from_millis(400),
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: std::time::Duration::from_secs(120),
            max_elapsed_time: Some($max_elapsed_time),
            ..Default::default()
        };
        backoff::future::retry(backoff, || {
            let fut = async {
                let result = $func.await;
                match result {
                    Ok(_) => {
                        return Ok(result);
                    }
                    Err(e) => {
                        // Treat every error as transient and retry until max_elapsed_time
                        tracing::debug!("Retrying due to error: {:?}", e);
                        return Err(backoff::Error::transient(e));
                    }
                }
            };
            std::boxed::Box::pin(fut)
        })
        .await
    }};
}
