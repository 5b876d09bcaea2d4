//! Signed provider requests, authenticated callbacks and contract status
//! reconciliation for an e-signature integration.

pub mod callback;
pub mod config;
pub mod contract;
pub mod error;
pub mod locks;
pub mod provider;
pub mod reconcile;
pub mod service;
pub mod signal;
pub mod signer;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod utils;
pub mod webhook;
