//! Sidecar agent for a container-image registry: proxies the registry's API,
//! tracks collection status durably and runs the external garbage collector
//! on a schedule or on demand, with at most one collection in flight.

pub mod api;
pub mod config;
pub mod error;
pub mod gc;
pub mod ledger;
pub mod registry;
pub mod service;
pub mod storage;
pub mod utils;
