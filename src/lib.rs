//! valkey-assess library
//!
//! Cluster-aware metrics collection and delta measurement for Valkey and
//! Redis-compatible servers: topology discovery, parallel INFO collection,
//! counter deltas, ECPU estimation, keyspace sampling and reporting.

pub mod assess;
pub mod client;
pub mod cluster;
pub mod config;
pub mod metrics;
pub mod server;
pub mod utils;
