//! services/api/src/lib.rs
//!
//! The `api` service as a library, so the binaries and the integration tests
//! share one router and one set of adapters.

pub mod adapters;
pub mod config;
pub mod error;
pub mod token;
pub mod web;
