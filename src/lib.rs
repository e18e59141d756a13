//! ARBHUNTER: cross-exchange spot arbitrage detection engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod exchanges;
pub mod engine;
pub mod presenter;
pub mod dashboard;
