//! # Repair Desk Server
//!
//! Wiring for the `repair-desk` binary: environment configuration, metric
//! registration and demo data seeding. The binary itself lives in
//! `main.rs`; everything here is testable without a database.

pub mod config;
pub mod metrics;
pub mod seed;

pub use config::Config;
pub use seed::{SeedOutcome, seed_demo_data};
