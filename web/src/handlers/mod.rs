//! HTTP request handlers.

pub mod health;
pub mod requests;

pub use health::{health_check, readiness_check};
