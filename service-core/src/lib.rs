//! service-core: Shared infrastructure for the course payment services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod utils;
