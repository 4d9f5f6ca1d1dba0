//! Access Gate — library crate for the binary and integration tests.

pub mod cli;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod proxy;
pub mod server;
