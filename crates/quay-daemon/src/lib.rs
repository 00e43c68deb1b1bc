//! Quay daemon library
//!
//! This module provides the core components for the Quay daemon:
//! - REST API handlers and event streams
//! - Configuration loading
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use api::{create_router, AppState};
pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
