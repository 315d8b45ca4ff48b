//! Infrastructure layer
//!
//! - HTTP client for the estimation backend
//! - Configuration management
//! - Logging

pub mod backend;
pub mod config;
pub mod logging;
