//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber, with an optional
//! rolling JSON file from tracing-appender.

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::{parse_log_level, LoggerImpl};
