//! Domain layer: runs, specifications and the ports to the outside world.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{BackendError, BackendResult, DomainError, DomainResult};
