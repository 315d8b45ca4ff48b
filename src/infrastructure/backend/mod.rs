//! Estimation backend over HTTP.

pub mod client;
pub mod rate_limiter;
pub mod retry;

pub use client::{rewrite_functions_host, HttpBackend};
pub use rate_limiter::RequestRateLimiter;
pub use retry::RetryPolicy;
