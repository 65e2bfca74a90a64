//! # Utility Modules
//!
//! Supporting utilities shared by the server.
//!
//! ## Components
//! - **Logging**: `tracing` subscriber setup from [`crate::config::LoggingConfig`]
//! - **Metrics**: Thread-safe observability counters

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{global_metrics, Metrics, MetricsSnapshot};
