//! Observability setup for the rebac service.
//!
//! Structured logging through `tracing-subscriber`, text or JSON.

mod logging;

pub use logging::{create_json_layer, init_logging, parse_log_level, LoggingConfig};
