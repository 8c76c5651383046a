//! Logging and OpenTelemetry metrics
//!
//! Structured logging goes through `tracing`; metrics are OpenTelemetry
//! counters obtained from the global meter, exported over OTLP when configured.

pub mod logging;
pub mod metrics;
pub mod otlp;

pub use logging::init_logging;
pub use metrics::WriterMetrics;
pub use otlp::ObservabilityManager;
