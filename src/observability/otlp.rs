//! OTLP metrics export
//!
//! Installs an OpenTelemetry `SdkMeterProvider` with a periodic OTLP/gRPC
//! exporter as the global meter provider, so [`super::WriterMetrics`]
//! instruments created afterwards are exported.

use crate::config::ObservabilityConfig;
use crate::error::DestinationError;
use opentelemetry::global;
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use std::time::Duration;
use tracing::{debug, info};

/// Owns the meter provider for the lifetime of a client
#[derive(Clone)]
pub struct ObservabilityManager {
    provider: SdkMeterProvider,
}

impl ObservabilityManager {
    /// Create the manager and register its provider globally
    ///
    /// Returns `Ok(None)` when no configuration is supplied.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the OTLP exporter cannot be built.
    pub fn new(config: Option<&ObservabilityConfig>) -> Result<Option<Self>, DestinationError> {
        let config = match config {
            Some(c) => c,
            None => return Ok(None),
        };

        let exporter = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint.clone())
            .build()
            .map_err(|e| {
                DestinationError::Configuration(format!("failed to build OTLP exporter: {}", e))
            })?;

        let reader = PeriodicReader::builder(exporter)
            .with_interval(Duration::from_secs(config.export_interval_secs))
            .build();

        let resource = Resource::builder()
            .with_service_name("arrow-flight-destination")
            .build();

        let provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(reader)
            .build();

        global::set_meter_provider(provider.clone());
        info!(
            "OTLP metrics export enabled: endpoint={}, interval={}s",
            config.endpoint, config.export_interval_secs
        );

        Ok(Some(Self { provider }))
    }

    /// Export everything recorded so far
    pub fn flush(&self) -> Result<(), DestinationError> {
        self.provider.force_flush().map_err(|e| {
            DestinationError::Configuration(format!("failed to flush metrics: {}", e))
        })
    }

    /// Flush and stop the exporter
    pub fn shutdown(&self) -> Result<(), DestinationError> {
        debug!("Shutting down metrics export");
        self.provider.shutdown().map_err(|e| {
            DestinationError::Configuration(format!("failed to shut down metrics: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_config() {
        assert!(ObservabilityManager::new(None).unwrap().is_none());
    }
}
