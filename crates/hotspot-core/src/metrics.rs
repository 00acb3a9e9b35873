//! OTLP metrics pipeline, compiled with the `metrics` feature.
//!
//! Installs a global meter provider that periodically pushes to an OTLP
//! collector over gRPC. Billing code records against `opentelemetry::global`
//! and never sees the provider directly.

use std::time::Duration;

use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use tracing::info;

/// How often accumulated measurements are pushed.
pub const EXPORT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("OpenTelemetry SDK error: {0}")]
    Sdk(#[from] opentelemetry_sdk::error::OTelSdkError),
}

/// Keeps the meter provider alive. Call [`MetricsGuard::shutdown`] before
/// exit to flush the last interval; dropping it does not.
pub struct MetricsGuard {
    provider: SdkMeterProvider,
}

impl MetricsGuard {
    pub fn shutdown(self) -> Result<(), MetricsError> {
        self.provider.force_flush()?;
        self.provider.shutdown()?;
        Ok(())
    }
}

/// Start exporting metrics for `service_name` to `endpoint`
/// (e.g. `http://localhost:4317`).
pub fn init_metrics(service_name: &str, endpoint: &str) -> Result<MetricsGuard, MetricsError> {
    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build();

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(EXPORT_INTERVAL)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build();
    global::set_meter_provider(provider.clone());

    info!(service_name, endpoint, "OTLP metrics exporter installed");
    Ok(MetricsGuard { provider })
}
