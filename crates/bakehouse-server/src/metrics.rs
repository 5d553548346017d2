// Metrics recorder setup
// Installs the Prometheus recorder and describes the protocol counters

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the process-wide recorder and describe every protocol metric.
/// Should be called once at application startup
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    bakehouse_core::metrics::describe_metrics();
    Ok(handle)
}
