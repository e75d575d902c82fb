//! Prometheus metrics recording and endpoint.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static RECORDER_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus metrics recorder and return the handle for rendering.
///
/// A process hosts exactly one global metrics recorder; a process that spins
/// up more than one gateway (integration tests) must share it, so the handle
/// is cached process-wide rather than rebuilt per call.
pub fn install_prometheus_recorder() -> PrometheusHandle {
    RECORDER_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            let _ = metrics::set_global_recorder(recorder);
            handle
        })
        .clone()
}

pub fn record_connect() {
    metrics::gauge!("asr_connections_active").increment(1.0);
    metrics::counter!("asr_connections_total").increment(1);
}

pub fn record_disconnect() {
    metrics::gauge!("asr_connections_active").decrement(1.0);
}

pub fn record_session_committed(audio_seconds: f64) {
    metrics::counter!("asr_items_committed_total").increment(1);
    metrics::histogram!("asr_item_audio_seconds").record(audio_seconds);
}

pub fn record_error(kind: &str) {
    let labels = [("kind", kind.to_string())];
    metrics::counter!("asr_errors_total", &labels).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_prometheus_recorder_renders_without_panicking() {
        let handle = install_prometheus_recorder();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#'));
    }

    #[test]
    fn recording_helpers_do_not_panic_without_recorder() {
        record_connect();
        record_disconnect();
        record_session_committed(1.5);
        record_error("invalid_audio");
    }
}
