use gradewise_domain::entities::TraceEvent;
use gradewise_domain::ports::TelemetrySink;
use tracing::info;

/// Installs an env-filtered fmt subscriber. Safe to call more than once.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GRADEWISE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::from_default_env()),
        )
        .try_init();
}

pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record(&self, event: TraceEvent) {
        info!(
            target: "gradewise.telemetry",
            name = %event.name,
            message = %event.message,
            attributes = %event.attributes
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradewise_domain::ports::TelemetrySink;

    #[test]
    fn log_sink_records_without_panic() {
        init_logging();
        init_logging();
        let sink = LogSink;
        sink.record(TraceEvent {
            name: "rewrite".into(),
            message: "ok".into(),
            timestamp_ms: 0,
            attributes: serde_json::json!({"level": "college"}),
        });
    }
}
