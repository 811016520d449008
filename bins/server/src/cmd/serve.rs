use std::sync::Arc;

use pipeline::{Bridge, PipelineError};
use sink_http::HttpSink;
use transport_mqtt::MqttConnection;

use crate::config::Effective;
use crate::error::ServerError;

pub async fn run(eff: Effective) -> Result<(), ServerError> {
    tracing::info!(
        broker = %format!("{}:{}", eff.mqtt.host, eff.mqtt.port),
        topic = %eff.settings.subscription.topic,
        qos = %eff.settings.subscription.qos,
        endpoint = %eff.endpoint.url,
        interval_secs = eff.settings.flush.interval_secs,
        "bridge-server starting"
    );

    // --- Plugins ---
    let connection = MqttConnection::new(&eff.mqtt)?;
    let sink = HttpSink::new(&eff.endpoint)?;

    // --- Listener + scheduler ---
    let bridge = Bridge::start(eff.settings, Box::new(connection), Arc::new(sink))?;

    let exited = tokio::select! {
        signal = shutdown_signal() => {
            let signal = signal?;
            tracing::info!(%signal, "shutting down...");
            None
        }
        task = bridge.finished() => {
            tracing::error!(task, "task exited unexpectedly, shutting down...");
            Some(task)
        }
    };

    let report = bridge.shutdown(eff.shutdown.timeout()).await?;
    tracing::info!(
        received = report.listener.received,
        appended = report.listener.appended,
        rejected = report.listener.rejected,
        reconnects = report.listener.reconnects,
        delivered = report.scheduler.delivered,
        failed = report.scheduler.failed,
        unflushed = report.unflushed,
        "bridge-server stopped"
    );

    match exited {
        Some(task) => Err(PipelineError::TaskExited { task }.into()),
        None => Ok(()),
    }
}

/// Ждать Ctrl+C (или SIGTERM на Unix).
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str, ServerError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            Ok("SIGINT")
        }
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str, ServerError> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
