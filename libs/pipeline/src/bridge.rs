use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bridge_api::{BrokerConnection, RecordSink};

use crate::buffer::SharedBuffer;
use crate::config::BridgeSettings;
use crate::forwarder::Forwarder;
use crate::listener::{Listener, ListenerReport};
use crate::scheduler::{FlushScheduler, SchedulerReport};
use crate::PipelineError;

/// Итоги работы моста после остановки.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReport {
    pub listener: ListenerReport,
    pub scheduler: SchedulerReport,
    /// Записей осталось в буфере (теряются, persistence нет).
    pub unflushed: usize,
}

// ═══════════════════════════════════════════════════════════════
//  Bridge: lifecycle controller
// ═══════════════════════════════════════════════════════════════

/// Владеет двумя задачами (listener, scheduler) и их общим токеном.
pub struct Bridge {
    token: CancellationToken,
    buffer: Arc<SharedBuffer>,
    listener: JoinHandle<ListenerReport>,
    scheduler: JoinHandle<SchedulerReport>,
    listener_exit: CancellationToken,
    scheduler_exit: CancellationToken,
}

/// Запустить задачу и получить токен, который отменяется при её выходе
/// (обычном, panic или abort).
fn spawn_tracked<T, F>(task: F) -> (JoinHandle<T>, CancellationToken)
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let exited = CancellationToken::new();
    let guard = exited.clone().drop_guard();
    let handle = tokio::spawn(async move {
        let _guard = guard;
        task.await
    });
    (handle, exited)
}

impl Bridge {
    /// Запустить listener и scheduler. Вызывать внутри tokio runtime.
    pub fn start(
        settings: BridgeSettings,
        connection: Box<dyn BrokerConnection>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, PipelineError> {
        settings
            .validate()
            .map_err(|detail| PipelineError::Config { context: "bridge", detail })?;

        let token = CancellationToken::new();
        let buffer = Arc::new(SharedBuffer::new());

        let listener = Listener::new(
            connection,
            settings.subscription.clone(),
            &settings.reconnect,
            buffer.clone(),
        );
        let scheduler = FlushScheduler::new(buffer.clone(), Forwarder::new(sink), &settings.flush);

        let (listener, listener_exit) = spawn_tracked(listener.run(token.clone()));
        let (scheduler, scheduler_exit) = spawn_tracked(scheduler.run(token.clone()));
        tracing::info!(topic = %settings.subscription.topic, "bridge started");

        Ok(Self { token, buffer, listener, scheduler, listener_exit, scheduler_exit })
    }

    pub fn buffer(&self) -> &Arc<SharedBuffer> {
        &self.buffer
    }

    /// Резолвится, когда любая из задач вышла, и возвращает её имя.
    ///
    /// До `shutdown` задачи сами не завершаются, кроме случаев, когда
    /// брокер закрыл соединение или задача упала с panic. Результат
    /// задачи остаётся в handle, `shutdown` после этого безопасен.
    pub async fn finished(&self) -> &'static str {
        tokio::select! {
            _ = self.listener_exit.cancelled() => "listener",
            _ = self.scheduler_exit.cancelled() => "scheduler",
        }
    }

    /// Graceful shutdown: выставить stop signal, дождаться обеих задач.
    ///
    /// Listener сам отправляет disconnect брокеру; батч, уже переданный
    /// forwarder'у, досылается. Если за `timeout` задачи не завершились,
    /// они abort'ятся и возвращается `ShutdownTimeout`.
    pub async fn shutdown(self, timeout: Duration) -> Result<BridgeReport, PipelineError> {
        let Bridge { token, buffer, mut listener, mut scheduler, .. } = self;

        tracing::info!(timeout_ms = timeout.as_millis() as u64, "stopping bridge");
        token.cancel();

        let joined = tokio::time::timeout(timeout, async {
            tokio::join!(&mut listener, &mut scheduler)
        })
        .await;

        let (listener_res, scheduler_res) = match joined {
            Ok(results) => results,
            Err(_) => {
                let mut pending = Vec::new();
                if !listener.is_finished() {
                    listener.abort();
                    pending.push("listener");
                }
                if !scheduler.is_finished() {
                    scheduler.abort();
                    pending.push("scheduler");
                }
                tracing::error!(?pending, waited_ms = timeout.as_millis() as u64, "shutdown timed out");
                return Err(PipelineError::ShutdownTimeout { waited: timeout, pending });
            }
        };

        let listener = listener_res.map_err(|source| PipelineError::Join { task: "listener", source })?;
        let scheduler = scheduler_res.map_err(|source| PipelineError::Join { task: "scheduler", source })?;

        let unflushed = buffer.len();
        if unflushed > 0 {
            tracing::warn!(unflushed, "discarding records that were never flushed");
        }
        tracing::info!("bridge stopped");

        Ok(BridgeReport { listener, scheduler, unflushed })
    }
}

#[cfg(test)]
mod tests {
    use bridge_api::BrokerEvent;

    use super::*;
    use crate::config::{FlushConfig, ReconnectConfig, SubscriptionConfig};
    use crate::testing::{RecordingSink, ScriptedConnection, message, reading, seq_of};

    fn settings(interval_ms: u64, final_flush: bool) -> BridgeSettings {
        BridgeSettings {
            subscription: SubscriptionConfig::default(),
            flush: FlushConfig { interval_secs: interval_ms as f64 / 1000.0, final_flush },
            reconnect: ReconnectConfig { initial_ms: 5, max_ms: 20 },
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn end_to_end_delivery_and_clean_shutdown() {
        let (conn, control) = ScriptedConnection::new(vec![
            Ok(BrokerEvent::Connected),
            Ok(BrokerEvent::Subscribed),
            message("sensor/data/", &reading(1)),
            message("sensor/data/", "not json"),
            message("sensor/data/", &reading(2)),
        ]);
        let sink = Arc::new(RecordingSink::new());
        let bridge = Bridge::start(settings(20, false), Box::new(conn), sink.clone()).unwrap();

        wait_until(|| sink.delivered().len() == 2).await;
        let report = bridge.shutdown(Duration::from_secs(5)).await.unwrap();

        assert!(control.is_disconnected());
        assert_eq!(report.listener.appended, 2);
        assert_eq!(report.listener.rejected, 1);
        assert_eq!(report.scheduler.delivered, 2);
        assert_eq!(report.unflushed, 0);
        let seqs: Vec<u64> = sink.delivered().iter().map(seq_of).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[tokio::test]
    async fn in_flight_batch_finishes_before_shutdown_returns() {
        let (conn, control) = ScriptedConnection::new(vec![Ok(BrokerEvent::Connected), Ok(BrokerEvent::Subscribed)]);
        for i in 0..3 {
            control.push(message("sensor/data/", &reading(i)));
        }
        let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_millis(40)).fail_network_at(1));
        let bridge = Bridge::start(settings(100, false), Box::new(conn), sink.clone()).unwrap();

        sink.first_call.notified().await;
        let report = bridge.shutdown(Duration::from_secs(5)).await.unwrap();

        assert_eq!(sink.attempts().len(), 3);
        assert_eq!(report.scheduler.delivered, 2);
        assert_eq!(report.scheduler.failed, 1);
    }

    #[tokio::test]
    async fn final_flush_delivers_leftovers_on_shutdown() {
        let (conn, control) = ScriptedConnection::new(vec![Ok(BrokerEvent::Connected), Ok(BrokerEvent::Subscribed)]);
        let sink = Arc::new(RecordingSink::new());
        // Interval far longer than the test: only the final flush can send.
        let bridge = Bridge::start(settings(60_000, true), Box::new(conn), sink.clone()).unwrap();
        control.push(message("sensor/data/", &reading(9)));

        let buffer = bridge.buffer().clone();
        wait_until(|| buffer.len() == 1).await;
        let report = bridge.shutdown(Duration::from_secs(5)).await.unwrap();

        assert_eq!(report.scheduler.ticks, 0);
        assert_eq!(report.scheduler.delivered, 1);
        assert_eq!(report.unflushed, 0);
    }

    #[tokio::test]
    async fn unflushed_records_are_reported() {
        let (conn, control) = ScriptedConnection::new(vec![Ok(BrokerEvent::Connected), Ok(BrokerEvent::Subscribed)]);
        let sink = Arc::new(RecordingSink::new());
        let bridge = Bridge::start(settings(60_000, false), Box::new(conn), sink.clone()).unwrap();
        control.push(message("sensor/data/", &reading(1)));

        let buffer = bridge.buffer().clone();
        wait_until(|| buffer.len() == 1).await;
        let report = bridge.shutdown(Duration::from_secs(5)).await.unwrap();

        assert_eq!(report.unflushed, 1);
        assert!(sink.attempts().is_empty());
    }

    #[tokio::test]
    async fn stuck_forward_pass_hits_shutdown_timeout() {
        let (conn, control) = ScriptedConnection::new(vec![Ok(BrokerEvent::Connected), Ok(BrokerEvent::Subscribed)]);
        control.push(message("sensor/data/", &reading(1)));
        let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_secs(60)));
        let bridge = Bridge::start(settings(10, false), Box::new(conn), sink.clone()).unwrap();

        sink.first_call.notified().await;
        let err = bridge.shutdown(Duration::from_millis(100)).await.unwrap_err();

        match err {
            PipelineError::ShutdownTimeout { pending, .. } => assert_eq!(pending, vec!["scheduler"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected() {
        let (conn, _control) = ScriptedConnection::new(vec![]);
        let mut bad = settings(10, false);
        bad.subscription.topic = String::new();

        let res = Bridge::start(bad, Box::new(conn), Arc::new(RecordingSink::new()));
        assert!(matches!(res, Err(PipelineError::Config { .. })));
    }

    #[tokio::test]
    async fn degenerate_flush_interval_is_rejected() {
        let (conn, _control) = ScriptedConnection::new(vec![]);
        let mut bad = settings(10, false);
        bad.flush.interval_secs = 1e-12;

        let res = Bridge::start(bad, Box::new(conn), Arc::new(RecordingSink::new()));
        assert!(matches!(res, Err(PipelineError::Config { .. })));
    }

    #[tokio::test]
    async fn broker_disconnect_resolves_finished() {
        let (conn, _control) = ScriptedConnection::new(vec![
            Ok(BrokerEvent::Connected),
            Ok(BrokerEvent::Subscribed),
            message("sensor/data/", &reading(1)),
            Ok(BrokerEvent::Disconnected),
        ]);
        let sink = Arc::new(RecordingSink::new());
        let bridge = Bridge::start(settings(60_000, true), Box::new(conn), sink.clone()).unwrap();

        let task = tokio::time::timeout(Duration::from_secs(5), bridge.finished()).await.unwrap();
        assert_eq!(task, "listener");

        // The listener result is still collectable and leftovers get the final flush.
        let report = bridge.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.listener.appended, 1);
        assert_eq!(report.scheduler.delivered, 1);
        assert_eq!(report.unflushed, 0);
    }

    #[tokio::test]
    async fn finished_stays_pending_while_tasks_run() {
        let (conn, _control) = ScriptedConnection::new(vec![Ok(BrokerEvent::Connected), Ok(BrokerEvent::Subscribed)]);
        let bridge = Bridge::start(settings(10, false), Box::new(conn), Arc::new(RecordingSink::new())).unwrap();

        let res = tokio::time::timeout(Duration::from_millis(100), bridge.finished()).await;
        assert!(res.is_err());
        bridge.shutdown(Duration::from_secs(5)).await.unwrap();
    }
}
