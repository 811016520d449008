use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bridge_api::{BrokerConnection, BrokerEvent, truncate_for_log};

use crate::backoff::Backoff;
use crate::buffer::SharedBuffer;
use crate::config::{ReconnectConfig, SubscriptionConfig};
use crate::decode::decode_payload;
use crate::PipelineError;

/// Сколько ждать подтверждения disconnect от транспорта при остановке.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Максимум символов payload в debug-логе.
const PAYLOAD_LOG_CHARS: usize = 512;

// ═══════════════════════════════════════════════════════════════
//  State & report
// ═══════════════════════════════════════════════════════════════

/// Состояние listener'а.
///
/// Connecting → (Connected, subscribe) → Subscribed → (SubAck) → Running.
/// Ошибка транспорта возвращает в Connecting, остановка переводит в Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerState {
    Connecting,
    Subscribed,
    Running,
    Stopped,
}

/// Итоги работы listener'а, возвращаются из его задачи.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ListenerReport {
    /// Сообщений получено от брокера.
    pub received: u64,
    /// Записей добавлено в буфер.
    pub appended: u64,
    /// Сообщений отброшено декодером.
    pub rejected: u64,
    /// Переподключений после первого успешного connect.
    pub reconnects: u64,
    /// Сообщений, пришедших до подтверждения подписки (SubAck).
    pub before_suback: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Listener: broker → decode → SharedBuffer
// ═══════════════════════════════════════════════════════════════

/// Единственный producer для `SharedBuffer`.
pub struct Listener {
    connection: Box<dyn BrokerConnection>,
    subscription: SubscriptionConfig,
    buffer: Arc<SharedBuffer>,
    backoff: Backoff,
    state: ListenerState,
    connected_once: bool,
    report: ListenerReport,
}

impl Listener {
    pub fn new(
        connection: Box<dyn BrokerConnection>,
        subscription: SubscriptionConfig,
        reconnect: &ReconnectConfig,
        buffer: Arc<SharedBuffer>,
    ) -> Self {
        Self {
            connection,
            subscription,
            buffer,
            backoff: Backoff::new(reconnect),
            state: ListenerState::Connecting,
            connected_once: false,
            report: ListenerReport::default(),
        }
    }

    /// Основной цикл. Токен проверяется между сообщениями: начатый
    /// decode + append всегда доводится до конца.
    pub async fn run(mut self, token: CancellationToken) -> ListenerReport {
        let peer = self.connection.peer_info();
        tracing::info!(%peer, topic = %self.subscription.topic, qos = %self.subscription.qos, "listener starting");

        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                event = self.connection.next_event() => event,
            };

            match event {
                Ok(BrokerEvent::Disconnected) => {
                    tracing::info!(%peer, "broker closed the connection");
                    self.state = ListenerState::Stopped;
                    break;
                }
                Ok(event) => {
                    if let Err(e) = self.handle_event(event).await {
                        self.on_connection_error(&peer, e);
                        if !self.wait_backoff(&token).await {
                            break;
                        }
                    }
                }
                Err(e) => {
                    self.on_connection_error(&peer, PipelineError::Connection { peer: peer.clone(), source: e });
                    if !self.wait_backoff(&token).await {
                        break;
                    }
                }
            }
        }

        if self.state != ListenerState::Stopped {
            self.disconnect(&peer).await;
        }

        let r = &self.report;
        tracing::info!(
            %peer,
            received = r.received,
            appended = r.appended,
            rejected = r.rejected,
            reconnects = r.reconnects,
            "listener stopped"
        );
        self.report
    }

    async fn handle_event(&mut self, event: BrokerEvent) -> Result<(), PipelineError> {
        match event {
            BrokerEvent::Connected => {
                if self.connected_once {
                    self.report.reconnects += 1;
                }
                self.connected_once = true;
                self.backoff.reset();
                tracing::info!(topic = %self.subscription.topic, "connected, subscribing");

                let topic = self.subscription.topic.clone();
                self.connection
                    .subscribe(&topic, self.subscription.qos)
                    .await
                    .map_err(|e| PipelineError::Connection { peer: self.connection.peer_info(), source: e })?;
                self.state = ListenerState::Subscribed;
            }
            BrokerEvent::Subscribed => {
                tracing::info!(topic = %self.subscription.topic, "subscription acknowledged");
                self.state = ListenerState::Running;
            }
            BrokerEvent::Message { topic, payload } => self.handle_message(&topic, &payload),
            // Handled by the caller.
            BrokerEvent::Disconnected => {}
        }
        Ok(())
    }

    fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        self.report.received += 1;
        if self.state != ListenerState::Running {
            // Persistent session: the broker may replay queued messages before SubAck.
            self.report.before_suback += 1;
            tracing::debug!(%topic, state = ?self.state, "message before subscription acknowledged");
        }
        tracing::debug!(
            %topic,
            payload = %truncate_for_log(&String::from_utf8_lossy(payload), PAYLOAD_LOG_CHARS),
            "message received"
        );

        match decode_payload(topic, payload) {
            Ok(record) => {
                self.buffer.append(record);
                self.report.appended += 1;
            }
            Err(e) => {
                self.report.rejected += 1;
                tracing::warn!(%topic, bytes = payload.len(), error = %e, "bad payload, skipping");
            }
        }
    }

    fn on_connection_error(&mut self, peer: &str, err: PipelineError) {
        tracing::error!(%peer, error = %err, "broker connection error");
        self.state = ListenerState::Connecting;
    }

    /// Подождать backoff. `false`, если пришёл запрос остановки.
    async fn wait_backoff(&mut self, token: &CancellationToken) -> bool {
        let delay = self.backoff.next_delay();
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.backoff.attempts(),
            "reconnecting"
        );
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Штатный disconnect и дочитывание событий до его подтверждения.
    /// Сообщения, пришедшие в этом окне, не обрабатываются.
    async fn disconnect(&mut self, peer: &str) {
        if let Err(e) = self.connection.disconnect().await {
            tracing::warn!(%peer, error = ?e, "disconnect request failed");
        }

        let mut discarded = 0u64;
        let settled = tokio::time::timeout(DISCONNECT_GRACE, async {
            loop {
                match self.connection.next_event().await {
                    Ok(BrokerEvent::Disconnected) | Err(_) => break,
                    Ok(BrokerEvent::Message { .. }) => discarded += 1,
                    Ok(_) => {}
                }
            }
        })
        .await;

        if settled.is_err() {
            tracing::warn!(%peer, "transport did not confirm disconnect");
        }
        if discarded > 0 {
            tracing::debug!(%peer, discarded, "messages discarded during disconnect");
        }
        self.state = ListenerState::Stopped;
    }
}
