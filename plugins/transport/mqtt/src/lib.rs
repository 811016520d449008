use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    SubscribeReasonCode,
};

use bridge_api::{BridgeError, BrokerConnection, BrokerEvent, QoS};

// ════════════════════════════════════════════════════════════════
//  Config
// ════════════════════════════════════════════════════════════════

/// Параметры подключения к MQTT-брокеру.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    /// Ёмкость очереди запросов клиента → event loop.
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,
}

impl MqttConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            clean_session: default_clean_session(),
            channel_capacity: default_capacity(),
        }
    }

    fn options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(&self.client_id, &self.host, self.port);
        opts.set_keep_alive(Duration::from_secs(self.keep_alive_secs.max(1)));
        opts.set_clean_session(self.clean_session);
        opts
    }
}

fn default_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "MQTT_Client".into()
}
fn default_keep_alive() -> u64 {
    60
}
fn default_clean_session() -> bool {
    true
}
fn default_capacity() -> usize {
    64
}

// ════════════════════════════════════════════════════════════════
//  Connection
// ════════════════════════════════════════════════════════════════

/// `BrokerConnection` поверх rumqttc.
///
/// Сеть обслуживает `EventLoop`: он (пере)подключается на каждом
/// `poll()` после ошибки, поэтому `next_event` и есть точка reconnect'а.
pub struct MqttConnection {
    client: AsyncClient,
    events: EventLoop,
    peer: String,
}

impl MqttConnection {
    /// Создать подключение. Сокет открывается лениво, на первом `next_event`.
    pub fn new(config: &MqttConfig) -> Result<Self, BridgeError> {
        if config.host.is_empty() {
            return Err(BridgeError::config("mqtt host is empty"));
        }
        let (client, events) = AsyncClient::new(config.options(), config.channel_capacity.max(1));
        let peer = format!("{}:{}", config.host, config.port);
        tracing::debug!(%peer, client_id = %config.client_id, "mqtt client created");
        Ok(Self { client, events, peer })
    }

    async fn poll(&mut self) -> Result<BrokerEvent, BridgeError> {
        loop {
            let event = self
                .events
                .poll()
                .await
                .map_err(|e| BridgeError::connection(format!("mqtt {}: {e}", self.peer)))?;
            if let Some(mapped) = map_event(event) {
                return mapped;
            }
        }
    }
}

impl BrokerConnection for MqttConnection {
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Result<BrokerEvent, BridgeError>> + Send + '_>> {
        Box::pin(self.poll())
    }

    fn subscribe<'a>(
        &'a mut self,
        topic: &'a str,
        qos: QoS,
    ) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + 'a>> {
        Box::pin(async move {
            self.client
                .subscribe(topic, to_mqtt_qos(qos))
                .await
                .map_err(|e| BridgeError::connection(format!("mqtt subscribe {topic}: {e}")))
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + '_>> {
        Box::pin(async move {
            self.client
                .disconnect()
                .await
                .map_err(|e| BridgeError::connection(format!("mqtt disconnect: {e}")))
        })
    }

    fn peer_info(&self) -> String {
        self.peer.clone()
    }
}

// ════════════════════════════════════════════════════════════════
//  Mapping
// ════════════════════════════════════════════════════════════════

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// Событие rumqttc → событие моста. `None` для служебных пакетов
/// (ping, puback и т.п.), которые listener'у не интересны.
fn map_event(event: Event) -> Option<Result<BrokerEvent, BridgeError>> {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => {
            if ack.code != ConnectReturnCode::Success {
                return Some(Err(BridgeError::connection(format!("connack refused: {:?}", ack.code))));
            }
            tracing::info!(session_present = ack.session_present, "mqtt connack");
            Some(Ok(BrokerEvent::Connected))
        }
        Event::Incoming(Packet::SubAck(ack)) => {
            if ack.return_codes.iter().any(|c| matches!(c, SubscribeReasonCode::Failure)) {
                return Some(Err(BridgeError::connection(format!(
                    "subscription rejected (pkid {})",
                    ack.pkid
                ))));
            }
            Some(Ok(BrokerEvent::Subscribed))
        }
        Event::Incoming(Packet::Publish(publish)) => Some(Ok(BrokerEvent::Message {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        })),
        Event::Outgoing(Outgoing::Disconnect) => Some(Ok(BrokerEvent::Disconnected)),
        _ => None,
    }
}
