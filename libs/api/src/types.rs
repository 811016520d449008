use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  QoS
// ════════════════════════════════════════════════════════════════

/// Уровень гарантии доставки брокера (MQTT QoS 0/1/2).
///
/// В конфиге задаётся числом: `qos = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(format!("qos must be 0, 1 or 2, got {other}")),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> u8 {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl std::fmt::Display for QoS {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

// ════════════════════════════════════════════════════════════════
//  Record
// ════════════════════════════════════════════════════════════════

/// Одно показание сенсора: JSON-объект плюс метаданные приёма.
///
/// Поля `body` для моста непрозрачны: схема не проверяется,
/// на endpoint уходит только `body`.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Topic, из которого пришло сообщение.
    pub topic: String,
    /// Время приёма (Unix ms).
    pub received_ms: i64,
    pub body: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    pub fn new(topic: impl Into<String>, body: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            topic: topic.into(),
            received_ms: crate::util::now_ms(),
            body,
        }
    }

    /// Сериализовать тело записи (то, что уходит в HTTP body).
    pub fn body_bytes(&self) -> Result<Vec<u8>, crate::BridgeError> {
        Ok(serde_json::to_vec(&self.body)?)
    }
}

// ════════════════════════════════════════════════════════════════
//  Broker events
// ════════════════════════════════════════════════════════════════

/// Событие, поднятое транспортом брокера к listener'у.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// Соединение установлено (или восстановлено), пора (пере)подписаться.
    Connected,
    /// Брокер подтвердил подписку.
    Subscribed,
    /// Входящее сообщение.
    Message { topic: String, payload: Vec<u8> },
    /// Транспорт закрыт (штатно или брокером).
    Disconnected,
}

// ════════════════════════════════════════════════════════════════
//  Delivery
// ════════════════════════════════════════════════════════════════

/// Успешный ответ endpoint'а на одну запись.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status: u16,
    /// Тело ответа как текст.
    pub reply: String,
}

impl Delivery {
    /// Sensor API отвечает `200 {"error": "..."}` на логический отказ.
    /// Возвращает текст такой ошибки, если он есть.
    pub fn reported_error(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.reply).ok()?;
        match value.get("error")? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
