//! Контракт между pipeline и плагинами моста.
//!
//! Crate намеренно не зависит от tokio: транспорт брокера и endpoint
//! реализуют трейты ниже, а pipeline владеет задачами и каналами.

use std::future::Future;
use std::pin::Pin;

mod error;
mod types;
mod util;

pub use error::{BridgeError, ErrorKind};
pub use types::{BrokerEvent, Delivery, QoS, Record};
pub use util::{now_ms, truncate_for_log};

// ════════════════════════════════════════════════════════════════
//  Inbound: broker connection
// ════════════════════════════════════════════════════════════════

/// Подключение к брокеру: поток событий, доставляемых push'ем.
///
/// Реализация сама поддерживает сокет и переподключается при следующем
/// вызове `next_event` после ошибки. Listener владеет подключением
/// эксклюзивно.
pub trait BrokerConnection: Send {
    /// Дождаться следующего события. Ошибка с `ErrorKind::Connection`
    /// означает разрыв транспорта; повторный вызов инициирует reconnect.
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Result<BrokerEvent, BridgeError>> + Send + '_>>;

    /// Запросить подписку на topic. Подтверждение придёт как
    /// `BrokerEvent::Subscribed`.
    fn subscribe<'a>(
        &'a mut self,
        topic: &'a str,
        qos: QoS,
    ) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + 'a>>;

    /// Штатно закрыть соединение (graceful shutdown).
    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + '_>>;

    /// Описание удалённой стороны (для логирования).
    fn peer_info(&self) -> String {
        "unknown".into()
    }
}

// ════════════════════════════════════════════════════════════════
//  Outbound: record sink
// ════════════════════════════════════════════════════════════════

/// Endpoint, принимающий одну запись за вызов.
///
/// `ErrorKind::Status`: endpoint ответил не-успехом.
/// `ErrorKind::Connection`: сетевой сбой. Повторов на этом уровне нет.
pub trait RecordSink: Send + Sync {
    fn send<'a>(&'a self, record: &'a Record)
        -> Pin<Box<dyn Future<Output = Result<Delivery, BridgeError>> + Send + 'a>>;

    /// Адрес endpoint'а (для логирования).
    fn target(&self) -> &str;
}
