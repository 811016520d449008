use std::sync::Arc;

use bridge_api::{Delivery, Record, RecordSink, truncate_for_log};

use crate::buffer::Batch;
use crate::ForwardError;

/// Максимум символов ответа endpoint'а в логе.
const REPLY_LOG_CHARS: usize = 256;

/// Итог одного прохода по батчу.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

// ═══════════════════════════════════════════════════════════════
//  Forwarder: Batch → one request per Record
// ═══════════════════════════════════════════════════════════════

/// Отправляет записи батча по одной, по порядку. Сбой одной записи
/// логируется и не прерывает батч; повторов нет (at-most-once).
#[derive(Clone)]
pub struct Forwarder {
    sink: Arc<dyn RecordSink>,
}

impl Forwarder {
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self { sink }
    }

    pub fn target(&self) -> &str {
        self.sink.target()
    }

    /// Потребляет батч: каждая запись отбрасывается после попытки,
    /// независимо от исхода.
    pub async fn forward(&self, batch: Batch) -> BatchReport {
        let endpoint = self.sink.target();
        let mut report = BatchReport::default();

        for record in batch {
            report.attempted += 1;
            match self.forward_one(&record).await {
                Ok(delivery) => {
                    report.delivered += 1;
                    log_delivery(endpoint, &record, &delivery);
                }
                Err(e) => {
                    report.failed += 1;
                    log_failure(endpoint, &record, &e);
                }
            }
        }

        tracing::info!(
            %endpoint,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "batch forwarded"
        );
        report
    }

    async fn forward_one(&self, record: &Record) -> Result<Delivery, ForwardError> {
        Ok(self.sink.send(record).await?)
    }
}

fn log_delivery(endpoint: &str, record: &Record, delivery: &Delivery) {
    tracing::info!(
        %endpoint,
        topic = %record.topic,
        status = delivery.status,
        reply = %truncate_for_log(&delivery.reply, REPLY_LOG_CHARS),
        "record delivered"
    );
    if let Some(reason) = delivery.reported_error() {
        tracing::warn!(%endpoint, topic = %record.topic, %reason, "endpoint reported error");
    }
}

fn log_failure(endpoint: &str, record: &Record, err: &ForwardError) {
    match err {
        ForwardError::Status { status, body } => tracing::warn!(
            %endpoint,
            topic = %record.topic,
            status = *status,
            body = %truncate_for_log(body, REPLY_LOG_CHARS),
            "endpoint rejected record"
        ),
        ForwardError::Network(_) | ForwardError::Other(_) => tracing::warn!(
            %endpoint,
            topic = %record.topic,
            error = %err,
            "record not delivered"
        ),
    }
}
