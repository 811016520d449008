use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::buffer::SharedBuffer;
use crate::config::FlushConfig;
use crate::forwarder::{BatchReport, Forwarder};

/// Итоги работы scheduler'а, возвращаются из его задачи.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerReport {
    pub ticks: u64,
    /// Непустых батчей передано forwarder'у.
    pub batches: u64,
    pub delivered: u64,
    pub failed: u64,
}

// ═══════════════════════════════════════════════════════════════
//  FlushScheduler: timer tick → drain → forward
// ═══════════════════════════════════════════════════════════════

/// Единственный consumer для `SharedBuffer`.
///
/// Батч пересылается синхронно внутри тика: следующий тик не начнётся,
/// пока не получены исходы по всем записям текущего.
pub struct FlushScheduler {
    buffer: Arc<SharedBuffer>,
    forwarder: Forwarder,
    interval: Duration,
    final_flush: bool,
    report: SchedulerReport,
}

impl FlushScheduler {
    pub fn new(buffer: Arc<SharedBuffer>, forwarder: Forwarder, flush: &FlushConfig) -> Self {
        Self {
            buffer,
            forwarder,
            interval: flush.interval(),
            final_flush: flush.final_flush,
            report: SchedulerReport::default(),
        }
    }

    /// Один тик: drain и, если есть что слать, forward.
    pub async fn flush_once(&mut self) -> Option<BatchReport> {
        let batch = self.buffer.drain();
        if batch.is_empty() {
            tracing::debug!(endpoint = %self.forwarder.target(), "nothing to send");
            return None;
        }

        tracing::debug!(records = batch.len(), "flushing batch");
        let report = self.forwarder.forward(batch).await;
        self.report.batches += 1;
        self.report.delivered += report.delivered as u64;
        self.report.failed += report.failed as u64;
        Some(report)
    }

    /// Основной цикл. Токен проверяется только между тиками, так что
    /// начатый батч всегда пересылается целиком.
    pub async fn run(mut self, token: CancellationToken) -> SchedulerReport {
        tracing::info!(
            endpoint = %self.forwarder.target(),
            interval_ms = self.interval.as_millis() as u64,
            "scheduler starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; the first flush is one period in.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.report.ticks += 1;
            self.flush_once().await;
        }

        if self.final_flush {
            tracing::info!(pending = self.buffer.len(), "final flush");
            self.flush_once().await;
        }

        let r = &self.report;
        tracing::info!(
            ticks = r.ticks,
            batches = r.batches,
            delivered = r.delivered,
            failed = r.failed,
            "scheduler stopped"
        );
        self.report
    }
}
