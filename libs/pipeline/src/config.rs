use std::time::Duration;

use serde::Deserialize;

use bridge_api::QoS;

// ═══════════════════════════════════════════════════════════════
//  Subscription Config
// ═══════════════════════════════════════════════════════════════

/// На что подписывается listener.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    /// Topic брокера (e.g., "sensor/data/").
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Уровень QoS подписки (0, 1, 2).
    #[serde(default)]
    pub qos: QoS,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            qos: QoS::default(),
        }
    }
}

impl SubscriptionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("subscription topic must not be empty".into());
        }
        Ok(())
    }
}

fn default_topic() -> String {
    "sensor/data/".into()
}

// ═══════════════════════════════════════════════════════════════
//  Flush Config
// ═══════════════════════════════════════════════════════════════

/// Периодическая выгрузка буфера на endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct FlushConfig {
    /// Период между тиками scheduler'а, секунды (допускаются доли).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    /// Сделать последний drain + forward после запроса остановки.
    #[serde(default)]
    pub final_flush: bool,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            final_flush: false,
        }
    }
}

/// Допустимый диапазон периода тика.
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);
const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

impl FlushConfig {
    /// Период тика. Для невалидного `interval_secs` (см. `validate`)
    /// значение прижимается к допустимому диапазону.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_secs)
            .unwrap_or(MAX_FLUSH_INTERVAL)
            .clamp(MIN_FLUSH_INTERVAL, MAX_FLUSH_INTERVAL)
    }

    pub fn validate(&self) -> Result<(), String> {
        match Duration::try_from_secs_f64(self.interval_secs) {
            Ok(d) if (MIN_FLUSH_INTERVAL..=MAX_FLUSH_INTERVAL).contains(&d) => Ok(()),
            _ => Err(format!(
                "flush interval_secs must be between {} and {} seconds, got {}",
                MIN_FLUSH_INTERVAL.as_secs_f64(),
                MAX_FLUSH_INTERVAL.as_secs(),
                self.interval_secs
            )),
        }
    }
}

fn default_interval_secs() -> f64 {
    3.0
}

// ═══════════════════════════════════════════════════════════════
//  Reconnect Config
// ═══════════════════════════════════════════════════════════════

/// Экспоненциальный backoff переподключения к брокеру.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReconnectConfig {
    /// Первая задержка, мс. Удваивается на каждой неудаче.
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,
    /// Потолок задержки, мс.
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_ms == 0 {
            return Err("reconnect initial_ms must be greater than 0".into());
        }
        if self.initial_ms > self.max_ms {
            return Err(format!(
                "reconnect initial_ms ({}) must not exceed max_ms ({})",
                self.initial_ms, self.max_ms
            ));
        }
        Ok(())
    }
}

fn default_initial_ms() -> u64 {
    500
}
fn default_max_ms() -> u64 {
    30_000
}

// ═══════════════════════════════════════════════════════════════
//  Shutdown Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ShutdownConfig {
    /// Сколько ждать остановки listener'а и scheduler'а, секунды.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

// ═══════════════════════════════════════════════════════════════
//  Bridge Settings
// ═══════════════════════════════════════════════════════════════

/// Всё, что нужно `Bridge::start` кроме транспорта и endpoint'а.
#[derive(Debug, Clone, Default)]
pub struct BridgeSettings {
    pub subscription: SubscriptionConfig,
    pub flush: FlushConfig,
    pub reconnect: ReconnectConfig,
}

impl BridgeSettings {
    pub fn validate(&self) -> Result<(), String> {
        self.subscription.validate()?;
        self.flush.validate()?;
        self.reconnect.validate()
    }
}
