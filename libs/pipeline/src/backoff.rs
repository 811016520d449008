use std::time::Duration;

use crate::config::ReconnectConfig;

/// Экспоненциальная задержка между попытками переподключения:
/// initial, 2×initial, 4×initial … но не больше max.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        let initial = Duration::from_millis(config.initial_ms);
        Self {
            initial,
            max: Duration::from_millis(config.max_ms).max(initial),
            current: initial,
            attempts: 0,
        }
    }

    /// Задержка перед следующей попыткой; сдвигает состояние.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        self.attempts += 1;
        delay
    }

    /// Сброс после успешного подключения.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    /// Число попыток с последнего `reset`.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
