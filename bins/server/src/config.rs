use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use bridge_api::QoS;
use pipeline::{BridgeSettings, FlushConfig, ReconnectConfig, ShutdownConfig, SubscriptionConfig};
use sink_http::HttpSinkConfig;
use transport_mqtt::MqttConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "bridge-server", about = "Мост MQTT → HTTP для показаний сенсоров")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Подписаться на брокер и пересылать показания на endpoint
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config.toml", env = "BRIDGE_CONFIG")]
    pub config: String,

    /// Адрес MQTT-брокера
    #[arg(long, env = "BRIDGE_HOST")]
    pub host: Option<String>,

    /// Порт MQTT-брокера
    #[arg(long, env = "BRIDGE_PORT")]
    pub port: Option<u16>,

    /// Topic подписки
    #[arg(long, env = "BRIDGE_TOPIC")]
    pub topic: Option<String>,

    /// URL endpoint'а, куда уходят показания
    #[arg(long, env = "BRIDGE_URL")]
    pub url: Option<String>,

    /// Период выгрузки буфера, секунды
    #[arg(long, env = "BRIDGE_INTERVAL")]
    pub interval: Option<f64>,

    /// QoS подписки (0, 1, 2)
    #[arg(long, env = "BRIDGE_QOS")]
    pub qos: Option<u8>,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub endpoint: EndpointSection,
    #[serde(default)]
    pub flush: FlushConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[broker]`: подключение и подписка. Поля, которые можно
/// переопределить из CLI, опциональны.
#[derive(Debug, Default, Deserialize)]
pub struct BrokerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub client_id: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub clean_session: Option<bool>,
    pub topic: Option<String>,
    pub qos: Option<QoS>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndpointSection {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Фильтр tracing (`info`, `debug`, `pipeline=debug,info`, ...).
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: LogFormat::default() }
    }
}

fn default_log_level() -> String {
    "info".into()
}

pub fn load_config(path: &str) -> Result<Config, ServerError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
    toml::from_str(&content)
        .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация после мержа: defaults < config.toml < env/CLI
#[derive(Debug)]
pub struct Effective {
    pub mqtt: MqttConfig,
    pub endpoint: HttpSinkConfig,
    pub settings: BridgeSettings,
    pub shutdown: ShutdownConfig,
    pub logging: LoggingConfig,
}

impl Effective {
    /// Прочитать файл (если есть) и наложить CLI/env.
    pub fn new(args: &ServeArgs) -> Result<Self, ServerError> {
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&args.config).exists() {
                    return Err(e);
                }
                Config::default()
            }
        };
        Self::merge(args, cfg)
    }

    pub fn merge(args: &ServeArgs, cfg: Config) -> Result<Self, ServerError> {
        let Config { broker, endpoint, mut flush, reconnect, shutdown, logging } = cfg;

        let host = args.host.clone().or(broker.host).unwrap_or_default();
        if host.trim().is_empty() {
            return Err(invalid("broker", "host is required (--host, BRIDGE_HOST or [broker] host)"));
        }

        let mut mqtt = MqttConfig::new(host.trim());
        mqtt.port = args.port.or(broker.port).unwrap_or(mqtt.port);
        if let Some(id) = broker.client_id {
            mqtt.client_id = id;
        }
        mqtt.keep_alive_secs = broker.keep_alive_secs.unwrap_or(mqtt.keep_alive_secs);
        mqtt.clean_session = broker.clean_session.unwrap_or(mqtt.clean_session);

        let qos = match args.qos {
            Some(level) => QoS::try_from(level).map_err(|e| invalid("broker", e))?,
            None => broker.qos.unwrap_or_default(),
        };
        let subscription = SubscriptionConfig {
            topic: args.topic.clone().or(broker.topic).unwrap_or_else(|| SubscriptionConfig::default().topic),
            qos,
        };

        let url = args.url.clone().or(endpoint.url).unwrap_or_default();
        if url.trim().is_empty() {
            return Err(invalid("endpoint", "url is required (--url, BRIDGE_URL or [endpoint] url)"));
        }
        let url = url.trim();
        sink_http::parse_endpoint_url(url).map_err(|e| invalid("endpoint", e.message()))?;
        let mut endpoint_cfg = HttpSinkConfig::new(url);
        if let Some(t) = endpoint.timeout_secs {
            endpoint_cfg.timeout_secs = t;
        }

        if let Some(interval) = args.interval {
            flush.interval_secs = interval;
        }

        let settings = BridgeSettings { subscription, flush, reconnect };
        settings.validate().map_err(|detail| ServerError::Config { context: "validate", detail })?;

        if shutdown.timeout_secs == 0 {
            return Err(invalid("shutdown", "timeout_secs must be greater than 0"));
        }
        tracing_subscriber::EnvFilter::try_new(&logging.level)
            .map_err(|e| invalid("logging", format!("bad level '{}': {e}", logging.level)))?;

        Ok(Self { mqtt, endpoint: endpoint_cfg, settings, shutdown, logging })
    }
}

fn invalid(context: &'static str, detail: impl Into<String>) -> ServerError {
    ServerError::Config { context, detail: detail.into() }
}
