/// Category of a bridge error. Lets the pipeline decide what to do with
/// a failure (drop the record, reconnect, log and move on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration: permanent, fail at startup.
    Config,
    /// Broker or network transport failure: transient, reconnect.
    Connection,
    /// Payload is not a valid document: drop it.
    Format,
    /// Endpoint answered with a non-success HTTP status.
    Status(u16),
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Connection => f.write_str("connection"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Status(code) => write!(f, "status {code}"),
        }
    }
}

/// Unified error type for the `BrokerConnection` and `RecordSink` seams.
///
/// Carries an `ErrorKind` for classification and a human-readable message.
/// `From<serde_json::Error>` maps to `Format`, so sinks can serialize with `?`.
#[derive(Clone)]
pub struct BridgeError {
    kind: ErrorKind,
    message: String,
}

impl BridgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    /// Transport failure; the caller is expected to reconnect or skip.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Connection, message: msg.into() }
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    /// Non-success HTTP response. `msg` is typically the response body.
    pub fn status(code: u16, msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Status(code), message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BridgeError {}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self { Self::format_err(e.to_string()) }
}
