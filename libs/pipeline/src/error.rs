use std::time::Duration;

use bridge_api::{BridgeError, ErrorKind};

/// Payload не удалось превратить в `Record`. Никогда не останавливает
/// listener: сообщение логируется и отбрасывается.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Одна запись не доставлена. Не ретраится, батч не прерывается.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("endpoint returned status {status}")]
    Status { status: u16, body: String },

    #[error("network: {0}")]
    Network(String),

    #[error("{0}")]
    Other(BridgeError),
}

impl From<BridgeError> for ForwardError {
    fn from(e: BridgeError) -> Self {
        match e.kind() {
            ErrorKind::Status(status) => ForwardError::Status { status, body: e.message().to_string() },
            ErrorKind::Connection => ForwardError::Network(e.message().to_string()),
            _ => ForwardError::Other(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("connection ({peer}): {source}")]
    Connection { peer: String, source: BridgeError },

    #[error("shutdown timed out after {waited:?}, still running: {pending:?}")]
    ShutdownTimeout { waited: Duration, pending: Vec<&'static str> },

    #[error("{task} task failed: {source}")]
    Join { task: &'static str, source: tokio::task::JoinError },

    #[error("{task} task exited before shutdown was requested")]
    TaskExited { task: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_classify_as_status() {
        let e = ForwardError::from(BridgeError::status(500, "boom"));
        assert!(matches!(e, ForwardError::Status { status: 500, ref body } if body == "boom"));
    }

    #[test]
    fn connection_errors_classify_as_network() {
        let e = ForwardError::from(BridgeError::connection("connection refused"));
        assert!(matches!(e, ForwardError::Network(ref m) if m == "connection refused"));
        assert_eq!(e.to_string(), "network: connection refused");
    }

    #[test]
    fn other_kinds_are_kept() {
        let e = ForwardError::from(BridgeError::format_err("bad body"));
        assert!(matches!(e, ForwardError::Other(_)));
    }
}
