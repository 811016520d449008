//! In-process fakes for the two seams, used by the pipeline tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, mpsc};

use bridge_api::{BridgeError, BrokerConnection, BrokerEvent, Delivery, QoS, Record, RecordSink};

pub type ScriptedEvent = Result<BrokerEvent, BridgeError>;

pub fn message(topic: &str, payload: &str) -> ScriptedEvent {
    Ok(BrokerEvent::Message { topic: topic.into(), payload: payload.as_bytes().to_vec() })
}

pub fn reading(seq: u64) -> String {
    format!(r#"{{"deviceID":1,"seq":{seq}}}"#)
}

pub fn record(seq: u64) -> Record {
    let mut body = serde_json::Map::new();
    body.insert("seq".into(), serde_json::json!(seq));
    Record::new("sensor/data/", body)
}

pub fn seq_of(record: &Record) -> u64 {
    record.body["seq"].as_u64().unwrap_or(u64::MAX)
}

// ═══════════════════════════════════════════════════════════════
//  ScriptedConnection
// ═══════════════════════════════════════════════════════════════

/// Broker connection fed from a channel. Blocks when the script is
/// exhausted; after `disconnect` it reports `Disconnected`.
pub struct ScriptedConnection {
    rx: mpsc::UnboundedReceiver<ScriptedEvent>,
    control: ScriptControl,
}

/// Test-side view of a `ScriptedConnection`.
#[derive(Clone)]
pub struct ScriptControl {
    tx: mpsc::UnboundedSender<ScriptedEvent>,
    subscriptions: Arc<Mutex<Vec<(String, QoS)>>>,
    disconnected: Arc<AtomicBool>,
}

impl ScriptedConnection {
    pub fn new(script: Vec<ScriptedEvent>) -> (Self, ScriptControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = ScriptControl {
            tx,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            disconnected: Arc::new(AtomicBool::new(false)),
        };
        for event in script {
            control.push(event);
        }
        (Self { rx, control: control.clone() }, control)
    }
}

impl ScriptControl {
    pub fn push(&self, event: ScriptedEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

impl BrokerConnection for ScriptedConnection {
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Result<BrokerEvent, BridgeError>> + Send + '_>> {
        Box::pin(async move {
            if self.control.is_disconnected() {
                return Ok(BrokerEvent::Disconnected);
            }
            match self.rx.recv().await {
                Some(event) => event,
                None => Ok(BrokerEvent::Disconnected),
            }
        })
    }

    fn subscribe<'a>(
        &'a mut self,
        topic: &'a str,
        qos: QoS,
    ) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + 'a>> {
        Box::pin(async move {
            self.control.subscriptions.lock().unwrap().push((topic.to_string(), qos));
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<(), BridgeError>> + Send + '_>> {
        Box::pin(async move {
            self.control.disconnected.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn peer_info(&self) -> String {
        "scripted".into()
    }
}

// ═══════════════════════════════════════════════════════════════
//  RecordingSink
// ═══════════════════════════════════════════════════════════════

enum Failure {
    Network,
    Status(u16),
}

/// Endpoint that records every attempt. Individual calls (0-based) can
/// be made to fail; an optional delay simulates a slow server.
#[derive(Default)]
pub struct RecordingSink {
    attempts: Mutex<Vec<Record>>,
    delivered: Mutex<Vec<Record>>,
    failures: HashMap<usize, Failure>,
    reply: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
    pub first_call: Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self { reply: r#"{"message":"Data updated successfully"}"#.into(), ..Default::default() }
    }

    pub fn fail_network_at(mut self, call: usize) -> Self {
        self.failures.insert(call, Failure::Network);
        self
    }

    pub fn reject_at(mut self, call: usize, status: u16) -> Self {
        self.failures.insert(call, Failure::Status(status));
        self
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn attempts(&self) -> Vec<Record> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<Record> {
        self.delivered.lock().unwrap().clone()
    }
}

impl RecordSink for RecordingSink {
    fn send<'a>(&'a self, record: &'a Record)
        -> Pin<Box<dyn Future<Output = Result<Delivery, BridgeError>> + Send + 'a>>
    {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                self.first_call.notify_one();
            }
            self.attempts.lock().unwrap().push(record.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.failures.get(&call) {
                Some(Failure::Network) => Err(BridgeError::connection("connection refused")),
                Some(Failure::Status(code)) => Err(BridgeError::status(*code, "server error")),
                None => {
                    self.delivered.lock().unwrap().push(record.clone());
                    Ok(Delivery { status: 200, reply: self.reply.clone() })
                }
            }
        })
    }

    fn target(&self) -> &str {
        "http://recording.test/api"
    }
}
