//! Remote log sink.
//!
//! Events are converted to JSON and handed over a channel to a shipper
//! thread, which posts them in batches. The shipper owns the transport so
//! blocking HTTP never runs on the orchestrator's runtime.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Environment variable naming the remote sink endpoint.
pub const ENDPOINT_ENV: &str = "ARNOLD_LOG_ENDPOINT";
/// Environment variable holding the remote sink bearer token.
pub const TOKEN_ENV: &str = "ARNOLD_LOG_TOKEN";

const MAX_BATCH: usize = 100;
const SHIPPER_THREAD: &str = "arnold-log-shipper";
/// Targets of the HTTP stack used by the shipper itself.
const TRANSPORT_TARGETS: [&str; 4] = ["reqwest", "hyper", "h2", "rustls"];
const FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Credentials for the remote sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSinkConfig {
    pub endpoint: String,
    pub token: String,
}

impl RemoteSinkConfig {
    /// Reads the sink credentials from the process environment.
    pub fn from_env() -> Option<Self> {
        Self::from_env_map(&std::env::vars().collect())
    }

    /// Reads the sink credentials from an environment snapshot.
    ///
    /// Both the endpoint and the token must be set and non-empty.
    pub fn from_env_map(env: &HashMap<String, String>) -> Option<Self> {
        let endpoint = env.get(ENDPOINT_ENV).filter(|v| !v.trim().is_empty())?;
        let token = env.get(TOKEN_ENV).filter(|v| !v.trim().is_empty())?;
        Some(Self {
            endpoint: endpoint.clone(),
            token: token.clone(),
        })
    }
}

/// Delivers a batch of records somewhere.
pub trait LogTransport: Send {
    fn send(&mut self, batch: &[Value]) -> Result<(), String>;
}

/// Posts record batches as a JSON array with a bearer token.
pub struct HttpTransport {
    config: RemoteSinkConfig,
    client: Option<reqwest::blocking::Client>,
}

impl HttpTransport {
    pub fn new(config: RemoteSinkConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }
}

impl LogTransport for HttpTransport {
    fn send(&mut self, batch: &[Value]) -> Result<(), String> {
        if self.client.is_none() {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| e.to_string())?;
            self.client = Some(client);
        }
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| "HTTP client unavailable".to_string())?;

        let response = client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.token)
            .json(batch)
            .send()
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("remote sink returned {}", response.status()));
        }
        Ok(())
    }
}

type SharedSender = Arc<Mutex<Option<Sender<Value>>>>;

/// Handle to the shipper thread.
pub struct RemoteSink {
    sender: SharedSender,
    run_id: String,
    handle: Option<JoinHandle<()>>,
}

impl RemoteSink {
    /// Starts the shipper thread.
    pub fn spawn(transport: Box<dyn LogTransport>, run_id: String) -> Self {
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name(SHIPPER_THREAD.to_string())
            .spawn(move || ship(rx, transport))
            .ok();

        Self {
            sender: Arc::new(Mutex::new(Some(tx))),
            run_id,
            handle,
        }
    }

    /// Returns a tracing layer feeding this sink.
    pub fn layer(&self) -> RemoteLayer {
        RemoteLayer {
            sender: Arc::clone(&self.sender),
            run_id: self.run_id.clone(),
        }
    }

    /// Closes the channel and waits for pending records to be shipped.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RemoteSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn ship(rx: Receiver<Value>, mut transport: Box<dyn LogTransport>) {
    let mut batch = Vec::with_capacity(MAX_BATCH);
    loop {
        match rx.recv_timeout(FLUSH_INTERVAL) {
            Ok(record) => {
                batch.push(record);
                if batch.len() >= MAX_BATCH {
                    flush(&mut batch, transport.as_mut());
                }
            }
            Err(RecvTimeoutError::Timeout) => flush(&mut batch, transport.as_mut()),
            Err(RecvTimeoutError::Disconnected) => {
                flush(&mut batch, transport.as_mut());
                break;
            }
        }
    }
}

fn flush(batch: &mut Vec<Value>, transport: &mut dyn LogTransport) {
    if batch.is_empty() {
        return;
    }
    // The shipper must not log through tracing: its records would loop back here.
    if let Err(e) = transport.send(batch) {
        eprintln!("failed to ship {} log records: {}", batch.len(), e);
    }
    batch.clear();
}

/// Tracing layer that forwards events to a [`RemoteSink`].
pub struct RemoteLayer {
    sender: SharedSender,
    run_id: String,
}

impl<S: Subscriber> Layer<S> for RemoteLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if is_transport_event(event.metadata().target()) {
            return;
        }
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let mut record = Map::new();
        record.insert(
            "timestamp".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        record.insert(
            "severity".to_string(),
            Value::String(metadata.level().to_string()),
        );
        record.insert(
            "target".to_string(),
            Value::String(metadata.target().to_string()),
        );
        record.insert("run_id".to_string(), Value::String(self.run_id.clone()));
        record.insert("fields".to_string(), Value::Object(visitor.fields));

        if let Ok(sender) = self.sender.lock() {
            if let Some(tx) = sender.as_ref() {
                let _ = tx.send(Value::Object(record));
            }
        }
    }
}

/// Returns true for records the shipper would produce while shipping.
fn is_transport_event(target: &str) -> bool {
    if std::thread::current().name() == Some(SHIPPER_THREAD) {
        return true;
    }
    TRANSPORT_TARGETS.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
    })
}

#[derive(Default)]
struct JsonVisitor {
    fields: Map<String, Value>,
}

impl Visit for JsonVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields
            .insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), Value::String(format!("{:?}", value)));
    }
}
