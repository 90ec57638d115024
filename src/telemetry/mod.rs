//! Process-wide logging context.
//!
//! [`Telemetry`] installs the tracing subscriber once at startup. Records
//! always go to stderr; when remote credentials are configured they are also
//! shipped to a remote sink. Dropping the context flushes the remote sink,
//! so holding it for the lifetime of `main` covers every exit path.

mod remote;

pub use remote::{HttpTransport, LogTransport, RemoteLayer, RemoteSink, RemoteSinkConfig};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging context held for the lifetime of the process.
pub struct Telemetry {
    run_id: String,
    remote: Option<RemoteSink>,
}

impl Telemetry {
    /// Installs the global subscriber.
    ///
    /// `RUST_LOG` controls the filter and defaults to `info`.
    pub fn init(remote: Option<RemoteSinkConfig>) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        let remote = remote.map(|config| {
            RemoteSink::spawn(Box::new(HttpTransport::new(config)), run_id.clone())
        });

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(remote.as_ref().map(RemoteSink::layer))
            .try_init();

        if let Err(e) = installed {
            eprintln!("tracing subscriber already installed: {}", e);
        }

        if remote.is_some() {
            tracing::info!(run_id = %run_id, "logging locally and to remote sink");
        } else {
            tracing::info!(run_id = %run_id, "only logging locally");
        }

        Self { run_id, remote }
    }

    /// Identifier attached to every remote record of this run.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns true if records are shipped to a remote sink.
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(remote) = self.remote.take() {
            remote.shutdown();
        }
    }
}
