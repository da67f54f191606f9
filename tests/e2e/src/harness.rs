//! Relay test harness: a live relay on a loopback port plus HTTP clients.
//!
//! Each harness owns its storage directory, so scenarios are isolated and
//! can run in parallel.

use relay_client::{
    Client, ClientConfig, HttpTransport, MemoryKv, Request, Response, Transport, TransportError,
};
use relay_content::collect_stream;
use relay_server::{http, Config, RelayError, WebRelay};
use relay_types::{Record, SigningKey};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

/// Client type used by the scenarios.
pub type TestClient = Client<MemoryKv, HttpTransport>;

/// Errors that can occur during harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Relay failed to start.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Raw request failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A condition did not hold before the deadline.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// General I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A raw relay response with its body collected.
#[derive(Debug)]
pub struct RawResponse {
    /// HTTP status.
    pub status: u16,
    /// Record header, if any.
    pub record: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
}

/// A relay served on `127.0.0.1` for the lifetime of the harness.
pub struct RelayHarness {
    addr: SocketAddr,
    relay: Arc<WebRelay>,
    server: JoinHandle<std::io::Result<()>>,
    transport: HttpTransport,
    storage: TempDir,
}

impl RelayHarness {
    /// Start a relay with default settings.
    pub async fn start() -> Result<Self, HarnessError> {
        Self::start_with(Config::default()).await
    }

    /// Start a relay with `config`; storage always goes to a fresh temp dir.
    pub async fn start_with(mut config: Config) -> Result<Self, HarnessError> {
        let storage = tempfile::tempdir()?;
        config.storage.dir = storage.path().to_path_buf();

        let relay = Arc::new(WebRelay::open(config).await?);
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(http::serve(listener, Arc::clone(&relay)));
        debug!(%addr, "Test relay started");

        Ok(Self {
            addr,
            relay,
            server,
            transport: HttpTransport::new(),
            storage,
        })
    }

    /// Origin of the relay, e.g. `http://127.0.0.1:41234`.
    pub fn address(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The relay behind the listener.
    pub fn relay(&self) -> &WebRelay {
        &self.relay
    }

    /// The relay's storage directory.
    pub fn storage_dir(&self) -> &Path {
        self.storage.path()
    }

    /// A client for `key` with a fresh in-memory store.
    pub fn client(&self, key: SigningKey) -> TestClient {
        self.client_with_store(key, MemoryKv::new())
    }

    /// A client for `key` over an existing store.
    pub fn client_with_store(&self, key: SigningKey, store: MemoryKv) -> TestClient {
        let config = ClientConfig::new().with_relay(self.address());
        Client::new(key, store, HttpTransport::new(), config)
    }

    /// PUT `body` at `full_path` with `record` as the record header.
    pub async fn raw_put(
        &self,
        full_path: &str,
        record: &Record,
        body: &[u8],
    ) -> Result<RawResponse, HarnessError> {
        let request = Request::put(self.url(full_path), record.to_base64(), body.to_vec());
        self.send(request).await
    }

    /// GET `full_path`.
    pub async fn raw_get(&self, full_path: &str) -> Result<RawResponse, HarnessError> {
        self.send(Request::get(self.url(full_path))).await
    }

    async fn send(&self, request: Request) -> Result<RawResponse, HarnessError> {
        let Response {
            status,
            record,
            body,
        } = self.transport.request(request).await?;
        Ok(RawResponse {
            status,
            record,
            body: collect_stream(body).await?,
        })
    }

    fn url(&self, full_path: &str) -> String {
        format!("{}/{}", self.address(), full_path)
    }
}

impl Drop for RelayHarness {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// An address nothing listens on.
///
/// Binds an ephemeral port and releases it, so connections are refused.
pub async fn offline_address() -> Result<String, HarnessError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

/// Poll `check` every 20ms until it returns true or `timeout` passes.
pub async fn wait_for<F, Fut>(what: &str, timeout: Duration, mut check: F) -> Result<(), HarnessError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(HarnessError::Timeout(what.to_string()));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
