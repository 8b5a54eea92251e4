//! In-process mock HTTP endpoint answering requests from regex stub rules.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{BenchError, Result};

/// Upper bound on waiting for in-flight connections during `stop`
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Body prefix of the response returned when no stub matches
pub const UNMATCHED_BODY_PREFIX: &str = "Request was not matched";

/// A request predicate (method + full-path regex) paired with a canned response
#[derive(Debug, Clone)]
pub struct StubRule {
    pub method: Method,
    pub path_pattern: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl StubRule {
    pub fn new(method: Method, path_pattern: impl Into<String>) -> Self {
        Self {
            method,
            path_pattern: path_pattern.into(),
            status: 200,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn post(path_pattern: impl Into<String>) -> Self {
        Self::new(Method::POST, path_pattern)
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Validate the rule and precompute its response parts
    fn compile(self) -> Result<CompiledStub> {
        let pattern = Regex::new(&format!("^(?:{})$", self.path_pattern)).map_err(|e| {
            BenchError::InvalidStub(format!("path pattern {:?}: {}", self.path_pattern, e))
        })?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|_| BenchError::InvalidStub(format!("status {}", self.status)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| BenchError::InvalidStub(format!("header name {name:?}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| BenchError::InvalidStub(format!("header value {value:?}")))?;
            headers.append(name, value);
        }

        Ok(CompiledStub {
            method: self.method,
            pattern,
            status,
            headers,
            body: self.body,
        })
    }
}

#[derive(Debug)]
struct CompiledStub {
    method: Method,
    pattern: Regex,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl CompiledStub {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method == method && self.pattern.is_match(path)
    }

    fn respond(&self) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        response
    }
}

/// Counts of matched and unmatched requests
#[derive(Debug, Default)]
struct RequestJournal {
    matched: AtomicU64,
    unmatched: AtomicU64,
}

/// Shared state behind the mock endpoint's router
#[derive(Clone, Default)]
pub struct EndpointState {
    stubs: Arc<RwLock<Vec<CompiledStub>>>,
    journal: Arc<RequestJournal>,
}

impl EndpointState {
    pub fn register(&self, rule: StubRule) -> Result<()> {
        let description = format!("{} {}", rule.method, rule.path_pattern);
        let compiled = rule.compile()?;
        self.stubs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(compiled);
        tracing::debug!(stub = %description, "Stub registered");
        Ok(())
    }

    pub fn matched_requests(&self) -> u64 {
        self.journal.matched.load(Ordering::Relaxed)
    }

    pub fn unmatched_requests(&self) -> u64 {
        self.journal.unmatched.load(Ordering::Relaxed)
    }

    fn reset_journal(&self) {
        self.journal.matched.store(0, Ordering::Relaxed);
        self.journal.unmatched.store(0, Ordering::Relaxed);
    }
}

/// Build the router that matches every request against the stub table
pub fn router(state: EndpointState) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

async fn handle_request(
    State(state): State<EndpointState>,
    method: Method,
    uri: Uri,
    _body: Bytes,
) -> Response {
    let path = uri.path();

    let matched = {
        let stubs = state.stubs.read().unwrap_or_else(PoisonError::into_inner);
        stubs
            .iter()
            .find(|stub| stub.matches(&method, path))
            .map(CompiledStub::respond)
    };

    match matched {
        Some(response) => {
            state.journal.matched.fetch_add(1, Ordering::Relaxed);
            response
        }
        None => {
            state.journal.unmatched.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(method = %method, path = %path, "Request was not matched");
            (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain")],
                format!("{UNMATCHED_BODY_PREFIX}: {method} {path}\n"),
            )
                .into_response()
        }
    }
}

/// Mock HTTP endpoint bound to 127.0.0.1, running on its own runtime
pub struct MockEndpoint {
    state: EndpointState,
    runtime: Option<Runtime>,
    server: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl MockEndpoint {
    pub fn new() -> Self {
        Self {
            state: EndpointState::default(),
            runtime: None,
            server: None,
            shutdown_tx: None,
            port: 0,
        }
    }

    /// Start listening and return the bound port (0 picks an ephemeral one)
    pub fn start(&mut self, port: u16) -> Result<u16> {
        if self.server.is_some() {
            return Err(BenchError::AlreadyStarted(self.port));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("mock-endpoint")
            .enable_all()
            .build()
            .map_err(BenchError::Runtime)?;

        let addr = format!("127.0.0.1:{port}");
        let listener = runtime
            .block_on(TcpListener::bind(&addr))
            .map_err(|source| BenchError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let port = listener
            .local_addr()
            .map_err(|source| BenchError::Bind { addr, source })?
            .port();

        let app = router(self.state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server = runtime.spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "Mock endpoint server exited with error");
            }
        });

        self.runtime = Some(runtime);
        self.server = Some(server);
        self.shutdown_tx = Some(shutdown_tx);
        self.port = port;

        tracing::info!(port, "Mock endpoint listening on 127.0.0.1");
        Ok(port)
    }

    /// Register a stub rule; allowed before or after `start`
    pub fn register_stub(&self, rule: StubRule) -> Result<()> {
        self.state.register(rule)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn is_running(&self) -> bool {
        self.server.is_some()
    }

    pub fn matched_requests(&self) -> u64 {
        self.state.matched_requests()
    }

    pub fn unmatched_requests(&self) -> u64 {
        self.state.unmatched_requests()
    }

    pub fn reset_journal(&self) {
        self.state.reset_journal();
    }

    /// Stop serving and release the listening socket
    ///
    /// The port is free once this returns, also when called from inside an
    /// async context: the drain then runs on a plain OS thread that is joined
    /// here. `start` has no such fallback and must be called outside a runtime.
    ///
    /// Problems are logged, never raised: a failed stop must not invalidate
    /// results that were already measured.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let server = self.server.take();
        let drain = move || drain_runtime(runtime, server);

        if tokio::runtime::Handle::try_current().is_ok() {
            // Blocking on a runtime is not allowed from inside another one.
            if std::thread::spawn(drain).join().is_err() {
                tracing::warn!(port = self.port, "Mock endpoint drain thread panicked");
            }
        } else {
            drain();
        }

        tracing::info!(port = self.port, "Mock endpoint stopped");
    }
}

/// Wait for the server task to finish, then shut the runtime down
fn drain_runtime(runtime: Runtime, server: Option<JoinHandle<()>>) {
    if let Some(server) = server {
        match runtime.block_on(async { tokio::time::timeout(SHUTDOWN_GRACE, server).await }) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Mock endpoint task failed"),
            Err(_) => tracing::warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "Mock endpoint did not drain in time; forcing shutdown"
            ),
        }
    }

    runtime.shutdown_timeout(Duration::from_secs(1));
}

impl Default for MockEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MockEndpoint {
    fn drop(&mut self) {
        self.stop();
    }
}
