//! Background dispatch for remote push handlers
//!
//! Each remote handler owns one [`Dispatcher`]: a bounded queue feeding a
//! single worker thread that runs a Tokio current-thread runtime and posts
//! payloads with `reqwest`. Callers only ever `try_send` into the queue, so
//! emitting never waits on the network. A full queue drops the payload.
//! In-flight requests are capped by a semaphore unless `max_in_flight` is
//! `None`, which reproduces unbounded fire-and-forget.
//!
//! Delivery failures are counted in [`DispatchMetrics`] and otherwise
//! ignored: reporting them through the logging path could re-trigger them.

use crate::core::{CloseError, DispatchMetrics, SetupError};
use parking_lot::{Mutex, RwLock};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::collections::BTreeMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use url::Url;

/// Default per-request timeout for pushes
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the reachability check done at construction
pub const DEFAULT_REACHABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest queue capacity or in-flight limit Tokio can represent
pub const MAX_DISPATCH_LIMIT: usize = Semaphore::MAX_PERMITS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Payloads buffered before new ones are dropped
    pub queue_capacity: usize,
    /// Concurrent requests; `None` means unbounded
    pub max_in_flight: Option<usize>,
    /// Per-request timeout, the only bound on a request's lifetime
    pub request_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_in_flight: Some(32),
            request_timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }
}

impl DispatchConfig {
    /// Unbounded in-flight requests, matching plain fire-and-forget
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.max_in_flight = None;
        self
    }
}

pub struct Dispatcher {
    component: String,
    sender: RwLock<Option<mpsc::Sender<Vec<u8>>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    /// Start a worker posting JSON payloads to `url` with `headers`
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Runtime`] if the HTTP client, runtime or worker
    /// thread cannot be created, and [`SetupError::InvalidConfiguration`]
    /// for malformed headers or limits beyond [`MAX_DISPATCH_LIMIT`].
    pub fn start(
        component: &str,
        url: Url,
        headers: &BTreeMap<String, String>,
        config: &DispatchConfig,
    ) -> Result<Self, SetupError> {
        if config.queue_capacity > MAX_DISPATCH_LIMIT
            || config.max_in_flight.is_some_and(|limit| limit > MAX_DISPATCH_LIMIT)
        {
            return Err(SetupError::config(
                component,
                format!("dispatch limits must not exceed {}", MAX_DISPATCH_LIMIT),
            ));
        }

        let mut header_map = HeaderMap::new();
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| SetupError::config(component, format!("invalid header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SetupError::config(component, format!("invalid value for header '{}': {}", key, e)))?;
            header_map.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(header_map)
            .build()
            .map_err(|e| SetupError::runtime(component, format!("HTTP client: {}", e)))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SetupError::runtime(component, format!("runtime: {}", e)))?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let metrics = Arc::new(DispatchMetrics::new());
        let semaphore = config
            .max_in_flight
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        let worker_metrics = Arc::clone(&metrics);
        let handle = thread::Builder::new()
            .name(format!("log-fabric-{}", component))
            .spawn(move || {
                runtime.block_on(run_worker(receiver, client, url, semaphore, worker_metrics));
            })
            .map_err(|e| SetupError::runtime(component, format!("worker thread: {}", e)))?;

        Ok(Self {
            component: component.to_string(),
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            metrics,
        })
    }

    /// Queue a payload without waiting; returns whether it was accepted
    pub fn submit(&self, body: Vec<u8>) -> bool {
        // Count first so the worker never settles a payload that is not yet counted
        self.metrics.record_submitted();
        let full = match self.sender.read().as_ref() {
            Some(sender) => match sender.try_send(body) {
                Ok(()) => return true,
                Err(e) => matches!(e, TrySendError::Full(_)),
            },
            None => false,
        };

        let dropped = self.metrics.record_dropped() + 1;
        // Rate-limited: warn on the 1st, 2nd, 4th, 8th ... drop
        if full && dropped.is_power_of_two() {
            eprintln!(
                "[WARN] {} dispatch queue full, payload dropped ({} dropped so far)",
                self.component, dropped
            );
        }
        false
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// Wait until every accepted payload has been delivered or has failed
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.metrics.pending() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// Stop accepting payloads, let queued and in-flight requests finish, join the worker
    pub fn close(&self) -> Result<(), CloseError> {
        self.sender.write().take();
        match self.worker.lock().take() {
            Some(handle) => handle.join().map_err(|_| CloseError::Dispatcher {
                component: self.component.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the queue lets the worker drain and exit on its own
        self.sender.write().take();
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<Vec<u8>>,
    client: reqwest::Client,
    url: Url,
    semaphore: Option<Arc<Semaphore>>,
    metrics: Arc<DispatchMetrics>,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            next = receiver.recv() => {
                let Some(body) = next else { break };
                let permit = match &semaphore {
                    Some(semaphore) => match Arc::clone(semaphore).acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                    None => None,
                };
                let request = client.post(url.clone()).body(body);
                let metrics = Arc::clone(&metrics);
                in_flight.spawn(async move {
                    match request.send().await {
                        Ok(response) if response.status().is_success() => metrics.record_delivered(),
                        _ => metrics.record_failed(),
                    };
                    drop(permit);
                });
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    while in_flight.join_next().await.is_some() {}
}

/// Parse a push endpoint, prepending `http://` when no scheme is given
pub fn parse_endpoint(component: &str, raw: &str) -> Result<Url, SetupError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SetupError::config(component, "endpoint is empty"));
    }
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    Url::parse(with_scheme.trim_end_matches('/'))
        .map_err(|e| SetupError::config(component, format!("invalid endpoint '{}': {}", raw, e)))
}

/// Append an API path to a base endpoint, keeping any base path prefix
pub fn join_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!("{}/{}", base.path().trim_end_matches('/'), path.trim_start_matches('/'));
    url.set_path(&joined);
    url
}

/// Check that the endpoint's host accepts TCP connections
pub fn check_reachable(url: &Url, timeout: Duration) -> Result<(), SetupError> {
    let host = url
        .host_str()
        .ok_or_else(|| SetupError::unreachable(url.as_str(), "endpoint has no host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| SetupError::unreachable(url.as_str(), "endpoint has no port"))?;

    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| SetupError::unreachable(url.as_str(), format!("resolve failed: {}", e)))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return Ok(()),
            Err(e) => last_error = Some(e),
        }
    }
    Err(SetupError::unreachable(
        url.as_str(),
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no addresses resolved".to_string()),
    ))
}
