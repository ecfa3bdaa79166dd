//! HTTP document-store connector.
//!
//! Documents are written with `PUT {endpoint}/{target}/docs/{key}` and the
//! target itself is managed with `DELETE`/`PUT {endpoint}/{target}`.
//!
//! Writes go through a client-side send queue in front of the connection
//! pool: at most `max_connections` requests are on the wire, at most
//! `send_queue_capacity` more wait for a connection, and anything beyond
//! that is rejected immediately as [`BackendError::Overload`].

use crate::options::{ConnectOptions, Credentials, DnsResolution, Transcoding};
use crate::session::{Connector, Provisioner, Session};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_core::{BackendError, TargetSpec};
use tokio::sync::Semaphore;

/// Connector for an HTTP document store
#[derive(Debug, Clone)]
pub struct HttpConnector {
    target: String,
}

impl HttpConnector {
    /// Create a connector whose sessions write into `target`
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn open(&self, options: &ConnectOptions) -> Result<Arc<dyn Session>, BackendError> {
        let session = HttpSession::connect(options, &self.target).await?;
        Ok(Arc::new(session))
    }
}

/// Open session against an HTTP document store
pub struct HttpSession {
    client: Client,
    endpoint: String,
    target: String,
    credentials: Credentials,
    transcoding: Transcoding,
    dispatch: Semaphore,
    queued: AtomicUsize,
    send_queue_capacity: usize,
    closed: AtomicBool,
}

impl HttpSession {
    /// Build the client and warm `min_connections` connections
    pub async fn connect(options: &ConnectOptions, target: &str) -> Result<Self, BackendError> {
        let url = Url::parse(&options.endpoint)
            .map_err(|e| BackendError::InvalidEndpoint(format!("{}: {}", options.endpoint, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| BackendError::InvalidEndpoint(options.endpoint.clone()))?
            .to_string();

        let mut builder = Client::builder()
            .pool_max_idle_per_host(options.pool.max_connections)
            .connect_timeout(options.connect_timeout);
        if let DnsResolution::Static(addrs) = &options.dns {
            builder = builder.resolve_to_addrs(&host, addrs);
        }
        let client = builder
            .build()
            .map_err(|e| BackendError::connection_failed(&options.endpoint, e.to_string()))?;

        let session = Self {
            client,
            endpoint: options.endpoint.trim_end_matches('/').to_string(),
            target: target.to_string(),
            credentials: options.credentials.clone(),
            transcoding: options.transcoding,
            dispatch: Semaphore::new(options.pool.max_connections.max(1)),
            queued: AtomicUsize::new(0),
            send_queue_capacity: options.send_queue_capacity,
            closed: AtomicBool::new(false),
        };

        session.warm_pool(options.pool.min_connections).await?;

        tracing::info!(
            "HTTP session open: endpoint={} target={} pool={}..{} send_queue={}",
            session.endpoint,
            session.target,
            options.pool.min_connections,
            options.pool.max_connections,
            options.send_queue_capacity
        );
        Ok(session)
    }

    async fn warm_pool(&self, connections: usize) -> Result<(), BackendError> {
        let probes = (0..connections).map(|_| {
            self.client
                .head(&self.endpoint)
                .basic_auth(&self.credentials.username, Some(&self.credentials.password))
                .send()
        });

        for result in futures::future::join_all(probes).await {
            let response = result
                .map_err(|e| BackendError::connection_failed(&self.endpoint, e.to_string()))?;
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) {
                return Err(BackendError::Unauthorized(format!(
                    "{} rejected credentials for '{}'",
                    self.endpoint, self.credentials.username
                )));
            }
        }
        Ok(())
    }

    fn document_url(&self, key: &str) -> String {
        format!("{}/{}/docs/{}", self.endpoint, self.target, key)
    }

    fn target_url(&self, name: &str) -> String {
        format!("{}/{}", self.endpoint, name)
    }

    fn encode(&self, payload: &[u8]) -> Result<(Vec<u8>, &'static str), BackendError> {
        match self.transcoding {
            Transcoding::Raw => Ok((payload.to_vec(), "application/octet-stream")),
            Transcoding::Json => {
                let value: serde_json::Value = serde_json::from_slice(payload)
                    .map_err(|e| BackendError::Encoding(e.to_string()))?;
                let body =
                    serde_json::to_vec(&value).map_err(|e| BackendError::Encoding(e.to_string()))?;
                Ok((body, "application/json"))
            }
        }
    }
}

/// Decrements the send queue depth when the waiting write leaves the queue,
/// including when it is cancelled.
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl Provisioner for HttpSession {
    async fn ensure_target(&self, target: &TargetSpec) -> Result<(), BackendError> {
        let url = self.target_url(&target.name);

        let response = self
            .client
            .delete(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await
            .map_err(|e| BackendError::provisioning(&target.name, e.to_string()))?;
        match response.status() {
            status if status.is_success() || status == StatusCode::NOT_FOUND => {
                tracing::info!("Dropped target '{}' ({})", target.name, status);
            }
            status => {
                return Err(BackendError::provisioning(
                    &target.name,
                    format!("drop returned {}", status),
                ))
            }
        }

        if !target.settle.is_zero() {
            tokio::time::sleep(target.settle).await;
        }

        let body = serde_json::json!({ "capacity_mb": target.capacity_mb }).to_string();
        let response = self
            .client
            .put(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| BackendError::provisioning(&target.name, e.to_string()))?;
        if !response.status().is_success() {
            return Err(BackendError::provisioning(
                &target.name,
                format!("create returned {}", response.status()),
            ));
        }

        tracing::info!(
            "Created target '{}' with {} MB",
            target.name,
            target.capacity_mb
        );
        Ok(())
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn write(
        &self,
        key: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::SessionClosed);
        }

        let (body, content_type) = self.encode(payload)?;

        let _permit = match self.dispatch.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                if self.queued.fetch_add(1, Ordering::AcqRel) >= self.send_queue_capacity {
                    self.queued.fetch_sub(1, Ordering::AcqRel);
                    return Err(BackendError::Overload("send queue full".to_string()));
                }
                let _slot = QueueSlot(&self.queued);
                self.dispatch
                    .acquire()
                    .await
                    .map_err(|_| BackendError::SessionClosed)?
            }
        };

        let result = self
            .client
            .put(self.document_url(key))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .timeout(timeout)
            .send()
            .await;

        match result {
            Ok(response) => classify_status(response.status(), timeout),
            Err(e) if e.is_timeout() => Err(BackendError::Timeout(timeout)),
            Err(e) => Err(BackendError::Transient(e.to_string())),
        }
    }

    async fn close(&self) -> Result<(), BackendError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(BackendError::SessionClosed);
        }
        self.dispatch.close();
        tracing::info!("HTTP session closed: endpoint={}", self.endpoint);
        Ok(())
    }
}

/// Map an HTTP status onto the backend error taxonomy
pub fn classify_status(status: StatusCode, deadline: Duration) -> Result<(), BackendError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            Err(BackendError::Overload(status.to_string()))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            Err(BackendError::Timeout(deadline))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(BackendError::Unauthorized(status.to_string()))
        }
        other => Err(BackendError::Transient(other.to_string())),
    }
}
