//! MCP transports.
//!
//! [`SseTransport`] speaks the HTTP+SSE transport: a long-lived `GET` event
//! stream carries server-to-client messages, and each client message is a
//! `POST` to the endpoint announced in the stream's first `endpoint` event.
//! Responses are correlated to requests by JSON-RPC id through a pending map.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use log::{debug, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use sse_stream::{Sse, SseStream};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use super::protocol::{
    IncomingMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};

const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";
const ENDPOINT_EVENT: &str = "endpoint";
const MESSAGE_EVENT: &str = "message";

/// Upper bound on requests awaiting a response on one transport.
pub const MAX_PENDING_REQUESTS: usize = 100;

type PendingMap = Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>;
type EventStream = BoxStream<'static, Result<Sse, sse_stream::Error>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open event stream: {0}")]
    Connect(String),
    #[error("unexpected content type: {0:?}")]
    UnexpectedContentType(Option<String>),
    #[error("event stream ended before announcing a message endpoint")]
    MissingEndpoint,
    #[error("invalid message endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to post message: {0}")]
    Post(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("too many pending requests ({0})")]
    Backpressure(usize),
    #[error("connection closed")]
    Closed,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A live, bidirectional channel to one MCP server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for the correlated response.
    ///
    /// The transport assigns the request id. A JSON-RPC error response is
    /// returned as a response, not as a transport failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be delivered, the connection
    /// drops before the response arrives, or the response times out.
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Send a notification. No response is expected.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be delivered.
    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), TransportError>;

    /// Release the connection. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to shut down cleanly.
    async fn close(&self) -> Result<(), TransportError>;

    /// Whether the connection has been closed or lost.
    fn is_closed(&self) -> bool;
}

/// Opens transports to provider endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be reached.
    async fn connect(
        &self,
        endpoint: &Url,
        request_timeout: Duration,
    ) -> Result<Arc<dyn McpTransport>, TransportError>;
}

/// Connector producing [`SseTransport`]s over a shared HTTP client.
#[derive(Clone, Default)]
pub struct SseConnector {
    client: reqwest::Client,
}

impl SseConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for SseConnector {
    async fn connect(
        &self,
        endpoint: &Url,
        request_timeout: Duration,
    ) -> Result<Arc<dyn McpTransport>, TransportError> {
        let transport: Arc<dyn McpTransport> =
            SseTransport::connect(self.client.clone(), endpoint.clone(), request_timeout).await?;
        Ok(transport)
    }
}

pub struct SseTransport {
    client: reqwest::Client,
    message_endpoint: Url,
    next_id: AtomicU64,
    pending: Arc<PendingMap>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    request_timeout: Duration,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce where
    /// messages should be posted.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened, is not an event
    /// stream, or ends before the `endpoint` event.
    pub async fn connect(
        client: reqwest::Client,
        sse_url: Url,
        request_timeout: Duration,
    ) -> Result<Arc<Self>, TransportError> {
        let (message_endpoint, events) =
            tokio::time::timeout(request_timeout, open_event_stream(&client, &sse_url))
                .await
                .map_err(|_| TransportError::Timeout(request_timeout))??;

        debug!("SSE transport ready stream={sse_url} endpoint={message_endpoint}");

        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_events(
            events,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Ok(Arc::new(Self {
            client,
            message_endpoint,
            next_id: AtomicU64::new(1),
            pending,
            closed,
            reader,
            request_timeout,
        }))
    }

    #[must_use]
    pub const fn message_endpoint(&self) -> &Url {
        &self.message_endpoint
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn post<T: serde::Serialize + Sync>(&self, message: &T) -> Result<(), TransportError> {
        self.client
            .post(self.message_endpoint.clone())
            .json(message)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map(drop)
            .map_err(|e| TransportError::Post(e.to_string()))
    }
}

async fn open_event_stream(
    client: &reqwest::Client,
    sse_url: &Url,
) -> Result<(Url, EventStream), TransportError> {
    let response = client
        .get(sse_url.clone())
        .header(ACCEPT, EVENT_STREAM_MIME_TYPE)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    match response.headers().get(CONTENT_TYPE) {
        Some(ct) if ct.as_bytes().starts_with(EVENT_STREAM_MIME_TYPE.as_bytes()) => {}
        Some(ct) => {
            return Err(TransportError::UnexpectedContentType(Some(
                String::from_utf8_lossy(ct.as_bytes()).into_owned(),
            )));
        }
        None => return Err(TransportError::UnexpectedContentType(None)),
    }

    let mut events = SseStream::from_byte_stream(response.bytes_stream()).boxed();

    loop {
        let sse = events
            .next()
            .await
            .ok_or(TransportError::MissingEndpoint)?
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if sse.event.as_deref() != Some(ENDPOINT_EVENT) {
            continue;
        }
        let endpoint = sse.data.unwrap_or_default();
        let url = message_endpoint(sse_url, endpoint.trim())?;
        return Ok((url, events));
    }
}

/// Resolve the announced endpoint against the stream URL. Absolute URLs,
/// absolute paths and bare query strings are all accepted.
fn message_endpoint(base: &Url, endpoint: &str) -> Result<Url, TransportError> {
    base.join(endpoint)
        .map_err(|source| TransportError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            source,
        })
}

async fn read_events(mut events: EventStream, pending: Arc<PendingMap>, closed: Arc<AtomicBool>) {
    while let Some(next) = events.next().await {
        let sse = match next {
            Ok(sse) => sse,
            Err(e) => {
                warn!("SSE stream error: {e}");
                break;
            }
        };

        let is_message = sse.event.as_deref().is_none_or(|e| e == MESSAGE_EVENT);
        let Some(data) = sse.data.filter(|_| is_message) else {
            continue;
        };

        match IncomingMessage::parse(&data) {
            Ok(IncomingMessage::Response(response)) => {
                let sender = pending.lock().await.remove(&response.id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => debug!("dropping response for unknown request id={}", response.id),
                }
            }
            Ok(IncomingMessage::ServerInitiated { method }) => {
                debug!("ignoring server-initiated message method={method}");
            }
            Err(e) => warn!("skipping malformed SSE message: {e}"),
        }
    }

    debug!("SSE stream ended");
    closed.store(true, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with a closed-channel error.
    pending.lock().await.clear();
}

/// Track a request awaiting its response.
///
/// The closed flag is read after the insert: the reader sets it before
/// clearing the map, so a request registered while the stream ends is
/// either dropped by that clear or rejected here.
async fn register_pending(
    pending: &PendingMap,
    closed: &AtomicBool,
    id: RequestId,
    tx: oneshot::Sender<JsonRpcResponse>,
) -> Result<(), TransportError> {
    let mut pending = pending.lock().await;
    if pending.len() >= MAX_PENDING_REQUESTS {
        return Err(TransportError::Backpressure(pending.len()));
    }
    pending.insert(id.clone(), tx);
    if closed.load(Ordering::SeqCst) {
        pending.remove(&id);
        return Err(TransportError::Closed);
    }
    Ok(())
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send(&self, mut request: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let id = RequestId::Number(self.next_request_id());
        request.id = id.clone();

        let (tx, rx) = oneshot::channel();
        register_pending(&self.pending, &self.closed, id.clone(), tx).await?;

        debug!("MCP request method={} id={id}", request.method);

        if let Err(e) = self.post(&request).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(TransportError::Timeout(self.request_timeout))
            }
        }
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        debug!("MCP notification method={}", notification.method);
        self.post(&notification).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.reader.abort();
        self.pending.lock().await.clear();
        debug!("SSE transport closed endpoint={}", self.message_endpoint);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
