//! HTTP transport (`http://host:port/path`).
//!
//! The producer performs one request per exchange with `reqwest` and stores the response in
//! the out message. The consumer serves the endpoint path with `axum` and turns every
//! request into an exchange.
use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
};
use reqwest::Client;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

use crate::{
    core::{Error, Exchange, Message, Result, Value, keys},
    ports::{Component, Consumer, Endpoint, Processor, Producer},
    tracing_setup,
};

pub const SCHEME: &str = "http";
pub const DEFAULT_PORT: u16 = 8080;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection-level headers. They describe one hop and are recomputed by the client or
/// server that sends the next one.
const HOP_HEADERS: [&str; 11] = [
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Engine-internal keys and hop-by-hop headers are not forwarded on the wire.
fn is_wire_header(name: &str) -> bool {
    !name.starts_with("Courier") && !HOP_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Axum reserves `:name`, `*name` and `{..}` in route paths.
fn check_route_path(path: &str) -> std::result::Result<(), String> {
    if path.contains(['{', '}']) {
        return Err(format!("path '{path}' contains a brace"));
    }
    match path
        .split('/')
        .find(|segment| segment.starts_with([':', '*']))
    {
        Some(segment) => Err(format!("path segment '{segment}' is reserved for captures")),
        None => Ok(()),
    }
}

pub struct HttpComponent {
    client: Client,
}

impl Default for HttpComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpComponent {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Component for HttpComponent {
    fn create_endpoint(&self, uri: &str) -> Result<Arc<dyn Endpoint>> {
        let url = Url::parse(uri).map_err(|e| Error::invalid_endpoint(uri, e.to_string()))?;
        if url.host_str().is_none() {
            return Err(Error::invalid_endpoint(uri, "missing host"));
        }

        Ok(Arc::new(HttpEndpoint {
            uri: uri.to_string(),
            url,
            client: self.client.clone(),
        }))
    }
}

pub struct HttpEndpoint {
    uri: String,
    url: Url,
    client: Client,
}

impl HttpEndpoint {
    /// Address the consumer binds to.
    pub fn bind_addr(&self) -> (String, u16) {
        let host = self.url.host_str().unwrap_or("0.0.0.0").to_string();
        (host, self.url.port().unwrap_or(DEFAULT_PORT))
    }
}

impl Endpoint for HttpEndpoint {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn create_producer(&self) -> Result<Box<dyn Producer>> {
        Ok(Box::new(HttpProducer {
            uri: self.uri.clone(),
            client: self.client.clone(),
            started: AtomicBool::new(false),
        }))
    }

    fn create_consumer(&self, processor: Arc<dyn Processor>) -> Result<Arc<dyn Consumer>> {
        let path = self.url.path();
        check_route_path(path).map_err(|reason| Error::invalid_endpoint(&self.uri, reason))?;

        Ok(Arc::new(HttpConsumer {
            uri: self.uri.clone(),
            bind: self.bind_addr(),
            path: path.to_string(),
            processor,
            server: Mutex::new(None),
        }))
    }
}

pub struct HttpProducer {
    uri: String,
    client: Client,
    started: AtomicBool,
}

#[async_trait]
impl Producer for HttpProducer {
    async fn start(&self, _scope: CancellationToken) -> Result<()> {
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.started.store(false, Ordering::Release);
        Ok(())
    }

    async fn send(&self, exchange: &mut Exchange) -> Result<()> {
        if !self.started.load(Ordering::Acquire) {
            return Err(Error::NotStarted(format!("Producer '{}'", self.uri)));
        }
        let method = match exchange.header(keys::HTTP_METHOD).and_then(Value::as_str) {
            Some(method) => Method::from_bytes(method.as_bytes())
                .map_err(|e| Error::transport(&self.uri, e))?,
            None => Method::POST,
        };

        let mut request = self.client.request(method.clone(), &self.uri);
        for (name, value) in exchange.in_message().headers() {
            if let Some(value) = value.as_str().filter(|_| is_wire_header(name)) {
                request = request.header(name.as_str(), value);
            }
        }
        if let Some(payload) = exchange.body().to_payload() {
            request = request.body(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(&self.uri, e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::transport(&self.uri, e))?;

        tracing::debug!(
            uri = %self.uri,
            method = %method,
            status = status.as_u16(),
            bytes = body.len(),
            "HTTP request completed"
        );

        let out = exchange.out_message_mut();
        out.set_body(body);
        for (name, value) in headers.iter() {
            if let Ok(value) = value.to_str() {
                out.set_header(name.as_str(), value);
            }
        }
        out.set_header(keys::HTTP_RESPONSE_CODE, i64::from(status.as_u16()));
        Ok(())
    }
}

#[derive(Clone)]
struct HandlerState {
    uri: Arc<str>,
    processor: Arc<dyn Processor>,
    scope: CancellationToken,
}

struct RunningServer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct HttpConsumer {
    uri: String,
    bind: (String, u16),
    path: String,
    processor: Arc<dyn Processor>,
    server: Mutex<Option<RunningServer>>,
}

fn request_exchange(
    scope: CancellationToken,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Exchange {
    let mut exchange = Exchange::new(scope);
    exchange.set_body(body);
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            exchange.set_header(name.as_str(), value);
        }
    }
    exchange.set_header(keys::HTTP_METHOD, method.as_str());
    exchange.set_header(keys::HTTP_URL, uri.to_string());
    exchange.set_header(keys::HTTP_PATH, uri.path());
    if let Some(query) = uri.query() {
        exchange.set_header(keys::HTTP_QUERY, query);
    }
    exchange
}

/// Render the reply message. The out message wins; an untouched out message falls back to
/// the in body.
fn reply(exchange: &Exchange) -> Response {
    let out = exchange.out_message();
    let message: &Message = if out.body().is_null() && out.headers().is_empty() {
        exchange.in_message()
    } else {
        out
    };

    let body = match message.body() {
        Value::Null => Bytes::new(),
        value => value
            .to_payload()
            .unwrap_or_else(|| Bytes::from(value.to_string())),
    };
    let mut response = body.into_response();

    if let Some(code) = out
        .header(keys::HTTP_RESPONSE_CODE)
        .and_then(Value::as_int)
        .and_then(|c| u16::try_from(c).ok())
        .and_then(|c| StatusCode::from_u16(c).ok())
    {
        *response.status_mut() = code;
    }
    for (name, value) in out.headers() {
        let Some(value) = value.as_str().filter(|_| is_wire_header(name)) else {
            continue;
        };
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

async fn handle_request(
    State(state): State<HandlerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut exchange = request_exchange(state.scope.child_token(), &method, &uri, &headers, body);

    if let Err(e) = state.processor.process(&mut exchange).await {
        tracing::warn!(
            uri = %state.uri,
            exchange_id = %exchange.id(),
            error = %e,
            "Failed to process HTTP request"
        );
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    reply(&exchange)
}

impl HttpConsumer {
    async fn bind(&self) -> Result<(TcpListener, SocketAddr)> {
        let (host, port) = &self.bind;
        let listener = TcpListener::bind((host.as_str(), *port))
            .await
            .map_err(|e| Error::transport(&self.uri, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::transport(&self.uri, e))?;
        Ok((listener, local_addr))
    }
}

#[async_trait]
impl Consumer for HttpConsumer {
    async fn start(&self, scope: CancellationToken) -> Result<()> {
        if self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            return Err(Error::AlreadyStarted(format!("Consumer '{}'", self.uri)));
        }

        let (listener, local_addr) = self.bind().await?;
        let cancel = scope.child_token();
        let app = Router::new()
            .route(&self.path, any(handle_request))
            .with_state(HandlerState {
                uri: Arc::from(self.uri.as_str()),
                processor: self.processor.clone(),
                scope: cancel.clone(),
            });

        let uri = self.uri.clone();
        let shutdown = cancel.clone();
        let handle = tokio::spawn(
            async move {
                let served = axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await;
                if let Err(e) = served {
                    tracing::error!(uri = %uri, error = %e, "HTTP server error");
                }
            }
            .instrument(tracing_setup::create_consumer_span(&self.uri)),
        );

        let mut server = self.server.lock().unwrap_or_else(PoisonError::into_inner);
        if server.is_some() {
            // lost a concurrent start, tear down ours
            cancel.cancel();
            return Err(Error::AlreadyStarted(format!("Consumer '{}'", self.uri)));
        }
        *server = Some(RunningServer { cancel, handle });
        tracing::info!(
            uri = %self.uri,
            addr = %local_addr,
            path = %self.path,
            "HTTP consumer listening"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let server = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(RunningServer { cancel, handle }) = server {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::error!(uri = %self.uri, error = %e, "HTTP server task ended abnormally");
            }
            tracing::info!(uri = %self.uri, "HTTP consumer stopped");
        }
        Ok(())
    }
}
