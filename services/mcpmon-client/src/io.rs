//! I/O traits and implementations for the MCPmon client
//!
//! This module provides trait abstractions for the push channel socket and
//! for HTTP requests. These traits enable mockall-based testing without
//! requiring actual network operations.
//!
//! The default implementations use tokio-tungstenite and reqwest.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket pair containing a reader and writer
pub struct SocketPair {
    /// Reader for receiving text frames
    pub reader: Box<dyn FrameReader>,
    /// Writer for sending text frames
    pub writer: Box<dyn FrameWriter>,
}

// ============================================================================
// FrameReader trait and implementations
// ============================================================================

/// Trait for reading text frames from a socket
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameReader: Send {
    /// Read the next text frame
    ///
    /// Returns `Ok(Some(text))` for a text frame,
    /// `Ok(None)` if the socket was closed,
    /// or an error if reading failed.
    async fn read_text(&mut self) -> Result<Option<String>>;
}

/// WebSocket implementation of FrameReader
pub struct WsFrameReader {
    stream: SplitStream<WsStream>,
}

impl WsFrameReader {
    pub fn new(stream: SplitStream<WsStream>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl FrameReader for WsFrameReader {
    async fn read_text(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            let message = message
                .map_err(|e| ClientError::ConnectionFailed(format!("WebSocket error: {}", e)))?;
            match message {
                Message::Text(text) => return Ok(Some(text)),
                Message::Close(frame) => {
                    debug!("Close frame received: {:?}", frame);
                    return Ok(None);
                }
                other => debug!("Ignoring non-text frame ({} bytes)", other.len()),
            }
        }
        Ok(None)
    }
}

// ============================================================================
// FrameWriter trait and implementations
// ============================================================================

/// Trait for writing text frames to a socket
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameWriter: Send {
    /// Write a single text frame
    async fn write_text(&mut self, text: &str) -> Result<()>;

    /// Send a close frame and shut the socket down
    async fn close(&mut self) -> Result<()>;
}

/// WebSocket implementation of FrameWriter
pub struct WsFrameWriter {
    sink: SplitSink<WsStream, Message>,
}

impl WsFrameWriter {
    pub fn new(sink: SplitSink<WsStream, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FrameWriter for WsFrameWriter {
    async fn write_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| ClientError::SendError(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| ClientError::SendError(e.to_string()))
    }
}

// ============================================================================
// SocketConnector trait and implementations
// ============================================================================

/// Trait for opening push channel sockets
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocketConnector: Send + Sync {
    /// Open a socket to `uri`, failing if the handshake takes longer than `timeout`
    async fn connect(&self, uri: &str, timeout: Duration) -> Result<SocketPair>;
}

/// tokio-tungstenite implementation of SocketConnector
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self, uri: &str, timeout: Duration) -> Result<SocketPair> {
        let target = crate::connection::redact_token(uri);
        debug!("Opening WebSocket to {} with timeout {:?}", target, timeout);

        let (stream, response) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(uri))
            .await
            .map_err(|_| ClientError::Timeout(format!("Connection to {} timed out", target)))?
            .map_err(|e| {
                ClientError::ConnectionFailed(format!("Failed to connect to {}: {}", target, e))
            })?;

        debug!("WebSocket handshake completed ({})", response.status());

        let (sink, stream) = stream.split();
        Ok(SocketPair {
            reader: Box::new(WsFrameReader::new(stream)),
            writer: Box::new(WsFrameWriter::new(sink)),
        })
    }
}

// ============================================================================
// HttpTransport trait and implementations
// ============================================================================

/// HTTP method used by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

/// A JSON request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Bearer token for the `Authorization` header
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// HTTP response from a request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over the HTTP client for dependency injection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Production HTTP transport using reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Http(format!("Building HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            bearer,
            body,
        } = request;
        debug!("{} {}", method, url);

        let mut builder = match method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Http(format!("{} {} failed: {}", method, url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Http(format!("Reading response body: {}", e)))?;

        debug!("{} {} -> {} ({} bytes)", method, url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}
