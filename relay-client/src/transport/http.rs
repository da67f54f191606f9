//! HTTP transport over reqwest.

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use relay_core::SseDecoder;
use relay_types::protocol::{CONTENT_TYPE_HEADER, OCTET_STREAM, RECORD_HEADER};
use tracing::debug;

use super::{EventStream, Method, Request, Response, Transport, TransportError};

/// Transport that speaks HTTP to real relays.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a default reqwest client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport on top of a configured reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: Request) -> Result<Response, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Put => self
                .client
                .put(&request.url)
                .header(CONTENT_TYPE_HEADER, OCTET_STREAM)
                .body(request.body),
        };
        if let Some(record) = request.record {
            builder = builder.header(RECORD_HEADER, record);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let record = response
            .headers()
            .get(RECORD_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!(url = %request.url, status, "Relay responded");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));

        Ok(Response {
            status,
            record,
            body: Box::pin(body),
        })
    }

    async fn subscribe(
        &self,
        url: &str,
        record: Option<String>,
    ) -> Result<EventStream, TransportError> {
        let mut builder = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(record) = record {
            builder = builder.header(RECORD_HEADER, record);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }

        let state = (
            Box::pin(response.bytes_stream()),
            SseDecoder::new(),
            VecDeque::new(),
            false,
        );
        let events = stream::unfold(state, |(mut body, mut decoder, mut ready, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(event) = ready.pop_front() {
                    return Some((Ok(event), (body, decoder, ready, false)));
                }
                match body.next().await {
                    Some(Ok(chunk)) => ready.extend(decoder.feed(&chunk)),
                    Some(Err(e)) => {
                        let err = TransportError::ReceiveFailed(e.to_string());
                        return Some((Err(err), (body, decoder, ready, true)));
                    }
                    None => return None,
                }
            }
        });

        Ok(Box::pin(events))
    }
}
