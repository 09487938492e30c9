//! Fetch.
//!
//! This module contains the code to request a release archive and hand out the response body as a stream.

use crate::context::Context;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONNECTION;
use std::io::{self, Read};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{debug, instrument, trace};

// Interval in which a pending request looks at its context.
#[doc(hidden)]
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The error type for fetching a release archive.
#[derive(Debug, thiserror::Error)]
pub(crate) enum FetchError {
    /// The request could not be turned into a valid URL.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The server could not be reached or the connection failed.
    #[error("transport error")]
    Transport(#[from] reqwest::Error),
    /// The context was cancelled (or its deadline passed before the request was sent).
    #[error("transport error: request cancelled")]
    Cancelled,
    /// The server answered with something other than `200 OK`.
    #[error("unexpected response status {code}")]
    UnexpectedStatus { code: u16 },
}

impl FetchError {
    /// Whether the error originates from the transport (including cancellation).
    pub(crate) fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Cancelled)
    }
}

/// The request for a release archive.
#[derive(Clone, Debug)]
pub(crate) struct FetchRequest {
    base_url: String,
    path: String,
}

impl FetchRequest {
    /// Creates a new `FetchRequest` out of the base URL (only scheme, host and port are used) and the release path.
    pub(crate) fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
        }
    }

    /// Builds the URL to request.
    ///
    /// The path of the request replaces path, query and fragment of the base URL entirely.
    pub(crate) fn url(&self) -> Result<Url, FetchError> {
        let base = Url::parse(&self.base_url).map_err(|err| FetchError::InvalidRequest(format!("'{}': {err}", self.base_url)))?;

        let scheme = base.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(FetchError::InvalidRequest(format!("unsupported scheme '{scheme}'")));
        }

        let Some(host) = base.host_str().filter(|host| !host.is_empty()) else {
            return Err(FetchError::InvalidRequest(format!("'{}': host required", self.base_url)));
        };

        let authority = match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let mut url = Url::parse(&format!("{scheme}://{authority}")).map_err(|err| FetchError::InvalidRequest(err.to_string()))?;
        url.set_path(&self.path);

        Ok(url)
    }
}

/// Fetches release archives with an injected HTTP client.
#[derive(Debug)]
pub(crate) struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Creates a new `Fetcher` on top of the given client.
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// Requests the archive and returns the (unread) response body.
    ///
    /// The context bounds the whole request, including reading the body. The request is sent on a worker thread, so
    /// cancelling the context returns [FetchError::Cancelled] without waiting for the server. A response arriving
    /// afterwards is dropped by the worker.
    #[instrument(level = "trace", skip(self, ctx, request), fields(base_url = %request.base_url, path = %request.path))]
    pub(crate) fn fetch(&self, ctx: &Context, request: &FetchRequest) -> Result<ReleaseStream, FetchError> {
        let url = request.url()?;
        trace!(%url);

        if ctx.is_done() {
            return Err(FetchError::Cancelled);
        }

        // a single request per connection, so it is closed as soon as the response is dropped
        let mut builder = self.client.get(url).header(CONNECTION, "close");
        if let Some(remaining) = ctx.remaining() {
            builder = builder.timeout(remaining);
        }

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(builder.send());
        });
        let response = loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(result) => break result?,
                // the deadline is enforced by the request timeout
                Err(RecvTimeoutError::Timeout) if ctx.is_cancelled() => {
                    debug!("request cancelled");
                    return Err(FetchError::Cancelled);
                }
                Err(RecvTimeoutError::Timeout) => {}
                // the worker went away without an answer
                Err(RecvTimeoutError::Disconnected) => return Err(FetchError::Cancelled),
            }
        };

        let status = response.status();
        debug!(%status, content_length = ?response.content_length());
        if status != reqwest::StatusCode::OK {
            // dropping the response releases the connection
            drop(response);
            return Err(FetchError::UnexpectedStatus { code: status.as_u16() });
        }

        Ok(ReleaseStream { response, ctx: ctx.clone() })
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

/// The body of a successful response, streamed lazily.
///
/// Dropping the stream closes the underlying connection. Reading fails once the context is done.
#[derive(Debug)]
pub(crate) struct ReleaseStream {
    response: Response,
    ctx: Context,
}

impl ReleaseStream {
    /// Returns the announced length of the body, if any.
    pub(crate) fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Returns the final URL (after redirects).
    pub(crate) fn url(&self) -> &Url {
        self.response.url()
    }
}

impl Read for ReleaseStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.ctx.is_done() {
            return Err(io::Error::other(FetchError::Cancelled));
        }
        self.response.read(buf)
    }
}
