//! Network and download capabilities used by the acquisition orchestrator.
//!
//! The orchestrator never talks to `reqwest` or the filesystem directly. It
//! goes through three narrow traits so tests can substitute fakes:
//!
//! - [`ClientFactory`] turns a [`CredentialSource`] into an [`HttpClient`];
//! - [`HttpClient`] performs one GET;
//! - [`Downloader`] drains a response body into a file and returns digests.
//!
//! Production implementations live in `http` and `download`.

pub mod download;
pub mod http;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;

use crate::credentials::CredentialSource;
use crate::Result;

/// Boxed `Send` future, as returned by the capability traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Response body as a stream of chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// One conditional GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Real `https://` URL.
    pub url: String,
    /// Sent verbatim as `If-Modified-Since` when present.
    pub if_modified_since: Option<String>,
}

/// Status line, headers of interest and body of a response.
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw `Content-Length` header value.
    pub content_length: Option<String>,
    /// Raw `Last-Modified` header value.
    pub last_modified: Option<String>,
    /// Response body; not read unless the orchestrator downloads it.
    pub body: BodyStream,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Content digests of a downloaded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digests {
    /// Bytes written.
    pub size: u64,
    /// Lowercase hex MD5.
    pub md5: String,
    /// Lowercase hex SHA-256.
    pub sha256: String,
}

/// Credentialed HTTP client.
pub trait HttpClient: Send + Sync {
    /// Issue a GET for `request`.
    ///
    /// Any status code is a successful exchange; only transport failures
    /// are errors.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Http`](crate::AppError::Http) or
    /// [`AppError::Credentials`](crate::AppError::Credentials) when the
    /// request could not be completed.
    fn get(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>>;
}

/// Persists a response body to a named file.
pub trait Downloader: Send + Sync {
    /// Write `body` to `path` and return its digests.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Download`](crate::AppError::Download) or a body
    /// stream error when the transfer fails.
    fn persist<'a>(&'a self, body: BodyStream, path: &'a Path) -> BoxFuture<'a, Result<Digests>>;
}

/// Builds the credentialed client from a credential source.
pub trait ClientFactory: Send + Sync {
    /// Resolve `source` and build a client around it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Credentials`](crate::AppError::Credentials) when no
    /// credentials can be obtained.
    fn connect(&self, source: CredentialSource) -> BoxFuture<'_, Result<Arc<dyn HttpClient>>>;
}
