//! `reqwest`-backed client that authenticates every request with a bearer token.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, CONTENT_LENGTH, IF_MODIFIED_SINCE, LAST_MODIFIED};
use tracing::debug;

use crate::credentials::{self, CredentialSource, TokenSource};
use crate::fetch::{BoxFuture, ClientFactory, FetchRequest, FetchResponse, HttpClient};
use crate::{AppError, Result};

/// Connection establishment timeout. The body transfer itself is unbounded.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client that attaches `Authorization: Bearer …` from a [`TokenSource`].
pub struct AuthorizedClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl AuthorizedClient {
    /// Wrap `http` so every request carries a token from `tokens`.
    #[must_use]
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self { http, tokens }
    }
}

impl HttpClient for AuthorizedClient {
    fn get(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>> {
        Box::pin(async move {
            let token = self.tokens.access_token().await?;

            let mut builder = self.http.get(&request.url).bearer_auth(token);
            if let Some(since) = &request.if_modified_since {
                builder = builder.header(IF_MODIFIED_SINCE, since.as_str());
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            debug!(url = %request.url, status, "http: response received");

            let headers = response.headers();
            let content_length = header_value(headers, &CONTENT_LENGTH);
            let last_modified = header_value(headers, &LAST_MODIFIED);
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(AppError::from))
                .boxed();

            Ok(FetchResponse {
                status,
                content_length,
                last_modified,
                body,
            })
        })
    }
}

/// [`ClientFactory`] that resolves Google credentials into an [`AuthorizedClient`].
pub struct GcpConnector {
    http: reqwest::Client,
}

impl GcpConnector {
    /// Build the shared `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Http`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("apt-transport-artifact-registry/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }
}

impl ClientFactory for GcpConnector {
    fn connect(&self, source: CredentialSource) -> BoxFuture<'_, Result<Arc<dyn HttpClient>>> {
        Box::pin(async move {
            let tokens = credentials::resolve(&source, &self.http).await?;
            let client: Arc<dyn HttpClient> =
                Arc::new(AuthorizedClient::new(self.http.clone(), tokens));
            Ok(client)
        })
    }
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
