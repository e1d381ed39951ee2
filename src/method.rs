//! Acquisition orchestrator.
//!
//! [`AptMethod`] owns the reader, the writer, the [`MethodConfig`] and the
//! lazily created credentialed client for one process lifetime:
//!
//! ```text
//! Start ── 100 Capabilities ──▶ ReceiveLoop
//!   600 URI Acquire    → handle_acquire
//!   601 Configuration  → handle_configure
//!   anything else      → 401 General Failure
//!   end of input       → Ok(())
//!   cancelled          → Ok(()), nothing more written
//!   other read error   → Err (fatal)
//! ```
//!
//! Messages are handled strictly one at a time. Per-request failures are
//! reported on the wire and the loop continues; only a failure to write to
//! apt or a framing error on the inbound stream ends [`AptMethod::run`] with
//! an error.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::MethodConfig;
use crate::credentials::CredentialSource;
use crate::fetch::{ClientFactory, Downloader, FetchRequest, FetchResponse, HttpClient};
use crate::protocol::{code, DoneOutcome, Message, MessageReader, MessageWriter, UriDone};
use crate::{AppError, Result};

/// Pseudo-scheme apt uses to route requests to this method.
const METHOD_SCHEME: &str = "ar+https:";

/// The `ar+https` apt method.
pub struct AptMethod<R, W> {
    reader: MessageReader<R>,
    writer: MessageWriter<W>,
    config: MethodConfig,
    client: Option<Arc<dyn HttpClient>>,
    connector: Arc<dyn ClientFactory>,
    downloader: Arc<dyn Downloader>,
}

impl<R, W> AptMethod<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a method reading from `input` and writing to `output`.
    pub fn new(
        input: R,
        output: W,
        connector: Arc<dyn ClientFactory>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        Self {
            reader: MessageReader::new(input),
            writer: MessageWriter::new(output),
            config: MethodConfig::default(),
            client: None,
            connector,
            downloader,
        }
    }

    /// Use `client` instead of resolving credentials on first acquisition.
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &MethodConfig {
        &self.config
    }

    /// Send capabilities, then handle messages until end of input or cancellation.
    ///
    /// # Errors
    ///
    /// - framing errors from the inbound stream;
    /// - [`AppError::Io`] when writing to apt fails.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        self.writer.send_capabilities().await?;
        info!("apt method: capabilities sent, waiting for requests");

        loop {
            if cancel.is_cancelled() {
                info!("apt method: cancelled");
                return Ok(());
            }

            let msg = match self.reader.read_message(&cancel).await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    info!("apt method: end of input");
                    return Ok(());
                }
                Err(AppError::Cancelled) => {
                    info!("apt method: cancelled while reading");
                    return Ok(());
                }
                Err(err) if err.is_framing() => {
                    error!(%err, "apt method: malformed input from apt");
                    return Err(err);
                }
                Err(err) => {
                    error!(%err, "apt method: unrecoverable read error");
                    return Err(err);
                }
            };

            self.dispatch(&msg).await?;
        }
    }

    /// Route one inbound message by code.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when writing the response fails.
    pub async fn dispatch(&mut self, msg: &Message) -> Result<()> {
        match msg.code() {
            code::URI_ACQUIRE => {
                let span = info_span!("acquire", uri = msg.get("URI").unwrap_or_default());
                self.handle_acquire(msg).instrument(span).await
            }
            code::CONFIGURATION => self.handle_configure(msg).await,
            other => {
                warn!(code = other, "apt method: unsupported message code");
                self.writer
                    .fail(&format!("Unsupported message code {other} received from apt"))
                    .await
            }
        }
    }

    /// Apply the `Config-Item` fields of a `601 Configuration` message.
    ///
    /// A malformed item is reported as `101 Log` and stops processing of the
    /// remaining items; it is not a failure of the message.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when writing the log message fails.
    pub async fn handle_configure(&mut self, msg: &Message) -> Result<()> {
        let items = msg.get_all("Config-Item");
        if items.is_empty() {
            debug!("apt method: configuration without Config-Item");
            return Ok(());
        }

        if let Err(err) = self.config.apply_items(items.iter().map(String::as_str)) {
            warn!(%err, "apt method: stopped applying configuration");
            self.writer.log(&err.to_string()).await?;
        }

        debug!(
            json = !self.config.service_account_json.is_empty(),
            email = !self.config.service_account_email.is_empty(),
            debug = self.config.debug,
            "apt method: configuration applied"
        );
        Ok(())
    }

    /// Fetch the URI named by a `600 URI Acquire` message.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when writing a response fails. Everything
    /// else is reported to apt as a failure message.
    pub async fn handle_acquire(&mut self, msg: &Message) -> Result<()> {
        let Some(uri) = msg.get("URI").filter(|u| !u.is_empty()) else {
            warn!("apt method: acquire without URI");
            return self.writer.fail("No URI provided in Acquire message").await;
        };
        let Some(filename) = msg.get("Filename").filter(|f| !f.is_empty()) else {
            warn!("apt method: acquire without Filename");
            return self
                .writer
                .fail_uri(uri, "No filename provided in Acquire message")
                .await;
        };
        let if_modified_since = msg.get("Last-Modified").map(str::to_owned);

        let client = match self.client.clone() {
            Some(client) => client,
            None => {
                let source = CredentialSource::select(&self.config);
                self.debug_log(&format!("Using {source}")).await?;
                match Arc::clone(&self.connector).connect(source).await {
                    Ok(client) => {
                        self.client = Some(Arc::clone(&client));
                        client
                    }
                    Err(err) => {
                        warn!(%err, "apt method: no credentials");
                        return self.writer.fail_uri(uri, &err.to_string()).await;
                    }
                }
            }
        };

        let url = rewrite_scheme(uri);
        self.debug_log(&format!("Requesting {url}")).await?;
        let request = FetchRequest {
            url,
            if_modified_since: if_modified_since.clone(),
        };
        let response = match client.get(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "apt method: request failed");
                return self.writer.fail_uri(uri, &err.to_string()).await;
            }
        };

        let FetchResponse {
            status,
            content_length,
            last_modified,
            body,
        } = response;
        self.debug_log(&format!("Server returned {status}")).await?;
        let last_modified = last_modified.unwrap_or_default();

        match status {
            200 => {
                // URI Start goes out only now because the size comes from the response.
                let size = content_length.unwrap_or_default();
                self.writer.uri_start(uri, &size, &last_modified).await?;

                let downloader = Arc::clone(&self.downloader);
                let digests = match downloader.persist(body, Path::new(filename)).await {
                    Ok(digests) => digests,
                    Err(err) => {
                        warn!(%err, "apt method: download failed");
                        return self.writer.fail_uri(uri, &err.to_string()).await;
                    }
                };

                let size = if size.is_empty() {
                    digests.size.to_string()
                } else {
                    size
                };
                info!(size = %size, "apt method: fetched");
                self.writer
                    .uri_done(&UriDone {
                        uri,
                        last_modified: &last_modified,
                        filename,
                        outcome: DoneOutcome::Fetched {
                            size: &size,
                            md5: &digests.md5,
                            sha256: &digests.sha256,
                        },
                    })
                    .await
            }
            304 => {
                info!("apt method: not modified");
                let last_modified = if last_modified.is_empty() {
                    if_modified_since.unwrap_or_default()
                } else {
                    last_modified
                };
                self.writer
                    .uri_done(&UriDone {
                        uri,
                        last_modified: &last_modified,
                        filename,
                        outcome: DoneOutcome::ImsHit,
                    })
                    .await
            }
            other => {
                warn!(status = other, "apt method: unexpected status");
                self.writer
                    .fail_uri(uri, &format!("Error downloading: code {other}"))
                    .await
            }
        }
    }

    /// Send `101 Log` when `Debug::Acquire::gar` is enabled.
    async fn debug_log(&mut self, text: &str) -> Result<()> {
        if self.config.debug {
            self.writer.log(text).await?;
        }
        Ok(())
    }

    /// Give back the output sink.
    pub fn into_output(self) -> W {
        self.writer.into_inner()
    }
}

/// Replace the `ar+https` scheme prefix with `https`; other URIs pass through.
#[must_use]
pub fn rewrite_scheme(uri: &str) -> String {
    match uri.strip_prefix(METHOD_SCHEME) {
        Some(rest) => format!("https:{rest}"),
        None => uri.to_owned(),
    }
}
