//! Outbound message writer.
//!
//! Serialises [`Message`]s in their canonical form and writes each one to
//! the sink followed by a flush, so apt sees every status as soon as it is
//! produced and in the order it was produced.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::protocol::message::{Message, UriDone};
use crate::{AppError, Result};

/// Writes [`Message`]s to a byte sink.
pub struct MessageWriter<W> {
    out: W,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Wrap `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Serialise `msg` and write it, flushing the sink afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if writing to or flushing the sink fails.
    pub async fn write_message(&mut self, msg: &Message) -> Result<()> {
        let wire = msg.to_string();
        self.out.write_all(wire.as_bytes()).await.map_err(|e| {
            warn!(code = msg.code(), error = %e, "message writer: write failed");
            AppError::Io(format!("write failed: {e}"))
        })?;
        self.out
            .flush()
            .await
            .map_err(|e| AppError::Io(format!("flush failed: {e}")))?;
        debug!(code = msg.code(), description = msg.description(), "message writer: sent");
        Ok(())
    }

    /// Send `100 Capabilities`.
    ///
    /// # Errors
    ///
    /// Propagates sink failures from [`write_message`](Self::write_message).
    pub async fn send_capabilities(&mut self) -> Result<()> {
        self.write_message(&Message::capabilities()).await
    }

    /// Send `101 Log`.
    ///
    /// # Errors
    ///
    /// Propagates sink failures from [`write_message`](Self::write_message).
    pub async fn log(&mut self, text: &str) -> Result<()> {
        self.write_message(&Message::log(text)).await
    }

    /// Send `200 URI Start`.
    ///
    /// # Errors
    ///
    /// Propagates sink failures from [`write_message`](Self::write_message).
    pub async fn uri_start(&mut self, uri: &str, size: &str, last_modified: &str) -> Result<()> {
        self.write_message(&Message::uri_start(uri, size, last_modified))
            .await
    }

    /// Send `201 URI Done`.
    ///
    /// # Errors
    ///
    /// Propagates sink failures from [`write_message`](Self::write_message).
    pub async fn uri_done(&mut self, done: &UriDone<'_>) -> Result<()> {
        self.write_message(&Message::uri_done(done)).await
    }

    /// Send `400 URI Failure`.
    ///
    /// # Errors
    ///
    /// Propagates sink failures from [`write_message`](Self::write_message).
    pub async fn fail_uri(&mut self, uri: &str, text: &str) -> Result<()> {
        self.write_message(&Message::uri_failure(uri, text)).await
    }

    /// Send `401 General Failure`.
    ///
    /// # Errors
    ///
    /// Propagates sink failures from [`write_message`](Self::write_message).
    pub async fn fail(&mut self, text: &str) -> Result<()> {
        self.write_message(&Message::general_failure(text)).await
    }

    /// Give back the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }
}
