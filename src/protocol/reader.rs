//! Inbound message reader.
//!
//! Assembles apt method messages from a line stream. One call to
//! [`MessageReader::read_message`] yields one complete [`Message`]; the reader
//! keeps its framing state between calls and is reused for the whole process
//! lifetime.
//!
//! # Framing
//!
//! | Line            | Nothing pending            | Header pending             |
//! |-----------------|----------------------------|----------------------------|
//! | non-blank       | parsed as header           | parsed as field            |
//! | blank           | [`AppError::EmptyMessage`] | message returned, reset    |
//!
//! # Cancellation
//!
//! The token is polled before every line read. A read that is already
//! waiting on the underlying stream is not interrupted by the token; only
//! closing the stream (EOF) releases it. Callers that need to stop a blocked
//! reader must close its input.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::codec::{Line, LineCodec};
use crate::protocol::message::Message;
use crate::{AppError, Result};

/// Reads [`Message`]s from a byte stream.
pub struct MessageReader<R> {
    lines: FramedRead<R, LineCodec>,
    pending: Option<Message>,
}

impl<R> MessageReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap `input` in a line-framed message reader.
    pub fn new(input: R) -> Self {
        Self {
            lines: FramedRead::new(input, LineCodec::new()),
            pending: None,
        }
    }

    /// Read lines until a complete message has been assembled.
    ///
    /// Returns `Ok(None)` at end of input. A partially assembled message left
    /// over at end of input is discarded.
    ///
    /// # Errors
    ///
    /// - [`AppError::Cancelled`] if `cancel` fired before a read attempt.
    /// - [`AppError::MalformedHeader`], [`AppError::DoubleHeader`],
    ///   [`AppError::MalformedField`] or [`AppError::EmptyMessage`] on framing
    ///   violations; the pending message is dropped.
    /// - [`AppError::Codec`] / [`AppError::Io`] from the underlying stream.
    pub async fn read_message(&mut self, cancel: &CancellationToken) -> Result<Option<Message>> {
        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let Some(line) = self.lines.next().await.transpose()? else {
                if let Some(partial) = self.pending.take() {
                    warn!(
                        code = partial.code(),
                        "message reader: end of input inside a message, discarding it"
                    );
                }
                return Ok(None);
            };

            let text = match line {
                Line::Blank => {
                    let msg = self.pending.take().ok_or(AppError::EmptyMessage)?;
                    debug!(
                        code = msg.code(),
                        description = msg.description(),
                        "message reader: message complete"
                    );
                    return Ok(Some(msg));
                }
                Line::Text(text) => text,
            };

            let parsed = if self.pending.is_none() {
                self.parse_header(&text)
            } else {
                self.parse_field(&text)
            };
            if let Err(err) = parsed {
                self.pending = None;
                return Err(err);
            }
        }
    }

    /// Parse `line` as the header of a new pending message.
    ///
    /// # Errors
    ///
    /// - [`AppError::MalformedHeader`] for an empty line, a line without a
    ///   space, or a code that is not an integer.
    /// - [`AppError::DoubleHeader`] if a header is already pending.
    pub fn parse_header(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Err(AppError::MalformedHeader("empty header line".into()));
        }
        if self.pending.is_some() {
            return Err(AppError::DoubleHeader);
        }

        let (code, description) = line
            .split_once(' ')
            .ok_or_else(|| AppError::MalformedHeader(format!("{line:?}: not enough parts")))?;
        let code = code.trim().parse::<u32>().map_err(|_| {
            AppError::MalformedHeader(format!("{line:?}: code is not an integer"))
        })?;

        let mut msg = Message::default();
        msg.set_header(code, description.trim().to_owned());
        self.pending = Some(msg);
        Ok(())
    }

    /// Parse `line` as a `Name: value` field of the pending message.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MalformedField`] for an empty line, a line without
    /// a colon, a field before any header, or an empty name or value.
    pub fn parse_field(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Err(AppError::MalformedField("empty field line".into()));
        }
        let msg = self
            .pending
            .as_mut()
            .ok_or_else(|| AppError::MalformedField(format!("{line:?}: field before header")))?;

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| AppError::MalformedField(format!("{line:?}: not enough parts")))?;
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() || value.is_empty() {
            return Err(AppError::MalformedField(format!(
                "{line:?}: empty name or value"
            )));
        }

        msg.push(name, value);
        Ok(())
    }

    /// Message currently being assembled, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&Message> {
        self.pending.as_ref()
    }
}
