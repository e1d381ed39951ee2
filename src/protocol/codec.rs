//! Line codec for the apt method pipe.
//!
//! Splits stdin on `\n`, trims each line and classifies it as [`Line::Blank`]
//! (message terminator) or [`Line::Text`]. The underlying
//! [`LinesCodec`] is capped at [`MAX_LINE_BYTES`] so a peer that never sends
//! `\n` cannot make the method buffer without bound.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum inbound line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One inbound line, surrounding whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Empty or whitespace-only line.
    Blank,
    /// Anything else, trimmed.
    Text(String),
}

impl Line {
    fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Blank
        } else {
            Self::Text(trimmed.to_owned())
        }
    }
}

/// Decoder producing [`Line`]s from stdin.
#[derive(Debug)]
pub struct LineCodec {
    lines: LinesCodec,
}

impl LineCodec {
    /// Codec with the [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Line;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Line>> {
        match self.lines.decode(src) {
            Ok(raw) => Ok(raw.as_deref().map(Line::classify)),
            Err(err) => Err(codec_error(err)),
        }
    }

    // A final line without `\n` still counts.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Line>> {
        match self.lines.decode_eof(src) {
            Ok(raw) => Ok(raw.as_deref().map(Line::classify)),
            Err(err) => Err(codec_error(err)),
        }
    }
}

fn codec_error(err: LinesCodecError) -> AppError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => AppError::Codec(format!(
            "line too long: more than {MAX_LINE_BYTES} bytes without a newline"
        )),
        LinesCodecError::Io(io) => AppError::Io(format!("read failed: {io}")),
    }
}
