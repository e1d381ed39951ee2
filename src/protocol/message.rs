//! apt method message model and canonical serialization.
//!
//! A message is a header line (`<code> <description>`), zero or more
//! `Name: value` field lines, and a terminating blank line. Field names may
//! repeat; every occurrence is kept, in the order it was seen.
//!
//! # Canonical form
//!
//! [`Message`]'s [`Display`] implementation is the only serializer. Field
//! names come out in ordinal byte order (so `URI` sorts before `abc`), values
//! under one name in insertion order, and any newline sequence inside a value
//! is replaced by the two characters `\n` so a value can never end a message
//! early.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Well-known message codes.
pub mod code {
    /// Method → apt: advertised capabilities, sent once at startup.
    pub const CAPABILITIES: u32 = 100;
    /// Method → apt: free-text diagnostic.
    pub const LOG: u32 = 101;
    /// Method → apt: transfer of a URI has started.
    pub const URI_START: u32 = 200;
    /// Method → apt: transfer of a URI finished.
    pub const URI_DONE: u32 = 201;
    /// Method → apt: a single URI failed.
    pub const URI_FAILURE: u32 = 400;
    /// Method → apt: failure not tied to a URI.
    pub const GENERAL_FAILURE: u32 = 401;
    /// apt → method: fetch a URI.
    pub const URI_ACQUIRE: u32 = 600;
    /// apt → method: configuration dump.
    pub const CONFIGURATION: u32 = 601;
}

/// One apt method protocol message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    code: u32,
    description: String,
    fields: BTreeMap<String, Vec<String>>,
}

impl Message {
    /// Create a message with no fields.
    #[must_use]
    pub fn new(code: u32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Numeric status or command code; `0` until a header has been parsed.
    #[must_use]
    pub fn code(&self) -> u32 {
        self.code
    }

    /// Text following the code on the header line.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// First value of `name`, if the field is present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value of `name`, in the order they were added.
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[String] {
        self.fields.get(name).map_or(&[], Vec::as_slice)
    }

    /// Append `value` under `name`, keeping any earlier values.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Builder-style [`push`](Self::push).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Builder-style push that skips empty values.
    #[must_use]
    pub fn with_nonempty(self, name: impl Into<String>, value: &str) -> Self {
        if value.is_empty() {
            self
        } else {
            self.with(name, value)
        }
    }

    /// Iterate over `(name, values)` pairs in canonical order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Whether the message carries no fields at all.
    #[must_use]
    pub fn has_no_fields(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn set_header(&mut self, code: u32, description: String) {
        self.code = code;
        self.description = description;
    }

    /// `100 Capabilities`.
    #[must_use]
    pub fn capabilities() -> Self {
        Self::new(code::CAPABILITIES, "Capabilities")
            .with("Send-Config", "true")
            .with("Version", "1.0")
    }

    /// `101 Log`.
    #[must_use]
    pub fn log(text: &str) -> Self {
        Self::new(code::LOG, "Log").with("Message", text)
    }

    /// `200 URI Start`. `Size` and `Last-Modified` are omitted when empty.
    #[must_use]
    pub fn uri_start(uri: &str, size: &str, last_modified: &str) -> Self {
        Self::new(code::URI_START, "URI Start")
            .with("URI", uri)
            .with_nonempty("Size", size)
            .with_nonempty("Last-Modified", last_modified)
            .with("Resume-Point", "0")
    }

    /// `201 URI Done`.
    ///
    /// An empty `Last-Modified` is left out rather than sent blank, the same
    /// as in [`uri_start`](Self::uri_start); apt treats a missing field as unknown.
    #[must_use]
    pub fn uri_done(done: &UriDone<'_>) -> Self {
        let msg = Self::new(code::URI_DONE, "URI Done")
            .with("URI", done.uri)
            .with_nonempty("Last-Modified", done.last_modified)
            .with("Filename", done.filename);
        match &done.outcome {
            DoneOutcome::ImsHit => msg.with("IMS-Hit", "true"),
            DoneOutcome::Fetched {
                size,
                md5,
                sha256,
            } => msg
                .with("Size", *size)
                .with("MD5-Hash", *md5)
                .with_nonempty("SHA256-Hash", sha256),
        }
    }

    /// `400 URI Failure`.
    #[must_use]
    pub fn uri_failure(uri: &str, text: &str) -> Self {
        Self::new(code::URI_FAILURE, "URI Failure")
            .with("URI", uri)
            .with("Message", text)
    }

    /// `401 General Failure`.
    #[must_use]
    pub fn general_failure(text: &str) -> Self {
        Self::new(code::GENERAL_FAILURE, "General Failure").with("Message", text)
    }
}

/// Parameters of a `201 URI Done` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriDone<'a> {
    /// URI exactly as apt sent it.
    pub uri: &'a str,
    /// Server `Last-Modified`, omitted when empty.
    pub last_modified: &'a str,
    /// Local file the URI was stored in.
    pub filename: &'a str,
    /// Whether the file was fetched or confirmed unchanged.
    pub outcome: DoneOutcome<'a>,
}

/// How a `201 URI Done` came about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoneOutcome<'a> {
    /// Conditional GET hit; the existing local file is still valid.
    ImsHit,
    /// The body was downloaded.
    Fetched {
        /// Size in bytes, as a decimal string.
        size: &'a str,
        /// Lowercase hex MD5 of the body.
        md5: &'a str,
        /// Lowercase hex SHA-256 of the body; omitted when empty.
        sha256: &'a str,
    },
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} {}", self.code, self.description)?;
        for (name, values) in &self.fields {
            for value in values {
                writeln!(f, "{name}: {}", escape_newlines(value))?;
            }
        }
        writeln!(f)
    }
}

/// Replace `\r\n`, `\n` and `\r` with the literal two characters `\n`.
fn escape_newlines(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains(['\n', '\r']) {
        value
            .replace("\r\n", "\\n")
            .replace(['\n', '\r'], "\\n")
            .into()
    } else {
        value.into()
    }
}
