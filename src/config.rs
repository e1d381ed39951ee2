//! Method configuration received from apt in `601 Configuration` messages.
//!
//! apt dumps its whole configuration tree to the method as repeated
//! `Config-Item: Key=Value` fields. Only the keys in the `gar` namespace are
//! interpreted; everything else is ignored.

use tracing::debug;

use crate::{AppError, Result};

/// Path to a service account JSON key file.
pub const KEY_SERVICE_ACCOUNT_JSON: &str = "Acquire::gar::Service-Account-JSON";
/// Service account email to request tokens for from the metadata server.
pub const KEY_SERVICE_ACCOUNT_EMAIL: &str = "Acquire::gar::Service-Account-Email";
/// Enables `101 Log` diagnostics.
pub const KEY_DEBUG: &str = "Debug::Acquire::gar";

/// Words apt treats as true in boolean configuration values.
const TRUTHY_WORDS: [&str; 5] = ["yes", "true", "with", "on", "enable"];

/// Process-lifetime method configuration.
///
/// `service_account_json` and `service_account_email` are mutually exclusive:
/// after every configuration message a non-empty JSON path clears the email.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodConfig {
    /// Service account JSON key path; empty when unset.
    pub service_account_json: String,
    /// Service account email; empty when unset.
    pub service_account_email: String,
    /// Whether diagnostic `101 Log` messages are emitted.
    pub debug: bool,
}

impl MethodConfig {
    /// Apply a sequence of `Key=Value` config items.
    ///
    /// Processing stops at the first item without `=`; items before it stay
    /// applied. The JSON-over-email precedence rule is enforced either way.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] naming the item that stopped processing.
    pub fn apply_items<'a, I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut outcome = Ok(());
        for item in items {
            let Some((key, value)) = item.split_once('=') else {
                outcome = Err(AppError::Config(format!(
                    "config item {item:?} is not of the form Key=Value"
                )));
                break;
            };
            self.apply(key.trim(), value);
        }

        if !self.service_account_json.is_empty() {
            self.service_account_email.clear();
        }
        outcome
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            KEY_SERVICE_ACCOUNT_JSON => value.trim().clone_into(&mut self.service_account_json),
            KEY_SERVICE_ACCOUNT_EMAIL => value.trim().clone_into(&mut self.service_account_email),
            KEY_DEBUG => self.debug = parse_truthy(value),
            _ => return,
        }
        debug!(key, "config: applied item");
    }
}

/// Interpret `value` the way apt interprets boolean options.
///
/// Integers are true only when exactly `1`; otherwise the lower-cased value
/// must be one of `yes`, `true`, `with`, `on`, `enable`.
#[must_use]
pub fn parse_truthy(value: &str) -> bool {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return n == 1;
    }
    let lowered = value.to_lowercase();
    TRUTHY_WORDS.contains(&lowered.as_str())
}
