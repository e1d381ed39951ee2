#![forbid(unsafe_code)]

//! apt transport method for Google Artifact Registry.
//!
//! apt starts the method as `ar+https`, feeds it `601 Configuration` and
//! `600 URI Acquire` messages on stdin, and reads status messages from
//! stdout. [`method::AptMethod`] drives that exchange; [`protocol`] holds the
//! wire format, [`credentials`] and [`fetch`] the network side.

pub mod config;
pub mod credentials;
pub mod errors;
pub mod fetch;
pub mod method;
pub mod protocol;

pub use config::MethodConfig;
pub use errors::{AppError, Result};
pub use method::AptMethod;
