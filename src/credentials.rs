//! Google Cloud credential resolution.
//!
//! The method authenticates to Artifact Registry with an OAuth2 access token.
//! Where the token comes from is decided once, from [`MethodConfig`], as a
//! [`CredentialSource`]:
//!
//! | Source                              | Token minted by                         |
//! |-------------------------------------|-----------------------------------------|
//! | [`CredentialSource::JsonFile`]      | `gcp_auth::CustomServiceAccount`        |
//! | [`CredentialSource::ComputeEmail`]  | GCE metadata server, named account      |
//! | [`CredentialSource::Ambient`]       | `gcp_auth::provider()` discovery chain  |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::MethodConfig;
use crate::{AppError, Result};

/// OAuth2 scope requested for every token.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Metadata server used when `GCE_METADATA_HOST` is not set.
const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// Tokens are refreshed this long before the metadata server says they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Where access tokens come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Service account JSON key file.
    JsonFile(PathBuf),
    /// Named service account attached to the GCE instance.
    ComputeEmail(String),
    /// Application default credentials discovery.
    Ambient,
}

impl CredentialSource {
    /// Pick the source configured in `config`: JSON key, then email, then ambient.
    #[must_use]
    pub fn select(config: &MethodConfig) -> Self {
        if !config.service_account_json.is_empty() {
            Self::JsonFile(PathBuf::from(&config.service_account_json))
        } else if !config.service_account_email.is_empty() {
            Self::ComputeEmail(config.service_account_email.clone())
        } else {
            Self::Ambient
        }
    }
}

impl Display for CredentialSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::JsonFile(path) => write!(f, "service account key file {}", path.display()),
            Self::ComputeEmail(email) => write!(f, "compute service account {email}"),
            Self::Ambient => write!(f, "application default credentials"),
        }
    }
}

/// Source of bearer tokens for outbound requests.
pub trait TokenSource: Send + Sync {
    /// Return a currently valid access token.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Credentials`] if no token can be obtained.
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// Resolve `source` into a token source.
///
/// # Errors
///
/// Returns [`AppError::Credentials`] when the key file cannot be loaded or
/// ambient discovery finds nothing.
pub async fn resolve(
    source: &CredentialSource,
    http: &reqwest::Client,
) -> Result<Arc<dyn TokenSource>> {
    let tokens: Arc<dyn TokenSource> = match source {
        CredentialSource::JsonFile(path) => {
            let account = gcp_auth::CustomServiceAccount::from_file(path).map_err(|e| {
                AppError::Credentials(format!("failed to obtain creds from {}: {e}", path.display()))
            })?;
            Arc::new(GcpTokenSource(Arc::new(account)))
        }
        CredentialSource::ComputeEmail(email) => {
            Arc::new(MetadataTokenSource::new(email.clone(), http.clone()))
        }
        CredentialSource::Ambient => {
            let provider = gcp_auth::provider()
                .await
                .map_err(|e| AppError::Credentials(format!("failed to obtain creds: {e}")))?;
            Arc::new(GcpTokenSource(provider))
        }
    };
    info!(source = %source, "credentials: token source ready");
    Ok(tokens)
}

/// Token source backed by a `gcp_auth` provider.
struct GcpTokenSource(Arc<dyn gcp_auth::TokenProvider>);

impl TokenSource for GcpTokenSource {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            let token = self.0.token(&[CLOUD_PLATFORM_SCOPE]).await?;
            Ok(token.as_str().to_owned())
        })
    }
}

/// Metadata server token response.
#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Token source for a named service account attached to a GCE instance.
///
/// Tokens are cached and reused until shortly before the expiry the metadata
/// server reported.
pub struct MetadataTokenSource {
    email: String,
    http: reqwest::Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenSource {
    /// Source for `email` on the metadata server named by `GCE_METADATA_HOST`,
    /// or `metadata.google.internal` when unset.
    #[must_use]
    pub fn new(email: String, http: reqwest::Client) -> Self {
        let host = std::env::var("GCE_METADATA_HOST")
            .unwrap_or_else(|_| DEFAULT_METADATA_HOST.to_owned());
        Self::with_host(email, http, &host)
    }

    /// Source for `email` on the metadata server at `host` (`name[:port]`).
    #[must_use]
    pub fn with_host(email: String, http: reqwest::Client, host: &str) -> Self {
        let url = metadata_token_url(host, &email);
        Self {
            email,
            http,
            url,
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<MetadataToken> {
        let response = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| AppError::Credentials(format!("metadata server unreachable: {e}")))?;
        if !response.status().is_success() {
            return Err(AppError::Credentials(format!(
                "metadata server refused token for {}: {}",
                self.email,
                response.status()
            )));
        }
        response
            .json::<MetadataToken>()
            .await
            .map_err(|e| AppError::Credentials(format!("invalid metadata token response: {e}")))
    }
}

impl TokenSource for MetadataTokenSource {
    fn access_token(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            let mut cached = self.cached.lock().await;
            if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.refresh_at) {
                return Ok(token.value.clone());
            }

            let fresh = self.fetch().await?;
            debug!(email = %self.email, expires_in = fresh.expires_in, "credentials: metadata token refreshed");
            let refresh_at = Instant::now() + refresh_after(fresh.expires_in);
            let value = fresh.access_token;
            *cached = Some(CachedToken {
                value: value.clone(),
                refresh_at,
            });
            Ok(value)
        })
    }
}

fn metadata_token_url(host: &str, email: &str) -> String {
    format!("http://{host}/computeMetadata/v1/instance/service-accounts/{email}/token")
}

fn refresh_after(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in).saturating_sub(REFRESH_MARGIN)
}
