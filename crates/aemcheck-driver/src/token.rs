use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::DriverError;

const ARM_RESOURCE: &str = "https://management.azure.com/";
const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Lifetime assumed when a token response carries no expiry.
const FALLBACK_LIFETIME: Duration = Duration::from_secs(300);

/// Source of Azure bearer tokens for the management API.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, DriverError>;
}

/// Credential chain for listing storage accounts: a service principal when
/// a client id and secret are given, the VM's managed identity when the
/// identity endpoint is advertised, otherwise the logged-in Azure CLI.
pub fn default_token_provider(
    tenant_id: Option<&str>,
    client_id: Option<&str>,
    client_secret: Option<&str>,
    login_base: &str,
    client: &reqwest::Client,
) -> Result<Box<dyn TokenProvider>, DriverError> {
    if let (Some(client_id), Some(client_secret)) = (client_id, client_secret) {
        let tenant_id = tenant_id.ok_or_else(|| {
            DriverError::Auth("a tenant id is required with --client-id/--client-secret".into())
        })?;
        debug!(tenant_id, client_id, "authenticating with client secret");
        let grant = Grant::ClientSecret {
            token_url: format!("{}/{}/oauth2/v2.0/token", login_base, tenant_id),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        };
        return Ok(Box::new(HttpTokenProvider::new(grant, client.clone())));
    }

    if let Ok(endpoint) = std::env::var("IDENTITY_ENDPOINT") {
        debug!(endpoint, "authenticating with managed identity");
        let grant = Grant::ManagedIdentity {
            endpoint,
            identity_header: std::env::var("IDENTITY_HEADER").ok(),
        };
        return Ok(Box::new(HttpTokenProvider::new(grant, client.clone())));
    }

    debug!("authenticating with the Azure CLI");
    Ok(Box::new(AzCliTokenProvider::new(tenant_id.map(str::to_string))))
}

// ── Cache ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct TokenCache(Mutex<Option<(String, Instant)>>);

impl TokenCache {
    /// Cached token if still fresh, otherwise the result of `fetch`. The
    /// lock is held across the fetch so concurrent callers share one request.
    async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String, DriverError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, Duration), DriverError>>,
    {
        let mut slot = self.0.lock().await;
        if let Some((token, refresh_at)) = slot.as_ref() {
            if Instant::now() < *refresh_at {
                return Ok(token.clone());
            }
        }
        let (token, lifetime) = fetch().await?;
        let refresh_at = Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN);
        *slot = Some((token.clone(), refresh_at));
        Ok(token)
    }
}

/// Access token and remaining lifetime from an OAuth2, IMDS or `az` token
/// document. Expiry may be `expires_in` (seconds, number or string) or
/// `expires_on` (unix seconds).
fn parse_token(body: &Value, source: &str) -> Result<(String, Duration), DriverError> {
    let token = body["access_token"]
        .as_str()
        .or_else(|| body["accessToken"].as_str())
        .ok_or_else(|| DriverError::Auth(format!("{} returned no access token", source)))?;

    let seconds = |v: &Value| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()));
    let lifetime = match seconds(&body["expires_in"]) {
        Some(secs) => Duration::from_secs(secs),
        None => seconds(&body["expires_on"])
            .map(|at| {
                let now = chrono::Utc::now().timestamp().max(0) as u64;
                Duration::from_secs(at.saturating_sub(now))
            })
            .unwrap_or(FALLBACK_LIFETIME),
    };
    Ok((token.to_string(), lifetime))
}

// ── HTTP token endpoints ──────────────────────────────────────────────────────

enum Grant {
    ClientSecret {
        token_url: String,
        client_id: String,
        client_secret: String,
    },
    ManagedIdentity {
        endpoint: String,
        identity_header: Option<String>,
    },
}

struct HttpTokenProvider {
    grant: Grant,
    client: reqwest::Client,
    cache: TokenCache,
}

impl HttpTokenProvider {
    fn new(grant: Grant, client: reqwest::Client) -> Self {
        Self { grant, client, cache: TokenCache::default() }
    }

    fn request(&self) -> (reqwest::RequestBuilder, &'static str) {
        match &self.grant {
            Grant::ClientSecret { token_url, client_id, client_secret } => {
                let form = [
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", "https://management.azure.com/.default"),
                ];
                (self.client.post(token_url).form(&form), "client secret login")
            }
            Grant::ManagedIdentity { endpoint, identity_header } => {
                let mut req = self
                    .client
                    .get(endpoint)
                    .header("Metadata", "true")
                    .query(&[("api-version", "2019-08-01"), ("resource", ARM_RESOURCE)]);
                if let Some(secret) = identity_header {
                    req = req.header("X-IDENTITY-HEADER", secret);
                }
                (req, "managed identity")
            }
        }
    }

    async fn fetch(&self) -> Result<(String, Duration), DriverError> {
        let (req, source) = self.request();
        let resp = req
            .send()
            .await
            .map_err(|e| DriverError::Auth(format!("{}: {}", source, e)))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| DriverError::Auth(format!("{}: unreadable response: {}", source, e)))?;
        if !status.is_success() {
            let reason = body["error_description"].as_str().or_else(|| body["error"].as_str());
            return Err(DriverError::Auth(format!(
                "{} failed with {}: {}",
                source,
                status,
                reason.unwrap_or("no details")
            )));
        }
        parse_token(&body, source)
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn token(&self) -> Result<String, DriverError> {
        self.cache.get_or_fetch(|| self.fetch()).await
    }
}

// ── Azure CLI ─────────────────────────────────────────────────────────────────

struct AzCliTokenProvider {
    tenant_id: Option<String>,
    cache: TokenCache,
}

impl AzCliTokenProvider {
    fn new(tenant_id: Option<String>) -> Self {
        Self { tenant_id, cache: TokenCache::default() }
    }

    async fn fetch(&self) -> Result<(String, Duration), DriverError> {
        let mut cmd = Command::new("az");
        cmd.args(["account", "get-access-token", "--resource", ARM_RESOURCE, "-o", "json"]);
        if let Some(tenant) = &self.tenant_id {
            cmd.args(["--tenant", tenant]);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| DriverError::Auth(format!("cannot run az: {}", e)))?;
        if !output.status.success() {
            return Err(DriverError::Auth(format!(
                "az account get-access-token: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let body: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| DriverError::Auth(format!("az output is not JSON: {}", e)))?;
        parse_token(&body, "az account get-access-token")
    }
}

#[async_trait]
impl TokenProvider for AzCliTokenProvider {
    async fn token(&self) -> Result<String, DriverError> {
        self.cache.get_or_fetch(|| self.fetch()).await
    }
}

// ── Static (tests) ────────────────────────────────────────────────────────────

pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, DriverError> {
        Ok(self.0.clone())
    }
}
