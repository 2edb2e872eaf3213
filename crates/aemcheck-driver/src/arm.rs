use async_trait::async_trait;
use aemcheck_domain::StorageAccountRef;
use serde_json::Value;
use tracing::debug;

use crate::directory::StorageDirectory;
use crate::error::DriverError;
use crate::token::{default_token_provider, TokenProvider};

const STORAGE_API_VERSION: &str = "2023-01-01";

// ── Configuration ─────────────────────────────────────────────────────────────

/// Operator-level settings for talking to Azure Resource Manager.
#[derive(Clone, Default)]
pub struct ArmDirectoryConfig {
    /// Subscription whose storage accounts are listed.
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    /// Service principal client ID (optional; falls back to MSI/CLI).
    pub client_id: Option<String>,
    /// Service principal client secret (optional; falls back to MSI/CLI).
    pub client_secret: Option<String>,
}

// ── Base URLs (overridden in tests) ───────────────────────────────────────────

#[derive(Clone)]
pub struct BaseUrls {
    pub management: String,
    pub login:      String,
}

impl Default for BaseUrls {
    fn default() -> Self {
        Self {
            management: "https://management.azure.com".into(),
            login:      "https://login.microsoftonline.com".into(),
        }
    }
}

// ── ArmStorageDirectory ───────────────────────────────────────────────────────

/// [`StorageDirectory`] backed by the `Microsoft.Storage` ARM provider.
pub struct ArmStorageDirectory {
    config: ArmDirectoryConfig,
    client: reqwest::Client,
    token:  Box<dyn TokenProvider>,
    base:   BaseUrls,
}

impl ArmStorageDirectory {
    /// Create a directory, auto-selecting the token provider
    /// (see [`default_token_provider`]).
    pub fn new(config: ArmDirectoryConfig) -> Result<Self, DriverError> {
        if config.subscription_id.is_empty() {
            return Err(DriverError::Auth("a subscription id is required".into()));
        }
        let client = reqwest::Client::new();
        let base   = BaseUrls::default();
        let token  = default_token_provider(
            config.tenant_id.as_deref(),
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
            &base.login,
            &client,
        )?;
        Ok(Self { config, client, token, base })
    }

    /// Create a directory with an explicit token provider and base URLs.
    pub fn with_token_provider(
        config: ArmDirectoryConfig,
        token: Box<dyn TokenProvider>,
        base: BaseUrls,
    ) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            token,
            base,
        }
    }

    async fn bearer(&self) -> Result<String, DriverError> {
        self.token.token().await
    }

    // ── ARM error parsing ─────────────────────────────────────────────────────

    fn parse_arm_error(body: &Value) -> String {
        let err = body
            .get("error")
            .or_else(|| body.get("Error"))
            .unwrap_or(body);
        let code    = err["code"].as_str().unwrap_or("Unknown");
        let message = err["message"].as_str().unwrap_or("unknown error");
        format!("{}: {}", code, message)
    }

    // ── ARM HTTP verbs ────────────────────────────────────────────────────────

    async fn arm_get(&self, url: &str) -> Result<Value, DriverError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM GET");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| DriverError::Request(format!("GET {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !(200..300).contains(&status) {
            return Err(DriverError::Status {
                url: url.to_string(),
                status,
                message: Self::parse_arm_error(&body),
            });
        }
        Ok(body)
    }

    async fn arm_post(&self, url: &str) -> Result<Value, DriverError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM POST");
        let resp = self
            .client
            .post(url)
            .bearer_auth(&token)
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|e| DriverError::Request(format!("POST {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !(200..300).contains(&status) {
            return Err(DriverError::Status {
                url: url.to_string(),
                status,
                message: Self::parse_arm_error(&body),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl StorageDirectory for ArmStorageDirectory {
    async fn list_accounts(&self) -> Result<Vec<StorageAccountRef>, DriverError> {
        let mut url = format!(
            "{}/subscriptions/{}/providers/Microsoft.Storage/storageAccounts?api-version={}",
            self.base.management, self.config.subscription_id, STORAGE_API_VERSION,
        );
        let mut accounts = Vec::new();

        loop {
            let body = self.arm_get(&url).await?;
            if let Some(items) = body["value"].as_array() {
                accounts.extend(items.iter().filter_map(account_from_arm));
            }
            match body["nextLink"].as_str() {
                Some(next) if !next.is_empty() => url = next.to_string(),
                _ => break,
            }
        }

        debug!(count = accounts.len(), "listed storage accounts");
        Ok(accounts)
    }

    async fn list_keys(
        &self,
        resource_group: &str,
        account_name: &str,
    ) -> Result<Vec<String>, DriverError> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}/listKeys?api-version={}",
            self.base.management, self.config.subscription_id, resource_group, account_name, STORAGE_API_VERSION,
        );
        let body = self.arm_post(&url).await?;
        let keys = body["keys"]
            .as_array()
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k["value"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(keys)
    }
}

/// Map one ARM storage account document. Entries without a name or id are
/// skipped.
fn account_from_arm(v: &Value) -> Option<StorageAccountRef> {
    let name = v["name"].as_str()?.to_string();
    let resource_id = v["id"].as_str()?.to_string();
    let account_type = v["sku"]["name"]
        .as_str()
        .or_else(|| v["properties"]["accountType"].as_str())
        .map(str::to_string);
    let endpoints = &v["properties"]["primaryEndpoints"];
    Some(StorageAccountRef {
        name,
        resource_id,
        account_type,
        blob_endpoint_host: endpoints["blob"].as_str().map(extract_url_hostname).unwrap_or_default(),
        table_endpoint_host: endpoints["table"].as_str().map(extract_url_hostname).unwrap_or_default(),
    })
}

/// Extract the hostname from a URL string.
///
/// Strips `https://` or `http://` prefix, then takes the portion before the first `/` or `:`.
fn extract_url_hostname(url: &str) -> String {
    let without_proto = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let without_path = without_proto.split('/').next().unwrap_or(without_proto);
    let without_port = without_path.split(':').next().unwrap_or(without_path);
    without_port.to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
