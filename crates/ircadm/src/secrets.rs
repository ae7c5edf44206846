//! Credential storage access.
//!
//! Account passwords and the operator credential live as named secrets in
//! Google Secret Manager, one project per network. The production client
//! talks the REST surface directly, authenticating with a bearer token from
//! the GCE instance metadata server, so the tool runs on the ircd host with
//! no key material on disk.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::SecretString;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::AdmError;

/// Suffix that marks a secret as an account credential.
pub const CREDENTIAL_SUFFIX: &str = "-credential";

/// Name of the credential secret for an account.
pub fn credential_name(username: &str) -> String {
    format!("{}{}", username, CREDENTIAL_SUFFIX)
}

/// Account name encoded in a credential secret name, if it carries one.
///
/// Secrets without the suffix (operator password, TLS material, unrelated
/// deployment keys) resolve to `None` and stay out of account discovery.
pub fn account_for_secret(secret_name: &str) -> Option<&str> {
    secret_name
        .strip_suffix(CREDENTIAL_SUFFIX)
        .filter(|account| !account.is_empty())
}

/// Listing and retrieval of named secrets within a project.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Short names of every secret in the project.
    async fn list(&self, project: &str) -> Result<Vec<String>, AdmError>;

    /// Current value of one secret, trimmed of surrounding whitespace.
    async fn access(&self, project: &str, name: &str) -> Result<SecretString, AdmError>;
}

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com";
const PAGE_SIZE: u32 = 300;

/// Refresh the cached token this many seconds before its reported expiry.
const TOKEN_EXPIRY_SLACK_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SecretList {
    #[serde(default)]
    secrets: Vec<SecretEntry>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SecretEntry {
    /// Fully qualified resource name, `projects/<p>/secrets/<name>`.
    name: String,
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: AccessPayload,
}

#[derive(Debug, Deserialize)]
struct AccessPayload {
    /// Base64-wrapped secret bytes.
    data: String,
}

struct CachedToken {
    value: SecretString,
    expires_at: Instant,
}

/// Google Secret Manager REST client authenticated via the instance
/// metadata server.
pub struct SecretManagerClient {
    http: reqwest::Client,
    api_url: String,
    token_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl SecretManagerClient {
    pub fn new() -> Result<Self, AdmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| secret_err("<http client>", e))?;
        Ok(Self {
            http,
            api_url: SECRET_MANAGER_URL.to_string(),
            token_url: METADATA_TOKEN_URL.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Service-account bearer token, cached until shortly before expiry.
    async fn bearer_token(&self) -> Result<SecretString, AdmError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("fetching service-account token from metadata server");
        let response: TokenResponse = self
            .http
            .get(&self.token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| secret_err("<metadata token>", e))?
            .error_for_status()
            .map_err(|e| secret_err("<metadata token>", e))?
            .json()
            .await
            .map_err(|e| secret_err("<metadata token>", e))?;

        let lifetime =
            Duration::from_secs(response.expires_in.saturating_sub(TOKEN_EXPIRY_SLACK_SECS));
        let value = SecretString::new(response.access_token);
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }
}

#[async_trait]
impl SecretStore for SecretManagerClient {
    async fn list(&self, project: &str) -> Result<Vec<String>, AdmError> {
        use secrecy::ExposeSecret;

        let token = self.bearer_token().await?;
        let url = format!("{}/v1/projects/{}/secrets", self.api_url, project);

        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(&url)
                .query(&[("pageSize", PAGE_SIZE.to_string())])
                .bearer_auth(token.expose_secret());
            if let Some(t) = &page_token {
                request = request.query(&[("pageToken", t.as_str())]);
            }

            let page: SecretList = request
                .send()
                .await
                .map_err(|e| secret_err("<list>", e))?
                .error_for_status()
                .map_err(|e| secret_err("<list>", e))?
                .json()
                .await
                .map_err(|e| secret_err("<list>", e))?;

            for entry in &page.secrets {
                names.push(short_name(&entry.name).to_string());
            }
            match page.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }

        debug!("listed {} secret(s) in project {}", names.len(), project);
        Ok(names)
    }

    async fn access(&self, project: &str, name: &str) -> Result<SecretString, AdmError> {
        use secrecy::ExposeSecret;

        let token = self.bearer_token().await?;
        let url = format!(
            "{}/v1/projects/{}/secrets/{}/versions/latest:access",
            self.api_url, project, name
        );

        let response: AccessResponse = self
            .http
            .get(&url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| secret_err(name, e))?
            .error_for_status()
            .map_err(|e| secret_err(name, e))?
            .json()
            .await
            .map_err(|e| secret_err(name, e))?;

        decode_payload(name, &response.payload.data)
    }
}

/// Last segment of a fully qualified secret resource name.
fn short_name(resource: &str) -> &str {
    resource.rsplit('/').next().unwrap_or(resource)
}

/// Unwrap the base64 payload and trim the trailing newline most secrets
/// are uploaded with.
fn decode_payload(name: &str, data: &str) -> Result<SecretString, AdmError> {
    let raw = BASE64
        .decode(data)
        .map_err(|e| secret_err(name, format!("payload not base64: {}", e)))?;
    let text = String::from_utf8(raw)
        .map_err(|e| secret_err(name, format!("payload not UTF-8: {}", e)))?;
    Ok(SecretString::new(text.trim().to_string()))
}

fn secret_err(name: &str, detail: impl std::fmt::Display) -> AdmError {
    AdmError::Secret {
        name: name.to_string(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn credential_name_appends_suffix() {
        assert_eq!(credential_name("alice"), "alice-credential");
    }

    #[test]
    fn account_for_secret_strips_suffix() {
        assert_eq!(account_for_secret("alice-credential"), Some("alice"));
    }

    #[test]
    fn unrelated_secrets_are_not_accounts() {
        assert_eq!(account_for_secret("oper-password"), None);
        assert_eq!(account_for_secret("tls-private-key"), None);
        // A bare suffix names nobody.
        assert_eq!(account_for_secret("-credential"), None);
    }

    #[test]
    fn short_name_takes_last_path_segment() {
        assert_eq!(
            short_name("projects/example/secrets/alice-credential"),
            "alice-credential"
        );
        assert_eq!(short_name("plain-name"), "plain-name");
    }

    #[test]
    fn list_page_deserializes() {
        let page: SecretList = serde_json::from_str(
            r#"{
                "secrets": [
                    {"name": "projects/p/secrets/alice-credential", "createTime": "2026-01-01T00:00:00Z"},
                    {"name": "projects/p/secrets/oper-password"}
                ],
                "nextPageToken": "tok-2"
            }"#,
        )
        .unwrap();
        assert_eq!(page.secrets.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("tok-2"));
    }

    #[test]
    fn empty_list_page_deserializes() {
        let page: SecretList = serde_json::from_str("{}").unwrap();
        assert!(page.secrets.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn payload_is_decoded_and_trimmed() {
        // "hunter2\n" in standard base64.
        let value = decode_payload("alice-credential", "aHVudGVyMgo=").unwrap();
        assert_eq!(value.expose_secret(), "hunter2");
    }

    #[test]
    fn bad_base64_payload_is_an_error() {
        let err = decode_payload("alice-credential", "!!!").unwrap_err();
        assert!(err.to_string().contains("alice-credential"));
    }
}
