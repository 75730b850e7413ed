use crate::client::{ClientError, ClientResult, ServiceClient, ToolParams};
use crate::config::ServiceConfig;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use keyring::Entry;
use std::env;
use std::time::Duration;
use tracing::debug;
use url::Url;

const KEYRING_SERVICE: &str = "mediahub-gateway";
const API_KEY_HEADER: &str = "x-api-key";
const MAX_ERROR_BODY: usize = 512;

/// Generic JSON-over-HTTP [`ServiceClient`].
///
/// Sends `POST {base_url}/tools/{tool}` with the parameters as the JSON body.
/// Vendor-specific translation lives behind the backend's own adapter; this
/// client only moves the call and maps failures.
pub struct HttpServiceClient {
    client: reqwest::Client,
    service: String,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpServiceClient {
    pub fn new(service: impl Into<String>, base_url: &str, api_key: Option<String>) -> Result<Self> {
        let service = service.into();
        let mut base_url = Url::parse(base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base_url for service '{}': {}", service, e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_source("http_transport"),
            )
        })?;
        // Url::join would otherwise replace the last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let pool_max_idle = env::var("GATEWAY_HTTP_POOL_MAX_IDLE_PER_HOST")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8);

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(pool_max_idle)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("failed to build HTTP client: {}", e),
                    ErrorContext::new().with_source("http_transport"),
                )
            })?;

        Ok(Self {
            client,
            service,
            base_url,
            api_key,
        })
    }

    /// Build a client from service configuration, resolving the credential.
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self> {
        let name = cfg.name.trim();
        let api_key = cfg.api_key.clone().or_else(|| resolve_api_key(name));
        Self::new(name, &cfg.base_url, api_key)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn tool_url(&self, tool: &str) -> std::result::Result<Url, ClientError> {
        self.base_url
            .join(&format!("tools/{}", tool))
            .map_err(|e| ClientError::transport(format!("invalid tool url: {}", e)))
    }
}

/// Look up a credential for `service`: OS keyring first, then
/// `<SERVICE>_API_KEY` from the environment.
pub fn resolve_api_key(service: &str) -> Option<String> {
    if let Ok(entry) = Entry::new(KEYRING_SERVICE, service) {
        if let Ok(key) = entry.get_password() {
            return Some(key);
        }
    }

    env::var(api_key_env_var(service)).ok()
}

pub fn api_key_env_var(service: &str) -> String {
    format!("{}_API_KEY", service.to_uppercase().replace('-', "_"))
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout { after: timeout }
    } else {
        ClientError::Transport(e.to_string())
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    async fn invoke(&self, tool: &str, params: &ToolParams, timeout: Duration) -> ClientResult {
        let url = self.tool_url(tool)?;
        debug!(service = %self.service, tool, url = %url, "sending tool call");

        let mut req = self.client.post(url).json(params).timeout(timeout);
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        if !status.is_success() {
            return Err(ClientError::Backend {
                status: Some(status.as_u16()),
                message: truncate(body),
            });
        }

        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| ClientError::transport(format!("invalid JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_env_var_name() {
        assert_eq!(api_key_env_var("download-client"), "DOWNLOAD_CLIENT_API_KEY");
        assert_eq!(api_key_env_var("jellyfin"), "JELLYFIN_API_KEY");
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = HttpServiceClient::new("tv", "http://sonarr:8989/api", None).unwrap();
        assert_eq!(client.base_url().as_str(), "http://sonarr:8989/api/");
        assert_eq!(
            client.tool_url("series_lookup").unwrap().as_str(),
            "http://sonarr:8989/api/tools/series_lookup"
        );
    }

    #[test]
    fn test_invalid_base_url_is_configuration_error() {
        let err = HttpServiceClient::new("tv", "not a url", None).err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "é".repeat(MAX_ERROR_BODY);
        let cut = truncate(body);
        assert!(cut.len() <= MAX_ERROR_BODY);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
