//! HTTP client for the workspace console API and the marketplace
//!
//! Every route in this crate is relative: console routes are joined onto
//! `{base_url}{api_prefix}`, marketplace routes onto `marketplace_url`.

mod error;

pub use error::ApiError;

use crate::config::ApiConfig;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Thin JSON client shared by the plugin service and the marketplace
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    console_root: String,
    marketplace_root: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client from the `[api]` config section
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ApiError::from_network_error)?;

        Ok(Self {
            http,
            console_root: config.console_root(),
            marketplace_root: config.marketplace_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Point both hosts at explicit roots (used against local test servers)
    pub fn with_roots(console_root: &str, marketplace_root: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            console_root: console_root.trim_end_matches('/').to_string(),
            marketplace_root: marketplace_root.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// GET a console route
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.console_root, path);
        tracing::debug!("GET {}", url);
        let req = self.authorize(self.http.get(&url).query(params));
        self.send_json(req).await
    }

    /// POST a console route with an optional JSON body
    pub async fn post<T, B>(&self, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.console_root, path);
        tracing::debug!("POST {}", url);
        let mut req = self.http.post(&url);
        if let Some(body) = body {
            req = req.json(body);
        }
        self.send_json(self.authorize(req)).await
    }

    /// GET a marketplace route
    pub async fn get_marketplace<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.marketplace_root, path);
        tracing::debug!("GET {}", url);
        self.send_json(self.http.get(&url).query(params)).await
    }

    /// POST a marketplace route
    pub async fn post_marketplace<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.marketplace_root, path);
        tracing::debug!("POST {}", url);
        self.send_json(self.http.post(&url).json(body)).await
    }

    /// GET a marketplace route as raw bytes (package downloads)
    pub async fn get_marketplace_bytes(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}{}", self.marketplace_root, path);
        tracing::debug!("GET {} (binary)", url);
        let response = self.checked(self.http.get(&url)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(ApiError::from_network_error)?;
        Ok(bytes.to_vec())
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn checked(&self, req: RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = req.send().await.map_err(ApiError::from_network_error)?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::debug!("API error ({}): {}", status, error_text);
            return Err(ApiError::from_http_status(status, error_text));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let response = self.checked(req).await?;
        let text = response
            .text()
            .await
            .map_err(ApiError::from_network_error)?;
        // Some mutation routes answer 200 with an empty body
        let text = if text.trim().is_empty() { "null" } else { &text };
        Ok(serde_json::from_str(text)?)
    }
}
