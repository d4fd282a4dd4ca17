//! Kroki render bridge
//!
//! Renders PlantUML through a [Kroki](https://kroki.io) server. Useful on
//! machines without a Java runtime; the server plays the engine's role.

use std::io::Write;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

use crate::config::DEFAULT_KROKI_URL;
use crate::detect;
use crate::error::{RenderError, Result};
use crate::renderer::RenderBridge;
use crate::types::{OutputFormat, QualityOptions};

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bridge to a Kroki server
///
/// The HTTP client is built lazily on the first render, which always runs
/// on a blocking thread.
#[derive(Debug)]
pub struct KrokiBridge {
    /// Base URL of the Kroki server
    base_url: String,
    /// Request timeout
    timeout: Duration,
    /// HTTP client
    client: OnceCell<Client>,
}

impl Default for KrokiBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl KrokiBridge {
    /// Create a bridge to the public Kroki server
    pub fn new() -> Self {
        Self::with_url(DEFAULT_KROKI_URL)
    }

    /// Create a bridge to a custom Kroki server
    pub fn with_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            client: OnceCell::new(),
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn client(&self) -> Result<&Client> {
        self.client.get_or_try_init(|| {
            Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| RenderError::Render(format!("Failed to create HTTP client: {}", e)))
        })
    }

    /// Encode diagram source for use in URLs (deflate + base64)
    pub fn encode_source(source: &str) -> Result<String> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(source.as_bytes())
            .map_err(|e| RenderError::Render(e.to_string()))?;
        let compressed = encoder
            .finish()
            .map_err(|e| RenderError::Render(e.to_string()))?;

        Ok(URL_SAFE_NO_PAD.encode(&compressed))
    }

    /// Generate a shareable URL for a diagram (without rendering)
    pub fn diagram_url(&self, source: &str, format: OutputFormat) -> Result<String> {
        let encoded = Self::encode_source(&detect::normalize(source))?;
        Ok(format!(
            "{}/plantuml/{}/{}",
            self.base_url,
            format.kroki_name(),
            encoded
        ))
    }

    /// Check if the Kroki server is reachable
    pub fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client()?
            .get(&url)
            .send()
            .map_err(|e| RenderError::Render(format!("Kroki health check failed: {}", e)))?;
        Ok(response.status().is_success())
    }
}

impl RenderBridge for KrokiBridge {
    fn name(&self) -> &'static str {
        "kroki"
    }

    fn render(&self, source: &str, format: OutputFormat, quality: &QualityOptions) -> Result<Vec<u8>> {
        let url = format!("{}/plantuml/{}", self.base_url, format.kroki_name());
        let body = detect::inject_quality(source, format, quality);

        let response = self
            .client()?
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(body)
            .send()
            .map_err(|e| RenderError::Render(format!("Kroki request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(RenderError::Render(format!(
                "Kroki server error ({}): {}",
                status.as_u16(),
                message.trim()
            )));
        }

        let data = response
            .bytes()
            .map_err(|e| RenderError::Render(format!("Kroki response unreadable: {}", e)))?
            .to_vec();
        if data.is_empty() {
            return Err(RenderError::Render("Kroki returned an empty image".to_string()));
        }
        Ok(data)
    }
}
