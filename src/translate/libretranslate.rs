use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::TranslateConfig;
use crate::error::{Result, H5pError};
use super::{TextFormat, TranslationBackend};

#[derive(Debug, Clone, Serialize)]
pub struct TranslateRequest {
    pub q: String,
    pub source: String,
    pub target: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslateResponse {
    #[serde(rename = "translatedText")]
    pub translated_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LanguageEntry {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Translation through a LibreTranslate-compatible inference server
pub struct LibreTranslateBackend {
    client: Client,
    config: TranslateConfig,
}

impl LibreTranslateBackend {
    pub fn new(config: TranslateConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), route)
    }

    /// Languages the server can translate between
    pub async fn languages(&self) -> Result<Vec<LanguageEntry>> {
        let response = self.client
            .get(self.url("languages"))
            .send()
            .await
            .map_err(|e| H5pError::Translation(format!("Failed to connect to LibreTranslate: {}", e)))?;

        if !response.status().is_success() {
            return Err(H5pError::Translation(format!(
                "LibreTranslate language listing failed with status {}",
                response.status()
            )));
        }

        response.json().await
            .map_err(|e| H5pError::Translation(format!("Failed to parse language list: {}", e)))
    }
}

#[async_trait]
impl TranslationBackend for LibreTranslateBackend {
    fn name(&self) -> &'static str {
        "libretranslate"
    }

    fn model(&self) -> String {
        self.config.model.clone()
    }

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        format: TextFormat,
    ) -> Result<String> {
        let request = TranslateRequest {
            q: text.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            format: format.as_str().to_string(),
            api_key: self.config.api_key.clone(),
        };

        let url = self.url("translate");
        debug!("Sending translation request to: {}", url);

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| H5pError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(H5pError::Translation(format!(
                "LibreTranslate API error {}: {}", status, message
            )));
        }

        let translated: TranslateResponse = response.json().await
            .map_err(|e| H5pError::Translation(format!("Failed to parse response: {}", e)))?;

        Ok(translated.translated_text)
    }

    async fn check_availability(&self, source: &str, target: &str) -> Result<()> {
        let languages = self.languages().await?;

        let source_entry = languages.iter().find(|l| l.code == source).ok_or_else(|| {
            H5pError::UnsupportedLanguage(format!("{} is not served by {}", source, self.config.endpoint))
        })?;

        // Older servers omit `targets`; any listed language is then a valid target
        let target_known = if source_entry.targets.is_empty() {
            languages.iter().any(|l| l.code == target)
        } else {
            source_entry.targets.iter().any(|t| t == target)
        };

        if !target_known {
            return Err(H5pError::UnsupportedLanguage(format!(
                "{} -> {} is not served by {}",
                source, target, self.config.endpoint
            )));
        }

        info!(
            "LibreTranslate at {} serves {} ({}) -> {}",
            self.config.endpoint, source_entry.name, source, target
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(endpoint: &str) -> LibreTranslateBackend {
        let mut config = Config::default().translate;
        config.endpoint = format!("{}/", endpoint);
        config.api_key = Some("secret".to_string());
        LibreTranslateBackend::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_translate_sends_format_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(body_partial_json(json!({
                "q": "<p>Hello</p>",
                "source": "en",
                "target": "de",
                "format": "html",
                "api_key": "secret"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "translatedText": "<p>Hallo</p>"
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server.uri());
        let translated = backend
            .translate("<p>Hello</p>", "en", "de", TextFormat::Html)
            .await
            .unwrap();

        assert_eq!(translated, "<p>Hallo</p>");
    }

    #[tokio::test]
    async fn test_translate_surfaces_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "xx is not supported"
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server.uri());
        let err = backend
            .translate("Hello", "en", "xx", TextFormat::Plain)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("xx is not supported"));
    }

    #[tokio::test]
    async fn test_check_availability_uses_targets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "code": "en", "name": "English", "targets": ["de", "fr"] },
                { "code": "de", "name": "German", "targets": ["en"] },
                { "code": "ja", "name": "Japanese", "targets": ["en"] }
            ])))
            .mount(&server)
            .await;

        let backend = backend_for(&server.uri());
        assert!(backend.check_availability("en", "de").await.is_ok());
        assert!(backend.check_availability("en", "ja").await.is_err());
        assert!(backend.check_availability("ko", "en").await.is_err());
    }
}
