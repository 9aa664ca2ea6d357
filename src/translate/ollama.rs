use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::TranslateConfig;
use crate::error::{Result, H5pError};
use crate::language::language_name;
use super::{TextFormat, TranslationBackend};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub text: String,
}

/// Translation through an Ollama-served LLM
pub struct OllamaBackend {
    client: Client,
    config: TranslateConfig,
}

impl OllamaBackend {
    pub fn new(config: TranslateConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Build the translation prompt, asking for a JSON answer
    fn build_prompt(&self, text: &str, source: &str, target: &str, format: TextFormat) -> String {
        let source_name = language_name(source).unwrap_or(source);
        let target_name = language_name(target).unwrap_or(target);

        let mut prompt = format!(
            "You are a professional translator of educational material.\n\
             \n\
             Translate the text from {} to {} ONLY. Do not translate to any other language.\n\
             The target language is: {} (language code: {})\n\
             \n\
             Return ONLY the translation in JSON format as {{\"text\":\"your {} translation here\"}}.\n\
             Do not include any explanations, alternatives, or text in other languages.\n",
            source_name, target_name, target_name, target, target_name
        );

        if format == TextFormat::Html {
            prompt.push_str(
                "The text is an HTML fragment. Keep every HTML tag and attribute exactly as it is \
                 and in the same order; translate only the text between the tags.\n",
            );
        }

        prompt.push_str(&format!("\n[Text to translate]\n{}\n", text));
        prompt
    }

    /// Pull the translation out of a reply that ignored the JSON instruction.
    ///
    /// Leading preamble lines are dropped; everything after them is kept.
    fn clean_response(&self, response: &str) -> String {
        let body: Vec<&str> = response
            .lines()
            .skip_while(|line| is_preamble(line.trim()))
            .collect();

        if body.is_empty() {
            return response.trim().to_string();
        }
        body.join("\n").trim().to_string()
    }
}

fn is_preamble(line: &str) -> bool {
    line.is_empty()
        || line.starts_with("Here is")
        || line.starts_with("Here are")
        || line.starts_with("Translation:")
        || line.starts_with("Option")
        || line.starts_with("**Option")
        || (line.len() > 4 && line.starts_with("**") && line.ends_with("**"))
}

#[async_trait]
impl TranslationBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
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
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: self.build_prompt(text, source, target, format),
            stream: false,
            format: "json".to_string(),
        };

        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        debug!("Sending translation request to: {}", url);

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| H5pError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(H5pError::Translation(format!(
                "Ollama API error {}: {}", status, error_text
            )));
        }

        let generated: GenerateResponse = response.json().await
            .map_err(|e| H5pError::Translation(format!("Failed to parse response: {}", e)))?;

        let raw_response = generated.response.trim().to_string();
        debug!("Raw Ollama response: {}", raw_response);

        if raw_response.is_empty() {
            return Err(H5pError::Translation("Empty translation received".to_string()));
        }

        if let Ok(result) = serde_json::from_str::<TranslationResult>(&raw_response) {
            return Ok(result.text.trim().to_string());
        }

        Ok(self.clean_response(&raw_response))
    }

    async fn check_availability(&self, _source: &str, _target: &str) -> Result<()> {
        let url = format!("{}/api/show", self.config.endpoint.trim_end_matches('/'));

        let response = self.client
            .post(&url)
            .json(&json!({ "name": self.config.model }))
            .send()
            .await
            .map_err(|e| H5pError::Translation(format!("Failed to connect to Ollama: {}", e)))?;

        if response.status().is_success() {
            info!("Ollama model '{}' is available", self.config.model);
            Ok(())
        } else {
            Err(H5pError::Translation(format!(
                "Ollama model '{}' not found. Please pull the model first: ollama pull {}",
                self.config.model, self.config.model
            )))
        }
    }
}
