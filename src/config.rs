use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, H5pError};

// Default values for keys that older config files may not carry
fn default_timeout_secs() -> u64 {
    300
}

fn default_use_cache() -> bool {
    true
}

fn default_translate_list_strings() -> bool {
    true
}

fn default_update_metadata() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub translate: TranslateConfig,
    pub chunking: ChunkingConfig,
    pub fields: FieldConfig,
    pub package: PackageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Which inference service serves the model
    pub backend: BackendKind,
    /// Base URL of the inference service
    pub endpoint: String,
    /// Model name passed to the service
    pub model: String,
    /// API key, if the service requires one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Language of the package text (ISO 639-1)
    pub source_language: String,
    /// Language to translate into (ISO 639-1)
    pub target_language: String,
    /// Attempts per model call before giving up on a piece of text
    pub max_retries: u32,
    /// HTTP timeout for a single model call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Reuse translations stored in the persistent cache
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Ollama: prompt an instruction-tuned model through /api/generate
    Ollama,
    /// LibreTranslate-compatible API (argos, M2M100/NLLB wrappers)
    LibreTranslate,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "libretranslate" | "libre" => Ok(Self::LibreTranslate),
            _ => Err(H5pError::Config(format!(
                "Invalid backend '{}'. Valid backends: ollama, libretranslate",
                value
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::LibreTranslate => "libretranslate",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Longest piece of visible text sent to the model in one call (characters)
    pub max_chunk_chars: usize,
    /// A translation shorter than this fraction of its source is treated as truncated
    pub min_length_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// JSON keys whose string values are translated
    pub translatable_keys: Vec<String>,
    /// Keys holding arrays of answer objects whose `text` is translated
    pub answer_list_keys: Vec<String>,
    /// Keys whose subtrees are never visited
    pub skip_keys: Vec<String>,
    /// Translate bare strings found inside arrays
    #[serde(default = "default_translate_list_strings")]
    pub translate_list_strings: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Location of the content document inside the archive
    pub content_path: String,
    /// Write content.json indented instead of compact
    pub pretty_json: bool,
    /// Translate the h5p.json title and set its language
    #[serde(default = "default_update_metadata")]
    pub update_metadata: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            translate: TranslateConfig {
                backend: BackendKind::LibreTranslate,
                endpoint: "http://localhost:5000".to_string(),
                model: "m2m100_418M".to_string(),
                api_key: None,
                source_language: "en".to_string(),
                target_language: "de".to_string(),
                max_retries: 2,
                timeout_secs: default_timeout_secs(),
                use_cache: true,
            },
            chunking: ChunkingConfig {
                max_chunk_chars: 400,
                min_length_ratio: 0.5,
            },
            fields: FieldConfig::default(),
            package: PackageConfig {
                content_path: "content/content.json".to_string(),
                pretty_json: true,
                update_metadata: true,
            },
        }
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        let to_strings = |keys: &[&str]| keys.iter().map(|k| k.to_string()).collect();
        Self {
            translatable_keys: to_strings(&[
                "text",
                "alt",
                "title",
                "label",
                "contentName",
                "question",
                "header",
                "body",
                "checkAnswerButton",
                "submitAnswerButton",
                "showSolutionButton",
                "a11yCheck",
                "a11yShowSolution",
                "a11yRetry",
                "feedbackOnWrong",
            ]),
            answer_list_keys: to_strings(&["answers"]),
            skip_keys: to_strings(&[
                "library",
                "subContentId",
                "mime",
                "path",
                "license",
                "licenseVersion",
                "licenseExtras",
                "yearFrom",
                "yearTo",
                "source",
            ]),
            translate_list_strings: true,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| H5pError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| H5pError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| H5pError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| H5pError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject settings the translation pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chunk_chars == 0 {
            return Err(H5pError::Config("chunking.max_chunk_chars must be greater than 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.chunking.min_length_ratio) {
            return Err(H5pError::Config(format!(
                "chunking.min_length_ratio must be between 0 and 1, got {}",
                self.chunking.min_length_ratio
            )));
        }
        if self.translate.max_retries == 0 {
            return Err(H5pError::Config("translate.max_retries must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h5p-translator.toml");

        Config::default().save_to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();

        assert_eq!(loaded.translate.backend, BackendKind::LibreTranslate);
        assert_eq!(loaded.translate.target_language, "de");
        assert_eq!(loaded.chunking.max_chunk_chars, 400);
        assert!(loaded.fields.translatable_keys.contains(&"feedbackOnWrong".to_string()));
    }

    #[test]
    fn test_missing_optional_keys_use_defaults() {
        let toml = r#"
            [translate]
            backend = "Ollama"
            endpoint = "http://localhost:11434"
            model = "llama3.2:3b"
            source_language = "en"
            target_language = "fr"
            max_retries = 3

            [chunking]
            max_chunk_chars = 200
            min_length_ratio = 0.4

            [fields]
            translatable_keys = ["text"]
            answer_list_keys = []
            skip_keys = []

            [package]
            content_path = "content/content.json"
            pretty_json = false
        "#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.translate.timeout_secs, 300);
        assert!(config.translate.use_cache);
        assert!(config.translate.api_key.is_none());
        assert!(config.fields.translate_list_strings);
        assert!(config.package.update_metadata);
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let mut config = Config::default();
        config.chunking.min_length_ratio = 1.5;
        assert!(config.validate().is_err());

        config.chunking.min_length_ratio = 0.5;
        config.chunking.max_chunk_chars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("Ollama").unwrap(), BackendKind::Ollama);
        assert_eq!(BackendKind::parse("libre").unwrap(), BackendKind::LibreTranslate);
        assert!(BackendKind::parse("deepl").is_err());
    }

    #[test]
    fn test_from_file_reports_invalid_files() {
        use assert_fs::prelude::*;

        let temp = assert_fs::TempDir::new().unwrap();
        let broken = temp.child("broken.toml");
        broken.write_str("[translate\nbackend = ").unwrap();
        assert!(matches!(Config::from_file(broken.path()), Err(H5pError::Config(_))));

        let mut config = Config::default();
        config.translate.max_retries = 0;
        let invalid = temp.child("invalid.toml");
        invalid.write_str(&toml::to_string_pretty(&config).unwrap()).unwrap();
        let err = Config::from_file(invalid.path()).unwrap_err();
        assert!(err.to_string().contains("max_retries"));

        assert!(Config::from_file(temp.child("missing.toml").path()).is_err());
    }
}
