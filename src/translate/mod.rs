// Translation backends and the tiered translation engine
//
// A backend is one inference service that serves the model:
// - LibreTranslate: any LibreTranslate-compatible server (argos, M2M100/NLLB wrappers)
// - Ollama: an instruction-tuned LLM prompted to translate
//
// The engine sits on top of a backend and decides how text reaches it.

pub mod cache;
pub mod engine;
pub mod libretranslate;
pub mod ollama;

use async_trait::async_trait;

pub use cache::{TranslationCache, TranslationCacheEntry};
pub use engine::{TierStats, Translated, TranslationEngine};

use crate::config::{BackendKind, TranslateConfig};
use crate::error::Result;

/// How the text handed to a backend should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    /// Markup must come back unchanged, only the text between tags is translated
    Html,
}

impl TextFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "text",
            Self::Html => "html",
        }
    }
}

/// One inference service able to translate a piece of text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Short backend identifier used in logs and cache keys
    fn name(&self) -> &'static str;

    /// Model served by the backend
    fn model(&self) -> String;

    /// Translate `text` from `source` to `target`
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        format: TextFormat,
    ) -> Result<String>;

    /// Check that the service is reachable and can serve the language pair
    async fn check_availability(&self, source: &str, target: &str) -> Result<()>;
}

/// Factory for creating backend instances
pub struct BackendFactory;

impl BackendFactory {
    /// Create the backend selected in the configuration
    pub fn create(config: &TranslateConfig) -> Result<Box<dyn TranslationBackend>> {
        let backend: Box<dyn TranslationBackend> = match config.backend {
            BackendKind::Ollama => Box::new(ollama::OllamaBackend::new(config.clone())?),
            BackendKind::LibreTranslate => {
                Box::new(libretranslate::LibreTranslateBackend::new(config.clone())?)
            }
        };
        Ok(backend)
    }
}
