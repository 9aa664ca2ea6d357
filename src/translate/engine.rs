//! Tiered translation of field values.
//!
//! Models truncate or garble long inputs and sometimes mangle markup, so a
//! value never reaches the backend in one opaque piece. Rich text is handled
//! block by block:
//!
//! 1. a block whose visible text fits in one chunk is sent whole, markup
//!    included, and accepted only if the tags come back unchanged and the text
//!    is not truncated;
//! 2. otherwise every tag is kept verbatim and each text node is translated on
//!    its own, long nodes in sentence-packed chunks;
//! 3. a text node that still fails keeps its original text, and a block where
//!    every node failed is left untouched.
//!
//! Plain values go straight to the chunked path.

use std::collections::HashMap;
use std::ops::AddAssign;
use tracing::{debug, info, warn};

use crate::config::{ChunkingConfig, TranslateConfig};
use crate::error::{Result, H5pError};
use crate::text::chunk::{char_len, chunk_text, should_translate, split_outer_whitespace, weighted_len};
use crate::text::html::{self, decode_entities, split_blocks, tag_signature, tokenize, visible_text, BlockKind, Token};
use super::cache::{CacheKey, TranslationCache};
use super::{TextFormat, TranslationBackend};

/// Counts of how each translated piece was handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    /// Pieces translated in a single model call
    pub whole: usize,
    /// Pieces translated chunk by chunk or node by node
    pub chunked: usize,
    /// Pieces left in the source language after every attempt failed
    pub original: usize,
}

impl AddAssign for TierStats {
    fn add_assign(&mut self, other: Self) {
        self.whole += other.whole;
        self.chunked += other.chunked;
        self.original += other.original;
    }
}

/// A translated value together with how it was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    pub text: String,
    pub stats: TierStats,
}

impl Translated {
    fn unchanged(text: &str) -> Self {
        Self { text: text.to_string(), stats: TierStats::default() }
    }

    fn kept_original(text: &str) -> Self {
        Self {
            text: text.to_string(),
            stats: TierStats { original: 1, ..TierStats::default() },
        }
    }
}

pub struct TranslationEngine {
    backend: Box<dyn TranslationBackend>,
    cache: Option<TranslationCache>,
    memory: HashMap<String, String>,
    source_language: String,
    target_language: String,
    max_retries: u32,
    chunking: ChunkingConfig,
    model_calls: usize,
}

impl TranslationEngine {
    pub fn new(
        backend: Box<dyn TranslationBackend>,
        cache: Option<TranslationCache>,
        translate: &TranslateConfig,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            memory: HashMap::new(),
            source_language: translate.source_language.clone(),
            target_language: translate.target_language.clone(),
            max_retries: translate.max_retries.max(1),
            chunking,
            model_calls: 0,
        }
    }

    pub fn backend(&self) -> &dyn TranslationBackend {
        self.backend.as_ref()
    }

    pub fn source_language(&self) -> &str {
        &self.source_language
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    /// Number of requests sent to the backend so far, retries included
    pub fn model_calls(&self) -> usize {
        self.model_calls
    }

    /// Translate a field value, rich text or plain
    pub async fn translate_value(&mut self, value: &str) -> Translated {
        if html::looks_like_html(value) {
            self.translate_html(value).await
        } else {
            self.translate_plain(value).await
        }
    }

    /// Translate plain text, keeping its outer whitespace
    pub async fn translate_plain(&mut self, text: &str) -> Translated {
        let (leading, core, trailing) = split_outer_whitespace(text);
        if !should_translate(core) {
            return Translated::unchanged(text);
        }

        // Escaped plain fields stay escaped; raw ones stay raw
        let escaped = core.contains('&') && decode_entities(core) != core;
        let source = if escaped { decode_entities(core) } else { core.to_string() };

        let chunk_count = chunk_text(&source, self.chunking.max_chunk_chars).len();
        match self.translate_chunks(&source).await {
            Some(translated) => {
                let translated = if escaped { escape_text(&translated) } else { translated };
                let stats = if chunk_count > 1 {
                    TierStats { chunked: 1, ..TierStats::default() }
                } else {
                    TierStats { whole: 1, ..TierStats::default() }
                };
                Translated { text: format!("{}{}{}", leading, translated, trailing), stats }
            }
            None => Translated::kept_original(text),
        }
    }

    /// Translate an HTML fragment block by block
    pub async fn translate_html(&mut self, fragment: &str) -> Translated {
        let mut output = String::with_capacity(fragment.len());
        let mut stats = TierStats::default();

        for block in split_blocks(fragment) {
            let raw_block = matches!(&block.kind, BlockKind::Element(name) if RAW_ELEMENTS.contains(&name.as_str()));
            if block.is_separator() || raw_block {
                output.push_str(&block.html);
                continue;
            }

            let visible = visible_text(&block.html);
            if !should_translate(&visible) {
                output.push_str(&block.html);
                continue;
            }

            if char_len(&visible) <= self.chunking.max_chunk_chars {
                if let Some(translated) = self.translate_whole_block(&block.html, &visible).await {
                    output.push_str(&translated);
                    stats.whole += 1;
                    continue;
                }
            }

            let (translated, translated_nodes, failed_nodes) = self.translate_text_nodes(&block.html).await;
            if translated_nodes == 0 {
                warn!("Keeping original block: {}", preview(&visible, 60));
                output.push_str(&block.html);
                stats.original += 1;
            } else {
                if failed_nodes > 0 {
                    warn!("{} text node(s) kept original in: {}", failed_nodes, preview(&visible, 60));
                }
                output.push_str(&translated);
                stats.chunked += 1;
                stats.original += failed_nodes;
            }
        }

        Translated { text: output, stats }
    }

    /// Send a whole block with its markup; `None` when the result is unusable
    async fn translate_whole_block(&mut self, block: &str, visible: &str) -> Option<String> {
        let (leading, core, trailing) = split_outer_whitespace(block);

        let translated = match self.call_model(core, TextFormat::Html).await {
            Ok(translated) => translated,
            Err(e) => {
                debug!("Whole-block translation failed, falling back to text nodes: {}", e);
                return None;
            }
        };
        let translated = translated.trim();

        if tag_signature(core) != tag_signature(translated) {
            debug!("Markup changed in translation, falling back to text nodes");
            return None;
        }

        let translated_visible = visible_text(translated);
        if !self.length_ok(visible, &translated_visible) {
            warn!(
                "Truncated block ({} vs {} chars), retrying node by node",
                char_len(&translated_visible),
                char_len(visible)
            );
            return None;
        }

        info!("[Block] {} → {}", preview(visible, 80), preview(&translated_visible, 80));
        Some(format!("{}{}{}", leading, translated, trailing))
    }

    /// Keep every tag and translate the text between them.
    ///
    /// Returns the rebuilt block with the number of text nodes translated
    /// and the number left in the source language.
    async fn translate_text_nodes(&mut self, block: &str) -> (String, usize, usize) {
        let mut output = String::with_capacity(block.len());
        let mut translated_nodes = 0;
        let mut failed_nodes = 0;
        let mut raw_depth = 0usize;

        for token in tokenize(block) {
            match token {
                Token::Tag(tag) => {
                    raw_depth = adjust_raw_depth(raw_depth, &tag);
                    output.push_str(&tag);
                }
                Token::Text(text) => {
                    if raw_depth > 0 {
                        output.push_str(&text);
                        continue;
                    }
                    let (leading, core, trailing) = split_outer_whitespace(&text);
                    let source = decode_entities(core);
                    if !should_translate(&source) {
                        output.push_str(&text);
                        continue;
                    }

                    match self.translate_chunks(&source).await {
                        Some(translated) => {
                            debug!("[Node] {} → {}", preview(&source, 60), preview(&translated, 60));
                            output.push_str(leading);
                            output.push_str(&escape_text(&translated));
                            output.push_str(trailing);
                            translated_nodes += 1;
                        }
                        None => {
                            output.push_str(&text);
                            failed_nodes += 1;
                        }
                    }
                }
            }
        }

        (output, translated_nodes, failed_nodes)
    }

    /// Translate text chunk by chunk; `None` if any chunk fails or comes back truncated
    async fn translate_chunks(&mut self, text: &str) -> Option<String> {
        let chunks = chunk_text(text, self.chunking.max_chunk_chars);
        if chunks.is_empty() {
            return None;
        }

        let mut parts = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            match self.call_model(chunk, TextFormat::Plain).await {
                Ok(translated) => parts.push(translated.trim().to_string()),
                Err(e) => {
                    warn!("Failed to translate part: {} - {}", preview(chunk, 30), e);
                    return None;
                }
            }
        }

        let joined = parts.join(" ");
        if !self.length_ok(text, &joined) {
            warn!(
                "Truncated translation (keeping original) → {} vs {}",
                char_len(&joined),
                char_len(text)
            );
            return None;
        }

        if chunks.len() == 1 {
            info!("{} → {}", preview(text, 80), preview(&joined, 80));
        } else {
            info!("[{} chunks] {} → {}", chunks.len(), preview(text, 80), preview(&joined, 80));
        }
        Some(joined)
    }

    /// One model request with caching and retries
    async fn call_model(&mut self, text: &str, format: TextFormat) -> Result<String> {
        let model = self.backend.model();
        let key = CacheKey {
            text,
            source_language: &self.source_language,
            target_language: &self.target_language,
            backend: self.backend.name(),
            model: &model,
            format: format.as_str(),
        };
        let digest = key.digest();

        if let Some(cached) = self.memory.get(&digest) {
            return Ok(cached.clone());
        }
        if let Some(cache) = &self.cache {
            if let Ok(Some(cached)) = cache.load(&key).await {
                self.memory.insert(digest, cached.clone());
                return Ok(cached);
            }
        }

        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            self.model_calls += 1;
            match self
                .backend
                .translate(text, &self.source_language, &self.target_language, format)
                .await
            {
                Ok(translated) if !translated.trim().is_empty() => {
                    if let Some(cache) = &self.cache {
                        if let Err(e) = cache.save(&key, &translated).await {
                            warn!("Failed to save translation to persistent cache: {}", e);
                        }
                    }
                    self.memory.insert(digest, translated.clone());
                    return Ok(translated);
                }
                Ok(_) => {
                    warn!("[Retry {}/{}] Empty translation received", attempt, self.max_retries);
                    last_error = Some(H5pError::Translation("Empty translation received".to_string()));
                }
                Err(e) => {
                    warn!("[Retry {}/{}] Error: {}", attempt, self.max_retries, preview(&e.to_string(), 80));
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| H5pError::Translation("No translation attempt made".to_string())))
    }

    /// Reject translations that lost too much of their source text
    fn length_ok(&self, source: &str, translated: &str) -> bool {
        let source_len = weighted_len(source.trim());
        if source_len == 0 {
            return true;
        }
        let translated_len = weighted_len(translated.trim());
        translated_len > 0
            && translated_len as f64 >= self.chunking.min_length_ratio * source_len as f64
    }
}

/// Elements whose text is code or markup rather than prose
const RAW_ELEMENTS: &[&str] = &["script", "style", "code", "pre", "kbd", "samp"];

/// Track whether we are inside an element whose text must not be translated
fn adjust_raw_depth(depth: usize, tag: &str) -> usize {
    match html::tag_info(tag) {
        Some(info) if RAW_ELEMENTS.contains(&info.name.as_str()) => {
            if info.closing {
                depth.saturating_sub(1)
            } else if info.self_closing {
                depth
            } else {
                depth + 1
            }
        }
        _ => depth,
    }
}

/// Escape text for insertion between tags
fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// First `max` characters of a string for log lines
pub fn preview(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if char_len(trimmed) <= max {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::translate::MockTranslationBackend;
    use std::sync::{Arc, Mutex};

    /// Mock backend that upper-cases plain text and handles HTML with `html`
    fn mock_backend<F>(html: F) -> MockTranslationBackend
    where
        F: Fn(&str) -> Result<String> + Send + 'static,
    {
        let mut backend = MockTranslationBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_model().returning(|| "mock-model".to_string());
        backend.expect_translate().returning(move |text, _, _, format| match format {
            TextFormat::Plain => Ok(text.to_uppercase()),
            TextFormat::Html => html(text),
        });
        backend
    }

    fn engine_with(backend: MockTranslationBackend, max_chunk_chars: usize) -> TranslationEngine {
        let config = Config::default();
        let chunking = ChunkingConfig { max_chunk_chars, min_length_ratio: 0.5 };
        TranslationEngine::new(Box::new(backend), None, &config.translate, chunking)
    }

    #[tokio::test]
    async fn test_plain_text_keeps_outer_whitespace() {
        let mut engine = engine_with(mock_backend(|t| Ok(t.to_string())), 400);
        let result = engine.translate_value("  Check answer ").await;

        assert_eq!(result.text, "  CHECK ANSWER ");
        assert_eq!(result.stats, TierStats { whole: 1, ..TierStats::default() });
    }

    #[tokio::test]
    async fn test_plain_text_not_translatable_is_untouched() {
        let mut engine = engine_with(MockTranslationBackend::new(), 400);
        let result = engine.translate_value("https://h5p.org").await;

        assert_eq!(result.text, "https://h5p.org");
        assert_eq!(result.stats, TierStats::default());
        assert_eq!(engine.model_calls(), 0);
    }

    #[tokio::test]
    async fn test_plain_text_escaped_entities_round_trip() {
        let mut engine = engine_with(mock_backend(|t| Ok(t.to_string())), 400);
        let result = engine.translate_value("Salt &amp; pepper").await;

        assert_eq!(result.text, "SALT &amp; PEPPER");
    }

    #[tokio::test]
    async fn test_long_plain_text_is_chunked() {
        let mut engine = engine_with(mock_backend(|t| Ok(t.to_string())), 20);
        let result = engine.translate_value("Wear your goggles. Tie back long hair.").await;

        assert_eq!(result.text, "WEAR YOUR GOGGLES. TIE BACK LONG HAIR.");
        assert_eq!(result.stats.chunked, 1);
        assert_eq!(engine.model_calls(), 2);
    }

    #[tokio::test]
    async fn test_html_whole_block_tier() {
        let mut engine = engine_with(
            mock_backend(|t| Ok(t.replace("Hello", "Hallo").replace("world", "Welt"))),
            400,
        );
        let result = engine.translate_value("<p>Hello <b>world</b></p>\n<p>Hello</p>").await;

        assert_eq!(result.text, "<p>Hallo <b>Welt</b></p>\n<p>Hallo</p>");
        assert_eq!(result.stats, TierStats { whole: 2, ..TierStats::default() });
    }

    #[tokio::test]
    async fn test_html_falls_back_to_text_nodes_when_markup_changes() {
        // The model drops the <b> tags, so the block is redone node by node
        let mut engine = engine_with(mock_backend(|_| Ok("<p>Hallo Welt</p>".to_string())), 400);
        let result = engine.translate_value("<p>Hello <b>world</b></p>").await;

        assert_eq!(result.text, "<p>HELLO <b>WORLD</b></p>");
        assert_eq!(result.stats, TierStats { chunked: 1, ..TierStats::default() });
    }

    #[tokio::test]
    async fn test_html_falls_back_when_block_truncated() {
        let mut engine = engine_with(mock_backend(|_| Ok("<p>Hi</p>".to_string())), 400);
        let result = engine
            .translate_value("<p>Always wash your hands before leaving.</p>")
            .await;

        assert_eq!(result.text, "<p>ALWAYS WASH YOUR HANDS BEFORE LEAVING.</p>");
    }

    #[tokio::test]
    async fn test_html_long_block_skips_whole_block_tier() {
        let mut backend = MockTranslationBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_model().returning(|| "mock-model".to_string());
        backend
            .expect_translate()
            .withf(|_, _, _, format| *format == TextFormat::Plain)
            .returning(|text, _, _, _| Ok(text.to_uppercase()));

        let mut engine = engine_with(backend, 15);
        let result = engine
            .translate_value("<p>First sentence. Second sentence.</p>")
            .await;

        assert_eq!(result.text, "<p>FIRST SENTENCE. SECOND SENTENCE.</p>");
        assert_eq!(result.stats.chunked, 1);
    }

    #[tokio::test]
    async fn test_html_keeps_original_when_everything_fails() {
        let mut backend = MockTranslationBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_model().returning(|| "mock-model".to_string());
        backend
            .expect_translate()
            .returning(|_, _, _, _| Err(H5pError::Translation("offline".to_string())));

        let mut engine = engine_with(backend, 400);
        let source = "<ul><li>Goggles</li><li>Gloves</li></ul>";
        let result = engine.translate_value(source).await;

        assert_eq!(result.text, source);
        assert_eq!(result.stats, TierStats { original: 1, ..TierStats::default() });
        // Whole block plus two nodes, each tried twice
        assert_eq!(engine.model_calls(), 6);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();

        let mut backend = MockTranslationBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_model().returning(|| "mock-model".to_string());
        backend.expect_translate().returning(move |text, _, _, _| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n == 1 {
                Ok("   ".to_string())
            } else {
                Ok(text.to_uppercase())
            }
        });

        let mut engine = engine_with(backend, 400);
        let result = engine.translate_value("Retry").await;

        assert_eq!(result.text, "RETRY");
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_repeated_text_hits_memory_cache() {
        let mut engine = engine_with(mock_backend(|t| Ok(t.to_string())), 400);

        engine.translate_value("Check").await;
        engine.translate_value("Check").await;

        assert_eq!(engine.model_calls(), 1);
    }

    #[tokio::test]
    async fn test_persistent_cache_is_used_across_engines() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();

        let mut first = TranslationEngine::new(
            Box::new(mock_backend(|t| Ok(t.to_string()))),
            Some(TranslationCache::new(dir.path())),
            &config.translate,
            config.chunking.clone(),
        );
        assert_eq!(first.translate_value("Retry").await.text, "RETRY");

        let mut offline = MockTranslationBackend::new();
        offline.expect_name().return_const("mock");
        offline.expect_model().returning(|| "mock-model".to_string());
        offline.expect_translate().never();

        let mut second = TranslationEngine::new(
            Box::new(offline),
            Some(TranslationCache::new(dir.path())),
            &config.translate,
            config.chunking.clone(),
        );
        assert_eq!(second.translate_value("Retry").await.text, "RETRY");
    }

    #[tokio::test]
    async fn test_code_elements_are_not_translated() {
        let mut backend = MockTranslationBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_model().returning(|| "mock-model".to_string());
        backend.expect_translate().returning(|text, _, _, format| match format {
            TextFormat::Html => Err(H5pError::Translation("no html".to_string())),
            TextFormat::Plain => Ok(text.to_uppercase()),
        });

        let mut engine = engine_with(backend, 400);
        let result = engine.translate_value("<p>Run <code>ls -la</code> now</p>").await;

        assert_eq!(result.text, "<p>RUN <code>ls -la</code> NOW</p>");
    }

    #[tokio::test]
    async fn test_plain_text_truncated_keeps_original() {
        let mut backend = MockTranslationBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_model().returning(|| "mock-model".to_string());
        backend.expect_translate().returning(|_, _, _, _| Ok("Hi".to_string()));
        let mut engine = engine_with(backend, 400);

        let source = "Always wash your hands before leaving.";
        let result = engine.translate_value(source).await;

        assert_eq!(result.text, source);
        assert_eq!(result.stats, TierStats { original: 1, ..TierStats::default() });
    }

    #[tokio::test]
    async fn test_failed_node_keeps_source_beside_translated_siblings() {
        let mut backend = MockTranslationBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_model().returning(|| "mock-model".to_string());
        backend.expect_translate().returning(|text, _, _, format| match format {
            TextFormat::Html => Err(H5pError::Translation("no html".to_string())),
            TextFormat::Plain if text == "Gloves" => Err(H5pError::Translation("timeout".to_string())),
            TextFormat::Plain => Ok(text.to_uppercase()),
        });

        let mut engine = engine_with(backend, 400);
        let result = engine.translate_value("<p>Goggles <b>Gloves</b></p>").await;

        assert_eq!(result.text, "<p>GOGGLES <b>Gloves</b></p>");
        assert_eq!(result.stats, TierStats { whole: 0, chunked: 1, original: 1 });
    }

    #[tokio::test]
    async fn test_dense_script_translation_is_not_truncated() {
        let mut backend = MockTranslationBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_model().returning(|| "mock-model".to_string());
        backend
            .expect_translate()
            .returning(|_, _, _, _| Ok("务必在实验室佩戴护目镜。".to_string()));

        let mut config = Config::default();
        config.translate.target_language = "zh".to_string();
        let mut engine = TranslationEngine::new(
            Box::new(backend),
            None,
            &config.translate,
            config.chunking.clone(),
        );
        let result = engine
            .translate_value("Always wear safety goggles in the laboratory.")
            .await;

        assert_eq!(result.text, "务必在实验室佩戴护目镜。");
        assert_eq!(result.stats, TierStats { whole: 1, ..TierStats::default() });
    }

    #[tokio::test]
    async fn test_preformatted_block_is_left_alone() {
        let mut engine = engine_with(mock_backend(|t| Ok(t.replace("Run this", "Führe aus"))), 400);
        let result = engine.translate_value("<p>Run this</p><pre>rm -rf build</pre>").await;

        assert_eq!(result.text, "<p>Führe aus</p><pre>rm -rf build</pre>");
        assert_eq!(engine.model_calls(), 1);
    }

    #[test]
    fn test_raw_depth_matches_whole_tag_names() {
        assert_eq!(adjust_raw_depth(0, "<codeblock>"), 0);
        assert_eq!(adjust_raw_depth(0, "<styled-x class=\"a\">"), 0);
        assert_eq!(adjust_raw_depth(0, "<code class=\"sh\">"), 1);
        assert_eq!(adjust_raw_depth(1, "</code>"), 0);
        assert_eq!(adjust_raw_depth(0, "<PRE>"), 1);
        assert_eq!(adjust_raw_depth(0, "<kbd/>"), 0);
        assert_eq!(adjust_raw_depth(0, "<!-- code -->"), 0);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("  short ", 10), "short");
        assert_eq!(preview("Ünïcödé text", 5), "Ünïcö...");
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
    }
}
