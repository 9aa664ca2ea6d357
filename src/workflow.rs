use std::path::{Path, PathBuf};
use std::time::Instant;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Result, H5pError};
use crate::h5p::{apply_translations, select_fields, H5pPackage, TranslatableField};
use crate::language::validate_language;
use crate::report::{BatchSummary, TranslationReport};
use crate::translate::engine::preview;
use crate::translate::cache::DEFAULT_CACHE_DIR;
use crate::translate::{BackendFactory, TierStats, TranslationBackend, TranslationCache, TranslationEngine};

/// Suffix added to translated package names
pub const OUTPUT_SUFFIX: &str = "_translated";

/// Per-package options from the command line
#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    /// Output file; defaults to `<stem>_translated.h5p` beside the input
    pub output: Option<PathBuf>,
    /// Replace an existing output file
    pub overwrite: bool,
    /// Also extract the translated package into this directory
    pub export_raw: Option<PathBuf>,
}

pub struct Workflow {
    config: Config,
    engine: TranslationEngine,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let backend = BackendFactory::create(&config.translate)?;
        let cache = config
            .translate
            .use_cache
            .then(|| TranslationCache::new(DEFAULT_CACHE_DIR));
        Self::with_parts(config, backend, cache)
    }

    /// Build a workflow around an already constructed backend and cache
    pub fn with_parts(
        mut config: Config,
        backend: Box<dyn TranslationBackend>,
        cache: Option<TranslationCache>,
    ) -> Result<Self> {
        config.validate()?;
        config.translate.source_language = validate_language(&config.translate.source_language)?;
        config.translate.target_language = validate_language(&config.translate.target_language)?;
        if config.translate.source_language == config.translate.target_language {
            return Err(H5pError::Config(format!(
                "Source and target language are both '{}'",
                config.translate.source_language
            )));
        }

        let engine = TranslationEngine::new(backend, cache, &config.translate, config.chunking.clone());
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Make sure the backend is up before any package is touched
    pub async fn check_backend(&self) -> Result<()> {
        let backend = self.engine.backend();
        info!("Checking {} backend (model: {})", backend.name(), backend.model());
        backend
            .check_availability(self.engine.source_language(), self.engine.target_language())
            .await
    }

    /// List the fields a translation run would send to the model
    pub fn inspect<P: AsRef<Path>>(&self, input: P) -> Result<Vec<TranslatableField>> {
        let package = H5pPackage::open(input, &self.config.package.content_path)?;
        let content = package.content_json()?;
        Ok(select_fields(&content, &self.config.fields))
    }

    /// Translate one package and write the result
    pub async fn translate_package<P: AsRef<Path>>(
        &mut self,
        input: P,
        options: &TranslateOptions,
    ) -> Result<TranslationReport> {
        let started = Instant::now();
        let input = input.as_ref();
        info!("Translating file: {}", input.display());

        if !input.exists() {
            return Err(H5pError::FileNotFound(input.display().to_string()));
        }
        if !has_h5p_extension(input) {
            return Err(H5pError::Package(format!(
                "{} is not an .h5p file",
                input.display()
            )));
        }

        let output = options
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(input));
        if output == input {
            return Err(H5pError::Config("Output would overwrite the input package".to_string()));
        }
        if output.exists() && !options.overwrite {
            return Err(H5pError::OutputExists(output.display().to_string()));
        }

        let mut package = H5pPackage::open(input, &self.config.package.content_path)?;
        let mut content = package.content_json()?;
        let fields = select_fields(&content, &self.config.fields);
        info!("Found {} translatable fields", fields.len());

        let calls_before = self.engine.model_calls();
        let progress = progress_bar(fields.len() as u64);
        let mut updates = Vec::new();
        let mut tiers = TierStats::default();

        for field in &fields {
            progress.set_message(field.path.clone());
            let translated = self.engine.translate_value(&field.text).await;
            tiers += translated.stats;

            if translated.text != field.text {
                info!("{}: {} → {}", field.path, preview(&field.text, 80), preview(&translated.text, 80));
                updates.push((field.pointer.clone(), translated.text));
            } else {
                warn!("{}: left unchanged", field.path);
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        apply_translations(&mut content, &updates)?;
        package.set_content_json(&content, self.config.package.pretty_json)?;

        if self.config.package.update_metadata {
            self.update_manifest(&mut package).await?;
        }

        package.write(&output)?;
        if let Some(dir) = &options.export_raw {
            package.export_raw(dir)?;
        }

        info!("[OK] Translated and saved: {}", output.display());

        Ok(TranslationReport {
            input: input.to_path_buf(),
            output,
            source_language: self.engine.source_language().to_string(),
            target_language: self.engine.target_language().to_string(),
            fields_total: fields.len(),
            fields_translated: updates.len(),
            fields_unchanged: fields.len() - updates.len(),
            tiers,
            model_calls: self.engine.model_calls() - calls_before,
            duration: started.elapsed(),
        })
    }

    /// Translate the h5p.json title and record the new language
    async fn update_manifest(&mut self, package: &mut H5pPackage) -> Result<()> {
        let Some(mut manifest) = package.manifest()? else {
            return Ok(());
        };
        let Value::Object(map) = &mut manifest else {
            return Err(H5pError::Package("h5p.json is not an object".to_string()));
        };

        if let Some(Value::String(title)) = map.get("title") {
            let translated = self.engine.translate_plain(title).await;
            map.insert("title".to_string(), Value::String(translated.text));
        }
        map.insert(
            "language".to_string(),
            Value::String(self.engine.target_language().to_string()),
        );

        package.set_manifest(&manifest)
    }

    /// Translate every .h5p file below a directory
    pub async fn translate_directory<P: AsRef<Path>>(
        &mut self,
        input_dir: P,
        output_dir: Option<&Path>,
        overwrite: bool,
    ) -> Result<BatchSummary> {
        let input_dir = input_dir.as_ref();
        info!("Processing directory: {}", input_dir.display());

        if !input_dir.is_dir() {
            return Err(H5pError::Config(format!(
                "{} is not a directory",
                input_dir.display()
            )));
        }

        let mut summary = BatchSummary::default();
        let mut packages = Vec::new();

        for entry in WalkDir::new(input_dir).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || !has_h5p_extension(path) {
                continue;
            }
            if is_translated_output(path) {
                summary.skipped.push(path.to_path_buf());
                continue;
            }
            packages.push(path.to_path_buf());
        }

        info!("Found {} H5P packages to translate", packages.len());

        for package in packages {
            let output = match output_dir {
                Some(dir) => {
                    let relative = pathdiff::diff_paths(&package, input_dir)
                        .unwrap_or_else(|| PathBuf::from(package.file_name().unwrap_or_default()));
                    default_output_path(&dir.join(relative))
                }
                None => default_output_path(&package),
            };
            let options = TranslateOptions {
                output: Some(output),
                overwrite,
                export_raw: None,
            };

            match self.translate_package(&package, &options).await {
                Ok(report) => {
                    info!("Successfully translated: {}", package.display());
                    summary.reports.push(report);
                }
                Err(e) => {
                    warn!("Failed to translate {}: {}", package.display(), e);
                    summary.failures.push((package, e.to_string()));
                }
            }
        }

        Ok(summary)
    }
}

/// `<dir>/<stem>_translated.h5p`
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());
    input.with_file_name(format!("{}{}.h5p", stem, OUTPUT_SUFFIX))
}

fn has_h5p_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("h5p"))
}

fn is_translated_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.ends_with(OUTPUT_SUFFIX))
}

fn progress_bar(len: u64) -> ProgressBar {
    let progress = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
    {
        progress.set_style(style.progress_chars("=>-"));
    }
    progress
}
