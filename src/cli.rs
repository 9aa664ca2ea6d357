use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{BackendKind, Config};
use crate::error::Result;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings that override the configuration file for one run
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TranslationOverrides {
    /// Source language code (e.g. en)
    #[arg(short, long)]
    pub source_lang: Option<String>,

    /// Target language code (e.g. de)
    #[arg(short, long)]
    pub target_lang: Option<String>,

    /// Translation backend: libretranslate or ollama
    #[arg(long)]
    pub backend: Option<String>,

    /// Backend endpoint URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Model name passed to the backend
    #[arg(long)]
    pub model: Option<String>,

    /// Do not read or write the translation cache
    #[arg(long)]
    pub no_cache: bool,
}

impl TranslationOverrides {
    /// Apply the command-line values on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(source) = &self.source_lang {
            config.translate.source_language = source.clone();
        }
        if let Some(target) = &self.target_lang {
            config.translate.target_language = target.clone();
        }
        if let Some(backend) = &self.backend {
            config.translate.backend = BackendKind::parse(backend)?;
        }
        if let Some(endpoint) = &self.endpoint {
            config.translate.endpoint = endpoint.clone();
        }
        if let Some(model) = &self.model {
            config.translate.model = model.clone();
        }
        if self.no_cache {
            config.translate.use_cache = false;
        }
        Ok(())
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate a single H5P package
    Translate {
        /// Input .h5p file
        #[arg(short, long)]
        input: PathBuf,

        /// Output .h5p file (default: <input>_translated.h5p)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite the output file if it exists
        #[arg(short, long)]
        force: bool,

        /// Also extract the translated package into this directory for debugging
        #[arg(long)]
        export_raw: Option<PathBuf>,

        #[command(flatten)]
        overrides: TranslationOverrides,
    },

    /// Translate all H5P packages in a directory
    Batch {
        /// Input directory containing .h5p files
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Output directory (default: next to each input)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Overwrite existing outputs
        #[arg(short, long)]
        force: bool,

        #[command(flatten)]
        overrides: TranslationOverrides,
    },

    /// List the fields that would be translated, without calling the model
    Inspect {
        /// Input .h5p file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Check that the translation backend is reachable
    Check {
        #[command(flatten)]
        overrides: TranslationOverrides,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Manage the translation cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a configuration file with default settings
    Init {
        /// Destination file
        #[arg(short, long, default_value = "h5p-translator.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// List cached translations
    List,

    /// Clear all cached translations
    Clear,

    /// Show cache statistics and size
    Info,

    /// Clear cache entries older than specified days
    Clean {
        /// Age in days (default: 30)
        #[arg(short, long, default_value = "30")]
        days: u64,
    },
}
