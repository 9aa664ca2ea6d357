//! H5P Translator
//!
//! Entry point of the command-line tool: parses arguments, sets up logging,
//! loads the configuration and dispatches to the workflow.

use std::path::{Path, PathBuf};
use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use h5p_translator::cli::{Args, CacheAction, Commands, ConfigAction};
use h5p_translator::config::Config;
use h5p_translator::error::H5pError;
use h5p_translator::report::format_duration;
use h5p_translator::translate::cache::DEFAULT_CACHE_DIR;
use h5p_translator::translate::engine::preview;
use h5p_translator::translate::TranslationCache;
use h5p_translator::workflow::{TranslateOptions, Workflow};

const DEFAULT_CONFIG_FILE: &str = "h5p-translator.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging to both console and file
    let _guard = setup_logging(args.verbose)?;
    info!("Starting H5P Translator");

    let mut config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Translate { input, output, force, export_raw, overrides } => {
            overrides.apply(&mut config)?;
            let mut workflow = Workflow::new(config)?;
            workflow.check_backend().await?;

            let options = TranslateOptions {
                output,
                overwrite: force,
                export_raw,
            };
            let report = workflow.translate_package(&input, &options).await?;
            println!("{}", report.render());
        }
        Commands::Batch { input_dir, output_dir, force, overrides } => {
            overrides.apply(&mut config)?;
            let mut workflow = Workflow::new(config)?;
            workflow.check_backend().await?;

            let summary = workflow
                .translate_directory(&input_dir, output_dir.as_deref(), force)
                .await?;
            println!("{}", summary.render());
            if !summary.failures.is_empty() {
                anyhow::bail!("{} package(s) failed to translate", summary.failures.len());
            }
        }
        Commands::Inspect { input } => {
            let workflow = Workflow::new(config)?;
            let fields = workflow.inspect(&input)?;

            if fields.is_empty() {
                println!("No translatable fields found.");
            } else {
                println!("\nTranslatable Fields in {}:", input.display());
                println!("{:<60} {:<60}", "Path", "Text");
                println!("{}", "-".repeat(120));
                for field in &fields {
                    println!("{:<60} {:<60}", field.path, preview(&field.text, 57));
                }
                println!("\n{} fields", fields.len());
            }
        }
        Commands::Check { overrides } => {
            overrides.apply(&mut config)?;
            let workflow = Workflow::new(config)?;
            workflow.check_backend().await?;
            println!("Backend is available");
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { output, force } => {
                if output.exists() && !force {
                    return Err(H5pError::OutputExists(output.display().to_string()).into());
                }
                Config::default().save_to_file(&output)?;
                println!("Wrote default configuration to {}", output.display());
            }
            ConfigAction::Show => {
                let rendered = toml::to_string_pretty(&config)
                    .map_err(|e| H5pError::Config(format!("Failed to serialize config: {}", e)))?;
                println!("{}", rendered);
            }
        },
        Commands::Cache { action } => {
            let cache = TranslationCache::new(DEFAULT_CACHE_DIR);
            match action {
                CacheAction::List => {
                    let items = cache.list().await?;
                    if items.is_empty() {
                        println!("No cached translations found.");
                    } else {
                        println!("\nCached Translations:");
                        println!("{:<16} {:<8} {:<15} {:<50}", "Model", "Pair", "Cached", "Source Text");
                        println!("{}", "-".repeat(90));
                        for item in items {
                            let age = chrono::Utc::now().signed_duration_since(item.cached_at);
                            println!(
                                "{:<16} {:<8} {:<15} {:<50}",
                                item.model,
                                format!("{}-{}", item.source_language, item.target_language),
                                format_duration(age.to_std().unwrap_or_default()),
                                preview(&item.source_text, 47)
                            );
                        }
                    }
                }
                CacheAction::Clear => {
                    let count = cache.clear().await?;
                    println!("Cleared {} cached translations", count);
                }
                CacheAction::Info => {
                    let info = cache.info().await?;
                    println!("\nCache Statistics:");
                    println!("Location: {}", cache.dir().display());
                    println!("Translation entries: {}", info.entries);
                    println!("Total size: {:.2} MB", info.total_size as f64 / 1024.0 / 1024.0);
                    if let Some(oldest) = info.oldest_entry {
                        println!("Oldest entry: {}", oldest.format("%Y-%m-%d %H:%M"));
                    }
                    if let Some(newest) = info.newest_entry {
                        println!("Newest entry: {}", newest.format("%Y-%m-%d %H:%M"));
                    }
                }
                CacheAction::Clean { days } => {
                    let count = cache.clean_older_than(days).await?;
                    println!("Removed {} cached translations older than {} days", count, days);
                }
            }
        }
    }

    info!("H5P Translator finished");
    Ok(())
}

/// Load the configuration from `--config`, ./h5p-translator.toml, or defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
                Config::from_file(DEFAULT_CONFIG_FILE)?
            } else {
                Config::default()
            }
        }
    };
    Ok(config)
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir: PathBuf = std::env::current_dir()?.join(".h5p-translator").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "h5p-translator.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("h5p-translator.log").display());

    Ok(guard)
}
