use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use crate::translate::TierStats;

/// Outcome of translating one package
#[derive(Debug, Clone)]
pub struct TranslationReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub source_language: String,
    pub target_language: String,
    /// Strings selected for translation
    pub fields_total: usize,
    /// Fields whose text changed
    pub fields_translated: usize,
    /// Fields left exactly as they were
    pub fields_unchanged: usize,
    pub tiers: TierStats,
    pub model_calls: usize,
    pub duration: Duration,
}

impl TranslationReport {
    /// Summary table printed after a run
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\nTranslation Summary ({} -> {}):", self.source_language, self.target_language);
        let _ = writeln!(out, "{}", "-".repeat(50));
        let _ = writeln!(out, "{:<28} {}", "Input", self.input.display());
        let _ = writeln!(out, "{:<28} {}", "Output", self.output.display());
        let _ = writeln!(out, "{:<28} {}", "Fields selected", self.fields_total);
        let _ = writeln!(out, "{:<28} {}", "Fields translated", self.fields_translated);
        let _ = writeln!(out, "{:<28} {}", "Fields unchanged", self.fields_unchanged);
        let _ = writeln!(out, "{:<28} {}", "Pieces in one call", self.tiers.whole);
        let _ = writeln!(out, "{:<28} {}", "Pieces chunked", self.tiers.chunked);
        let _ = writeln!(out, "{:<28} {}", "Pieces kept original", self.tiers.original);
        let _ = writeln!(out, "{:<28} {}", "Model calls", self.model_calls);
        let _ = writeln!(out, "{:<28} {}", "Duration", format_duration(self.duration));
        out
    }
}

/// Outcome of a directory run
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub reports: Vec<TranslationReport>,
    pub failures: Vec<(PathBuf, String)>,
    /// Files skipped because they are outputs of an earlier run
    pub skipped: Vec<PathBuf>,
}

impl BatchSummary {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\nBatch Summary:");
        let _ = writeln!(out, "{}", "-".repeat(50));
        let _ = writeln!(out, "{:<28} {}", "Packages translated", self.reports.len());
        let _ = writeln!(out, "{:<28} {}", "Packages failed", self.failures.len());
        let _ = writeln!(out, "{:<28} {}", "Packages skipped", self.skipped.len());
        for (path, error) in &self.failures {
            let _ = writeln!(out, "  FAILED {}: {}", path.display(), error);
        }
        out
    }
}

/// Format a duration to a human-readable string
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
