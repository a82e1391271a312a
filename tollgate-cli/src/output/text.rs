//! Text output formatting with colors.

use serde_json::Value;
use tollgate_core::FetchMetrics;
use tollgate_fetch::Completion;

use super::json::{CacheOutput, SearchOutput};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// One record per line, as compact JSON.
    pub fn format_record(&self, record: &Value) -> String {
        record.to_string()
    }

    /// Records followed by a summary.
    pub fn format_search(&self, output: &SearchOutput) -> String {
        let mut lines: Vec<String> = output
            .records
            .iter()
            .map(|r| self.format_record(r))
            .collect();
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(self.format_summary(output));
        lines.join("\n")
    }

    /// Summary block: status line, metrics, and a resume hint if needed.
    pub fn format_summary(&self, output: &SearchOutput) -> String {
        let status = match (&output.completion, &output.error) {
            (_, Some(error)) => self.red(&format!("stopped: {error}")),
            (Some(Completion::Exhausted), _) => self.green("complete"),
            (Some(Completion::Capped), _) => self.green("limit reached"),
            (Some(Completion::Cancelled { .. }), _) => self.yellow("cancelled"),
            (None, None) => self.dim("unknown"),
        };

        let mut lines = vec![format!(
            "{} for {} ({})",
            self.bold(&format!("{} records", output.count)),
            self.cyan(&output.query),
            status
        )];
        lines.push(self.format_metrics(&output.metrics));

        if let Some(index) = output.resume_index {
            lines.push(format!(
                "Resume with {}",
                self.bold(&format!("--offset {index}"))
            ));
        }
        lines.join("\n")
    }

    /// One-line metrics summary.
    pub fn format_metrics(&self, metrics: &FetchMetrics) -> String {
        self.dim(&format!(
            "pages {} · retries {} · tokens {} · reauth {} · 429s {} · duplicates {}",
            metrics.pages_fetched,
            metrics.retries,
            metrics.tokens_acquired,
            metrics.reauthorizations,
            metrics.rate_limit_hits,
            metrics.duplicates_dropped,
        ))
    }

    /// Cached token status.
    pub fn format_cache(&self, output: &CacheOutput) -> String {
        let mut lines = vec![
            format!("Key:      {}", self.cyan(&output.key)),
            format!("Backend:  {}", output.backend),
        ];

        if !output.present {
            lines.push(format!("Status:   {}", self.yellow("no fresh token")));
            return lines.join("\n");
        }

        lines.push(format!("Status:   {}", self.green("fresh")));
        if let Some(source) = &output.source {
            lines.push(format!("Source:   {source}"));
        }
        if let Some(at) = output.acquired_at {
            lines.push(format!("Acquired: {}", at.format("%Y-%m-%d %H:%M:%S UTC")));
        }
        if let Some(secs) = output.remaining_secs {
            lines.push(format!(
                "Expires:  in {}",
                self.dim(&format_remaining(secs))
            ));
        }
        lines.push(format!("Cookies:  {}", output.cookies.join(", ")));
        lines.join("\n")
    }

    // ========================================================================
    // Color helpers
    // ========================================================================

    fn paint(&self, code: &str, text: &str) -> String {
        if self.use_colors {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}

/// "5h 12m", "12m", or "40s".
pub fn format_remaining(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{secs}s")
    }
}
