//! Formatted output helpers for CLI commands.
//!
//! Status lines go to stderr so stdout stays free for machine-readable
//! output such as `fx init --json`.

use std::time::Duration;

use fx_runtime::{ManagedContainer, PullOutcome, PullReport};

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const CYAN: &str = "\x1b[36m";
pub const RESET: &str = "\x1b[0m";

/// Prints a line prefixed with a green check.
pub fn success(message: &str) {
    eprintln!("  {GREEN}✓{RESET} {message}");
}

/// Prints a line prefixed with a red cross.
pub fn failure(message: &str) {
    eprintln!("  {RED}✗{RESET} {message}");
}

/// Prints one line per pulled reference followed by a summary.
pub fn print_pull_report(report: &PullReport) {
    for (reference, outcome) in report.outcomes() {
        match outcome {
            PullOutcome::Pulled => success(&format!("pulled {reference}")),
            PullOutcome::Failed { message } => {
                failure(&format!("{reference} {DIM}{message}{RESET}"));
            }
        }
    }
    eprintln!();
    eprintln!(
        "  {BOLD}{}/{}{RESET} base images pulled",
        report.pulled(),
        report.len()
    );
}

/// Prints where a freshly deployed container can be reached.
pub fn print_container(container: &ManagedContainer) {
    let image = container.image().unwrap_or("-");
    eprintln!();
    eprintln!(
        "  {GREEN}●{RESET} {BOLD}{image}{RESET} {DIM}[{}]{RESET}",
        container.id().short()
    );
    if let Some(binding) = container.binding() {
        eprintln!("    {DIM}{binding}{RESET}");
        eprintln!(
            "  {CYAN}Access at:{RESET} {BOLD}http://localhost:{}{RESET}",
            binding.host_port
        );
    }
}

/// Formats a duration as seconds with one decimal (e.g., "2.5s").
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_rounds_to_tenths() {
        assert_eq!(format_duration(Duration::from_millis(2540)), "2.5s");
    }

    #[test]
    fn format_duration_handles_zero() {
        assert_eq!(format_duration(Duration::ZERO), "0.0s");
    }
}
