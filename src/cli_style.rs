/*!
 * CLI output styling
 *
 * Themed text, status icons and the console [`SuiteReporter`], which shows a
 * spinner while a case runs and prints one line per finished case.
 */

use std::time::Duration;

use console::{style, StyledObject, Term};
use indicatif::{ProgressBar, ProgressStyle};

use crate::probe::{Case, CaseResult};
use crate::suite::{SuiteReport, SuiteReporter};
use crate::units::format_duration;

/// Anomalies listed per case before the rest are summarized
const MAX_LISTED_ANOMALIES: usize = 10;

/// Colors used for case outcomes
pub struct Theme;

impl Theme {
    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    /// Secondary detail: domains, timings, anomaly lines
    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }
}

/// Status markers at the start of each result line
pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const SKIPPED: &'static str = "○";
    pub const ARROW_RIGHT: &'static str = "→";
    pub const BULLET: &'static str = "•";
}

/// Print a styled error message with an optional hint
pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!(
        "\n{} {}",
        Theme::error(format!("{} Error:", Icons::ERROR)),
        message
    );

    if let Some(hint) = suggestion {
        eprintln!(
            "  {} {}",
            Theme::muted(Icons::ARROW_RIGHT),
            Theme::muted(hint)
        );
    }
}

/// Print a styled warning message
pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

/// Print a styled success message
pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        message
    );
}

/// Progress on the terminal: a spinner per running case, a line per result
pub struct ConsoleReporter {
    spinner: Option<ProgressBar>,
    show_spinner: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            spinner: None,
            show_spinner: Term::stdout().is_term(),
        }
    }

    fn start_spinner(&mut self, message: String) {
        let spinner = if self.show_spinner {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner
        } else {
            ProgressBar::hidden()
        };
        spinner.set_message(message);
        self.spinner = Some(spinner);
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn position(index: usize, total: usize) -> String {
    let width = total.to_string().len();
    format!("[{:>width$}/{}]", index + 1, total, width = width)
}

impl SuiteReporter for ConsoleReporter {
    fn dry_run(&mut self, index: usize, total: usize, case: &dyn Case) {
        println!(
            "{} {} {}",
            Theme::muted(position(index, total)),
            case.name(),
            Theme::muted(format!("({}, {})", case.strategy(), case.domain()))
        );
    }

    fn connection_check(&mut self) {
        println!("Checking server connection…");
    }

    fn suite_started(&mut self, total: usize) {
        println!("Starting test suite ({} cases)…\n", total);
    }

    fn case_started(&mut self, index: usize, total: usize, case: &dyn Case) {
        self.start_spinner(format!("{} {}", position(index, total), case.name()));
    }

    fn case_finished(&mut self, index: usize, total: usize, result: &CaseResult) {
        self.stop_spinner();

        let icon = if result.abandoned {
            Theme::warning(Icons::SKIPPED)
        } else if result.success {
            Theme::success(Icons::SUCCESS)
        } else {
            Theme::error(Icons::ERROR)
        };
        println!(
            "{} {} {}: {} {}",
            icon,
            Theme::muted(position(index, total)),
            result.name,
            result.summary,
            Theme::muted(format!("({})", format_duration(result.elapsed)))
        );

        for anomaly in result.anomalies.iter().take(MAX_LISTED_ANOMALIES) {
            println!("    {} {}", Theme::muted(Icons::BULLET), anomaly.pretty());
        }
        if result.anomalies.len() > MAX_LISTED_ANOMALIES {
            println!(
                "    {} …and {} more",
                Theme::muted(Icons::BULLET),
                result.anomalies.len() - MAX_LISTED_ANOMALIES
            );
        }
        for orphan in &result.orphans {
            println!("    {} left in bucket: {}", Theme::warning(Icons::WARNING), orphan);
        }
    }

    fn suite_finished(&mut self, report: &SuiteReport) {
        self.stop_spinner();
        if report.dry_run {
            return;
        }

        println!(
            "\n{} passed, {} failed",
            Theme::success(report.passed()),
            if report.failed() > 0 {
                Theme::error(report.failed())
            } else {
                Theme::muted(report.failed())
            }
        );
        if let Some(name) = &report.aborted {
            print_error(&format!("Suite aborted during {}", name), None);
        }
        if !report.skipped.is_empty() {
            let reason = if report.aborted.is_some() { "Aborted" } else { "Cancelled" };
            print_warning(&format!("{}; {} cases not run", reason, report.skipped.len()));
            for name in &report.skipped {
                println!("    {} {}", Theme::muted(Icons::SKIPPED), name);
            }
        }

        let orphans: Vec<_> = report.orphans().collect();
        if !orphans.is_empty() {
            print_warning(&format!("{} objects were left in the bucket:", orphans.len()));
            for key in orphans {
                println!("    {} {}", Theme::muted(Icons::BULLET), key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_is_padded() {
        assert_eq!(position(0, 9), "[1/9]");
        assert_eq!(position(4, 120), "[  5/120]");
    }
}
