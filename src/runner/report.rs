use std::{fs, path::Path};

use anyhow::{Context, Result};
use colored::{Color, Colorize};

use super::models::{relative_to, ExecutionResult, Outcome, RunReport, RunSummary};

fn outcome_color(outcome: Outcome) -> Color {
    match outcome {
        Outcome::Success => Color::Green,
        Outcome::Warning => Color::Yellow,
        Outcome::Failure => Color::Red,
    }
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => "PASS",
        Outcome::Warning => "WARN",
        Outcome::Failure => "FAIL",
    }
}

pub fn print_execution_result(result: &ExecutionResult, root: &Path) {
    let color = outcome_color(result.outcome);
    let path = relative_to(&result.path, root);

    println!(
        "{} {}",
        outcome_label(result.outcome).color(color).bold(),
        path.display().to_string().bold()
    );

    if let (Some(method), Some(url)) = (&result.method, &result.url) {
        println!("  {} {}", method.bold(), url.cyan());
    }

    if result.dispatched {
        println!(
            "  {} {} {}",
            "Status:".bold(),
            result.status.to_string().color(color),
            format!("({:.1} ms)", result.duration_ms).dimmed()
        );
    }

    if let Some(error) = &result.error {
        println!("  {} {}", "Error:".bold(), error.message().red());
    }

    for assertion in &result.assertions {
        let mark = if assertion.passed {
            "✓".green()
        } else {
            "✗".red()
        };
        match &assertion.message {
            Some(message) if !assertion.passed => {
                println!("  {} {} {}", mark, assertion.name, message.dimmed())
            }
            _ => println!("  {} {}", mark, assertion.name),
        }
    }

    for hook in &result.hook_errors {
        println!(
            "  {} {}",
            format!("{} hook:", hook.stage).bold(),
            hook.message.red()
        );
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "Summary".bold());
    println!(
        "  {} total, {} passed, {} warnings, {} failed",
        summary.total,
        summary.success.to_string().green(),
        summary.warning.to_string().yellow(),
        summary.failure.to_string().red()
    );
    if summary.assertions_passed + summary.assertions_failed > 0 {
        println!(
            "  {} assertions passed, {} failed",
            summary.assertions_passed.to_string().green(),
            summary.assertions_failed.to_string().red()
        );
    }
    if !summary.failed_requests.is_empty() {
        println!("{}", "Failed requests".bold());
        for path in &summary.failed_requests {
            println!("  {}", path.display().to_string().red());
        }
    }
}

pub fn print_report(report: &RunReport) {
    for result in &report.results {
        print_execution_result(result, &report.root);
    }
    for hook in &report.collection_hook_errors {
        println!(
            "{} {}",
            format!("{} hook:", hook.stage).bold(),
            hook.message.red()
        );
    }
    print_summary(&report.summary);
}

/// Writes the report as pretty JSON, creating parent directories.
pub fn write_json_report(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("serializing run report")?;
    fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))
}
