//! Terminal rendering of run summaries and reports

use colored::*;

use ragprobe_eval::{GenerationReport, RetrievalReport, Unevaluable};
use ragprobe_synth::{SynthesisOutcome, ValidationReport};

fn header(title: &str) -> String {
    format!("{}\n{}", title.blue().bold(), "─".repeat(title.chars().count()).blue())
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn unevaluable_lines(items: &[Unevaluable], out: &mut Vec<String>) {
    if items.is_empty() {
        return;
    }
    out.push(format!("{} {}", "Unevaluable:".yellow().bold(), items.len()));
    for item in items {
        out.push(format!("  {} {}", item.record_id.yellow(), item.reason.dimmed()));
    }
}

fn cancelled_line(cancelled: bool, discarded: usize, out: &mut Vec<String>) {
    if cancelled {
        out.push(format!(
            "{} {} in-flight record(s) discarded; totals cover completed records only",
            "Cancelled:".red().bold(),
            discarded
        ));
    }
}

pub fn format_synthesis(outcome: &SynthesisOutcome) -> String {
    let grounded = outcome.records.grounded().count();
    let mut out = vec![
        header("Synthesis"),
        format!(
            "Records: {} ({} grounded, {} not grounded)",
            outcome.records.len().to_string().green().bold(),
            grounded,
            outcome.records.len() - grounded
        ),
    ];
    if !outcome.failures.is_empty() {
        out.push(format!("{} {}", "Failed:".yellow().bold(), outcome.failures.len()));
        for failure in &outcome.failures {
            out.push(format!("  {} {}", failure.anchor_chunk_id.yellow(), failure.error.dimmed()));
        }
    }
    cancelled_line(outcome.cancelled, outcome.discarded, &mut out);
    out.join("\n")
}

pub fn format_validation(report: &ValidationReport) -> String {
    let mut out = vec![header("Dataset validation"), format!("Records: {}", report.total)];
    for check in &report.checks {
        let status = if check.passed { "PASS".green().bold() } else { "FAIL".red().bold() };
        let offending = if check.offending.is_empty() {
            String::new()
        } else {
            format!(" ({} record(s))", check.offending.len())
        };
        out.push(format!("  {} {}{}", status, check.name, offending.dimmed()));
    }
    for warning in &report.warnings {
        let subject = warning.record_id().unwrap_or("dataset");
        out.push(format!("  {} {}: {}", "warning".yellow(), subject, warning.describe()));
    }
    let verdict = if report.passed() { "passed".green().bold() } else { "failed".red().bold() };
    out.push(format!("Validation {}", verdict));
    out.join("\n")
}

pub fn format_retrieval(report: &RetrievalReport) -> String {
    let mut out = vec![
        header("Retrieval"),
        format!("Evaluated: {} grounded record(s)", report.evaluated),
        format!("Hit Rate@{}: {}", report.k, percent(report.hit_rate).green().bold()),
        format!("MRR: {}", format!("{:.3}", report.mrr).green().bold()),
    ];
    if report.skipped_ungrounded > 0 {
        out.push(format!("Skipped (not grounded): {}", report.skipped_ungrounded).dimmed().to_string());
    }
    unevaluable_lines(&report.unevaluable, &mut out);
    cancelled_line(report.cancelled, report.discarded, &mut out);
    out.join("\n")
}

pub fn format_generation(report: &GenerationReport) -> String {
    let mut out = vec![
        header("Generation"),
        format!(
            "Grounded: {} evaluated, mean score {:.2}",
            report.grounded.evaluated, report.grounded.mean_score
        ),
        format!(
            "Not grounded: {} evaluated, mean score {:.2}",
            report.not_grounded.evaluated, report.not_grounded.mean_score
        ),
        format!(
            "Hallucination rate: {} ({} record(s))",
            percent(report.hallucination_rate).red().bold(),
            report.hallucinations
        ),
        format!("Good abstentions: {}", report.good_abstentions),
        format!("False abstentions: {}", report.false_abstentions),
        format!("Unsupported answers: {}", report.unsupported_answers),
    ];
    unevaluable_lines(&report.unevaluable, &mut out);
    cancelled_line(report.cancelled, report.discarded, &mut out);
    out.join("\n")
}

pub fn print_synthesis(outcome: &SynthesisOutcome) {
    println!("{}\n", format_synthesis(outcome));
}

pub fn print_validation(report: &ValidationReport) {
    println!("{}\n", format_validation(report));
}

pub fn print_retrieval(report: &RetrievalReport) {
    println!("{}\n", format_retrieval(report));
}

pub fn print_generation(report: &GenerationReport) {
    println!("{}\n", format_generation(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragprobe_eval::RecordRetrieval;

    #[test]
    fn test_retrieval_lines() {
        colored::control::set_override(false);
        let mut report = RetrievalReport::from_records(
            5,
            vec![RecordRetrieval {
                record_id: "a".to_string(),
                retrieved: vec!["7".to_string(), "3".to_string()],
                hit: true,
                reciprocal_rank: 0.5,
                first_hit_rank: Some(2),
            }],
            vec![Unevaluable::new("b", "Search error: timeout")],
        );
        report.skipped_ungrounded = 3;

        let text = format_retrieval(&report);
        assert!(text.contains("Hit Rate@5: 100.0%"));
        assert!(text.contains("MRR: 0.500"));
        assert!(text.contains("Skipped (not grounded): 3"));
        assert!(text.contains("  b Search error: timeout"));
        assert!(!text.contains("Cancelled"));
    }

    #[test]
    fn test_generation_lines_on_cancel() {
        colored::control::set_override(false);
        let mut report = GenerationReport::from_records(Vec::new(), Vec::new());
        report.cancelled = true;
        report.discarded = 4;

        let text = format_generation(&report);
        assert!(text.contains("Hallucination rate: 0.0% (0 record(s))"));
        assert!(text.contains("Cancelled: 4 in-flight record(s) discarded"));
    }
}
