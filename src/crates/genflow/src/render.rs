//! Console rendering of workflow notifications

use clap::ValueEnum;
use colored::Colorize;
use genflow_core::cache::CacheRecord;
use genflow_core::stream::{WorkflowEvent, WorkflowOutcome};

/// How `genflow run` prints its progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per notification
    Json,
}

/// Render one notification as a single line.
pub fn render_event(event: &WorkflowEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
        }
        OutputFormat::Text => render_text(event),
    }
}

fn render_text(event: &WorkflowEvent) -> String {
    match event {
        WorkflowEvent::Started { run_id, topic } => {
            format!("{} {} {}", "▶".cyan(), topic.bold(), format!("({})", run_id).dimmed())
        }
        WorkflowEvent::CacheHit { .. } => format!("  {} cached result found", "✓".green()),
        WorkflowEvent::CacheMiss { .. } => format!("  {} no cached result", "·".dimmed()),
        WorkflowEvent::AttemptStarted { attempt, max_attempts } => {
            format!("  {} attempt {}/{}", "→".cyan(), attempt, max_attempts)
        }
        WorkflowEvent::AttemptRejected { attempt, reason } => {
            format!("  {} attempt {} rejected: {}", "✗".yellow(), attempt, reason)
        }
        WorkflowEvent::CacheWriteFailed { error, .. } => {
            format!("  {} result not cached: {}", "!".yellow(), error)
        }
        WorkflowEvent::Finished(outcome) => render_outcome(outcome),
    }
}

fn render_outcome(outcome: &WorkflowOutcome) -> String {
    match outcome {
        WorkflowOutcome::Accepted {
            payload,
            attempts,
            cached,
            ..
        } => {
            let source = if *cached {
                "from cache".to_string()
            } else {
                format!("after {} attempt(s)", attempts)
            };
            format!(
                "{} {}\n{}",
                "Accepted".green().bold(),
                source.dimmed(),
                pretty(payload)
            )
        }
        WorkflowOutcome::Exhausted {
            message, last_error, ..
        } => match last_error {
            Some(err) => format!("{} {}\n  last error: {}", "Failed".red().bold(), message, err),
            None => format!("{} {}", "Failed".red().bold(), message),
        },
        WorkflowOutcome::Cancelled { attempts, .. } => format!(
            "{} after {} attempt(s)",
            "Cancelled".yellow().bold(),
            attempts
        ),
    }
}

/// Render a cached entry for `genflow cache list`.
pub fn render_cache_entry(record: &CacheRecord, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string(record).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
        }
        OutputFormat::Text => format!(
            "{}  {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            record.topic
        ),
    }
}

/// Payloads that are plain strings print as-is.
pub fn pretty(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_json_lines_are_tagged() {
        let line = render_event(
            &WorkflowEvent::AttemptStarted {
                attempt: 2,
                max_attempts: 3,
            },
            OutputFormat::Json,
        );
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "attempt_started");
        assert_eq!(value["data"]["attempt"], 2);
    }

    #[test]
    fn test_text_rejection_includes_reason() {
        plain();
        let line = render_event(
            &WorkflowEvent::AttemptRejected {
                attempt: 1,
                reason: "missing field `title`".into(),
            },
            OutputFormat::Text,
        );
        assert_eq!(line, "  ✗ attempt 1 rejected: missing field `title`");
    }

    #[test]
    fn test_text_outcomes() {
        plain();
        let accepted = WorkflowEvent::Finished(WorkflowOutcome::Accepted {
            topic: "t".into(),
            payload: json!("hello"),
            attempts: 0,
            cached: true,
        });
        assert_eq!(render_event(&accepted, OutputFormat::Text), "Accepted from cache\nhello");

        let exhausted = WorkflowEvent::Finished(WorkflowOutcome::exhausted("t", 3, Some("empty".into())));
        let text = render_event(&exhausted, OutputFormat::Text);
        assert!(text.starts_with("Failed Sorry"));
        assert!(text.ends_with("last error: empty"));
    }

    #[test]
    fn test_pretty_payloads() {
        assert_eq!(pretty(&json!("plain text")), "plain text");
        assert_eq!(pretty(&json!({"a": 1})), "{\n  \"a\": 1\n}");
    }
}
