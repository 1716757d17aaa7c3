//! Terminal rendering of findings.

use std::collections::BTreeMap;

use owo_colors::{OwoColorize, Rgb};

use crate::issues::{DetectionFamily, Issue, IssueKind};

const ERROR: Rgb = Rgb(239, 68, 68);
const WARNING: Rgb = Rgb(234, 179, 8);
const INFO: Rgb = Rgb(59, 130, 246);
const SUCCESS: Rgb = Rgb(34, 197, 94);
const MUTED: Rgb = Rgb(107, 114, 128);

/// Renders issues as one line each, plus a summary.
#[derive(Debug, Clone)]
pub struct IssueRenderer {
    colored: bool,
    /// Descriptions longer than this are truncated.
    max_description: usize,
}

impl Default for IssueRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl IssueRenderer {
    pub fn new() -> Self {
        Self {
            colored: true,
            max_description: 120,
        }
    }

    pub fn with_color(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    pub fn with_max_description(mut self, max_chars: usize) -> Self {
        self.max_description = max_chars;
        self
    }

    fn family_color(kind: IssueKind) -> Rgb {
        match kind.family() {
            DetectionFamily::TypeChange => WARNING,
            DetectionFamily::Readable => ERROR,
            DetectionFamily::Report => INFO,
        }
    }

    /// Truncates on character boundaries.
    fn safe_truncate(s: &str, max_chars: usize) -> String {
        if s.chars().count() <= max_chars {
            s.to_string()
        } else {
            let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{}...", truncated)
        }
    }

    /// `kind  chain  description`
    pub fn render_issue(&self, issue: &Issue) -> String {
        let kind = format!("{:<30}", issue.kind.name());
        let chain = issue.chain.to_string();
        let description = Self::safe_truncate(&issue.description, self.max_description);

        if self.colored {
            format!(
                "{} {} {}",
                kind.color(Self::family_color(issue.kind)).bold(),
                chain.color(MUTED),
                description
            )
        } else {
            format!("{} {} {}", kind, chain, description)
        }
    }

    /// All issues followed by a per-kind count.
    pub fn render_report(&self, issues: &[Issue]) -> String {
        if issues.is_empty() {
            let clean = "No issues found";
            return if self.colored {
                format!("{}", clean.color(SUCCESS))
            } else {
                clean.to_string()
            };
        }

        let mut output = String::new();
        for issue in issues {
            output.push_str(&self.render_issue(issue));
            output.push('\n');
        }

        let mut counts: BTreeMap<IssueKind, usize> = BTreeMap::new();
        for issue in issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
        let breakdown: Vec<String> = counts
            .iter()
            .map(|(kind, count)| format!("{} {}", count, kind))
            .collect();
        let summary = format!(
            "{} issue{} ({})",
            issues.len(),
            if issues.len() == 1 { "" } else { "s" },
            breakdown.join(", ")
        );

        output.push('\n');
        if self.colored {
            output.push_str(&format!("{}", summary.color(ERROR).bold()));
        } else {
            output.push_str(&summary);
        }
        output
    }
}
