//! Prompt Templates
//!
//! Fixed prompts for the classifier, the investigators' root-cause analysis
//! and the reporter, plus cleanup of model output.

use lazy_static::lazy_static;
use regex::Regex;

use crate::alert::AlertContext;
use crate::workflow::Verification;

lazy_static! {
    static ref THINK_BLOCK: Regex = Regex::new(r"(?s)<think>.*?</think>").unwrap();
}

/// System prompt shared by the analysis and reporting calls.
pub const ANALYST_SYSTEM_PROMPT: &str = r#"You are a senior site reliability engineer triaging a production alert.
Work only from the evidence provided. Quote concrete values. If the evidence
is inconclusive, say so instead of guessing."#;

/// Remove `<think>...</think>` reasoning blocks some models emit, and trim.
pub fn strip_reasoning(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

pub fn classification_prompt(alert: &AlertContext) -> String {
    format!(
        "Classify this monitoring alert into exactly one category.\n\n\
        Alert rule: {}\n\
        Description: {}\n\n\
        Categories:\n\
        INFRA - compute, containers, virtual machines, CPU, memory or disk pressure\n\
        DATABASE - SQL databases, DTU, query errors, storage of a database\n\
        NETWORK - connectivity, DNS, load balancers, latency between services\n\
        APP - application exceptions, failed requests, dependency failures\n\n\
        Answer with the category token only (INFRA, DATABASE, NETWORK or APP).",
        alert.rule_name,
        if alert.description.is_empty() { "(none)" } else { &alert.description },
    )
}

/// Root-cause analysis over collected evidence, used by the infrastructure
/// and application investigators.
pub fn analysis_prompt(alert: &AlertContext, focus: &str, evidence: &[String]) -> String {
    format!(
        "{}\n\n\
        Alert: {} ({})\n\
        Resource: {}\n\
        Focus: {}\n\n\
        Evidence:\n{}\n\n\
        In at most five sentences, state the most likely root cause and the \
        first action an on-call engineer should take.",
        ANALYST_SYSTEM_PROMPT,
        alert.rule_name,
        alert.severity,
        alert.primary_resource().unwrap_or("unknown"),
        focus,
        bullet_list(evidence),
    )
}

/// The final report prompt. The answer must keep the four section headings.
pub fn report_prompt(
    alert: &AlertContext,
    classification: &str,
    draft: Option<&str>,
    evidence: &[String],
    verification: Option<Verification>,
) -> String {
    let resolution = match verification {
        Some(Verification::Resolved) => {
            "\nVerification: the alert condition appears to have self-resolved. Say so in the summary.\n"
        }
        Some(Verification::StillActive) => "\nVerification: the alert condition is still active.\n",
        _ => "",
    };

    format!(
        "{}\n\n\
        Write the incident report for alert '{}' (severity {}, fired {}).\n\
        {}\
        Investigator notes:\n{}\n\n\
        Evidence:\n{}\n\n\
        Use exactly this structure:\n\
        **Classification:** {}\n\
        **Summary:** <two or three sentences>\n\
        **Evidence:** <bullet list of the evidence that matters>\n\
        **Recommendation:** <next actions>",
        ANALYST_SYSTEM_PROMPT,
        alert.rule_name,
        alert.severity,
        alert.fired_at.to_rfc3339(),
        resolution,
        draft.unwrap_or("(none)"),
        bullet_list(evidence),
        classification,
    )
}

/// Steps as a markdown bullet list; continuation lines are indented.
pub fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (no evidence collected)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item.replace('\n', "\n  ")))
        .collect::<Vec<_>>()
        .join("\n")
}
