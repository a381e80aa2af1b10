//! Diagnostic extraction from Terraform output.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A finding reported by the tool about the submitted configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Stage that produced the diagnostic
    pub stage: String,
    pub severity: Severity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl Diagnostic {
    fn new(stage: &str, severity: Severity, summary: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            severity,
            summary: summary.into(),
            detail: None,
            filename: None,
            line: None,
            column: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[derive(Deserialize)]
struct ValidateOutput {
    #[serde(default)]
    diagnostics: Vec<JsonDiagnostic>,
}

#[derive(Deserialize)]
struct JsonDiagnostic {
    severity: Severity,
    summary: String,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    range: Option<JsonRange>,
}

#[derive(Deserialize)]
struct JsonRange {
    filename: String,
    start: JsonPos,
}

#[derive(Deserialize)]
struct JsonPos {
    line: u32,
    column: u32,
}

/// Parse `terraform validate -json` output.
///
/// Returns `None` when `stdout` is not the expected document so the caller
/// can fall back to [`parse_text`].
pub fn parse_validate_json(stage: &str, stdout: &str) -> Option<Vec<Diagnostic>> {
    let parsed: ValidateOutput = serde_json::from_str(stdout.trim()).ok()?;
    Some(
        parsed
            .diagnostics
            .into_iter()
            .map(|d| {
                let mut diag = Diagnostic::new(stage, d.severity, d.summary);
                diag.detail = d.detail.filter(|s| !s.is_empty());
                if let Some(range) = d.range {
                    diag.filename = Some(range.filename);
                    diag.line = Some(range.start.line);
                    diag.column = Some(range.start.column);
                }
                diag
            })
            .collect(),
    )
}

/// Diagnostics for `terraform fmt -check -list=true`.
///
/// Every file listed on stdout needs formatting; stderr carries parse errors.
pub fn parse_fmt_output(stage: &str, stdout: &str, stderr: &str) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|file| {
            let mut diag = Diagnostic::new(stage, Severity::Error, "file is not formatted");
            diag.filename = Some(file.to_string());
            diag
        })
        .collect();
    diagnostics.extend(parse_text(stage, stderr));
    diagnostics
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(Error|Warning): (.+)$").expect("valid regex"))
}

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^on (\S+) line (\d+)(?:, in [^:]+)?:$").expect("valid regex")
    })
}

fn snippet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+:").expect("valid regex"))
}

/// Parse human-readable `Error:` / `Warning:` blocks.
pub fn parse_text(stage: &str, text: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut current: Option<(Diagnostic, Vec<String>)> = None;

    for raw in text.lines() {
        let line = raw
            .trim_start_matches(['│', '╷', '╵'])
            .trim();

        if let Some(caps) = header_re().captures(line) {
            if let Some(done) = current.take() {
                diagnostics.push(finish(done));
            }
            let severity = if &caps[1] == "Error" {
                Severity::Error
            } else {
                Severity::Warning
            };
            current = Some((Diagnostic::new(stage, severity, caps[2].trim()), Vec::new()));
            continue;
        }

        let Some((diag, detail)) = current.as_mut() else {
            continue;
        };
        if let Some(caps) = location_re().captures(line) {
            if diag.filename.is_none() {
                diag.filename = Some(caps[1].to_string());
                diag.line = caps[2].parse().ok();
            }
        } else if !line.is_empty() && !snippet_re().is_match(line) {
            detail.push(line.to_string());
        }
    }

    if let Some(done) = current.take() {
        diagnostics.push(finish(done));
    }
    diagnostics
}

fn finish((mut diag, detail): (Diagnostic, Vec<String>)) -> Diagnostic {
    if !detail.is_empty() {
        diag.detail = Some(detail.join(" "));
    }
    diag
}
