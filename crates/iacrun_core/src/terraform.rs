//! Terraform stage table.
//!
//! Which subcommands each operation runs, in order, and with which flags.

use serde::{Deserialize, Serialize};

use crate::operation::Operation;

/// Plan artifact written by the plan stage and read by the render stages.
pub const PLAN_FILE: &str = "tfplan.bin";

/// How `terraform init` treats the configured backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitMode {
    /// `-backend=false`: providers and modules only, no remote state
    Offline,
    /// Backend enabled so plan can read remote state
    Full,
}

/// One step of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Format,
    Init(InitMode),
    Validate,
    Plan,
    ShowText,
    ShowJson,
}

impl Stage {
    /// Stable name used in transcripts and `stageOutputs`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::Init(_) => "init",
            Self::Validate => "validate",
            Self::Plan => "plan",
            Self::ShowText => "show",
            Self::ShowJson => "show-json",
        }
    }

    /// Arguments passed to the executable.
    pub fn args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            Self::Format => &["fmt", "-check", "-recursive", "-list=true", "-no-color"],
            Self::Init(InitMode::Offline) => &["init", "-backend=false", "-input=false", "-no-color"],
            Self::Init(InitMode::Full) => &["init", "-input=false", "-no-color"],
            Self::Validate => &["validate", "-json", "-no-color"],
            Self::Plan => {
                return vec![
                    "plan".to_string(),
                    "-input=false".to_string(),
                    "-no-color".to_string(),
                    format!("-out={}", PLAN_FILE),
                ]
            }
            Self::ShowText => &["show", "-no-color", PLAN_FILE],
            Self::ShowJson => &["show", "-json", PLAN_FILE],
        };
        args.iter().map(|s| s.to_string()).collect()
    }
}

/// A stage together with whether its failure fails the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub stage: Stage,
    pub mandatory: bool,
}

impl StagePlan {
    fn mandatory(stage: Stage) -> Self {
        Self {
            stage,
            mandatory: true,
        }
    }

    fn best_effort(stage: Stage) -> Self {
        Self {
            stage,
            mandatory: false,
        }
    }
}

/// Stage sequence for `operation`.
///
/// `require_plan_json` promotes the machine-readable plan rendering to a
/// mandatory stage.
pub fn stages_for(operation: Operation, require_plan_json: bool) -> Vec<StagePlan> {
    match operation {
        Operation::FormatCheck => vec![StagePlan::mandatory(Stage::Format)],
        Operation::Validate => vec![
            StagePlan::mandatory(Stage::Init(InitMode::Offline)),
            StagePlan::mandatory(Stage::Validate),
        ],
        Operation::Plan => vec![
            StagePlan::mandatory(Stage::Init(InitMode::Full)),
            StagePlan::mandatory(Stage::Plan),
            StagePlan::mandatory(Stage::ShowText),
            if require_plan_json {
                StagePlan::mandatory(Stage::ShowJson)
            } else {
                StagePlan::best_effort(Stage::ShowJson)
            },
        ],
    }
}
