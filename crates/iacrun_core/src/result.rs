//! Stage results and the per-request execution result.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::operation::Operation;
use crate::terraform::Stage;

/// Output of one executed stage.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: Stage,
    /// Command line as run
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub output: String,
    pub diagnostics: Vec<Diagnostic>,
    pub success: bool,
    pub duration_ms: u64,
}

/// Which stages the pipeline got through.
///
/// `format` and `validate` are set once the check ran, even if it reported
/// problems. `init` and `plan` are set only when they succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagesReached {
    pub format: bool,
    pub init: bool,
    pub validate: bool,
    pub plan: bool,
}

/// How a finished pipeline run should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    #[default]
    Success,
    /// The tool ran and reported problems with the configuration
    DiagnosticFailure,
}

/// Terminal artifact of one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub ok: bool,
    pub operation: Operation,
    pub stages_reached: StagesReached,
    pub stage_outputs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_artifact: Option<String>,
    /// `Some(None)` when a plan succeeded but its JSON rendering did not
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub plan_artifact_machine_readable: Option<Option<String>>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub diagnostics: Vec<Diagnostic>,
    pub logs: Vec<String>,
    #[serde(skip)]
    pub outcome: Outcome,
}

impl ExecutionResult {
    /// Machine-readable plan, if one was rendered.
    pub fn plan_json(&self) -> Option<&str> {
        self.plan_artifact_machine_readable
            .as_ref()
            .and_then(|inner| inner.as_deref())
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }
}

/// Reads a present field, `null` included, as `Some`; absence uses `default`.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Accumulates stage results in execution order.
#[derive(Debug)]
pub struct ResultAssembler {
    operation: Operation,
    started: Instant,
    stages: Vec<StageResult>,
    mandatory: Vec<Stage>,
    logs: Vec<String>,
    plan_text: Option<String>,
    plan_json: Option<Option<String>>,
}

impl ResultAssembler {
    /// Start assembling; `mandatory` lists the stages that must all succeed.
    pub fn new(operation: Operation, mandatory: Vec<Stage>) -> Self {
        Self {
            operation,
            started: Instant::now(),
            stages: Vec::new(),
            mandatory,
            logs: Vec::new(),
            plan_text: None,
            plan_json: None,
        }
    }

    /// Append a transcript line.
    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    pub fn record(&mut self, result: StageResult) {
        match result.stage {
            // A failing plan's output is still the human-readable artifact.
            Stage::Plan if !result.success => {
                self.plan_text = Some(result.output.trim().to_string());
            }
            Stage::ShowText if result.success => self.plan_text = Some(result.output.clone()),
            Stage::ShowJson => {
                self.plan_json = Some(result.success.then(|| result.stdout.clone()));
            }
            _ => {}
        }
        self.stages.push(result);
    }

    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    fn succeeded(&self, stage: Stage) -> bool {
        self.stages.iter().any(|r| r.stage == stage && r.success)
    }

    fn ran(&self, matches: impl Fn(Stage) -> bool) -> bool {
        self.stages.iter().any(|r| matches(r.stage))
    }

    fn stages_reached(&self) -> StagesReached {
        StagesReached {
            format: self.ran(|s| s == Stage::Format),
            init: self
                .stages
                .iter()
                .any(|r| matches!(r.stage, Stage::Init(_)) && r.success),
            validate: self.ran(|s| s == Stage::Validate),
            plan: self.succeeded(Stage::Plan) && self.succeeded(Stage::ShowText),
        }
    }

    /// Produce the single result for this request.
    pub fn finish(self) -> ExecutionResult {
        let ok = self.mandatory.iter().all(|stage| self.succeeded(*stage));
        let stages_reached = self.stages_reached();

        let stage_outputs = self
            .stages
            .iter()
            .filter(|r| r.stage != Stage::ShowJson)
            .map(|r| (r.stage.name().to_string(), r.output.trim().to_string()))
            .collect();

        let diagnostics = self
            .stages
            .iter()
            .flat_map(|r| r.diagnostics.iter().cloned())
            .collect();

        let plan_json = match self.operation {
            Operation::Plan if ok => Some(self.plan_json.unwrap_or(None)),
            _ => self.plan_json,
        };

        ExecutionResult {
            ok,
            operation: self.operation,
            stages_reached,
            stage_outputs,
            plan_artifact: self.plan_text,
            plan_artifact_machine_readable: plan_json,
            duration_ms: self.started.elapsed().as_millis() as u64,
            diagnostics,
            logs: self.logs,
            outcome: if ok {
                Outcome::Success
            } else {
                Outcome::DiagnosticFailure
            },
        }
    }
}
