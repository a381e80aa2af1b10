//! Per-request command pipeline.
//!
//! A pipeline walks `Start → Written → Initialized → Staged(n) → Done`,
//! running the stage table for its operation one stage at a time. A
//! mandatory stage that exits non-zero halts the walk; infrastructure
//! errors from the runner abort it.

use iacrun_runner::{Invocation, ToolRunner};
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::diagnostics::{parse_fmt_output, parse_text, parse_validate_json, Diagnostic};
use crate::environment::ToolEnvironment;
use crate::error::OrchestratorResult;
use crate::fileset::FileSet;
use crate::operation::Operation;
use crate::result::{ExecutionResult, ResultAssembler, StageResult};
use crate::terraform::{stages_for, Stage};
use crate::workspace::Workspace;

/// Position of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Workspace allocated, nothing written
    Start,
    /// Files materialized
    Written,
    /// `terraform init` succeeded
    Initialized,
    /// `n` post-initialization stages have run
    Staged(usize),
    /// No further stages will run
    Done,
}

impl PipelineState {
    /// Whether moving to `next` is a legal transition.
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Start, Written) | (Start, Done) => true,
            (Written, Initialized) | (Written, Staged(1)) | (Written, Done) => true,
            (Initialized, Staged(1)) | (Initialized, Done) => true,
            (Staged(n), Staged(m)) => m == n + 1,
            (Staged(_), Done) => true,
            _ => false,
        }
    }
}

/// Runs one operation against one workspace.
pub struct Pipeline<'a> {
    runner: &'a dyn ToolRunner,
    config: &'a OrchestratorConfig,
    operation: Operation,
    env: ToolEnvironment,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        runner: &'a dyn ToolRunner,
        config: &'a OrchestratorConfig,
        operation: Operation,
        env: ToolEnvironment,
    ) -> Self {
        Self {
            runner,
            config,
            operation,
            env,
            state: PipelineState::Start,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal pipeline transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn next_state(&self, stage: Stage, success: bool) -> PipelineState {
        match (stage, self.state) {
            (Stage::Init(_), _) if success => PipelineState::Initialized,
            (_, PipelineState::Staged(n)) => PipelineState::Staged(n + 1),
            _ => PipelineState::Staged(1),
        }
    }

    /// Materialize `files` into `workspace` and run every stage.
    pub async fn run(
        mut self,
        workspace: &Workspace,
        files: &FileSet,
    ) -> OrchestratorResult<ExecutionResult> {
        workspace.materialize(files).await?;
        self.advance(PipelineState::Written);

        let plan = stages_for(self.operation, self.config.require_plan_json);
        let mandatory = plan.iter().filter(|p| p.mandatory).map(|p| p.stage).collect();
        let mut assembler = ResultAssembler::new(self.operation, mandatory);

        for step in &plan {
            let result = self.run_stage(step.stage, workspace, &mut assembler).await?;
            let success = result.success;
            let next = self.next_state(step.stage, success);
            assembler.record(result);

            if !success {
                if step.mandatory {
                    info!("Stage {} failed, halting pipeline", step.stage.name());
                    assembler.log(format!("{} failed; remaining stages skipped", step.stage.name()));
                    break;
                }
                warn!("Best-effort stage {} failed", step.stage.name());
                assembler.log(format!("{} failed (best-effort, ignored)", step.stage.name()));
            }
            self.advance(next);
        }

        self.advance(PipelineState::Done);
        Ok(assembler.finish())
    }

    async fn run_stage(
        &self,
        stage: Stage,
        workspace: &Workspace,
        assembler: &mut ResultAssembler,
    ) -> OrchestratorResult<StageResult> {
        let invocation = Invocation::new(&self.config.executable)
            .args(stage.args())
            .workdir(workspace.path())
            .envs(self.env.vars().clone());
        let command = invocation.display_command();

        info!("Running stage {}", stage.name());
        assembler.log(format!("$ {}", command));

        let output = self
            .runner
            .invoke(&invocation, &self.config.run_config)
            .await?;
        let success = output.success();
        let combined = output.combined_output();
        let diagnostics = stage_diagnostics(stage, success, &output.stdout, &output.stderr, &combined);

        Ok(StageResult {
            stage,
            command,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            output: combined,
            diagnostics,
            success,
            duration_ms: output.duration_ms,
        })
    }
}

fn stage_diagnostics(
    stage: Stage,
    success: bool,
    stdout: &str,
    stderr: &str,
    combined: &str,
) -> Vec<Diagnostic> {
    let name = stage.name();
    match stage {
        // warnings are worth reporting even when validation passes
        Stage::Validate => {
            parse_validate_json(name, stdout).unwrap_or_else(|| parse_text(name, combined))
        }
        Stage::Format if !success => parse_fmt_output(name, stdout, stderr),
        Stage::ShowJson => Vec::new(),
        _ if !success => parse_text(name, combined),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use PipelineState::*;
        assert!(Start.can_advance_to(Written));
        assert!(Written.can_advance_to(Initialized));
        assert!(Written.can_advance_to(Staged(1)));
        assert!(Initialized.can_advance_to(Staged(1)));
        assert!(Staged(1).can_advance_to(Staged(2)));
        assert!(Staged(3).can_advance_to(Done));

        assert!(!Start.can_advance_to(Initialized));
        assert!(!Staged(1).can_advance_to(Staged(3)));
        assert!(!Done.can_advance_to(Start));
        assert!(!Initialized.can_advance_to(Written));
    }

    #[test]
    fn test_validate_diagnostics_fall_back_to_text() {
        let diags = stage_diagnostics(
            Stage::Validate,
            false,
            "",
            "Error: Failed to read file\n",
            "Error: Failed to read file\n",
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].stage, "validate");
    }

    #[test]
    fn test_successful_stages_have_no_diagnostics() {
        assert!(stage_diagnostics(Stage::Plan, true, "Error: x", "", "Error: x").is_empty());
    }
}
