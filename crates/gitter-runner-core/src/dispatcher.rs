//! Event router and phase state machine.
//!
//! Routing:
//! - `opened | reopened | synchronize | edited | ready_for_review` ⇒ verify:
//!   post "verifying", check artifacts, then either list the errors or stage
//!   the artifacts, dry-run multi-gitter, and report the result
//! - `closed` and not merged ⇒ post "closed without merging"
//! - `closed` and merged ⇒ post "running", stage at the merge revision, run
//!   multi-gitter for real, and report "done" or "failed"
//! - anything else ⇒ ignored
//!
//! Each phase threads its `StatusComment` as a value from creation to the
//! final update. Host failures abort the phase; they are logged and never
//! escape `dispatch`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use crate::comment::StatusComment;
use crate::domain::{
    ArtifactRole, DispatchError, Phase, PullRequestEvent, RepositoryRef, RequiredArtifacts,
};
use crate::executor::{RunInvocation, RunResult, ToolRunner};
use crate::host::{self, ChangedFile, HostConnector, HostOperation, RepositoryHost};
use crate::lease::PullRequestLeases;
use crate::materialize::{materialize, MaterializeError};
use crate::messages;
use crate::metrics::METRICS;
use crate::obs;
use crate::verifier::verify;

/// Terminal state of one dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// The action does not trigger a phase.
    Ignored,
    /// Closed without merging; a single terminal comment was posted.
    ClosedWithoutMerge,
    /// Verification found errors; nothing was staged or run.
    VerificationFailed { errors: Vec<String> },
    /// Verification passed and the dry run finished.
    DryRunFinished { succeeded: bool },
    /// The merged pull request was run.
    RunFinished { succeeded: bool },
    /// A collaborator failure stopped the phase.
    Aborted { reason: String },
}

impl PhaseOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PhaseOutcome::Ignored => "ignored",
            PhaseOutcome::ClosedWithoutMerge => "closed_without_merge",
            PhaseOutcome::VerificationFailed { .. } => "verification_failed",
            PhaseOutcome::DryRunFinished { succeeded: true } => "dry_run_succeeded",
            PhaseOutcome::DryRunFinished { succeeded: false } => "dry_run_failed",
            PhaseOutcome::RunFinished { succeeded: true } => "run_succeeded",
            PhaseOutcome::RunFinished { succeeded: false } => "run_failed",
            PhaseOutcome::Aborted { .. } => "aborted",
        }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub required: RequiredArtifacts,
    /// Parent directory of per-phase staging directories.
    pub staging_root: PathBuf,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            required: RequiredArtifacts::default(),
            staging_root: std::env::temp_dir().join("gitter-runner"),
        }
    }
}

/// Routes pull-request events to the verify and run phases.
pub struct Dispatcher {
    connector: Arc<dyn HostConnector>,
    runner: Arc<dyn ToolRunner>,
    config: DispatcherConfig,
    leases: PullRequestLeases,
}

impl Dispatcher {
    pub fn new(
        connector: Arc<dyn HostConnector>,
        runner: Arc<dyn ToolRunner>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            connector,
            runner,
            config,
            leases: PullRequestLeases::new(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Process one event to completion. Never fails; errors are logged and
    /// reported as `PhaseOutcome::Aborted`.
    pub async fn dispatch(&self, event: &PullRequestEvent) -> PhaseOutcome {
        let phase = event.phase();
        if phase == Phase::Ignore {
            tracing::debug!(action = %event.action, "action ignored");
            return PhaseOutcome::Ignored;
        }

        let span = obs::span_for(event);
        async {
            let start = Instant::now();
            obs::emit_phase_started(phase.name(), event.action.as_str());

            let _lease = self.leases.acquire(&event.pull_request()).await;
            let outcome = match self.handle(event, phase).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    METRICS.inc_aborted();
                    obs::emit_phase_aborted(phase.name(), &e);
                    PhaseOutcome::Aborted {
                        reason: e.to_string(),
                    }
                }
            };

            obs::emit_phase_finished(
                phase.name(),
                outcome.label(),
                start.elapsed().as_millis() as u64,
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn handle(
        &self,
        event: &PullRequestEvent,
        phase: Phase,
    ) -> Result<PhaseOutcome, DispatchError> {
        match phase {
            Phase::Verify => self.verify_phase(event).await,
            Phase::Close { merged: false } => self.close_phase(event).await,
            Phase::Close { merged: true } => self.run_phase(event).await,
            Phase::Ignore => Ok(PhaseOutcome::Ignored),
        }
    }

    async fn connect(
        &self,
        event: &PullRequestEvent,
    ) -> Result<Arc<dyn RepositoryHost>, DispatchError> {
        let host = host::call(
            HostOperation::ResolveInstallation,
            self.connector.connect(event.installation_id),
        )
        .await?;
        Ok(host)
    }

    async fn verify_phase(
        &self,
        event: &PullRequestEvent,
    ) -> Result<PhaseOutcome, DispatchError> {
        let host = self.connect(event).await?;
        let pull_request = event.pull_request();

        let comment =
            StatusComment::create(host.as_ref(), &pull_request, messages::VERIFYING).await?;
        let changed = list_files(host.as_ref(), event).await?;

        let outcome = verify(
            host.as_ref(),
            &event.repository,
            &event.head_sha,
            &changed,
            &self.config.required,
        )
        .await;

        let errors = outcome.errors();
        METRICS.record_verification(errors.is_empty());
        if !errors.is_empty() {
            obs::emit_verification_failed(&errors);
            comment
                .update(host.as_ref(), &messages::verification_failed(&errors))
                .await?;
            return Ok(PhaseOutcome::VerificationFailed { errors });
        }

        let result = self
            .stage_and_run(
                host.as_ref(),
                &event.repository,
                &event.head_sha,
                &changed,
                true,
            )
            .await?;
        comment
            .update(host.as_ref(), messages::dry_run_finished(result.succeeded))
            .await?;

        Ok(PhaseOutcome::DryRunFinished {
            succeeded: result.succeeded,
        })
    }

    async fn close_phase(&self, event: &PullRequestEvent) -> Result<PhaseOutcome, DispatchError> {
        let host = self.connect(event).await?;
        StatusComment::create(
            host.as_ref(),
            &event.pull_request(),
            messages::CLOSED_WITHOUT_MERGING,
        )
        .await?;
        Ok(PhaseOutcome::ClosedWithoutMerge)
    }

    async fn run_phase(&self, event: &PullRequestEvent) -> Result<PhaseOutcome, DispatchError> {
        let host = self.connect(event).await?;
        let pull_request = event.pull_request();

        let comment =
            StatusComment::create(host.as_ref(), &pull_request, messages::RUNNING).await?;
        let changed = list_files(host.as_ref(), event).await?;

        let result = self
            .stage_and_run(
                host.as_ref(),
                &event.repository,
                event.run_revision(),
                &changed,
                false,
            )
            .await?;
        comment
            .update(host.as_ref(), messages::run_finished(result.succeeded))
            .await?;

        Ok(PhaseOutcome::RunFinished {
            succeeded: result.succeeded,
        })
    }

    /// Stage the artifacts at `revision` and run the tool on them.
    ///
    /// Host failures abort the phase; any other staging problem becomes a
    /// failed run so the comment still reaches a terminal state.
    async fn stage_and_run(
        &self,
        host: &dyn RepositoryHost,
        repository: &RepositoryRef,
        revision: &str,
        changed: &[ChangedFile],
        dry_run: bool,
    ) -> Result<RunResult, DispatchError> {
        let staged = match materialize(
            host,
            repository,
            revision,
            changed,
            &self.config.required,
            &self.config.staging_root,
        )
        .await
        {
            Ok(staged) => staged,
            Err(MaterializeError::Host(e)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(error = %e, "staging failed");
                METRICS.record_run(false);
                return Ok(RunResult::not_started(e.to_string()));
            }
        };

        let invocation = match (
            staged.path_for(ArtifactRole::Script),
            staged.path_for(ArtifactRole::Config),
        ) {
            (Some(script), Some(config)) => RunInvocation {
                script: script.to_path_buf(),
                config: config.to_path_buf(),
                dry_run,
            },
            _ => {
                METRICS.record_run(false);
                return Ok(RunResult::not_started("staged artifacts incomplete"));
            }
        };

        let result = self.runner.run(&invocation).await;
        METRICS.record_run(result.succeeded);
        obs::emit_run_finished(
            dry_run,
            result.succeeded,
            result.exit_code,
            result.duration_ms,
        );
        if !result.succeeded {
            obs::emit_run_output(&result.stdout, &result.stderr);
        }

        // `staged` drops here, removing the staging directory.
        Ok(result)
    }
}

async fn list_files(
    host: &dyn RepositoryHost,
    event: &PullRequestEvent,
) -> Result<Vec<ChangedFile>, DispatchError> {
    let files =
        host::call(HostOperation::ListFiles, host.list_files(&event.pull_request())).await?;
    tracing::debug!(count = files.len(), "changed files listed");
    Ok(files)
}
