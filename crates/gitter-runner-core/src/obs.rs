//! Structured observability hooks for the pull-request lifecycle.
//!
//! This module provides:
//! - A pull-request-scoped span (`span_for`) for instrumenting phase futures
//! - Emission functions for key lifecycle events: delivery, phase start and
//!   finish, verification failure, tool run, and host call failure

use tracing::{info, warn};

use crate::domain::PullRequestEvent;
use crate::host::{HostError, HostOperation};

/// Span for `event`, for instrumenting futures across await points.
pub fn span_for(event: &PullRequestEvent) -> tracing::Span {
    tracing::info_span!(
        "gitter.pull_request",
        owner = %event.repository.owner,
        repo = %event.repository.name,
        pr = event.number,
        delivery_id = %event.delivery_id,
    )
}

/// Emit event: a webhook delivery reached the service.
pub fn emit_delivery_received(delivery_id: &str, event_name: &str) {
    info!(event = "delivery.received", delivery_id = %delivery_id, github_event = %event_name);
}

/// Emit event: a delivery id was already seen and will not be dispatched.
pub fn emit_delivery_duplicate(delivery_id: &str) {
    info!(event = "delivery.duplicate", delivery_id = %delivery_id);
}

/// Emit event: a phase began for an action.
pub fn emit_phase_started(phase: &str, action: &str) {
    info!(event = "phase.started", phase = %phase, action = %action);
}

/// Emit event: a phase reached its outcome.
pub fn emit_phase_finished(phase: &str, outcome: &str, duration_ms: u64) {
    info!(
        event = "phase.finished",
        phase = %phase,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

/// Emit event: a phase aborted on a collaborator failure (warning level).
pub fn emit_phase_aborted(phase: &str, error: &dyn std::fmt::Display) {
    warn!(event = "phase.aborted", phase = %phase, error = %error);
}

/// Emit event: verification produced user-facing errors.
pub fn emit_verification_failed(errors: &[String]) {
    info!(
        event = "verification.failed",
        error_count = errors.len(),
        errors = ?errors,
    );
}

/// Emit event: the external tool finished.
pub fn emit_run_finished(
    dry_run: bool,
    succeeded: bool,
    exit_code: Option<i32>,
    duration_ms: u64,
) {
    info!(
        event = "run.finished",
        dry_run = dry_run,
        succeeded = succeeded,
        exit_code = ?exit_code,
        duration_ms = duration_ms,
    );
}

/// Emit event: the external tool failed; output stays in the logs only.
pub fn emit_run_output(stdout: &str, stderr: &str) {
    warn!(event = "run.output", stdout = %stdout, stderr = %stderr);
}

/// Emit event: a repository host call failed (error level).
pub fn emit_host_call_failed(operation: HostOperation, error: &HostError) {
    match error.status() {
        Some(status) => tracing::error!(
            event = "host.call_failed",
            operation = %operation,
            status = status,
            "Failed to {}: got HTTP {} response.",
            operation,
            status,
        ),
        None => tracing::error!(
            event = "host.call_failed",
            operation = %operation,
            error = %error,
            "Failed to {}: {}",
            operation,
            error,
        ),
    }
}
