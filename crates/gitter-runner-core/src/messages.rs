//! Status comment bodies posted to pull requests.

pub const VERIFYING: &str = "Verifying pull request...";
pub const VERIFICATION_FAILED_BANNER: &str = "Verification failed:";
pub const DONE_VERIFYING: &str = "Done verifying.";
pub const DRY_RUN_FAILED: &str = "Failed to run `multi-gitter` in dry-run mode.";
pub const CLOSED_WITHOUT_MERGING: &str = "Pull request was closed without merging.";
pub const RUNNING: &str = "Running `multi-gitter`...";
pub const DONE_RUNNING: &str = "Done running `multi-gitter`.";
pub const FAILED_RUNNING: &str = "Failed running `multi-gitter`.";

/// Banner line followed by one list item per error.
pub fn verification_failed(errors: &[String]) -> String {
    let mut body = String::from(VERIFICATION_FAILED_BANNER);
    for error in errors {
        body.push_str("\n - ");
        body.push_str(error);
    }
    body
}

/// Final body for a verify-phase dry run.
pub fn dry_run_finished(succeeded: bool) -> &'static str {
    if succeeded {
        DONE_VERIFYING
    } else {
        DRY_RUN_FAILED
    }
}

/// Final body for a merged run.
pub fn run_finished(succeeded: bool) -> &'static str {
    if succeeded {
        DONE_RUNNING
    } else {
        FAILED_RUNNING
    }
}
