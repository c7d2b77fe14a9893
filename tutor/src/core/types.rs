//! Shared deterministic types for the verification lifecycle.
//!
//! These types define stable contracts between the orchestrator, the verifier
//! and the presentation layer.

/// Whether an attempt grades the submission or only executes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Execute the submission without grading.
    Run,
    /// Execute submission and solution, then compare.
    #[default]
    Verify,
}

impl RunMode {
    pub fn from_run_flag(run: bool) -> Self {
        if run { RunMode::Run } else { RunMode::Verify }
    }

    pub fn is_run(self) -> bool {
        self == RunMode::Run
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Run => "run",
            RunMode::Verify => "verify",
        }
    }

    /// Verb used when announcing an attempt ("Running" / "Verifying").
    pub fn verb(self) -> &'static str {
        match self {
            RunMode::Run => "Running",
            RunMode::Verify => "Verifying",
        }
    }
}

/// Terminal result of one verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
}

/// Signal delivered by a verifier session.
///
/// A session sends exactly one `Completed` value, optionally followed by `End`
/// once every process it started has been torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierEvent {
    Completed(Outcome),
    End,
}

/// Which failure message the learner sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    /// The problem supplied its own comparison function.
    Custom,
    /// Output was compared for equality against the reference solution.
    OutputMismatch,
}

impl FailKind {
    pub fn for_custom_verify(custom: bool) -> Self {
        if custom {
            FailKind::Custom
        } else {
            FailKind::OutputMismatch
        }
    }
}

/// Summary of what a verify/run action ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Passed,
    Failed,
    /// The asynchronous setup reported an error; nothing was executed.
    SetupFailed,
}

impl From<Outcome> for VerifyOutcome {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Pass => VerifyOutcome::Passed,
            Outcome::Fail => VerifyOutcome::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flag_maps_to_mode() {
        assert_eq!(RunMode::from_run_flag(true), RunMode::Run);
        assert_eq!(RunMode::from_run_flag(false), RunMode::Verify);
        assert_eq!(RunMode::Run.verb(), "Running");
        assert_eq!(RunMode::Verify.verb(), "Verifying");
    }

    #[test]
    fn fail_kind_follows_custom_flag() {
        assert_eq!(FailKind::for_custom_verify(true), FailKind::Custom);
        assert_eq!(FailKind::for_custom_verify(false), FailKind::OutputMismatch);
    }
}
