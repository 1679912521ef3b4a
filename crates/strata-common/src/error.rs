//! Error types for strata
//!
//! Errors are structured with fields to aid debugging in production. The
//! variants fall into three groups that callers handle differently:
//!
//! - construction errors (`StackApi`, `NotFound`, `Precondition`) surface
//!   before any side effect happens
//! - wait outcomes (`WaitFailed`, `WaitTimeout`, `Cancelled`) classify how a
//!   blocking step ended
//! - `Aggregate` carries every failure of a parallel task node

use std::time::Duration;

use thiserror::Error;

/// Main error type for strata operations
#[derive(Debug, Error)]
pub enum Error {
    /// A remote stack or cluster API call failed
    #[error("stack API error for {stack}: {message}")]
    StackApi {
        /// Stack (or cluster) the call was made for
        stack: String,
        /// Description of what failed
        message: String,
    },

    /// A resource that was expected to exist could not be found
    #[error("{kind} {name:?} not found")]
    NotFound {
        /// Kind of resource (stack, nodegroup, cluster)
        kind: String,
        /// Resource name
        name: String,
    },

    /// A precondition required to build a task tree does not hold
    #[error("precondition failed: {message}")]
    Precondition {
        /// Description of the unmet precondition
        message: String,
    },

    /// A waited-on operation reached a terminal failure state
    #[error("{operation} for {resource} reached terminal state {state}")]
    WaitFailed {
        /// Resource the operation was acting on
        resource: String,
        /// Human-readable operation description
        operation: String,
        /// The failure state that was observed
        state: String,
    },

    /// A waited-on operation did not reach a terminal state in time
    #[error(
        "timed out after {timeout:?} waiting for {resource} (last observed state: {})",
        .last_state.as_deref().unwrap_or("none")
    )]
    WaitTimeout {
        /// Resource being waited on
        resource: String,
        /// Configured timeout
        timeout: Duration,
        /// Last state observed before the deadline, if any poll succeeded
        last_state: Option<String>,
    },

    /// The operation was cancelled before it completed
    #[error("cancelled: {context}")]
    Cancelled {
        /// What was running when cancellation was observed
        context: String,
    },

    /// Every failure of a parallel task node
    #[error("{} task(s) failed: {}", .errors.len(), join_errors(.errors))]
    Aggregate {
        /// Failures ordered by the position of the failing child
        errors: Vec<Error>,
    },

    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "executor", "kube-client")
        context: String,
    },
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a stack API error for the given stack
    pub fn stack_api(stack: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StackApi {
            stack: stack.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition {
            message: msg.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: context.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Wrap a set of child failures
    pub fn aggregate(errors: Vec<Error>) -> Self {
        Self::Aggregate { errors }
    }

    /// Whether a fresh build-and-execute cycle could plausibly succeed
    ///
    /// Timeouts and remote API errors are retryable. Terminal wait failures,
    /// precondition failures and cancellation are not. An aggregate is
    /// retryable only if every failure inside it is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::StackApi { .. } | Error::WaitTimeout { .. } | Error::Kube { .. } => true,
            Error::Aggregate { errors } => {
                !errors.is_empty() && errors.iter().all(Error::is_retryable)
            }
            _ => false,
        }
    }

    /// Leaf failures with nested aggregates flattened
    pub fn failures(&self) -> Vec<&Error> {
        match self {
            Error::Aggregate { errors } => errors.iter().flat_map(Error::failures).collect(),
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Classifying teardown failures
    // ==========================================================================

    /// Story: a stuck node group reports the state it got stuck in
    #[test]
    fn story_terminal_failure_names_operation_and_state() {
        let err = Error::WaitFailed {
            resource: "strata-demo-nodegroup-ng-1".to_string(),
            operation: "delete stack".to_string(),
            state: "DELETE_FAILED".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "delete stack for strata-demo-nodegroup-ng-1 reached terminal state DELETE_FAILED"
        );
        assert!(!err.is_retryable());
    }

    /// Story: a timeout keeps the last state so the operator knows where it stalled
    #[test]
    fn story_timeout_carries_last_observed_state() {
        let err = Error::WaitTimeout {
            resource: "demo".to_string(),
            timeout: Duration::from_secs(60),
            last_state: Some("DELETE_IN_PROGRESS".to_string()),
        };
        assert!(err.to_string().contains("DELETE_IN_PROGRESS"));
        assert!(err.is_retryable());

        let never_seen = Error::WaitTimeout {
            resource: "demo".to_string(),
            timeout: Duration::from_secs(60),
            last_state: None,
        };
        assert!(never_seen.to_string().contains("last observed state: none"));
    }

    /// Story: parallel failures are all reported, even through nesting
    #[test]
    fn story_aggregate_flattens_nested_failures() {
        let err = Error::aggregate(vec![
            Error::stack_api("ng-a", "throttled"),
            Error::aggregate(vec![
                Error::precondition("no oidc"),
                Error::stack_api("ng-b", "access denied"),
            ]),
        ]);

        let failures = err.failures();
        assert_eq!(failures.len(), 3);
        assert!(err.to_string().starts_with("2 task(s) failed"));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn aggregate_is_retryable_only_when_every_failure_is() {
        let all_transient = Error::aggregate(vec![
            Error::stack_api("a", "throttled"),
            Error::stack_api("b", "throttled"),
        ]);
        assert!(all_transient.is_retryable());

        let mixed = Error::aggregate(vec![
            Error::stack_api("a", "throttled"),
            Error::cancelled("shutdown"),
        ]);
        assert!(!mixed.is_retryable());

        assert!(!Error::aggregate(vec![]).is_retryable());
    }

    #[test]
    fn constructors_fill_context() {
        match Error::internal_with_context("executor", "join failed") {
            Error::Internal { context, message } => {
                assert_eq!(context, "executor");
                assert_eq!(message, "join failed");
            }
            other => panic!("expected Internal, got {other:?}"),
        }
        assert_eq!(
            Error::not_found("stack", "strata-demo-cluster").to_string(),
            "stack \"strata-demo-cluster\" not found"
        );
    }
}
