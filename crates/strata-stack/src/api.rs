//! Remote collaborators consumed by the lifecycle code
//!
//! These traits abstract the cloud APIs so the task engine and the composer
//! can be exercised with fakes. Implementations must be safe to share across
//! concurrently running tasks.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use strata_common::Result;

use crate::stack::{OperationHandle, Stack, StackKind};

/// Remote stack API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StackApi: Send + Sync {
    /// List the stacks of `kind` that belong to `cluster`, in a stable order
    async fn describe_stacks(&self, cluster: &str, kind: StackKind) -> Result<Vec<Stack>>;

    /// Describe one stack by name; `None` once the stack no longer exists
    async fn describe_stack(&self, name: &str) -> Result<Option<Stack>>;

    /// Start deleting a stack; returns once the request is accepted
    async fn delete_stack(&self, stack: &Stack) -> Result<OperationHandle>;
}

/// The cluster's identity-federation (OIDC) provider
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Whether the provider currently exists
    async fn exists(&self) -> Result<bool>;

    /// Delete the provider
    async fn delete_provider(&self) -> Result<()>;
}
