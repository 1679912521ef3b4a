//! Leaf tasks
//!
//! A [`Task`] wraps exactly one side-effecting call. The set of kinds is
//! closed: stack operations that block until the stack reaches a terminal
//! state, stack operations that return once accepted, parameterless calls,
//! calls taking a single name, and calls that need a lazily obtained
//! Kubernetes client.
//!
//! Every leaf owns the data for its call. Shared capabilities (the stack
//! client, the identity provider) are held behind `Arc` and only read.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use strata_common::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::kubernetes::{ClientProvider, KubeClient};
use crate::stack::{OperationHandle, Stack};

/// Per-execution context handed to every task
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    cancel: CancellationToken,
}

impl RunContext {
    /// Context observing `cancel`
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Cancellation signal for this execution
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail fast if the execution was cancelled
    pub fn check_cancelled(&self, context: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled(context));
        }
        Ok(())
    }
}

/// Stack operations a leaf can perform
#[async_trait]
pub trait StackOperations: Send + Sync {
    /// Start deleting the stack and return once the request is accepted
    async fn delete_stack_by_spec(&self, stack: &Stack) -> Result<OperationHandle>;

    /// Delete the stack and block until it reaches a terminal state
    async fn delete_stack_by_spec_sync(&self, stack: &Stack, cancel: &CancellationToken)
        -> Result<()>;
}

/// A call without parameters
#[async_trait]
pub trait Operation: Send + Sync {
    /// Perform the call
    async fn call(&self) -> Result<()>;
}

/// A call taking one name, such as a remediation hook for a stuck node group
#[async_trait]
pub trait NamedOperation: Send + Sync {
    /// Perform the call for `name`
    async fn call(&self, name: &str) -> Result<()>;
}

/// Closure run against a freshly obtained Kubernetes client
pub type KubeCall =
    Box<dyn FnOnce(Arc<dyn KubeClient>) -> BoxFuture<'static, Result<()>> + Send>;

/// Operation on one stack
pub struct StackTask {
    info: String,
    stack: Stack,
    ops: Arc<dyn StackOperations>,
}

/// Parameterless call
pub struct NoParamTask {
    info: String,
    call: Arc<dyn Operation>,
}

/// Call taking a single name
pub struct NamedParamTask {
    info: String,
    param: String,
    call: Arc<dyn NamedOperation>,
}

/// Call that needs a Kubernetes client, obtained when the task runs
pub struct KubernetesTask {
    info: String,
    provider: Arc<dyn ClientProvider>,
    call: KubeCall,
}

/// One leaf of a task tree
pub enum Task {
    /// Stack operation that blocks until a terminal state
    StackSync(StackTask),
    /// Stack operation that returns once accepted
    StackAsync(StackTask),
    /// Parameterless call
    NoParam(NoParamTask),
    /// Call taking one name
    NamedParam(NamedParamTask),
    /// Call against a lazily obtained Kubernetes client
    Kubernetes(KubernetesTask),
}

impl Task {
    /// Stack operation that waits for the stack to reach a terminal state
    pub fn stack_sync(
        info: impl Into<String>,
        stack: Stack,
        ops: Arc<dyn StackOperations>,
    ) -> Self {
        Task::StackSync(StackTask {
            info: info.into(),
            stack,
            ops,
        })
    }

    /// Stack operation that returns as soon as the request is accepted
    pub fn stack_async(
        info: impl Into<String>,
        stack: Stack,
        ops: Arc<dyn StackOperations>,
    ) -> Self {
        Task::StackAsync(StackTask {
            info: info.into(),
            stack,
            ops,
        })
    }

    /// Stack operation, blocking when `wait` is set
    pub fn stack(
        info: impl Into<String>,
        stack: Stack,
        ops: Arc<dyn StackOperations>,
        wait: bool,
    ) -> Self {
        if wait {
            Self::stack_sync(info, stack, ops)
        } else {
            Self::stack_async(info, stack, ops)
        }
    }

    /// Parameterless call
    pub fn no_param(info: impl Into<String>, call: Arc<dyn Operation>) -> Self {
        Task::NoParam(NoParamTask {
            info: info.into(),
            call,
        })
    }

    /// Call taking one name
    pub fn named_param(
        info: impl Into<String>,
        param: impl Into<String>,
        call: Arc<dyn NamedOperation>,
    ) -> Self {
        Task::NamedParam(NamedParamTask {
            info: info.into(),
            param: param.into(),
            call,
        })
    }

    /// Call against a Kubernetes client obtained from `provider` at run time
    pub fn kubernetes<F, Fut>(info: impl Into<String>, provider: Arc<dyn ClientProvider>, call: F) -> Self
    where
        F: FnOnce(Arc<dyn KubeClient>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Task::Kubernetes(KubernetesTask {
            info: info.into(),
            provider,
            call: Box::new(move |client| call(client).boxed()),
        })
    }

    /// Description of what the task does
    pub fn info(&self) -> &str {
        match self {
            Task::StackSync(t) | Task::StackAsync(t) => &t.info,
            Task::NoParam(t) => &t.info,
            Task::NamedParam(t) => &t.info,
            Task::Kubernetes(t) => &t.info,
        }
    }

    /// Whether the task blocks until the remote operation is terminal
    pub fn blocks(&self) -> bool {
        matches!(self, Task::StackSync(_))
    }

    /// One-line plan entry
    pub fn describe(&self) -> String {
        if self.blocks() {
            format!("{} [wait]", self.info())
        } else {
            self.info().to_string()
        }
    }

    /// Perform the call
    pub async fn run(self, ctx: &RunContext) -> Result<()> {
        let info = self.info().to_string();
        ctx.check_cancelled(&info)?;
        debug!(task = %info, "Running task");

        let result = match self {
            Task::StackSync(t) => t.ops.delete_stack_by_spec_sync(&t.stack, ctx.cancel_token()).await,
            Task::StackAsync(t) => t.ops.delete_stack_by_spec(&t.stack).await.map(|handle| {
                debug!(stack = %handle.stack, operation_id = %handle.id, "Stack operation accepted");
            }),
            Task::NoParam(t) => t.call.call().await,
            Task::NamedParam(t) => t.call.call(&t.param).await,
            Task::Kubernetes(t) => match t.provider.client().await {
                Ok(client) => (t.call)(client).await,
                Err(e) => Err(e),
            },
        };

        match &result {
            Ok(()) => info!(task = %info, "Task completed"),
            Err(e) => warn!(task = %info, error = %e, "Task failed"),
        }
        result
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Task::StackSync(_) => "StackSync",
            Task::StackAsync(_) => "StackAsync",
            Task::NoParam(_) => "NoParam",
            Task::NamedParam(_) => "NamedParam",
            Task::Kubernetes(_) => "Kubernetes",
        };
        f.debug_struct("Task")
            .field("kind", &kind)
            .field("info", &self.info())
            .finish()
    }
}
