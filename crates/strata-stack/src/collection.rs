//! Stacks belonging to one cluster
//!
//! [`StackCollection`] answers inventory questions for a single cluster and
//! performs stack deletions, blocking on the [`Waiter`] when asked to. The
//! teardown builders in [`crate::delete_tasks`] are defined on it.

use std::sync::Arc;

use async_trait::async_trait;
use strata_common::{Error, Result, WaitConfig, Waiter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::StackApi;
use crate::stack::{cluster_stack_name, OperationHandle, Stack, StackKind, StackStatus};
use crate::tasks::StackOperations;

/// Stack inventory and stack operations for one cluster
#[derive(Clone)]
pub struct StackCollection {
    api: Arc<dyn StackApi>,
    cluster: String,
    wait: WaitConfig,
}

impl StackCollection {
    /// Collection for `cluster`, waiting on deletions with `wait`
    pub fn new(api: Arc<dyn StackApi>, cluster: impl Into<String>, wait: WaitConfig) -> Self {
        Self {
            api,
            cluster: cluster.into(),
            wait,
        }
    }

    /// Name of the cluster the collection belongs to
    pub fn cluster_name(&self) -> &str {
        &self.cluster
    }

    /// Node-group stacks that still exist
    pub async fn describe_node_group_stacks(&self) -> Result<Vec<Stack>> {
        self.describe_live(StackKind::NodeGroup).await
    }

    /// IAM service-account stacks that still exist
    pub async fn describe_iam_service_account_stacks(&self) -> Result<Vec<Stack>> {
        self.describe_live(StackKind::ServiceAccount).await
    }

    /// The control-plane stack
    pub async fn describe_cluster_stack(&self) -> Result<Stack> {
        self.describe_live(StackKind::Cluster)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("stack", cluster_stack_name(&self.cluster)))
    }

    async fn describe_live(&self, kind: StackKind) -> Result<Vec<Stack>> {
        let stacks = self.api.describe_stacks(&self.cluster, kind).await?;
        let total = stacks.len();
        let live: Vec<Stack> = stacks
            .into_iter()
            .filter(|s| s.status != StackStatus::DeleteComplete)
            .collect();
        debug!(
            cluster = %self.cluster,
            kind = %kind,
            total,
            live = live.len(),
            "Described stacks"
        );
        Ok(live)
    }
}

#[async_trait]
impl StackOperations for StackCollection {
    async fn delete_stack_by_spec(&self, stack: &Stack) -> Result<OperationHandle> {
        let handle = self.api.delete_stack(stack).await?;
        info!(stack = %stack.name, operation_id = %handle.id, "Stack deletion requested");
        Ok(handle)
    }

    async fn delete_stack_by_spec_sync(
        &self,
        stack: &Stack,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.delete_stack_by_spec(stack).await?;

        let api = self.api.clone();
        let name = stack.name.clone();
        Waiter::new(
            &stack.name,
            "waiting for stack deletion",
            StackStatus::DeleteComplete,
            self.wait.clone(),
        )
        .with_failures([StackStatus::DeleteFailed])
        .wait(
            cancel,
            move || {
                let api = api.clone();
                let name = name.clone();
                async move { api.describe_stack(&name).await }
            },
            // a stack that can no longer be described is gone
            |current: &Option<Stack>| {
                current
                    .as_ref()
                    .map_or(StackStatus::DeleteComplete, |s| s.status.clone())
            },
        )
        .await
    }
}
