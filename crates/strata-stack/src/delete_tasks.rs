//! Teardown task builders
//!
//! Each builder queries the current inventory and returns a [`TaskTree`]
//! encoding the order in which resources must go:
//!
//! 1. node groups, all in parallel (a stuck group is remediated first when a
//!    cleanup hook is given)
//! 2. IAM service accounts in parallel, each as role-then-object, and only
//!    then the OIDC provider
//! 3. the control plane, last
//!
//! A builder either returns a complete tree or an error; nothing is executed
//! while building.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use strata_common::{Error, Result};
use tracing::{debug, info, warn};

use crate::api::IdentityProvider;
use crate::collection::StackCollection;
use crate::kubernetes::ClientProvider;
use crate::stack::{ServiceAccountRef, StackStatus};
use crate::tasks::{NamedOperation, Operation, StackOperations, Task, TaskTree};

/// Deletes the OIDC provider as a parameterless task
struct DeleteProvider(Arc<dyn IdentityProvider>);

#[async_trait]
impl Operation for DeleteProvider {
    async fn call(&self) -> Result<()> {
        self.0.delete_provider().await
    }
}

/// Whether `name` is selected; `None` selects everything
fn selected(only: Option<&BTreeSet<String>>, name: &str) -> bool {
    only.map_or(true, |names| names.contains(name))
}

fn warn_unmatched<'a>(
    only: Option<&BTreeSet<String>>,
    found: impl IntoIterator<Item = &'a str>,
    kind: &str,
) {
    let Some(requested) = only else {
        return;
    };
    let found: BTreeSet<&str> = found.into_iter().collect();
    for name in requested {
        if !found.contains(name.as_str()) {
            warn!(kind = %kind, name = %name, "Requested for deletion but no stack exists");
        }
    }
}

impl StackCollection {
    fn operations(&self) -> Arc<dyn StackOperations> {
        Arc::new(self.clone())
    }

    /// Delete node groups in parallel
    ///
    /// Selects the groups named in `only`, or every group when `only` is
    /// `None`. A group whose stack is `DELETE_FAILED` is preceded by
    /// `cleanup` when one is given, as a sequential pair.
    pub async fn delete_node_group_tasks(
        &self,
        only: Option<&BTreeSet<String>>,
        wait: bool,
        cleanup: Option<Arc<dyn NamedOperation>>,
    ) -> Result<TaskTree> {
        let stacks = self.describe_node_group_stacks().await?;
        let ops = self.operations();
        let mut tasks = TaskTree::parallel();

        warn_unmatched(only, stacks.iter().map(|s| s.node_group_name()), "nodegroup");

        for stack in stacks {
            let name = stack.node_group_name().to_string();
            if !selected(only, &name) {
                info!(nodegroup = %name, "Skipping nodegroup not selected for deletion");
                continue;
            }

            let delete = Task::stack(
                format!("delete nodegroup {name:?}"),
                stack.clone(),
                ops.clone(),
                wait,
            );

            match (&stack.status, &cleanup) {
                (StackStatus::DeleteFailed, Some(cleanup)) => {
                    debug!(nodegroup = %name, "Nodegroup stuck in DELETE_FAILED, adding cleanup");
                    let mut pair = TaskTree::sequential().into_sub_task();
                    pair.append(Task::named_param(
                        format!("cleanup for nodegroup {name:?}"),
                        name.clone(),
                        cleanup.clone(),
                    ));
                    pair.append(delete);
                    tasks.append(pair);
                }
                _ => tasks.append(delete),
            }
        }

        Ok(tasks)
    }

    /// Delete IAM service accounts in parallel
    ///
    /// Each account is a sequential pair: its IAM role stack, then the
    /// Kubernetes service account. `only` holds `namespace/name` entries;
    /// `None` selects every account.
    pub async fn delete_service_account_tasks(
        &self,
        only: Option<&BTreeSet<String>>,
        clients: Arc<dyn ClientProvider>,
        wait: bool,
    ) -> Result<TaskTree> {
        let stacks = self.describe_iam_service_account_stacks().await?;
        let ops = self.operations();
        let mut tasks = TaskTree::parallel();

        warn_unmatched(
            only,
            stacks.iter().map(|s| s.service_account_name()),
            "iamserviceaccount",
        );

        for stack in stacks {
            let name = stack.service_account_name().to_string();
            if !selected(only, &name) {
                info!(serviceaccount = %name, "Skipping serviceaccount not selected for deletion");
                continue;
            }

            let mut pair = TaskTree::sequential().into_sub_task();
            pair.append(Task::stack(
                format!("delete IAM role for serviceaccount {name:?}"),
                stack,
                ops.clone(),
                wait,
            ));

            let account = name.clone();
            pair.append(Task::kubernetes(
                format!("delete serviceaccount {name:?}"),
                clients.clone(),
                move |client| async move {
                    let sa = ServiceAccountRef::parse(&account)?;
                    client.delete_service_account(&sa.namespace, &sa.name).await
                },
            ));
            tasks.append(pair);
        }

        Ok(tasks)
    }

    /// Delete every IAM service account, then the OIDC provider
    ///
    /// Role deletions always block so the provider goes only after every
    /// binding is gone. Fails with [`Error::Precondition`] when the provider
    /// does not exist.
    pub async fn delete_oidc_provider_with_service_accounts_tasks(
        &self,
        oidc: Arc<dyn IdentityProvider>,
        clients: Arc<dyn ClientProvider>,
    ) -> Result<TaskTree> {
        if !oidc.exists().await? {
            return Err(Error::precondition(
                "unable to delete iamserviceaccount(s) without IAM OIDC provider enabled",
            ));
        }

        let mut tasks = TaskTree::sequential();

        let service_accounts = self.delete_service_account_tasks(None, clients, true).await?;
        if !service_accounts.is_empty() {
            tasks.append(service_accounts.into_sub_task());
        }
        tasks.append(Task::no_param(
            "delete IAM OIDC provider",
            Arc::new(DeleteProvider(oidc)),
        ));

        Ok(tasks)
    }

    /// Delete the whole cluster: node groups, then service accounts and the
    /// OIDC provider, then the control plane
    ///
    /// Node groups and service accounts are always waited on; `wait` only
    /// controls whether the control-plane deletion blocks.
    pub async fn delete_cluster_tasks(
        &self,
        oidc: Arc<dyn IdentityProvider>,
        clients: Arc<dyn ClientProvider>,
        wait: bool,
        cleanup: Option<Arc<dyn NamedOperation>>,
    ) -> Result<TaskTree> {
        let mut tasks = TaskTree::sequential();

        let node_groups = self.delete_node_group_tasks(None, true, cleanup).await?;
        if !node_groups.is_empty() {
            tasks.append(node_groups.into_sub_task());
        }

        let identity = self
            .delete_oidc_provider_with_service_accounts_tasks(oidc, clients)
            .await?;
        if !identity.is_empty() {
            tasks.append(identity.into_sub_task());
        }

        let cluster = self.describe_cluster_stack().await?;
        tasks.append(Task::stack(
            format!("delete cluster control plane {:?}", self.cluster_name()),
            cluster,
            self.operations(),
            wait,
        ));

        Ok(tasks)
    }
}
