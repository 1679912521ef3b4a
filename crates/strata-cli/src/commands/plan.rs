//! Plan command - show the teardown tasks for a cluster without running them
//!
//! Usage: strata plan <operation> --inventory <path>
//!
//! The tree is built by the same builders a real teardown uses, against an
//! inventory snapshot instead of the live stack API. Nothing is deleted.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};
use strata_common::WaitConfig;
use strata_stack::{NamedOperation, StackCollection, TaskTree};
use tracing::info;

use crate::inventory::{Inventory, SnapshotBackend};
use crate::Result;

/// Print the task tree for a teardown operation
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Inventory snapshot (YAML) describing the cluster's stacks
    #[arg(short = 'i', long, global = true, env = "STRATA_INVENTORY")]
    pub inventory: Option<PathBuf>,

    #[command(subcommand)]
    pub operation: PlanOperation,
}

/// Teardown operations that can be planned
#[derive(Subcommand, Debug)]
pub enum PlanOperation {
    /// Delete the cluster with its node groups, service accounts and OIDC provider
    DeleteCluster {
        /// Wait for the control plane deletion to finish
        #[arg(long)]
        wait: bool,

        /// Clean up node groups stuck in DELETE_FAILED before retrying them
        #[arg(long)]
        with_cleanup: bool,
    },

    /// Delete node groups
    DeleteNodegroups {
        /// Only these node groups (comma-separated); all when omitted
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Wait for each deletion to finish
        #[arg(long)]
        wait: bool,
    },

    /// Delete IAM service accounts
    DeleteServiceaccounts {
        /// Only these accounts as namespace/name (comma-separated); all when omitted
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Wait for each role deletion to finish
        #[arg(long)]
        wait: bool,
    },

    /// Delete every IAM service account and then the OIDC provider; role
    /// deletions always block
    DeleteOidc,
}

/// Build the tree `args` asks for from the inventory it names
pub async fn build(args: &PlanArgs, wait_config: WaitConfig) -> Result<TaskTree> {
    let path = args
        .inventory
        .as_deref()
        .ok_or_else(|| crate::Error::validation("--inventory is required"))?;
    let inventory = Inventory::load(path)?;
    let cluster = inventory.cluster.clone();
    let backend = Arc::new(SnapshotBackend::new(inventory));
    let stacks = StackCollection::new(backend.clone(), cluster, wait_config);

    let tree = match &args.operation {
        PlanOperation::DeleteCluster { wait, with_cleanup } => {
            let cleanup = with_cleanup.then(|| backend.clone() as Arc<dyn NamedOperation>);
            stacks
                .delete_cluster_tasks(backend.clone(), backend.clone(), *wait, cleanup)
                .await?
        }
        PlanOperation::DeleteNodegroups { only, wait } => {
            let only = subset(only);
            stacks
                .delete_node_group_tasks(only.as_ref(), *wait, None)
                .await?
        }
        PlanOperation::DeleteServiceaccounts { only, wait } => {
            for name in only {
                strata_stack::ServiceAccountRef::parse(name)?;
            }
            let only = subset(only);
            stacks
                .delete_service_account_tasks(only.as_ref(), backend.clone(), *wait)
                .await?
        }
        PlanOperation::DeleteOidc => {
            stacks
                .delete_oidc_provider_with_service_accounts_tasks(backend.clone(), backend.clone())
                .await?
        }
    };
    Ok(tree)
}

fn subset(only: &[String]) -> Option<BTreeSet<String>> {
    if only.is_empty() {
        None
    } else {
        Some(only.iter().cloned().collect())
    }
}

/// Plan text followed by the task count
pub fn render(tree: &TaskTree) -> String {
    let count = tree.len();
    let noun = if count == 1 { "task" } else { "tasks" };
    format!("{}\n{count} {noun} planned", tree.describe())
}

/// Run the plan command
pub async fn run(args: PlanArgs, wait_config: WaitConfig) -> Result<()> {
    let tree = build(&args, wait_config).await?;
    info!(tasks = tree.len(), "Built teardown plan");
    println!("{}", render(&tree));
    Ok(())
}
