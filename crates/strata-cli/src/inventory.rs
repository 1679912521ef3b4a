//! Offline inventory snapshots
//!
//! A snapshot describes one cluster's stacks and whether its OIDC provider
//! exists:
//!
//! ```yaml
//! cluster: demo
//! oidc_provider: true
//! stacks:
//!   - name: strata-demo-cluster
//!     kind: cluster
//!     status: CREATE_COMPLETE
//!   - name: strata-demo-nodegroup-ng-1
//!     kind: node-group
//!     status: DELETE_FAILED
//! ```
//!
//! [`SnapshotBackend`] answers every describe call from the snapshot and
//! refuses every mutating call, so plans built from it have no side effects.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use strata_stack::{
    ClientProvider, IdentityProvider, KubeClient, NamedOperation, OperationHandle, Stack,
    StackApi, StackKind,
};
use tracing::debug;

use crate::{Error, Result};

/// One cluster's stacks at a point in time
#[derive(Clone, Debug, Deserialize)]
pub struct Inventory {
    /// Cluster name
    pub cluster: String,
    /// Whether the cluster's OIDC provider exists
    #[serde(default)]
    pub oidc_provider: bool,
    /// Every stack belonging to the cluster
    #[serde(default)]
    pub stacks: Vec<Stack>,
}

impl Inventory {
    /// Read and validate a YAML snapshot
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let inventory: Inventory = serde_yaml::from_str(&data)?;
        inventory
            .validate()
            .map_err(|message| Error::invalid_inventory(path, message))?;
        debug!(
            path = %path.display(),
            cluster = %inventory.cluster,
            stacks = inventory.stacks.len(),
            "Loaded inventory"
        );
        Ok(inventory)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.cluster.trim().is_empty() {
            return Err("cluster name must not be empty".to_string());
        }
        let mut seen = BTreeSet::new();
        for stack in &self.stacks {
            if !seen.insert(stack.name.as_str()) {
                return Err(format!("duplicate stack {:?}", stack.name));
            }
        }
        Ok(())
    }
}

/// Read-only collaborator implementations over an [`Inventory`]
#[derive(Clone, Debug)]
pub struct SnapshotBackend {
    inventory: Arc<Inventory>,
}

impl SnapshotBackend {
    /// Backend answering from `inventory`
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory: Arc::new(inventory),
        }
    }

    fn read_only(&self, what: &str) -> strata_common::Error {
        strata_common::Error::stack_api(
            &self.inventory.cluster,
            format!("{what} is not possible against an inventory snapshot"),
        )
    }
}

#[async_trait]
impl StackApi for SnapshotBackend {
    async fn describe_stacks(
        &self,
        cluster: &str,
        kind: StackKind,
    ) -> strata_common::Result<Vec<Stack>> {
        if cluster != self.inventory.cluster {
            return Ok(Vec::new());
        }
        Ok(self
            .inventory
            .stacks
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect())
    }

    async fn describe_stack(&self, name: &str) -> strata_common::Result<Option<Stack>> {
        Ok(self.inventory.stacks.iter().find(|s| s.name == name).cloned())
    }

    async fn delete_stack(&self, stack: &Stack) -> strata_common::Result<OperationHandle> {
        Err(self.read_only(&format!("deleting stack {}", stack.name)))
    }
}

#[async_trait]
impl IdentityProvider for SnapshotBackend {
    async fn exists(&self) -> strata_common::Result<bool> {
        Ok(self.inventory.oidc_provider)
    }

    async fn delete_provider(&self) -> strata_common::Result<()> {
        Err(self.read_only("deleting the OIDC provider"))
    }
}

#[async_trait]
impl ClientProvider for SnapshotBackend {
    async fn client(&self) -> strata_common::Result<Arc<dyn KubeClient>> {
        Err(self.read_only("connecting to the cluster"))
    }
}

#[async_trait]
impl NamedOperation for SnapshotBackend {
    async fn call(&self, name: &str) -> strata_common::Result<()> {
        Err(self.read_only(&format!("cleaning up nodegroup {name}")))
    }
}
