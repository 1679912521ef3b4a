//! Stack model
//!
//! A stack is a named group of remote resources created, updated and deleted
//! as one unit. Each cluster owns one control-plane stack, one stack per node
//! group and one stack per IAM service account.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strata_common::{Error, Result};

/// Tag carrying the owning cluster's name
pub const CLUSTER_NAME_TAG: &str = "strata.io/cluster-name";
/// Tag carrying a node group's name on its stack
pub const NODE_GROUP_NAME_TAG: &str = "strata.io/nodegroup-name";
/// Tag carrying `namespace/name` of an IAM service account on its stack
pub const SERVICE_ACCOUNT_NAME_TAG: &str = "strata.io/iamserviceaccount-name";

const NODE_GROUP_INFIX: &str = "-nodegroup-";

/// Control-plane stack name for a cluster
pub fn cluster_stack_name(cluster: &str) -> String {
    format!("strata-{cluster}-cluster")
}

/// Stack name for a node group
pub fn node_group_stack_name(cluster: &str, node_group: &str) -> String {
    format!("strata-{cluster}{NODE_GROUP_INFIX}{node_group}")
}

/// Stack name for an IAM service account
pub fn service_account_stack_name(cluster: &str, sa: &ServiceAccountRef) -> String {
    format!(
        "strata-{cluster}-addon-iamserviceaccount-{}-{}",
        sa.namespace, sa.name
    )
}

/// What a stack provisions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StackKind {
    /// The cluster control plane
    Cluster,
    /// A node group
    NodeGroup,
    /// An IAM role bound to a Kubernetes service account
    ServiceAccount,
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StackKind::Cluster => "cluster",
            StackKind::NodeGroup => "nodegroup",
            StackKind::ServiceAccount => "iamserviceaccount",
        })
    }
}

/// Remote stack status
///
/// Statuses the lifecycle code branches on get their own variant; anything
/// else is preserved verbatim in `Other`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StackStatus {
    /// CREATE_IN_PROGRESS
    CreateInProgress,
    /// CREATE_COMPLETE
    CreateComplete,
    /// CREATE_FAILED
    CreateFailed,
    /// UPDATE_IN_PROGRESS
    UpdateInProgress,
    /// UPDATE_COMPLETE
    UpdateComplete,
    /// ROLLBACK_COMPLETE
    RollbackComplete,
    /// DELETE_IN_PROGRESS
    DeleteInProgress,
    /// DELETE_COMPLETE
    DeleteComplete,
    /// DELETE_FAILED
    DeleteFailed,
    /// Any other status string
    Other(String),
}

impl StackStatus {
    /// Status string as reported by the stack API
    pub fn as_str(&self) -> &str {
        match self {
            StackStatus::CreateInProgress => "CREATE_IN_PROGRESS",
            StackStatus::CreateComplete => "CREATE_COMPLETE",
            StackStatus::CreateFailed => "CREATE_FAILED",
            StackStatus::UpdateInProgress => "UPDATE_IN_PROGRESS",
            StackStatus::UpdateComplete => "UPDATE_COMPLETE",
            StackStatus::RollbackComplete => "ROLLBACK_COMPLETE",
            StackStatus::DeleteInProgress => "DELETE_IN_PROGRESS",
            StackStatus::DeleteComplete => "DELETE_COMPLETE",
            StackStatus::DeleteFailed => "DELETE_FAILED",
            StackStatus::Other(s) => s,
        }
    }
}

impl From<String> for StackStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "CREATE_IN_PROGRESS" => StackStatus::CreateInProgress,
            "CREATE_COMPLETE" => StackStatus::CreateComplete,
            "CREATE_FAILED" => StackStatus::CreateFailed,
            "UPDATE_IN_PROGRESS" => StackStatus::UpdateInProgress,
            "UPDATE_COMPLETE" => StackStatus::UpdateComplete,
            "ROLLBACK_COMPLETE" => StackStatus::RollbackComplete,
            "DELETE_IN_PROGRESS" => StackStatus::DeleteInProgress,
            "DELETE_COMPLETE" => StackStatus::DeleteComplete,
            "DELETE_FAILED" => StackStatus::DeleteFailed,
            _ => StackStatus::Other(s),
        }
    }
}

impl From<&str> for StackStatus {
    fn from(s: &str) -> Self {
        StackStatus::from(s.to_string())
    }
}

impl From<StackStatus> for String {
    fn from(status: StackStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor of one remote stack as returned by describe-stacks
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    /// Stack name
    pub name: String,
    /// Remote stack id, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,
    /// What the stack provisions
    pub kind: StackKind,
    /// Last reported status
    pub status: StackStatus,
    /// Stack tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Stack {
    /// Create a stack descriptor without tags
    pub fn new(name: impl Into<String>, kind: StackKind, status: StackStatus) -> Self {
        Self {
            name: name.into(),
            stack_id: None,
            kind,
            status,
            tags: BTreeMap::new(),
        }
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Node group name: the name tag, else the suffix after `-nodegroup-`
    pub fn node_group_name(&self) -> &str {
        if let Some(name) = self.tags.get(NODE_GROUP_NAME_TAG) {
            return name;
        }
        self.name
            .split_once(NODE_GROUP_INFIX)
            .map(|(_, ng)| ng)
            .unwrap_or(&self.name)
    }

    /// Service account `namespace/name`: the name tag, else the stack name
    pub fn service_account_name(&self) -> &str {
        self.tags
            .get(SERVICE_ACCOUNT_NAME_TAG)
            .map(String::as_str)
            .unwrap_or(&self.name)
    }
}

/// Handle to a remote stack operation that has been accepted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationHandle {
    /// Stack the operation acts on
    pub stack: String,
    /// Remote operation or request id
    pub id: String,
}

/// A Kubernetes service account identified by `namespace/name`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceAccountRef {
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
}

impl ServiceAccountRef {
    /// Parse `namespace/name`
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(Error::precondition(format!(
                "unexpected serviceaccount name format {s:?} (expected namespace/name)"
            ))),
        }
    }
}

impl fmt::Display for ServiceAccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!(StackStatus::from("DELETE_FAILED"), StackStatus::DeleteFailed);
        assert_eq!(StackStatus::DeleteComplete.to_string(), "DELETE_COMPLETE");

        let unknown = StackStatus::from("IMPORT_IN_PROGRESS");
        assert_eq!(unknown, StackStatus::Other("IMPORT_IN_PROGRESS".to_string()));
        assert_eq!(unknown.as_str(), "IMPORT_IN_PROGRESS");
    }

    #[test]
    fn node_group_name_prefers_tag() {
        let tagged = Stack::new("anything", StackKind::NodeGroup, StackStatus::CreateComplete)
            .with_tag(NODE_GROUP_NAME_TAG, "workers");
        assert_eq!(tagged.node_group_name(), "workers");

        let untagged = Stack::new(
            node_group_stack_name("demo", "gpu"),
            StackKind::NodeGroup,
            StackStatus::CreateComplete,
        );
        assert_eq!(untagged.node_group_name(), "gpu");
    }

    #[test]
    fn service_account_refs_parse_namespace_and_name() {
        let sa = ServiceAccountRef::parse("kube-system/aws-node").unwrap();
        assert_eq!(sa.namespace, "kube-system");
        assert_eq!(sa.name, "aws-node");
        assert_eq!(sa.to_string(), "kube-system/aws-node");
        assert_eq!(
            service_account_stack_name("demo", &sa),
            "strata-demo-addon-iamserviceaccount-kube-system-aws-node"
        );

        for bad in ["aws-node", "/aws-node", "kube-system/", "a/b/c"] {
            assert!(ServiceAccountRef::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn stacks_deserialize_from_inventory_yaml_shape() {
        let stack: Stack = serde_json::from_value(serde_json::json!({
            "name": "strata-demo-nodegroup-ng-1",
            "kind": "node-group",
            "status": "DELETE_FAILED",
        }))
        .unwrap();
        assert_eq!(stack.kind, StackKind::NodeGroup);
        assert_eq!(stack.status, StackStatus::DeleteFailed);
        assert!(stack.tags.is_empty());
    }
}
