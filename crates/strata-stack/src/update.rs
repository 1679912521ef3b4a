//! In-place cluster updates: control-plane logging and Kubernetes version
//!
//! Both updates are asynchronous on the remote side. They return an
//! [`Update`] handle, and the blocking variants poll it with the [`Waiter`]
//! until it is `Successful`, or fail on `Failed` / `Cancelled`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use strata_common::{Error, Result, WaitConfig, Waiter};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Control-plane log types the cluster API accepts
pub const SUPPORTED_LOG_TYPES: [&str; 5] = [
    "api",
    "audit",
    "authenticator",
    "controllerManager",
    "scheduler",
];

/// Status of a remote cluster update
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateStatus {
    /// Still being applied
    InProgress,
    /// Applied
    Successful,
    /// Rejected or failed while applying
    Failed,
    /// Cancelled before it was applied
    Cancelled,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UpdateStatus::InProgress => "InProgress",
            UpdateStatus::Successful => "Successful",
            UpdateStatus::Failed => "Failed",
            UpdateStatus::Cancelled => "Cancelled",
        })
    }
}

/// Handle to a remote cluster update
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Update id used to describe it later
    pub id: String,
    /// What is being updated, e.g. `LoggingUpdate` or `VersionUpdate`
    pub update_type: String,
    /// Last reported status
    pub status: UpdateStatus,
}

/// A group of log types that share an enabled flag
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSetup {
    /// Whether the types are enabled
    pub enabled: bool,
    /// Log type names
    pub types: Vec<String>,
}

/// Desired logging state, split into the types to enable and to disable
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoggingChange {
    /// Types to enable
    pub enabled: BTreeSet<String>,
    /// Every other supported type
    pub disabled: BTreeSet<String>,
}

impl LoggingChange {
    /// Enable `enabled` and disable the rest of `all`
    pub fn new(all: &BTreeSet<String>, enabled: &BTreeSet<String>) -> Result<Self> {
        let unsupported: Vec<&str> = enabled.difference(all).map(String::as_str).collect();
        if !unsupported.is_empty() {
            return Err(Error::precondition(format!(
                "unsupported log types: {}",
                unsupported.join(", ")
            )));
        }
        Ok(Self {
            enabled: enabled.clone(),
            disabled: all.difference(enabled).cloned().collect(),
        })
    }

    /// The request body: one enabled and one disabled group
    pub fn log_setups(&self) -> Vec<LogSetup> {
        vec![
            LogSetup {
                enabled: true,
                types: self.enabled.iter().cloned().collect(),
            },
            LogSetup {
                enabled: false,
                types: self.disabled.iter().cloned().collect(),
            },
        ]
    }

    /// `enabled types: a, b` or `no types enabled`
    pub fn describe_enabled(&self) -> String {
        describe_types(&self.enabled, "enabled")
    }

    /// `disabled types: a, b` or `no types disabled`
    pub fn describe_disabled(&self) -> String {
        describe_types(&self.disabled, "disabled")
    }
}

fn describe_types(types: &BTreeSet<String>, state: &str) -> String {
    if types.is_empty() {
        return format!("no types {state}");
    }
    let names: Vec<&str> = types.iter().map(String::as_str).collect();
    format!("{state} types: {}", names.join(", "))
}

/// Remote cluster API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Current logging configuration
    async fn describe_logging(&self, cluster: &str) -> Result<Vec<LogSetup>>;

    /// Request a logging configuration change
    async fn update_logging(&self, cluster: &str, setups: Vec<LogSetup>) -> Result<Update>;

    /// Request a Kubernetes version upgrade
    async fn update_version(&self, cluster: &str, version: &str) -> Result<Update>;

    /// Describe an update by id
    async fn describe_update(&self, cluster: &str, update_id: &str) -> Result<Update>;
}

/// Applies updates to one cluster
#[derive(Clone)]
pub struct ClusterUpdater {
    api: Arc<dyn ClusterApi>,
    cluster: String,
    wait: WaitConfig,
}

impl ClusterUpdater {
    /// Updater for `cluster`
    pub fn new(api: Arc<dyn ClusterApi>, cluster: impl Into<String>, wait: WaitConfig) -> Self {
        Self {
            api,
            cluster: cluster.into(),
            wait,
        }
    }

    /// Currently enabled and disabled log types
    pub async fn current_logging(&self) -> Result<(BTreeSet<String>, BTreeSet<String>)> {
        let mut enabled = BTreeSet::new();
        let mut disabled = BTreeSet::new();

        for setup in self.api.describe_logging(&self.cluster).await? {
            for log_type in setup.types {
                if log_type.is_empty() {
                    return Err(Error::stack_api(
                        &self.cluster,
                        "unexpected response from cluster API: empty log type",
                    ));
                }
                if setup.enabled {
                    enabled.insert(log_type);
                } else {
                    disabled.insert(log_type);
                }
            }
        }
        Ok((enabled, disabled))
    }

    /// Enable exactly `enable` out of `all`, disabling the rest, and wait for
    /// the change to apply
    pub async fn update_logging(
        &self,
        all: &BTreeSet<String>,
        enable: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> Result<LoggingChange> {
        let change = LoggingChange::new(all, enable)?;
        let update = self
            .api
            .update_logging(&self.cluster, change.log_setups())
            .await?;
        self.wait_for_update(&update, cancel).await?;

        info!(
            cluster = %self.cluster,
            "Configured logging ({} & {})",
            change.describe_enabled(),
            change.describe_disabled()
        );
        Ok(change)
    }

    /// Request a version upgrade without waiting for it
    pub async fn update_version(&self, version: &str) -> Result<Update> {
        let update = self.api.update_version(&self.cluster, version).await?;
        info!(cluster = %self.cluster, version, update_id = %update.id, "Version update requested");
        Ok(update)
    }

    /// Request a version upgrade and wait for it to apply
    pub async fn update_version_blocking(
        &self,
        version: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let update = self.update_version(version).await?;
        self.wait_for_update(&update, cancel).await
    }

    /// Poll `update` until it is `Successful`, `Failed` or `Cancelled`
    pub async fn wait_for_update(&self, update: &Update, cancel: &CancellationToken) -> Result<()> {
        let api = self.api.clone();
        let cluster = self.cluster.clone();
        let id = update.id.clone();

        Waiter::new(
            &self.cluster,
            format!(
                "waiting for requested {:?} in cluster {:?} to succeed",
                update.update_type, self.cluster
            ),
            UpdateStatus::Successful,
            self.wait.clone(),
        )
        .with_failures([UpdateStatus::Failed, UpdateStatus::Cancelled])
        .wait(
            cancel,
            move || {
                let api = api.clone();
                let cluster = cluster.clone();
                let id = id.clone();
                async move { api.describe_update(&cluster, &id).await }
            },
            |current: &Update| current.status,
        )
        .await
    }
}

/// Every supported log type
pub fn all_log_types() -> BTreeSet<String> {
    SUPPORTED_LOG_TYPES.iter().map(|t| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn update(status: UpdateStatus) -> Update {
        Update {
            id: "upd-1".to_string(),
            update_type: "VersionUpdate".to_string(),
            status,
        }
    }

    fn updater(api: MockClusterApi) -> ClusterUpdater {
        ClusterUpdater::new(
            Arc::new(api),
            "demo",
            WaitConfig::fixed(Duration::from_secs(300), Duration::from_secs(10)),
        )
    }

    /// Describe-update replays `statuses`, repeating the last one
    fn replay(api: &mut MockClusterApi, statuses: Vec<UpdateStatus>) -> Arc<AtomicU32> {
        let polls = Arc::new(AtomicU32::new(0));
        let seen = polls.clone();
        api.expect_describe_update()
            .with(eq("demo"), eq("upd-1"))
            .returning(move |_, _| {
                let n = seen.fetch_add(1, Ordering::SeqCst) as usize;
                Ok(update(statuses[n.min(statuses.len() - 1)]))
            });
        polls
    }

    // ==========================================================================
    // Story: logging changes are computed as a two-set diff
    // ==========================================================================

    #[test]
    fn logging_change_disables_everything_not_enabled() {
        let change = LoggingChange::new(&all_log_types(), &set(&["api", "audit"])).unwrap();

        assert_eq!(change.enabled, set(&["api", "audit"]));
        assert_eq!(
            change.disabled,
            set(&["authenticator", "controllerManager", "scheduler"])
        );
        assert_eq!(change.describe_enabled(), "enabled types: api, audit");
        assert_eq!(
            change.describe_disabled(),
            "disabled types: authenticator, controllerManager, scheduler"
        );
    }

    #[test]
    fn logging_change_describes_empty_sides() {
        let none = LoggingChange::new(&all_log_types(), &BTreeSet::new()).unwrap();
        assert_eq!(none.describe_enabled(), "no types enabled");

        let all = LoggingChange::new(&all_log_types(), &all_log_types()).unwrap();
        assert_eq!(all.describe_disabled(), "no types disabled");
        assert_eq!(all.log_setups()[1].types, Vec::<String>::new());
    }

    #[test]
    fn unsupported_log_types_are_rejected() {
        let err = LoggingChange::new(&all_log_types(), &set(&["api", "kubelet"])).unwrap_err();
        assert!(err.to_string().contains("kubelet"));
    }

    #[tokio::test]
    async fn current_logging_splits_enabled_and_disabled() {
        let mut api = MockClusterApi::new();
        api.expect_describe_logging().with(eq("demo")).returning(|_| {
            Ok(vec![
                LogSetup {
                    enabled: true,
                    types: vec!["api".to_string()],
                },
                LogSetup {
                    enabled: false,
                    types: vec!["audit".to_string(), "scheduler".to_string()],
                },
            ])
        });

        let (enabled, disabled) = updater(api).current_logging().await.unwrap();

        assert_eq!(enabled, set(&["api"]));
        assert_eq!(disabled, set(&["audit", "scheduler"]));
    }

    #[tokio::test]
    async fn empty_log_type_is_an_unexpected_response() {
        let mut api = MockClusterApi::new();
        api.expect_describe_logging().returning(|_| {
            Ok(vec![LogSetup {
                enabled: true,
                types: vec![String::new()],
            }])
        });

        let err = updater(api).current_logging().await.unwrap_err();
        assert!(matches!(err, Error::StackApi { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn update_logging_sends_both_groups_and_waits() {
        let mut api = MockClusterApi::new();
        api.expect_update_logging()
            .withf(|cluster, setups| {
                cluster == "demo"
                    && setups.len() == 2
                    && setups[0].enabled
                    && setups[0].types == vec!["api".to_string()]
                    && !setups[1].enabled
                    && setups[1].types.len() == 4
            })
            .times(1)
            .returning(|_, _| Ok(update(UpdateStatus::InProgress)));
        let polls = replay(
            &mut api,
            vec![UpdateStatus::InProgress, UpdateStatus::Successful],
        );

        let change = updater(api)
            .update_logging(&all_log_types(), &set(&["api"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(change.enabled, set(&["api"]));
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    // ==========================================================================
    // Story: version upgrades, fire-and-forget or blocking
    // ==========================================================================

    #[tokio::test]
    async fn non_blocking_version_update_never_polls() {
        let mut api = MockClusterApi::new();
        api.expect_update_version()
            .with(eq("demo"), eq("1.31"))
            .times(1)
            .returning(|_, _| Ok(update(UpdateStatus::InProgress)));
        api.expect_describe_update().never();

        let handle = updater(api).update_version("1.31").await.unwrap();
        assert_eq!(handle.id, "upd-1");
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_version_update_classifies_terminal_states() {
        for terminal in [UpdateStatus::Failed, UpdateStatus::Cancelled] {
            let mut api = MockClusterApi::new();
            api.expect_update_version()
                .returning(|_, _| Ok(update(UpdateStatus::InProgress)));
            let polls = replay(&mut api, vec![UpdateStatus::InProgress, terminal]);

            let err = updater(api)
                .update_version_blocking("1.31", &CancellationToken::new())
                .await
                .unwrap_err();

            match err {
                Error::WaitFailed {
                    resource,
                    operation,
                    state,
                } => {
                    assert_eq!(resource, "demo");
                    assert!(operation.contains("VersionUpdate"));
                    assert_eq!(state, terminal.to_string());
                }
                other => panic!("expected WaitFailed, got {other:?}"),
            }
            assert_eq!(polls.load(Ordering::SeqCst), 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_version_update_times_out_with_last_state() {
        let mut api = MockClusterApi::new();
        api.expect_update_version()
            .returning(|_, _| Ok(update(UpdateStatus::InProgress)));
        replay(&mut api, vec![UpdateStatus::InProgress]);

        let err = updater(api)
            .update_version_blocking("1.31", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::WaitTimeout { last_state: Some(ref s), .. } if s == "InProgress"
        ));
    }
}
