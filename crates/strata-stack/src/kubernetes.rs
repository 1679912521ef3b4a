//! Kubernetes access for in-cluster cleanup
//!
//! The only in-cluster object the lifecycle code touches is the service
//! account bound to an IAM role. Clients are obtained lazily through a
//! [`ClientProvider`] when a task actually runs, so a cluster whose API server
//! is unreachable still produces a complete plan.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::api::{Api, DeleteParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
#[cfg(test)]
use mockall::automock;
use strata_common::{Error, Result};
use tracing::{debug, info};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Kubernetes operations used during teardown
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Delete a service account. An account that is already gone is not an error.
    async fn delete_service_account(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Lazily obtains a Kubernetes client
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Build or fetch a client; failures surface when the calling task runs
    async fn client(&self) -> Result<Arc<dyn KubeClient>>;
}

/// [`KubeClient`] backed by kube-rs
#[derive(Clone)]
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn delete_service_account(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);

        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(namespace = %namespace, service_account = %name, "Deleted serviceaccount");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(namespace = %namespace, service_account = %name, "Serviceaccount not found (already deleted)");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// [`ClientProvider`] that builds a client from a kubeconfig file, or from the
/// inferred environment when no path is given
#[derive(Clone, Debug)]
pub struct KubeconfigClientProvider {
    kubeconfig: Option<PathBuf>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl KubeconfigClientProvider {
    /// Provider for an optional kubeconfig path with default timeouts
    pub fn new(kubeconfig: Option<PathBuf>) -> Self {
        Self {
            kubeconfig,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    async fn load_config(&self) -> Result<Config> {
        match &self.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::internal_with_context(
                        "kube-client",
                        format!("failed to read kubeconfig {}: {}", path.display(), e),
                    )
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| {
                        Error::internal_with_context(
                            "kube-client",
                            format!("failed to load kubeconfig: {}", e),
                        )
                    })
            }
            None => Config::infer().await.map_err(|e| {
                Error::internal_with_context(
                    "kube-client",
                    format!("failed to infer config: {}", e),
                )
            }),
        }
    }
}

#[async_trait]
impl ClientProvider for KubeconfigClientProvider {
    async fn client(&self) -> Result<Arc<dyn KubeClient>> {
        let mut config = self.load_config().await?;
        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = Some(self.read_timeout);

        let client = Client::try_from(config).map_err(|e| {
            Error::internal_with_context("kube-client", format!("failed to create client: {}", e))
        })?;
        Ok(Arc::new(KubeClientImpl::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_kubeconfig_fails_only_when_client_is_requested() {
        let provider = KubeconfigClientProvider::new(Some(PathBuf::from(
            "/nonexistent/strata/kubeconfig",
        )));

        let err = match provider.client().await {
            Ok(_) => panic!("expected kubeconfig read to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Internal { ref context, .. } if context == "kube-client"));
        assert!(err.to_string().contains("/nonexistent/strata/kubeconfig"));
    }
}
