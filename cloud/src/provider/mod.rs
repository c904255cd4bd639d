/*!

A cloud provider plugs into pharmer by implementing [`ClusterManager`] and registering a factory
for it in a [`CloudRegistry`]. Operations return a [`ProviderResult`] so that a failure always says
whether cloud resources were left behind.

!*/

mod error;

pub use error::{AsResources, IntoProviderError, ProviderError, ProviderResult, Resources};

use crate::admin::{AdminClient, KubeAdminClient};
use crate::scope::Scope;
use async_trait::async_trait;
use pharmer_model::{Action, Cluster, KubeConfig, NodeSpec};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Drives one cloud provider's managed Kubernetes offering.
///
/// A manager is created fresh for every command. `set_cloud_connector` is always called before
/// any of the methods that talk to the cloud.
#[async_trait]
pub trait ClusterManager: Send + Sync {
    /// The provider name stored in `CloudSpec::cloud_provider`, e.g. `gke`.
    fn provider_name(&self) -> &'static str;

    /// Fills in provider defaults of a cluster that is about to be created. Must not contact the
    /// cloud.
    fn set_default_cluster(&self, cluster: &mut Cluster) -> ProviderResult<()>;

    /// The node spec used for new node groups of the given SKU.
    fn default_node_spec(&self, cluster: &Cluster, sku: &str) -> ProviderResult<NodeSpec>;

    /// Loads and validates the cluster credential and builds the API clients.
    async fn set_cloud_connector(&mut self, scope: &mut Scope) -> ProviderResult<()>;

    /// Makes sure the cloud side of the cluster exists and is usable, creating it if needed.
    async fn prepare_cloud(&mut self, scope: &mut Scope, dry_run: bool)
        -> ProviderResult<Vec<Action>>;

    /// Reconciles every node group of the cluster with the cloud.
    async fn apply_scale(&mut self, scope: &mut Scope, dry_run: bool)
        -> ProviderResult<Vec<Action>>;

    /// Deletes the cloud side of the cluster.
    async fn apply_delete(&mut self, scope: &mut Scope, dry_run: bool)
        -> ProviderResult<Vec<Action>>;

    /// Admin credentials for the cluster's API server.
    async fn kube_config(&self, scope: &Scope) -> ProviderResult<KubeConfig>;

    async fn admin_client(&self, scope: &Scope) -> ProviderResult<Box<dyn AdminClient>> {
        let konfig = self.kube_config(scope).await?;
        let client = KubeAdminClient::from_kube_config(&konfig)
            .await
            .context(Resources::Remaining, "Unable to create Kubernetes client")?;
        Ok(Box::new(client))
    }
}

/// Creates a new [`ClusterManager`].
pub type ManagerFactory = Arc<dyn Fn() -> Box<dyn ClusterManager> + Send + Sync>;

/// The cluster managers pharmer knows about, by provider name.
#[derive(Clone, Default)]
pub struct CloudRegistry {
    factories: BTreeMap<String, ManagerFactory>,
}

impl CloudRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S, F>(&mut self, name: S, factory: F)
    where
        S: Into<String>,
        F: Fn() -> Box<dyn ClusterManager> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// A new manager for `name`.
    pub fn manager(&self, name: &str) -> crate::Result<Box<dyn ClusterManager>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| {
                crate::error::UnknownProviderSnafu {
                    name,
                    known: self.names().collect::<Vec<_>>().join(", "),
                }
                .build()
            })?;
        Ok(factory())
    }
}

impl Debug for CloudRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
