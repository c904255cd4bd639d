/*!

A [`ClusterManager`] that keeps its "cloud" in memory so that the apply workflow can be tested
without cloud credentials. Every manager created from the same [`MockCloud`] sees the same cloud
state.

!*/

pub(crate) mod admin_client;

use admin_client::MockAdminClient;
use async_trait::async_trait;
use pharmer_cloud::provider::{
    CloudRegistry, ClusterManager, IntoProviderError, ProviderError, ProviderResult, Resources,
};
use pharmer_cloud::{AdminClient, Scope};
use pharmer_model::{Action, ActionType, AuthInfo, Cluster, KubeConfig, NodeSpec};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) const PROVIDER: &str = "mock";
pub(crate) const KUBE_SYSTEM_UID: &str = "d2a0ed4c-kube-system";
pub(crate) const ENDPOINT: &str = "10.1.2.3";

#[derive(Debug, Default)]
pub(crate) struct CloudState {
    pub(crate) cluster_exists: bool,
    pub(crate) pools: BTreeMap<String, i32>,
    pub(crate) fail_prepare: bool,
    pub(crate) fail_scale: bool,
    pub(crate) connected: usize,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct MockCloud {
    state: Arc<Mutex<CloudState>>,
}

impl MockCloud {
    pub(crate) fn state(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn registry(&self) -> CloudRegistry {
        let cloud = self.clone();
        let mut registry = CloudRegistry::new();
        registry.register(PROVIDER, move || {
            Box::new(MockManager {
                cloud: cloud.clone(),
            })
        });
        registry
    }
}

pub(crate) struct MockManager {
    cloud: MockCloud,
}

#[async_trait]
impl ClusterManager for MockManager {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn set_default_cluster(&self, cluster: &mut Cluster) -> ProviderResult<()> {
        if cluster.spec.config.cloud.zone.is_empty() {
            cluster.spec.config.cloud.zone = "mock-1a".to_string();
        }
        Ok(())
    }

    fn default_node_spec(&self, _cluster: &Cluster, sku: &str) -> ProviderResult<NodeSpec> {
        Ok(NodeSpec {
            sku: sku.to_string(),
            disk_size: 100,
            ..NodeSpec::default()
        })
    }

    async fn set_cloud_connector(&mut self, scope: &mut Scope) -> ProviderResult<()> {
        scope
            .credential()
            .await
            .context(Resources::Clear, "Unable to load credential")?;
        self.cloud.state().connected += 1;
        Ok(())
    }

    async fn prepare_cloud(
        &mut self,
        scope: &mut Scope,
        dry_run: bool,
    ) -> ProviderResult<Vec<Action>> {
        let mut state = self.cloud.state();
        if state.fail_prepare {
            return Err(ProviderError::new_with_context(
                Resources::Clear,
                "Quota exceeded",
            ));
        }
        if state.cluster_exists {
            return Ok(Vec::new());
        }
        if !dry_run {
            state.cluster_exists = true;
            scope.cluster.set_api_address(ENDPOINT);
        }
        Ok(vec![Action::new(
            ActionType::Add,
            "Cluster",
            format!("Cluster {} will be created", scope.cluster_name()),
        )])
    }

    async fn apply_scale(
        &mut self,
        scope: &mut Scope,
        dry_run: bool,
    ) -> ProviderResult<Vec<Action>> {
        if self.cloud.state().fail_scale {
            return Err(ProviderError::new_with_context(
                Resources::Remaining,
                "Node pool quota exceeded",
            ));
        }
        let machine_sets = scope
            .machine_sets()
            .await
            .context(Resources::Unknown, "Unable to list node groups")?;
        let store = scope.store.machine_sets(scope.cluster_name());
        let mut actions = Vec::new();
        for mut machine_set in machine_sets {
            let name = machine_set.name().to_string();
            let current = self.cloud.state().pools.get(&name).copied();
            let deleting = machine_set.is_marked_for_deletion();
            match (current, deleting) {
                (None, false) => {
                    actions.push(Action::new(ActionType::Add, &name, "create node pool"));
                    if !dry_run {
                        self.cloud
                            .state()
                            .pools
                            .insert(name.clone(), machine_set.spec.replicas);
                    }
                }
                (Some(_), true) | (None, true) => {
                    actions.push(Action::new(ActionType::Delete, &name, "delete node pool"));
                    if !dry_run {
                        self.cloud.state().pools.remove(&name);
                        store
                            .delete(&name)
                            .await
                            .context(Resources::Remaining, "Unable to delete node group")?;
                    }
                    continue;
                }
                (Some(size), false) if size != machine_set.spec.replicas => {
                    actions.push(Action::new(ActionType::Update, &name, "resize node pool"));
                    if !dry_run {
                        self.cloud
                            .state()
                            .pools
                            .insert(name.clone(), machine_set.spec.replicas);
                    }
                }
                (Some(_), false) => {}
            }
            if !dry_run {
                machine_set.status.replicas = machine_set.spec.replicas;
                store
                    .update_status(machine_set)
                    .await
                    .context(Resources::Remaining, "Unable to update node group status")?;
            }
        }
        Ok(actions)
    }

    async fn apply_delete(
        &mut self,
        scope: &mut Scope,
        dry_run: bool,
    ) -> ProviderResult<Vec<Action>> {
        let mut state = self.cloud.state();
        if !state.cluster_exists {
            return Ok(Vec::new());
        }
        if !dry_run {
            state.cluster_exists = false;
        }
        Ok(vec![Action::new(
            ActionType::Delete,
            "Cluster",
            format!("Cluster {} will be deleted", scope.cluster_name()),
        )])
    }

    async fn kube_config(&self, scope: &Scope) -> ProviderResult<KubeConfig> {
        let server = scope
            .cluster
            .api_server_url()
            .context(Resources::Remaining, "Cluster has no API server address")?;
        Ok(KubeConfig::new(
            scope.cluster_name(),
            server,
            b"mock-ca".to_vec(),
            AuthInfo::Token {
                token: "mock-token".to_string(),
            },
        ))
    }

    async fn admin_client(&self, _scope: &Scope) -> ProviderResult<Box<dyn AdminClient>> {
        Ok(Box::new(MockAdminClient {
            kube_system_uid: KUBE_SYSTEM_UID.to_string(),
        }))
    }
}
