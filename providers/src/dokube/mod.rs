/*!

DigitalOcean Kubernetes. A cluster is identified by the id DigitalOcean assigns to it, which is
kept in the cluster's `dokube` spec as soon as the cluster is created.

!*/

pub(crate) mod api;

use crate::node_group::{apply_node_groups, NodePool, NodePools};
use api::{
    parse_kubeconfig, ClusterAccess, ClusterCreateRequest, DigitalOceanApi, DoClient, DoNodePool,
    NodePoolRequest, STATE_ERRORED, STATE_PROVISIONING,
};
use async_trait::async_trait;
use log::{debug, info};
use pharmer_cloud::certificates;
use pharmer_cloud::provider::{
    ClusterManager, IntoProviderError, ProviderError, ProviderResult, Resources,
};
use pharmer_cloud::wait::poll_immediate;
use pharmer_cloud::Scope;
use pharmer_model::constants::{ADMIN_CERT_NAME, PROVIDER_DOKUBE, RETRY_INTERVAL, RETRY_TIMEOUT};
use pharmer_model::{
    Action, ActionType, AuthInfo, Cluster, DigitalOcean, DokubeSpec, KubeConfig, MachineSet,
    NodeSpec,
};
use pharmer_store::KeyPair;
use std::sync::Arc;

#[derive(Default)]
pub struct DokubeManager {
    api: Option<Arc<dyn DigitalOceanApi>>,
}

impl DokubeManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_api(api: Arc<dyn DigitalOceanApi>) -> Self {
        Self { api: Some(api) }
    }

    fn api(&self) -> ProviderResult<&dyn DigitalOceanApi> {
        self.api
            .as_deref()
            .context(Resources::Clear, "DigitalOcean cloud connector is not set")
    }

    async fn cluster_access(&self, cluster_id: &str) -> ProviderResult<ClusterAccess> {
        let yaml = self
            .api()?
            .kubeconfig(cluster_id)
            .await
            .context(Resources::Remaining, "Unable to fetch kubeconfig")?;
        parse_kubeconfig(&yaml).context(Resources::Remaining, "Unable to read kubeconfig")
    }
}

fn cluster_id(cluster: &Cluster) -> &str {
    cluster
        .spec
        .config
        .cloud
        .dokube
        .as_ref()
        .map(|dokube| dokube.cluster_id.as_str())
        .unwrap_or_default()
}

fn node_pool_request(machine_set: &MachineSet) -> NodePoolRequest {
    NodePoolRequest {
        name: machine_set.name().to_string(),
        size: machine_set.node_spec().sku.clone(),
        count: machine_set.spec.replicas,
    }
}

/// Polls the cluster until it has left the `provisioning` state.
async fn wait_for_cluster(api: &dyn DigitalOceanApi, id: &str) -> ProviderResult<()> {
    let mut attempt = 0u32;
    poll_immediate(RETRY_INTERVAL, RETRY_TIMEOUT, || {
        attempt += 1;
        let attempt = attempt;
        async move {
            match api.get_cluster(id).await {
                Ok(Some(cluster)) if cluster.status.state == STATE_ERRORED => {
                    Err(ProviderError::new_with_context(
                        Resources::Remaining,
                        format!(
                            "DigitalOcean cluster '{}' failed: {}",
                            id, cluster.status.message
                        ),
                    ))
                }
                Ok(Some(cluster)) => {
                    info!(
                        "Waiting for cluster creation, attempt {}: '{}'",
                        attempt, cluster.status.state
                    );
                    Ok(cluster.status.state != STATE_PROVISIONING)
                }
                Ok(None) => Ok(false),
                Err(e) => {
                    debug!("Unable to read DigitalOcean cluster '{}': {}", id, e);
                    Ok(false)
                }
            }
        }
    })
    .await
    .context(
        Resources::Remaining,
        format!("DigitalOcean cluster '{}' did not finish provisioning", id),
    )
}

async fn wait_for_cluster_deletion(api: &dyn DigitalOceanApi, id: &str) -> ProviderResult<()> {
    poll_immediate(RETRY_INTERVAL, RETRY_TIMEOUT, move || async move {
        match api.get_cluster(id).await {
            Ok(found) => Ok::<_, ProviderError>(found.is_none()),
            Err(e) => {
                debug!("Unable to read DigitalOcean cluster '{}': {}", id, e);
                Ok(false)
            }
        }
    })
    .await
    .context(
        Resources::Remaining,
        format!("DigitalOcean cluster '{}' was not deleted", id),
    )
}

#[async_trait]
impl ClusterManager for DokubeManager {
    fn provider_name(&self) -> &'static str {
        PROVIDER_DOKUBE
    }

    fn set_default_cluster(&self, cluster: &mut Cluster) -> ProviderResult<()> {
        let cloud = &mut cluster.spec.config.cloud;
        if cloud.zone.is_empty() {
            return Err(ProviderError::new_with_context(
                Resources::Clear,
                "A zone is required for DigitalOcean clusters",
            ));
        }
        if cloud.region.is_empty() {
            cloud.region = cloud.zone.clone();
        }
        cloud.dokube.get_or_insert_with(DokubeSpec::default);
        Ok(())
    }

    fn default_node_spec(&self, _: &Cluster, sku: &str) -> ProviderResult<NodeSpec> {
        Ok(NodeSpec {
            sku: sku.to_string(),
            ..Default::default()
        })
    }

    async fn set_cloud_connector(&mut self, scope: &mut Scope) -> ProviderResult<()> {
        let credential = scope
            .credential()
            .await
            .context(Resources::Clear, "Unable to load DigitalOcean credential")?;
        let digitalocean = DigitalOcean::try_from(&credential).context(
            Resources::Clear,
            format!("Credential '{}' is not a DigitalOcean credential", credential.name()),
        )?;
        if self.api.is_none() {
            let client = DoClient::new(digitalocean.token())
                .context(Resources::Clear, "Unable to create DigitalOcean client")?;
            self.api = Some(Arc::new(client));
        }
        self.api()?.account().await.context(
            Resources::Clear,
            format!("Credential '{}' is not authorized", credential.name()),
        )?;
        Ok(())
    }

    async fn prepare_cloud(
        &mut self,
        scope: &mut Scope,
        dry_run: bool,
    ) -> ProviderResult<Vec<Action>> {
        let api = self.api()?;
        let name = scope.cluster_name().to_string();
        let mut actions = Vec::new();
        let mut id = cluster_id(&scope.cluster).to_string();

        if id.is_empty() {
            actions.push(Action::new(
                ActionType::Add,
                "Kubernetes cluster",
                format!("Kubernetes cluster {} will be created", name),
            ));
            if dry_run {
                return Ok(actions);
            }
            let machine_sets = scope
                .machine_sets()
                .await
                .context(Resources::Clear, "Unable to list node groups")?;
            let config = &scope.cluster.spec.config;
            let request = ClusterCreateRequest {
                name: name.clone(),
                region: config.cloud.zone.clone(),
                version: config.kubernetes_version.clone(),
                node_pools: machine_sets
                    .iter()
                    .filter(|ms| !ms.is_marked_for_deletion())
                    .map(node_pool_request)
                    .collect(),
            };
            info!("Creating DigitalOcean cluster '{}'", name);
            let created = api.create_cluster(&request).await.context(
                Resources::Clear,
                format!("Unable to create DigitalOcean cluster '{}'", name),
            )?;
            id = created.id;
            scope
                .cluster
                .spec
                .config
                .cloud
                .dokube
                .get_or_insert_with(DokubeSpec::default)
                .cluster_id = id.clone();
            // Without the id the cluster could not be found again.
            scope.update_cluster().await.context(
                Resources::Orphaned,
                format!("Unable to record id '{}' of cluster '{}'", id, name),
            )?;

            let store = scope.store.machine_sets(&name);
            for mut machine_set in machine_sets {
                if machine_set.is_marked_for_deletion() {
                    continue;
                }
                machine_set.status.replicas = machine_set.spec.replicas;
                store
                    .update_status(machine_set)
                    .await
                    .context(Resources::Remaining, "Unable to update node group status")?;
            }
        } else {
            actions.push(Action::new(
                ActionType::Nop,
                "Kubernetes cluster",
                format!("Kubernetes cluster {} exists", name),
            ));
            if dry_run {
                return Ok(actions);
            }
        }

        wait_for_cluster(api, &id).await?;
        let cluster = api
            .get_cluster(&id)
            .await
            .context(
                Resources::Remaining,
                format!("Unable to read DigitalOcean cluster '{}'", id),
            )?
            .context(
                Resources::Remaining,
                format!("DigitalOcean cluster '{}' does not exist", id),
            )?;
        info!("DigitalOcean cluster '{}' is '{}'", name, cluster.status.state);

        let access = self.cluster_access(&id).await?;
        certificates::store_cloud_ca(scope.store.as_ref(), &scope.cluster, access.ca_pem)
            .await
            .context(Resources::Remaining, "Unable to store cluster CA certificate")?;
        if let Some((cert, key)) = access.client_cert {
            certificates::replace_cert(
                scope.store.as_ref(),
                &name,
                ADMIN_CERT_NAME,
                KeyPair {
                    public: cert,
                    private: key,
                },
            )
            .await
            .context(Resources::Remaining, "Unable to store admin certificate")?;
        }
        scope.certs = None;

        if !cluster.endpoint.is_empty() {
            scope.cluster.set_api_address(cluster.endpoint.as_str());
        } else if !cluster.ipv4.is_empty() {
            scope.cluster.set_api_address(cluster.ipv4.as_str());
        }
        scope
            .update_cluster()
            .await
            .context(Resources::Remaining, "Unable to update cluster")?;
        Ok(actions)
    }

    async fn apply_scale(
        &mut self,
        scope: &mut Scope,
        dry_run: bool,
    ) -> ProviderResult<Vec<Action>> {
        let pools = DoPools {
            api: self.api()?,
            cluster_id: cluster_id(&scope.cluster).to_string(),
        };
        apply_node_groups(scope, &pools, dry_run).await
    }

    async fn apply_delete(
        &mut self,
        scope: &mut Scope,
        dry_run: bool,
    ) -> ProviderResult<Vec<Action>> {
        let api = self.api()?;
        let id = cluster_id(&scope.cluster).to_string();
        if id.is_empty() {
            debug!("Cluster '{}' was never created", scope.cluster_name());
            return Ok(Vec::new());
        }
        let existing = api.get_cluster(&id).await.context(
            Resources::Remaining,
            format!("Unable to read DigitalOcean cluster '{}'", id),
        )?;
        if existing.is_none() {
            debug!("DigitalOcean cluster '{}' is already gone", id);
            return Ok(Vec::new());
        }
        let actions = vec![Action::new(
            ActionType::Delete,
            "Kubernetes cluster",
            format!("Kubernetes cluster {} will be deleted", scope.cluster_name()),
        )];
        if !dry_run {
            info!("Deleting DigitalOcean cluster '{}'", id);
            api.delete_cluster(&id).await.context(
                Resources::Remaining,
                format!("Unable to delete DigitalOcean cluster '{}'", id),
            )?;
            wait_for_cluster_deletion(api, &id).await?;
        }
        Ok(actions)
    }

    async fn kube_config(&self, scope: &Scope) -> ProviderResult<KubeConfig> {
        let cluster = &scope.cluster;
        let store = scope.store.as_ref();
        let server = cluster
            .api_server_url()
            .context(Resources::Remaining, "DigitalOcean cluster has no endpoint yet")?;
        let ca = certificates::load_cert(store, cluster.name(), &cluster.spec.config.ca_cert_name)
            .await
            .and_then(|ca| ca.cert_pem())
            .context(Resources::Remaining, "Unable to load cluster CA certificate")?;
        // DigitalOcean tokens expire, so a fresh one is read every time.
        let access = self.cluster_access(cluster_id(cluster)).await?;
        let auth = match (access.token, access.client_cert) {
            (Some(token), _) => AuthInfo::Token { token },
            (None, Some((cert_pem, key_pem))) => AuthInfo::ClientCertificate { cert_pem, key_pem },
            (None, None) => {
                let admin = certificates::get_admin_cert(store, cluster)
                    .await
                    .context(Resources::Remaining, "Unable to load admin certificate")?;
                AuthInfo::ClientCertificate {
                    cert_pem: admin
                        .cert_pem()
                        .context(Resources::Remaining, "Unable to encode admin certificate")?,
                    key_pem: admin
                        .key_pem()
                        .context(Resources::Remaining, "Unable to encode admin key")?,
                }
            }
        };
        Ok(KubeConfig::new(cluster.name(), server, ca, auth))
    }
}

struct DoPools<'a> {
    api: &'a dyn DigitalOceanApi,
    cluster_id: String,
}

impl DoPools<'_> {
    async fn find(&self, name: &str) -> ProviderResult<Option<DoNodePool>> {
        let pools = self
            .api
            .list_node_pools(&self.cluster_id)
            .await
            .context(Resources::Remaining, "Unable to list node pools")?;
        Ok(pools.into_iter().find(|pool| pool.name == name))
    }

    async fn pool_id(&self, name: &str) -> ProviderResult<String> {
        Ok(self
            .find(name)
            .await?
            .context(
                Resources::Remaining,
                format!("Node pool '{}' does not exist", name),
            )?
            .id)
    }

    /// Waits until the pool's nodes have been provisioned, or until the pool is gone.
    async fn wait(&self, name: &str, gone: bool) -> ProviderResult<()> {
        poll_immediate(RETRY_INTERVAL, RETRY_TIMEOUT, || async move {
            match self.find(name).await {
                Ok(Some(pool)) => Ok::<_, ProviderError>(!gone && !pool.is_provisioning()),
                Ok(None) => Ok(gone),
                Err(e) => {
                    debug!("Unable to read node pool '{}': {}", name, e);
                    Ok(false)
                }
            }
        })
        .await
        .context(
            Resources::Remaining,
            format!("Timed out waiting for node pool '{}'", name),
        )
    }
}

#[async_trait]
impl NodePools for DoPools<'_> {
    async fn get(&self, name: &str) -> ProviderResult<Option<NodePool>> {
        Ok(self
            .find(name)
            .await?
            .map(|pool| NodePool { size: Some(pool.count) }))
    }

    async fn create(&self, machine_set: &MachineSet) -> ProviderResult<()> {
        let name = machine_set.name();
        self.api
            .create_node_pool(&self.cluster_id, &node_pool_request(machine_set))
            .await
            .context(
                Resources::Remaining,
                format!("Unable to create node pool '{}'", name),
            )?;
        self.wait(name, false).await
    }

    async fn resize(&self, machine_set: &MachineSet) -> ProviderResult<()> {
        let name = machine_set.name();
        let id = self.pool_id(name).await?;
        self.api
            .update_node_pool(&self.cluster_id, &id, &node_pool_request(machine_set))
            .await
            .context(
                Resources::Remaining,
                format!("Unable to resize node pool '{}'", name),
            )?;
        self.wait(name, false).await
    }

    async fn delete(&self, name: &str) -> ProviderResult<()> {
        let id = self.pool_id(name).await?;
        self.api
            .delete_node_pool(&self.cluster_id, &id)
            .await
            .context(
                Resources::Remaining,
                format!("Unable to delete node pool '{}'", name),
            )?;
        self.wait(name, true).await
    }
}
