/*!

Google Kubernetes Engine. The control plane is created with the node pools known at the time,
later node groups are reconciled one node pool at a time. Every mutating call returns a zone
operation that is polled until it is `DONE`.

!*/

pub(crate) mod api;

use crate::node_group::{apply_node_groups, NodePool, NodePools};
use api::{
    ClientCertificateConfig, ContainerApi, GkeClient, GkeCluster, GkeNodePool, MasterAuth,
    Network, NodeConfig, OPERATION_DONE,
};
use async_trait::async_trait;
use log::{debug, info};
use pharmer_cloud::certificates;
use pharmer_cloud::provider::{
    AsResources, ClusterManager, IntoProviderError, ProviderError, ProviderResult, Resources,
};
use pharmer_cloud::wait::poll_immediate;
use pharmer_cloud::Scope;
use pharmer_model::constants::{ADMIN_CERT_NAME, PROVIDER_GKE, RETRY_INTERVAL, RETRY_TIMEOUT};
use pharmer_model::{
    Action, ActionType, AuthInfo, Cluster, Gce, GkeSpec, KubeConfig, MachineSet, NodeSpec,
};
use pharmer_store::KeyPair;
use std::sync::Arc;

const DEFAULT_NETWORK: &str = "default";
const DEFAULT_NETWORK_RANGE: &str = "10.240.0.0/16";
const DEFAULT_IMAGE: &str = "COS";
const DEFAULT_DISK_TYPE: &str = "pd-standard";
const DEFAULT_DISK_SIZE: i64 = 100;

/// Tracks how far cluster creation got. A create operation that never finished leaves a cluster
/// pharmer cannot vouch for.
#[derive(Debug, Default)]
struct CreatedCluster {
    operation: Option<String>,
}

impl AsResources for &CreatedCluster {
    fn as_resources(&self) -> Resources {
        match self.operation {
            Some(_) => Resources::Orphaned,
            None => Resources::Clear,
        }
    }
}

#[derive(Default)]
pub struct GkeManager {
    api: Option<Arc<dyn ContainerApi>>,
}

impl GkeManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_api(api: Arc<dyn ContainerApi>) -> Self {
        Self { api: Some(api) }
    }

    fn api(&self) -> ProviderResult<&dyn ContainerApi> {
        self.api
            .as_deref()
            .context(Resources::Clear, "GKE cloud connector is not set")
    }
}

/// Polls a zone operation until it is done. Errors reading the operation are retried.
async fn wait_for_zone_operation(
    api: &dyn ContainerApi,
    operation: &str,
    resources: impl AsResources,
) -> ProviderResult<()> {
    debug!("Waiting for zone operation '{}'", operation);
    poll_immediate(RETRY_INTERVAL, RETRY_TIMEOUT, move || async move {
        match api.get_operation(operation).await {
            Ok(op) if op.status == OPERATION_DONE && !op.status_message.is_empty() => {
                crate::error::OperationFailedSnafu {
                    name: op.name,
                    message: op.status_message,
                }
                .fail()
            }
            Ok(op) => Ok(op.status == OPERATION_DONE),
            Err(e) => {
                debug!("Unable to read operation '{}': {}", operation, e);
                Ok(false)
            }
        }
    })
    .await
    .context(resources, format!("Zone operation '{}' failed", operation))
}

fn encode_node_pool(machine_set: &MachineSet, image: &str) -> GkeNodePool {
    let spec = machine_set.node_spec();
    GkeNodePool {
        name: machine_set.name().to_string(),
        initial_node_count: machine_set.spec.replicas,
        config: Some(NodeConfig {
            machine_type: spec.sku.clone(),
            disk_size_gb: spec.disk_size,
            disk_type: spec.disk_type.clone(),
            image_type: image.to_string(),
        }),
        status: String::new(),
    }
}

fn encode_cluster(cluster: &Cluster, machine_sets: &[MachineSet]) -> GkeCluster {
    let config = &cluster.spec.config;
    let gke = config.cloud.gke.clone().unwrap_or_default();
    GkeCluster {
        name: cluster.name().to_string(),
        description: format!("pharmer cluster {}", cluster.name()),
        network: gke.network_name.clone(),
        cluster_ipv4_cidr: cluster.pod_cidr().unwrap_or_default().to_string(),
        initial_cluster_version: config.kubernetes_version.clone(),
        zone: config.cloud.zone.clone(),
        master_auth: Some(MasterAuth {
            username: gke.user_name,
            password: gke.password,
            client_certificate_config: Some(ClientCertificateConfig {
                issue_client_certificate: true,
            }),
            ..Default::default()
        }),
        node_pools: machine_sets
            .iter()
            .filter(|ms| !ms.is_marked_for_deletion())
            .map(|ms| encode_node_pool(ms, &config.cloud.instance_image))
            .collect(),
        ..Default::default()
    }
}

fn decode_pem(value: &str, what: &str) -> ProviderResult<Vec<u8>> {
    base64::decode(value.trim()).context(Resources::Remaining, format!("Invalid {}", what))
}

impl GkeManager {
    async fn ensure_network(
        &self,
        scope: &Scope,
        dry_run: bool,
        actions: &mut Vec<Action>,
    ) -> ProviderResult<()> {
        let api = self.api()?;
        let name = scope
            .cluster
            .spec
            .config
            .cloud
            .gke
            .as_ref()
            .map(|gke| gke.network_name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_NETWORK);
        let existing = api
            .get_network(name)
            .await
            .context(Resources::Clear, format!("Unable to read network '{}'", name))?;
        if existing.is_some() {
            return Ok(());
        }
        actions.push(Action::new(
            ActionType::Add,
            "Default Network",
            format!("Network {} will be created", name),
        ));
        if !dry_run {
            info!("Creating network '{}'", name);
            api.insert_network(&Network {
                name: name.to_string(),
                ipv4_range: DEFAULT_NETWORK_RANGE.to_string(),
                auto_create_subnetworks: None,
            })
            .await
            .context(Resources::Clear, format!("Unable to create network '{}'", name))?;
        }
        Ok(())
    }

    /// Creates the GKE cluster with its initial node pools and returns it once it is running.
    async fn create_cluster(&self, scope: &Scope) -> ProviderResult<GkeCluster> {
        let api = self.api()?;
        let name = scope.cluster_name();
        let machine_sets = scope
            .machine_sets()
            .await
            .context(Resources::Clear, "Unable to list node groups")?;
        let request = encode_cluster(&scope.cluster, &machine_sets);

        let mut created = CreatedCluster::default();
        info!("Creating GKE cluster '{}'", name);
        let operation = api
            .create_cluster(&request)
            .await
            .context(&created, format!("Unable to create GKE cluster '{}'", name))?;
        created.operation = Some(operation.name.clone());
        wait_for_zone_operation(api, &operation.name, &created).await?;

        // The initial node pools now exist with their requested size.
        let store = scope.store.machine_sets(name);
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

        api.get_cluster(name)
            .await
            .context(Resources::Remaining, format!("Unable to read GKE cluster '{}'", name))?
            .context(Resources::Remaining, format!("GKE cluster '{}' disappeared", name))
    }

    /// Keeps the credentials GKE issued for the cluster.
    async fn store_master_auth(&self, scope: &mut Scope, auth: &MasterAuth) -> ProviderResult<()> {
        let name = scope.cluster_name().to_string();
        if !auth.cluster_ca_certificate.is_empty() {
            let ca = decode_pem(&auth.cluster_ca_certificate, "cluster CA certificate")?;
            certificates::store_cloud_ca(scope.store.as_ref(), &scope.cluster, ca)
                .await
                .context(Resources::Remaining, "Unable to store cluster CA certificate")?;
        }
        if !auth.client_certificate.is_empty() && !auth.client_key.is_empty() {
            let pair = KeyPair {
                public: decode_pem(&auth.client_certificate, "client certificate")?,
                private: decode_pem(&auth.client_key, "client key")?,
            };
            certificates::replace_cert(scope.store.as_ref(), &name, ADMIN_CERT_NAME, pair)
                .await
                .context(Resources::Remaining, "Unable to store admin certificate")?;
        }
        if let Some(gke) = scope.cluster.spec.config.cloud.gke.as_mut() {
            if !auth.username.is_empty() {
                gke.user_name = auth.username.clone();
                gke.password = auth.password.clone();
            }
        }
        scope.certs = None;
        Ok(())
    }
}

#[async_trait]
impl ClusterManager for GkeManager {
    fn provider_name(&self) -> &'static str {
        PROVIDER_GKE
    }

    fn set_default_cluster(&self, cluster: &mut Cluster) -> ProviderResult<()> {
        let cloud = &mut cluster.spec.config.cloud;
        if cloud.zone.is_empty() {
            return Err(ProviderError::new_with_context(
                Resources::Clear,
                "A zone is required for GKE clusters",
            ));
        }
        let gke = cloud.gke.get_or_insert_with(GkeSpec::default);
        if gke.network_name.is_empty() {
            gke.network_name = DEFAULT_NETWORK.to_string();
        }
        if cloud.instance_image.is_empty() {
            cloud.instance_image = DEFAULT_IMAGE.to_string();
        }
        Ok(())
    }

    fn default_node_spec(&self, _: &Cluster, sku: &str) -> ProviderResult<NodeSpec> {
        Ok(NodeSpec {
            sku: sku.to_string(),
            disk_type: DEFAULT_DISK_TYPE.to_string(),
            disk_size: DEFAULT_DISK_SIZE,
            ..Default::default()
        })
    }

    async fn set_cloud_connector(&mut self, scope: &mut Scope) -> ProviderResult<()> {
        let credential = scope
            .credential()
            .await
            .context(Resources::Clear, "Unable to load GKE credential")?;
        let gce = Gce::try_from(&credential).context(
            Resources::Clear,
            format!("Credential '{}' is not a Google Cloud credential", credential.name()),
        )?;
        let cloud = &mut scope.cluster.spec.config.cloud;
        if cloud.project.is_empty() {
            cloud.project = gce.project_id().to_string();
        }
        if self.api.is_none() {
            let client = GkeClient::new(gce.service_account(), &cloud.project, &cloud.zone)
                .context(Resources::Clear, "Unable to create GKE client")?;
            self.api = Some(Arc::new(client));
        }
        self.api()?.list_clusters().await.context(
            Resources::Clear,
            format!("Credential '{}' does not have access to GKE", credential.name()),
        )?;
        Ok(())
    }

    async fn prepare_cloud(
        &mut self,
        scope: &mut Scope,
        dry_run: bool,
    ) -> ProviderResult<Vec<Action>> {
        let mut actions = Vec::new();
        self.ensure_network(scope, dry_run, &mut actions).await?;

        let name = scope.cluster_name().to_string();
        let existing = self
            .api()?
            .get_cluster(&name)
            .await
            .context(Resources::Unknown, format!("Unable to read GKE cluster '{}'", name))?;
        let cluster = match existing {
            Some(cluster) => {
                actions.push(Action::new(
                    ActionType::Nop,
                    "Kubernetes cluster",
                    format!("Kubernetes cluster {} exists", name),
                ));
                cluster
            }
            None => {
                actions.push(Action::new(
                    ActionType::Add,
                    "Kubernetes cluster",
                    format!("Kubernetes cluster {} will be created", name),
                ));
                if dry_run {
                    return Ok(actions);
                }
                self.create_cluster(scope).await?
            }
        };
        if dry_run {
            return Ok(actions);
        }

        if let Some(auth) = cluster.master_auth.as_ref() {
            self.store_master_auth(scope, auth).await?;
        }
        if !cluster.endpoint.is_empty() {
            scope.cluster.set_api_address(cluster.endpoint.as_str());
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
        let pools = GkePools {
            api: self.api()?,
            cluster: scope.cluster_name().to_string(),
            image: scope.cluster.spec.config.cloud.instance_image.clone(),
        };
        apply_node_groups(scope, &pools, dry_run).await
    }

    async fn apply_delete(
        &mut self,
        scope: &mut Scope,
        dry_run: bool,
    ) -> ProviderResult<Vec<Action>> {
        let api = self.api()?;
        let name = scope.cluster_name().to_string();
        let existing = api
            .get_cluster(&name)
            .await
            .context(Resources::Remaining, format!("Unable to read GKE cluster '{}'", name))?;
        if existing.is_none() {
            debug!("GKE cluster '{}' is already gone", name);
            return Ok(Vec::new());
        }
        let actions = vec![Action::new(
            ActionType::Delete,
            "Kubernetes cluster",
            format!("Kubernetes cluster {} will be deleted", name),
        )];
        if !dry_run {
            info!("Deleting GKE cluster '{}'", name);
            let operation = api.delete_cluster(&name).await.context(
                Resources::Remaining,
                format!("Unable to delete GKE cluster '{}'", name),
            )?;
            wait_for_zone_operation(api, &operation.name, Resources::Remaining).await?;
        }
        Ok(actions)
    }

    async fn kube_config(&self, scope: &Scope) -> ProviderResult<KubeConfig> {
        let cluster = &scope.cluster;
        let store = scope.store.as_ref();
        let server = cluster
            .api_server_url()
            .context(Resources::Remaining, "GKE cluster has no endpoint yet")?;
        let ca = certificates::load_cert(store, cluster.name(), &cluster.spec.config.ca_cert_name)
            .await
            .and_then(|ca| ca.cert_pem())
            .context(Resources::Remaining, "Unable to load cluster CA certificate")?;
        let auth = match cluster.spec.config.cloud.gke.as_ref() {
            Some(gke) if !gke.user_name.is_empty() && !gke.password.is_empty() => AuthInfo::Basic {
                username: gke.user_name.clone(),
                password: gke.password.clone(),
            },
            _ => issued_client_cert(scope).await?,
        };
        Ok(KubeConfig::new(cluster.name(), server, ca, auth))
    }
}

/// The client certificate GKE issued with the master. pharmer cannot sign one itself because the
/// cluster CA key stays with Google.
async fn issued_client_cert(scope: &Scope) -> ProviderResult<AuthInfo> {
    let name = scope.cluster_name();
    let pair = match scope.store.certificates(name).get(ADMIN_CERT_NAME).await {
        Ok(pair) => pair,
        Err(e) if e.is_not_found() => {
            return Err(ProviderError::new_with_context(
                Resources::Remaining,
                format!(
                    "GKE cluster '{}' has neither basic auth nor an issued client certificate",
                    name
                ),
            ))
        }
        Err(e) => return Err(e).context(Resources::Remaining, "Unable to load admin certificate"),
    };
    Ok(AuthInfo::ClientCertificate {
        cert_pem: pair.public,
        key_pem: pair.private,
    })
}

struct GkePools<'a> {
    api: &'a dyn ContainerApi,
    cluster: String,
    image: String,
}

#[async_trait]
impl NodePools for GkePools<'_> {
    async fn get(&self, name: &str) -> ProviderResult<Option<NodePool>> {
        let pool = self
            .api
            .get_node_pool(&self.cluster, name)
            .await
            .context(Resources::Remaining, format!("Unable to read node pool '{}'", name))?;
        // GKE only reports the initial size of a pool.
        Ok(pool.map(|_| NodePool { size: None }))
    }

    async fn create(&self, machine_set: &MachineSet) -> ProviderResult<()> {
        let name = machine_set.name();
        let operation = self
            .api
            .create_node_pool(&self.cluster, &encode_node_pool(machine_set, &self.image))
            .await
            .context(Resources::Remaining, format!("Unable to create node pool '{}'", name))?;
        wait_for_zone_operation(self.api, &operation.name, Resources::Remaining).await
    }

    async fn resize(&self, machine_set: &MachineSet) -> ProviderResult<()> {
        let name = machine_set.name();
        let operation = self
            .api
            .set_node_pool_size(&self.cluster, name, machine_set.spec.replicas)
            .await
            .context(Resources::Remaining, format!("Unable to resize node pool '{}'", name))?;
        wait_for_zone_operation(self.api, &operation.name, Resources::Remaining).await
    }

    async fn delete(&self, name: &str) -> ProviderResult<()> {
        let operation = self
            .api
            .delete_node_pool(&self.cluster, name)
            .await
            .context(Resources::Remaining, format!("Unable to delete node pool '{}'", name))?;
        wait_for_zone_operation(self.api, &operation.name, Resources::Remaining).await
    }
}

#[cfg(test)]
mod test {
    use super::api::*;
    use super::*;
    use crate::error::Result;
    use pharmer_cloud::certificates::{create_ca_cert_pair, create_client_cert};
    use pharmer_model::constants::CREDENTIAL_GCE;
    use pharmer_model::credential::{GCE_PROJECT_ID, GCE_SERVICE_ACCOUNT};
    use pharmer_model::{ClusterPhase, Credential};
    use pharmer_store::{fake, DynStore};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockState {
        clusters: BTreeMap<String, GkeCluster>,
        networks: Vec<String>,
        operations: usize,
        resized: Vec<(String, i32)>,
    }

    #[derive(Default)]
    struct MockContainer {
        state: Mutex<MockState>,
        ca_pem: String,
        client_cert_pem: String,
        client_key_pem: String,
        no_basic_auth: bool,
    }

    impl MockContainer {
        fn operation(state: &mut MockState) -> GkeOperation {
            state.operations += 1;
            GkeOperation {
                name: format!("operation-{}", state.operations),
                status: "RUNNING".into(),
                status_message: String::new(),
            }
        }
    }

    #[async_trait]
    impl ContainerApi for MockContainer {
        async fn list_clusters(&self) -> Result<Vec<GkeCluster>> {
            Ok(self.state.lock().unwrap().clusters.values().cloned().collect())
        }

        async fn get_cluster(&self, name: &str) -> Result<Option<GkeCluster>> {
            Ok(self.state.lock().unwrap().clusters.get(name).cloned())
        }

        async fn create_cluster(&self, cluster: &GkeCluster) -> Result<GkeOperation> {
            let mut state = self.state.lock().unwrap();
            let mut cluster = cluster.clone();
            cluster.endpoint = "35.1.2.3".into();
            cluster.status = "RUNNING".into();
            let issue_cert = cluster
                .master_auth
                .as_ref()
                .and_then(|auth| auth.client_certificate_config.as_ref())
                .map(|config| config.issue_client_certificate)
                .unwrap_or(false);
            let mut auth = MasterAuth {
                cluster_ca_certificate: self.ca_pem.clone(),
                ..Default::default()
            };
            if !self.no_basic_auth {
                auth.username = "admin".into();
                auth.password = "secret".into();
            }
            if issue_cert {
                auth.client_certificate = self.client_cert_pem.clone();
                auth.client_key = self.client_key_pem.clone();
            }
            cluster.master_auth = Some(auth);
            state.clusters.insert(cluster.name.clone(), cluster);
            Ok(Self::operation(&mut state))
        }

        async fn delete_cluster(&self, name: &str) -> Result<GkeOperation> {
            let mut state = self.state.lock().unwrap();
            state.clusters.remove(name);
            Ok(Self::operation(&mut state))
        }

        async fn get_node_pool(&self, cluster: &str, pool: &str) -> Result<Option<GkeNodePool>> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .clusters
                .get(cluster)
                .and_then(|c| c.node_pools.iter().find(|np| np.name == pool).cloned()))
        }

        async fn create_node_pool(
            &self,
            cluster: &str,
            pool: &GkeNodePool,
        ) -> Result<GkeOperation> {
            let mut state = self.state.lock().unwrap();
            if let Some(c) = state.clusters.get_mut(cluster) {
                c.node_pools.push(pool.clone());
            }
            Ok(Self::operation(&mut state))
        }

        async fn set_node_pool_size(
            &self,
            _: &str,
            pool: &str,
            size: i32,
        ) -> Result<GkeOperation> {
            let mut state = self.state.lock().unwrap();
            state.resized.push((pool.to_string(), size));
            Ok(Self::operation(&mut state))
        }

        async fn delete_node_pool(&self, cluster: &str, pool: &str) -> Result<GkeOperation> {
            let mut state = self.state.lock().unwrap();
            if let Some(c) = state.clusters.get_mut(cluster) {
                c.node_pools.retain(|np| np.name != pool);
            }
            Ok(Self::operation(&mut state))
        }

        async fn get_operation(&self, name: &str) -> Result<GkeOperation> {
            Ok(GkeOperation {
                name: name.to_string(),
                status: OPERATION_DONE.into(),
                status_message: String::new(),
            })
        }

        async fn get_network(&self, name: &str) -> Result<Option<Network>> {
            let state = self.state.lock().unwrap();
            Ok(state.networks.iter().find(|n| *n == name).map(|n| Network {
                name: n.clone(),
                ..Default::default()
            }))
        }

        async fn insert_network(&self, network: &Network) -> Result<()> {
            self.state.lock().unwrap().networks.push(network.name.clone());
            Ok(())
        }
    }

    async fn setup() -> (Scope, MockContainer) {
        let store: DynStore = Arc::new(fake::new());
        let mut credential = Credential::new("gce", CREDENTIAL_GCE);
        credential.spec.data.insert(GCE_PROJECT_ID.into(), "my-project".into());
        credential.spec.data.insert(GCE_SERVICE_ACCOUNT.into(), "{}".into());
        store.credentials().create(credential).await.unwrap();

        let mut cluster = Cluster::new("g1");
        cluster.spec.config.credential_name = "gce".into();
        cluster.spec.config.cloud.cloud_provider = PROVIDER_GKE.into();
        cluster.spec.config.cloud.zone = "us-central1-f".into();
        cluster.spec.config.cloud.ssh_key_name = "g1-sshkey".into();
        cluster.set_cert_names();
        cluster.set_networking_defaults("calico");
        cluster.status.phase = ClusterPhase::Pending;
        GkeManager::new().set_default_cluster(&mut cluster).unwrap();
        certificates::create_pharmer_certs(store.as_ref(), &cluster)
            .await
            .unwrap();
        let cluster = store.clusters().create(cluster).await.unwrap();

        let spec = GkeManager::new()
            .default_node_spec(&cluster, "n1-standard-2")
            .unwrap();
        store
            .machine_sets("g1")
            .create(MachineSet::new("g1", "n1-standard-2", 2, spec))
            .await
            .unwrap();

        let cloud_ca = create_ca_cert_pair("gke-ca").unwrap();
        let client = create_client_cert(&cloud_ca, "client", &[]).unwrap();
        let api = MockContainer {
            ca_pem: base64::encode(cloud_ca.cert_pem().unwrap()),
            client_cert_pem: base64::encode(client.cert_pem().unwrap()),
            client_key_pem: base64::encode(client.key_pem().unwrap()),
            ..Default::default()
        };
        (Scope::new(cluster, store), api)
    }

    #[test]
    fn defaults() {
        let mut cluster = Cluster::new("g1");
        assert!(GkeManager::new().set_default_cluster(&mut cluster).is_err());
        cluster.spec.config.cloud.zone = "us-central1-f".into();
        GkeManager::new().set_default_cluster(&mut cluster).unwrap();
        assert_eq!(cluster.spec.config.cloud.instance_image, DEFAULT_IMAGE);
        assert_eq!(
            cluster.spec.config.cloud.gke.as_ref().unwrap().network_name,
            DEFAULT_NETWORK
        );
    }

    #[tokio::test(start_paused = true)]
    async fn create_scale_and_delete() {
        let (mut scope, api) = setup().await;
        let api = Arc::new(api);
        let mut manager = GkeManager::with_api(api.clone());
        manager.set_cloud_connector(&mut scope).await.unwrap();
        assert_eq!(scope.cluster.spec.config.cloud.project, "my-project");

        let dry = manager.prepare_cloud(&mut scope, true).await.unwrap();
        assert_eq!(dry.len(), 2);
        assert!(api.state.lock().unwrap().clusters.is_empty());

        manager.prepare_cloud(&mut scope, false).await.unwrap();
        {
            let state = api.state.lock().unwrap();
            assert_eq!(state.networks, vec![DEFAULT_NETWORK.to_string()]);
            let cluster = state.clusters.get("g1").unwrap();
            assert_eq!(cluster.node_pools.len(), 1);
            assert_eq!(cluster.node_pools[0].initial_node_count, 2);
            assert_eq!(cluster.cluster_ipv4_cidr, "192.168.0.0/16");
        }
        assert_eq!(scope.cluster.api_server_url().unwrap(), "https://35.1.2.3");
        let stored_ca = scope
            .store
            .certificates("g1")
            .get(&scope.cluster.spec.config.ca_cert_name)
            .await
            .unwrap();
        assert_eq!(base64::encode(&stored_ca.public), api.ca_pem);

        // The pool created with the cluster is already at its size.
        let actions = manager.apply_scale(&mut scope, false).await.unwrap();
        assert_eq!(actions[0].action, ActionType::Nop);

        let store = scope.store.machine_sets("g1");
        let mut machine_set = store.get("n1-standard-2-pool").await.unwrap();
        machine_set.spec.replicas = 5;
        store.update(machine_set).await.unwrap();
        store
            .create(MachineSet::new("g1", "n1-highmem-4", 1, NodeSpec::default()))
            .await
            .unwrap();
        let actions = manager.apply_scale(&mut scope, false).await.unwrap();
        let kinds: Vec<ActionType> = actions.iter().map(|a| a.action).collect();
        assert_eq!(kinds, vec![ActionType::Add, ActionType::Update]);
        assert_eq!(
            api.state.lock().unwrap().resized,
            vec![("n1-standard-2-pool".to_string(), 5)]
        );

        let konfig = manager.kube_config(&scope).await.unwrap();
        assert_eq!(konfig.cluster.server, "https://35.1.2.3");
        assert_eq!(
            konfig.auth_info.auth,
            AuthInfo::Basic {
                username: "admin".into(),
                password: "secret".into(),
            }
        );
        assert_eq!(
            base64::encode(&konfig.cluster.certificate_authority_data),
            api.ca_pem
        );

        let actions = manager.apply_delete(&mut scope, false).await.unwrap();
        assert_eq!(actions[0].action, ActionType::Delete);
        assert!(api.state.lock().unwrap().clusters.is_empty());
        assert!(manager.apply_delete(&mut scope, false).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn issued_client_certificate_is_used_without_basic_auth() {
        let (mut scope, api) = setup().await;
        let api = Arc::new(MockContainer {
            no_basic_auth: true,
            ..api
        });
        let mut manager = GkeManager::with_api(api.clone());
        manager.set_cloud_connector(&mut scope).await.unwrap();
        manager.prepare_cloud(&mut scope, false).await.unwrap();
        assert!(api.state.lock().unwrap().clusters["g1"]
            .master_auth
            .as_ref()
            .unwrap()
            .client_certificate_config
            .as_ref()
            .unwrap()
            .issue_client_certificate);

        let konfig = manager.kube_config(&scope).await.unwrap();
        match konfig.auth_info.auth {
            AuthInfo::ClientCertificate { cert_pem, key_pem } => {
                assert_eq!(base64::encode(cert_pem), api.client_cert_pem);
                assert_eq!(base64::encode(key_pem), api.client_key_pem);
            }
            other => panic!("unexpected auth {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn kube_config_never_signs_with_the_gke_ca() {
        let (mut scope, api) = setup().await;
        let api = Arc::new(MockContainer {
            no_basic_auth: true,
            client_cert_pem: String::new(),
            client_key_pem: String::new(),
            ..api
        });
        let mut manager = GkeManager::with_api(api.clone());
        manager.set_cloud_connector(&mut scope).await.unwrap();
        manager.prepare_cloud(&mut scope, false).await.unwrap();

        let err = manager.kube_config(&scope).await.unwrap_err();
        assert!(err.to_string().contains("neither basic auth"), "{}", err);
        assert!(scope
            .store
            .certificates("g1")
            .get(ADMIN_CERT_NAME)
            .await
            .unwrap_err()
            .is_not_found());
    }
}
