/*!

Amazon Elastic Kubernetes Service. The IAM roles, subnets and security groups are expected to
exist and are named in the cluster's `eks` spec. Each machine set maps onto a managed node group.
EKS has no operation handles, so waits poll the cluster or node group status instead.

!*/

pub(crate) mod api;

use crate::node_group::{apply_node_groups, NodePool, NodePools};
use api::{ClusterRequest, EksApi, EksClient, NodeGroupRequest};
use async_trait::async_trait;
use log::{debug, info};
use pharmer_cloud::certificates;
use pharmer_cloud::provider::{
    ClusterManager, IntoProviderError, ProviderError, ProviderResult, Resources,
};
use pharmer_cloud::wait::poll_immediate;
use pharmer_cloud::Scope;
use pharmer_model::constants::{PROVIDER_EKS, RETRY_INTERVAL, RETRY_TIMEOUT};
use pharmer_model::{
    Action, ActionType, AuthInfo, Aws, Cluster, EksSpec, EksStatus, KubeConfig, MachineSet,
    NodeSpec,
};
use std::sync::Arc;

const STATUS_ACTIVE: &str = "ACTIVE";
const STATUS_FAILED: &str = "FAILED";
const CREATE_FAILED: &str = "CREATE_FAILED";
const DEFAULT_DISK_TYPE: &str = "gp2";
const DEFAULT_DISK_SIZE: i64 = 20;
const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";

/// `us-east-1a` is in `us-east-1`.
pub(crate) fn region_from_zone(zone: &str) -> &str {
    zone.trim_end_matches(|c: char| c.is_ascii_alphabetic())
}

#[derive(Default)]
pub struct EksManager {
    api: Option<Arc<dyn EksApi>>,
}

impl EksManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_api(api: Arc<dyn EksApi>) -> Self {
        Self { api: Some(api) }
    }

    fn api(&self) -> ProviderResult<&dyn EksApi> {
        self.api
            .as_deref()
            .context(Resources::Clear, "EKS cloud connector is not set")
    }
}

fn eks_spec(cluster: &Cluster) -> EksSpec {
    cluster.spec.config.cloud.eks.clone().unwrap_or_default()
}

fn failed(status: &str) -> bool {
    status == STATUS_FAILED || status == CREATE_FAILED
}

async fn wait_for_cluster(api: &dyn EksApi, name: &str) -> ProviderResult<()> {
    poll_immediate(RETRY_INTERVAL, RETRY_TIMEOUT, move || async move {
        match api.describe_cluster(name).await {
            Ok(Some(cluster)) if cluster.status == STATUS_ACTIVE => Ok(true),
            Ok(Some(cluster)) if failed(&cluster.status) => Err(ProviderError::new_with_context(
                Resources::Remaining,
                format!("EKS cluster '{}' is '{}'", name, cluster.status),
            )),
            Ok(Some(cluster)) => {
                info!("EKS cluster '{}' is '{}'", name, cluster.status);
                Ok(false)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                debug!("Unable to describe EKS cluster '{}': {}", name, e);
                Ok(false)
            }
        }
    })
    .await
    .context(
        Resources::Remaining,
        format!("EKS cluster '{}' did not become active", name),
    )
}

async fn wait_for_cluster_deletion(api: &dyn EksApi, name: &str) -> ProviderResult<()> {
    poll_immediate(RETRY_INTERVAL, RETRY_TIMEOUT, move || async move {
        match api.describe_cluster(name).await {
            Ok(None) => Ok::<_, ProviderError>(true),
            Ok(Some(cluster)) => {
                debug!("EKS cluster '{}' is '{}'", name, cluster.status);
                Ok(false)
            }
            Err(e) => {
                debug!("Unable to describe EKS cluster '{}': {}", name, e);
                Ok(false)
            }
        }
    })
    .await
    .context(
        Resources::Remaining,
        format!("EKS cluster '{}' was not deleted", name),
    )
}

/// Waits for a node group to become active, or to disappear if `gone` is set.
async fn wait_for_nodegroup(
    api: &dyn EksApi,
    cluster: &str,
    name: &str,
    gone: bool,
) -> ProviderResult<()> {
    poll_immediate(RETRY_INTERVAL, RETRY_TIMEOUT, move || async move {
        match api.describe_nodegroup(cluster, name).await {
            Ok(None) => Ok(gone),
            Ok(Some(nodegroup)) if failed(&nodegroup.status) => {
                Err(ProviderError::new_with_context(
                    Resources::Remaining,
                    format!("Node group '{}' is '{}'", name, nodegroup.status),
                ))
            }
            Ok(Some(nodegroup)) => {
                debug!("Node group '{}' is '{}'", name, nodegroup.status);
                Ok(!gone && nodegroup.status == STATUS_ACTIVE)
            }
            Err(e) => {
                debug!("Unable to describe node group '{}': {}", name, e);
                Ok(false)
            }
        }
    })
    .await
    .context(
        Resources::Remaining,
        format!("Timed out waiting for node group '{}'", name),
    )
}

#[async_trait]
impl ClusterManager for EksManager {
    fn provider_name(&self) -> &'static str {
        PROVIDER_EKS
    }

    fn set_default_cluster(&self, cluster: &mut Cluster) -> ProviderResult<()> {
        let cloud = &mut cluster.spec.config.cloud;
        if cloud.region.is_empty() {
            cloud.region = region_from_zone(&cloud.zone).to_string();
        }
        if cloud.region.is_empty() {
            return Err(ProviderError::new_with_context(
                Resources::Clear,
                "A zone or region is required for EKS clusters",
            ));
        }
        cloud.eks.get_or_insert_with(EksSpec::default);
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
            .context(Resources::Clear, "Unable to load EKS credential")?;
        let aws = Aws::try_from(&credential).context(
            Resources::Clear,
            format!("Credential '{}' is not an AWS credential", credential.name()),
        )?;
        if self.api.is_none() {
            let client = EksClient::new(
                &scope.cluster.spec.config.cloud.region,
                aws.access_key_id(),
                aws.secret_access_key(),
            )
            .await;
            self.api = Some(Arc::new(client));
        }
        self.api()?.list_clusters().await.map_err(|e| {
            ProviderError::new_with_source_and_context(
                Resources::Clear,
                format!("Credential '{}' does not have access to EKS", credential.name()),
                e,
            )
        })?;
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
        match api.describe_cluster(&name).await? {
            Some(_) => actions.push(Action::new(
                ActionType::Nop,
                "Kubernetes cluster",
                format!("Kubernetes cluster {} exists", name),
            )),
            None => {
                actions.push(Action::new(
                    ActionType::Add,
                    "Kubernetes cluster",
                    format!("Kubernetes cluster {} will be created", name),
                ));
                if dry_run {
                    return Ok(actions);
                }
                let eks = eks_spec(&scope.cluster);
                if eks.role_arn.is_empty() || eks.subnet_ids.is_empty() {
                    return Err(ProviderError::new_with_context(
                        Resources::Clear,
                        format!("EKS cluster '{}' needs a role ARN and subnets", name),
                    ));
                }
                info!("Creating EKS cluster '{}'", name);
                api.create_cluster(&ClusterRequest {
                    name: name.clone(),
                    version: scope.cluster.spec.config.kubernetes_version.clone(),
                    role_arn: eks.role_arn,
                    subnet_ids: eks.subnet_ids,
                    security_group_ids: eks.security_group_ids,
                })
                .await?;
            }
        }
        if dry_run {
            return Ok(actions);
        }

        wait_for_cluster(api, &name).await?;
        let cluster = api.describe_cluster(&name).await?.context(
            Resources::Remaining,
            format!("EKS cluster '{}' disappeared", name),
        )?;
        info!("EKS cluster '{}' is active", name);

        if !cluster.certificate_authority.is_empty() {
            let ca = base64::decode(cluster.certificate_authority.trim())
                .context(Resources::Remaining, "Invalid cluster CA certificate")?;
            certificates::store_cloud_ca(scope.store.as_ref(), &scope.cluster, ca)
                .await
                .context(Resources::Remaining, "Unable to store cluster CA certificate")?;
            scope.certs = None;
        }
        if !cluster.endpoint.is_empty() {
            scope.cluster.set_api_address(cluster.endpoint.as_str());
        }
        scope.cluster.status.cloud.eks = Some(EksStatus {
            arn: cluster.arn,
            platform_version: cluster.platform_version,
        });
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
        let eks = eks_spec(&scope.cluster);
        let pools = EksNodeGroups {
            api: self.api()?,
            cluster: scope.cluster_name().to_string(),
            node_role_arn: eks.node_role_arn,
            subnet_ids: eks.subnet_ids,
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
        if api.describe_cluster(&name).await?.is_none() {
            debug!("EKS cluster '{}' is already gone", name);
            return Ok(Vec::new());
        }
        let actions = vec![Action::new(
            ActionType::Delete,
            "Kubernetes cluster",
            format!("Kubernetes cluster {} will be deleted", name),
        )];
        if !dry_run {
            info!("Deleting EKS cluster '{}'", name);
            api.delete_cluster(&name).await?;
            wait_for_cluster_deletion(api, &name).await?;
        }
        Ok(actions)
    }

    async fn kube_config(&self, scope: &Scope) -> ProviderResult<KubeConfig> {
        let cluster = &scope.cluster;
        let server = cluster
            .api_server_url()
            .context(Resources::Remaining, "EKS cluster has no endpoint yet")?;
        let ca = certificates::load_cert(
            scope.store.as_ref(),
            cluster.name(),
            &cluster.spec.config.ca_cert_name,
        )
        .await
        .and_then(|ca| ca.cert_pem())
        .context(Resources::Remaining, "Unable to load cluster CA certificate")?;
        let auth = AuthInfo::Exec {
            api_version: EXEC_API_VERSION.to_string(),
            command: "aws".to_string(),
            args: vec![
                "eks".to_string(),
                "get-token".to_string(),
                "--cluster-name".to_string(),
                cluster.name().to_string(),
                "--region".to_string(),
                cluster.spec.config.cloud.region.clone(),
            ],
        };
        Ok(KubeConfig::new(cluster.name(), server, ca, auth))
    }
}

struct EksNodeGroups<'a> {
    api: &'a dyn EksApi,
    cluster: String,
    node_role_arn: String,
    subnet_ids: Vec<String>,
}

#[async_trait]
impl NodePools for EksNodeGroups<'_> {
    async fn get(&self, name: &str) -> ProviderResult<Option<NodePool>> {
        Ok(self
            .api
            .describe_nodegroup(&self.cluster, name)
            .await?
            .map(|nodegroup| NodePool {
                size: nodegroup.desired_size,
            }))
    }

    async fn create(&self, machine_set: &MachineSet) -> ProviderResult<()> {
        let spec = machine_set.node_spec();
        let request = NodeGroupRequest {
            name: machine_set.name().to_string(),
            node_role_arn: self.node_role_arn.clone(),
            subnet_ids: self.subnet_ids.clone(),
            instance_type: spec.sku.clone(),
            disk_size: i32::try_from(spec.disk_size).unwrap_or(i32::MAX),
            size: machine_set.spec.replicas,
        };
        self.api.create_nodegroup(&self.cluster, &request).await?;
        wait_for_nodegroup(self.api, &self.cluster, machine_set.name(), false).await
    }

    async fn resize(&self, machine_set: &MachineSet) -> ProviderResult<()> {
        let name = machine_set.name();
        self.api
            .update_nodegroup_size(&self.cluster, name, machine_set.spec.replicas)
            .await?;
        wait_for_nodegroup(self.api, &self.cluster, name, false).await
    }

    async fn delete(&self, name: &str) -> ProviderResult<()> {
        self.api.delete_nodegroup(&self.cluster, name).await?;
        wait_for_nodegroup(self.api, &self.cluster, name, true).await
    }
}
