use async_trait::async_trait;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_sdk_eks::error::{
    DescribeClusterError, DescribeClusterErrorKind, DescribeNodegroupError,
    DescribeNodegroupErrorKind,
};
use aws_sdk_eks::model::{NodegroupScalingConfig, VpcConfigRequest};
use aws_sdk_eks::output::{DescribeClusterOutput, DescribeNodegroupOutput};
use aws_sdk_eks::types::SdkError;
use aws_types::region::Region;
use log::info;
use pharmer_cloud::provider::{IntoProviderError, ProviderResult, Resources};

/// The fields of an EKS cluster pharmer reads.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct EksCluster {
    pub(crate) status: String,
    pub(crate) endpoint: String,
    /// Base64 encoded PEM.
    pub(crate) certificate_authority: String,
    pub(crate) arn: String,
    pub(crate) platform_version: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct EksNodeGroup {
    pub(crate) status: String,
    pub(crate) desired_size: Option<i32>,
}

/// What pharmer asks EKS to create.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ClusterRequest {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) role_arn: String,
    pub(crate) subnet_ids: Vec<String>,
    pub(crate) security_group_ids: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct NodeGroupRequest {
    pub(crate) name: String,
    pub(crate) node_role_arn: String,
    pub(crate) subnet_ids: Vec<String>,
    pub(crate) instance_type: String,
    pub(crate) disk_size: i32,
    pub(crate) size: i32,
}

/// The EKS calls an [`EksManager`](super::EksManager) makes, in one region.
#[async_trait]
pub(crate) trait EksApi: Send + Sync {
    async fn list_clusters(&self) -> ProviderResult<Vec<String>>;

    async fn describe_cluster(&self, name: &str) -> ProviderResult<Option<EksCluster>>;

    async fn create_cluster(&self, request: &ClusterRequest) -> ProviderResult<()>;

    async fn delete_cluster(&self, name: &str) -> ProviderResult<()>;

    async fn describe_nodegroup(
        &self,
        cluster: &str,
        name: &str,
    ) -> ProviderResult<Option<EksNodeGroup>>;

    async fn create_nodegroup(&self, cluster: &str, request: &NodeGroupRequest)
        -> ProviderResult<()>;

    async fn update_nodegroup_size(&self, cluster: &str, name: &str, size: i32)
        -> ProviderResult<()>;

    async fn delete_nodegroup(&self, cluster: &str, name: &str) -> ProviderResult<()>;
}

/// EKS requires at least one node in a node group.
pub(crate) fn scaling_config(size: i32) -> NodegroupScalingConfig {
    let size = size.max(1);
    NodegroupScalingConfig::builder()
        .min_size(size)
        .max_size(size)
        .desired_size(size)
        .build()
}

#[derive(Debug, Clone)]
pub(crate) struct EksClient {
    eks_client: aws_sdk_eks::Client,
}

impl EksClient {
    pub(crate) async fn new(region: &str, access_key_id: &str, secret_access_key: &str) -> Self {
        info!("Creating EKS client for region '{}'", region);
        let credentials = Credentials::new(access_key_id, secret_access_key, None, None, "pharmer");
        let shared_config = aws_config::from_env()
            .region(Region::new(region.to_string()))
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .load()
            .await;
        Self {
            eks_client: aws_sdk_eks::Client::new(&shared_config),
        }
    }
}

fn cluster_not_found(
    result: &std::result::Result<DescribeClusterOutput, SdkError<DescribeClusterError>>,
) -> bool {
    if let Err(SdkError::ServiceError(service_error)) = result {
        if matches!(
            &service_error.err().kind,
            DescribeClusterErrorKind::ResourceNotFoundException(_)
        ) {
            return true;
        }
    }
    false
}

fn nodegroup_not_found(
    result: &std::result::Result<DescribeNodegroupOutput, SdkError<DescribeNodegroupError>>,
) -> bool {
    if let Err(SdkError::ServiceError(service_error)) = result {
        if matches!(
            &service_error.err().kind,
            DescribeNodegroupErrorKind::ResourceNotFoundException(_)
        ) {
            return true;
        }
    }
    false
}

#[async_trait]
impl EksApi for EksClient {
    async fn list_clusters(&self) -> ProviderResult<Vec<String>> {
        Ok(self
            .eks_client
            .list_clusters()
            .send()
            .await
            .context(Resources::Clear, "Unable to list EKS clusters")?
            .clusters()
            .map(|clusters| clusters.to_vec())
            .unwrap_or_default())
    }

    async fn describe_cluster(&self, name: &str) -> ProviderResult<Option<EksCluster>> {
        let result = self
            .eks_client
            .describe_cluster()
            .name(name)
            .send()
            .await;
        if cluster_not_found(&result) {
            return Ok(None);
        }
        let output = result.context(
            Resources::Unknown,
            format!("Unable to describe EKS cluster '{}'", name),
        )?;
        let cluster = output.cluster().context(
            Resources::Unknown,
            format!("EKS response for cluster '{}' is missing the cluster", name),
        )?;
        Ok(Some(EksCluster {
            status: cluster
                .status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
            endpoint: cluster.endpoint().unwrap_or_default().to_string(),
            certificate_authority: cluster
                .certificate_authority()
                .and_then(|ca| ca.data())
                .unwrap_or_default()
                .to_string(),
            arn: cluster.arn().unwrap_or_default().to_string(),
            platform_version: cluster.platform_version().unwrap_or_default().to_string(),
        }))
    }

    async fn create_cluster(&self, request: &ClusterRequest) -> ProviderResult<()> {
        let mut create = self
            .eks_client
            .create_cluster()
            .name(&request.name)
            .role_arn(&request.role_arn)
            .resources_vpc_config(
                VpcConfigRequest::builder()
                    .set_subnet_ids(Some(request.subnet_ids.clone()))
                    .set_security_group_ids(Some(request.security_group_ids.clone()))
                    .build(),
            );
        if !request.version.is_empty() {
            create = create.version(&request.version);
        }
        create.send().await.context(
            Resources::Clear,
            format!("Unable to create EKS cluster '{}'", request.name),
        )?;
        Ok(())
    }

    async fn delete_cluster(&self, name: &str) -> ProviderResult<()> {
        self.eks_client
            .delete_cluster()
            .name(name)
            .send()
            .await
            .context(
                Resources::Remaining,
                format!("Unable to delete EKS cluster '{}'", name),
            )?;
        Ok(())
    }

    async fn describe_nodegroup(
        &self,
        cluster: &str,
        name: &str,
    ) -> ProviderResult<Option<EksNodeGroup>> {
        let result = self
            .eks_client
            .describe_nodegroup()
            .cluster_name(cluster)
            .nodegroup_name(name)
            .send()
            .await;
        if nodegroup_not_found(&result) {
            return Ok(None);
        }
        let output = result.context(
            Resources::Remaining,
            format!("Unable to describe node group '{}'", name),
        )?;
        let nodegroup = output
            .nodegroup()
            .context(Resources::Remaining, "No nodegroup was found")?;
        Ok(Some(EksNodeGroup {
            status: nodegroup
                .status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
            desired_size: nodegroup
                .scaling_config()
                .and_then(|scaling| scaling.desired_size()),
        }))
    }

    async fn create_nodegroup(
        &self,
        cluster: &str,
        request: &NodeGroupRequest,
    ) -> ProviderResult<()> {
        self.eks_client
            .create_nodegroup()
            .cluster_name(cluster)
            .nodegroup_name(&request.name)
            .node_role(&request.node_role_arn)
            .set_subnets(Some(request.subnet_ids.clone()))
            .instance_types(&request.instance_type)
            .disk_size(request.disk_size)
            .scaling_config(scaling_config(request.size))
            .send()
            .await
            .context(
                Resources::Remaining,
                format!("Unable to create node group '{}'", request.name),
            )?;
        Ok(())
    }

    async fn update_nodegroup_size(
        &self,
        cluster: &str,
        name: &str,
        size: i32,
    ) -> ProviderResult<()> {
        self.eks_client
            .update_nodegroup_config()
            .cluster_name(cluster)
            .nodegroup_name(name)
            .scaling_config(scaling_config(size))
            .send()
            .await
            .context(
                Resources::Remaining,
                format!("Unable to resize node group '{}'", name),
            )?;
        Ok(())
    }

    async fn delete_nodegroup(&self, cluster: &str, name: &str) -> ProviderResult<()> {
        self.eks_client
            .delete_nodegroup()
            .cluster_name(cluster)
            .nodegroup_name(name)
            .send()
            .await
            .context(
                Resources::Remaining,
                format!("Unable to delete node group '{}'", name),
            )?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scaling_config_has_at_least_one_node() {
        let config = scaling_config(0);
        assert_eq!(config.min_size(), Some(1));
        assert_eq!(config.desired_size(), Some(1));
        let config = scaling_config(4);
        assert_eq!(config.min_size(), Some(4));
        assert_eq!(config.max_size(), Some(4));
        assert_eq!(config.desired_size(), Some(4));
    }
}
