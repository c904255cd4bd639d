//! The DigitalOcean Kubernetes API, `api.digitalocean.com/v2/kubernetes`.

use crate::error::{self, Result};
use crate::rest::RestClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};

const DIGITALOCEAN_API: &str = "https://api.digitalocean.com/v2";

pub(crate) const STATE_PROVISIONING: &str = "provisioning";
pub(crate) const STATE_ERRORED: &str = "errored";

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DoCluster {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) region: String,
    #[serde(default)]
    pub(crate) version: String,
    #[serde(default)]
    pub(crate) endpoint: String,
    #[serde(default)]
    pub(crate) ipv4: String,
    #[serde(default)]
    pub(crate) status: DoStatus,
    #[serde(default)]
    pub(crate) node_pools: Vec<DoNodePool>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DoStatus {
    #[serde(default)]
    pub(crate) state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) message: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DoNodePool {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) size: String,
    #[serde(default)]
    pub(crate) count: i32,
    #[serde(default)]
    pub(crate) nodes: Vec<DoNode>,
}

impl DoNodePool {
    /// True while any node of the pool is still being provisioned.
    pub(crate) fn is_provisioning(&self) -> bool {
        self.nodes
            .iter()
            .any(|node| node.status.state == STATE_PROVISIONING)
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct DoNode {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) status: DoStatus,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ClusterCreateRequest {
    pub(crate) name: String,
    pub(crate) region: String,
    pub(crate) version: String,
    pub(crate) node_pools: Vec<NodePoolRequest>,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct NodePoolRequest {
    pub(crate) name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) size: String,
    pub(crate) count: i32,
}

#[derive(Deserialize, Debug)]
struct ClusterResponse {
    kubernetes_cluster: DoCluster,
}

#[derive(Deserialize, Debug)]
struct NodePoolResponse {
    node_pool: DoNodePool,
}

#[derive(Deserialize, Debug)]
struct NodePoolsResponse {
    #[serde(default)]
    node_pools: Vec<DoNodePool>,
}

/// The DigitalOcean calls a [`DokubeManager`](super::DokubeManager) makes.
#[async_trait]
pub(crate) trait DigitalOceanApi: Send + Sync {
    /// Reads the account, which fails for an invalid token.
    async fn account(&self) -> Result<()>;

    async fn create_cluster(&self, request: &ClusterCreateRequest) -> Result<DoCluster>;

    async fn get_cluster(&self, id: &str) -> Result<Option<DoCluster>>;

    async fn delete_cluster(&self, id: &str) -> Result<()>;

    async fn list_node_pools(&self, cluster_id: &str) -> Result<Vec<DoNodePool>>;

    async fn create_node_pool(&self, cluster_id: &str, request: &NodePoolRequest)
        -> Result<DoNodePool>;

    async fn update_node_pool(
        &self,
        cluster_id: &str,
        pool_id: &str,
        request: &NodePoolRequest,
    ) -> Result<DoNodePool>;

    async fn delete_node_pool(&self, cluster_id: &str, pool_id: &str) -> Result<()>;

    /// The admin kubeconfig of the cluster, as YAML.
    async fn kubeconfig(&self, cluster_id: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub(crate) struct DoClient {
    rest: RestClient,
    token: String,
}

impl DoClient {
    pub(crate) fn new(token: &str) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new()?,
            token: token.to_string(),
        })
    }

    fn clusters_url() -> String {
        format!("{}/kubernetes/clusters", DIGITALOCEAN_API)
    }

    fn cluster_url(id: &str) -> String {
        format!("{}/{}", Self::clusters_url(), id)
    }

    fn node_pools_url(cluster_id: &str) -> String {
        format!("{}/node_pools", Self::cluster_url(cluster_id))
    }
}

#[async_trait]
impl DigitalOceanApi for DoClient {
    async fn account(&self) -> Result<()> {
        let url = format!("{}/account", DIGITALOCEAN_API);
        let _: serde_json::Value = self
            .rest
            .get(&url, &self.token)
            .await?
            .context(error::ApiSnafu {
                method: "GET",
                url: &url,
                status: 404u16,
                body: "account not found",
            })?;
        Ok(())
    }

    async fn create_cluster(&self, request: &ClusterCreateRequest) -> Result<DoCluster> {
        let response: ClusterResponse = self
            .rest
            .post(&Self::clusters_url(), &self.token, request)
            .await?;
        Ok(response.kubernetes_cluster)
    }

    async fn get_cluster(&self, id: &str) -> Result<Option<DoCluster>> {
        let response: Option<ClusterResponse> =
            self.rest.get(&Self::cluster_url(id), &self.token).await?;
        Ok(response.map(|r| r.kubernetes_cluster))
    }

    async fn delete_cluster(&self, id: &str) -> Result<()> {
        self.rest.delete(&Self::cluster_url(id), &self.token).await?;
        Ok(())
    }

    async fn list_node_pools(&self, cluster_id: &str) -> Result<Vec<DoNodePool>> {
        let response: Option<NodePoolsResponse> = self
            .rest
            .get(&Self::node_pools_url(cluster_id), &self.token)
            .await?;
        Ok(response.map(|r| r.node_pools).unwrap_or_default())
    }

    async fn create_node_pool(
        &self,
        cluster_id: &str,
        request: &NodePoolRequest,
    ) -> Result<DoNodePool> {
        let response: NodePoolResponse = self
            .rest
            .post(&Self::node_pools_url(cluster_id), &self.token, request)
            .await?;
        Ok(response.node_pool)
    }

    async fn update_node_pool(
        &self,
        cluster_id: &str,
        pool_id: &str,
        request: &NodePoolRequest,
    ) -> Result<DoNodePool> {
        let url = format!("{}/{}", Self::node_pools_url(cluster_id), pool_id);
        let response: NodePoolResponse = self.rest.put(&url, &self.token, request).await?;
        Ok(response.node_pool)
    }

    async fn delete_node_pool(&self, cluster_id: &str, pool_id: &str) -> Result<()> {
        let url = format!("{}/{}", Self::node_pools_url(cluster_id), pool_id);
        self.rest.delete(&url, &self.token).await?;
        Ok(())
    }

    async fn kubeconfig(&self, cluster_id: &str) -> Result<String> {
        let url = format!("{}/kubeconfig", Self::cluster_url(cluster_id));
        self.rest.get_text(&url, &self.token).await
    }
}

/// The parts of a DigitalOcean kubeconfig pharmer keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClusterAccess {
    pub(crate) ca_pem: Vec<u8>,
    pub(crate) token: Option<String>,
    /// PEM encoded client certificate and key.
    pub(crate) client_cert: Option<(Vec<u8>, Vec<u8>)>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Deserialize, Debug)]
struct NamedCluster {
    cluster: ClusterEntry,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    #[serde(default)]
    certificate_authority_data: String,
}

#[derive(Deserialize, Debug)]
struct NamedUser {
    user: UserEntry,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    client_key_data: Option<String>,
}

fn decode(value: &str, what: &str) -> Result<Vec<u8>> {
    base64::decode(value.trim()).context(error::Base64Snafu { what })
}

pub(crate) fn parse_kubeconfig(yaml: &str) -> Result<ClusterAccess> {
    let config: Kubeconfig = serde_yaml::from_str(yaml).context(error::KubeconfigParseSnafu)?;
    let cluster = config
        .clusters
        .first()
        .filter(|c| !c.cluster.certificate_authority_data.is_empty())
        .context(error::KubeconfigMissingSnafu {
            what: "certificate-authority-data",
        })?;
    let ca_pem = decode(
        &cluster.cluster.certificate_authority_data,
        "certificate-authority-data",
    )?;
    let user = config.users.into_iter().next().map(|u| u.user).unwrap_or_default();
    let client_cert = match (user.client_certificate_data, user.client_key_data) {
        (Some(cert), Some(key)) => Some((
            decode(&cert, "client-certificate-data")?,
            decode(&key, "client-key-data")?,
        )),
        _ => None,
    };
    Ok(ClusterAccess {
        ca_pem,
        token: user.token.filter(|token| !token.is_empty()),
        client_cert,
    })
}
