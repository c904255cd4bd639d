//! The parts of the Google Kubernetes Engine and Compute Engine REST APIs pharmer uses.

use crate::error::{self, Result};
use crate::rest::RestClient;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::time::Duration;
use tokio::sync::Mutex;

const CONTAINER_API: &str = "https://container.googleapis.com/v1";
const COMPUTE_API: &str = "https://compute.googleapis.com/compute/v1";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Operation status reported once a zone operation is finished.
pub(crate) const OPERATION_DONE: &str = "DONE";

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GkeCluster {
    pub(crate) name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) endpoint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) network: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) cluster_ipv4_cidr: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) initial_cluster_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) master_auth: Option<MasterAuth>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) node_pools: Vec<GkeNodePool>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MasterAuth {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) password: String,
    /// Base64 encoded PEM.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) cluster_ca_certificate: String,
    /// Base64 encoded PEM.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) client_certificate: String,
    /// Base64 encoded PEM.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) client_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) client_certificate_config: Option<ClientCertificateConfig>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClientCertificateConfig {
    #[serde(default)]
    pub(crate) issue_client_certificate: bool,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GkeNodePool {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) initial_node_count: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) config: Option<NodeConfig>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) status: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NodeConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) machine_type: String,
    #[serde(default)]
    pub(crate) disk_size_gb: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) disk_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) image_type: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GkeOperation {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) status_message: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Network {
    pub(crate) name: String,
    #[serde(default, rename = "IPv4Range", skip_serializing_if = "String::is_empty")]
    pub(crate) ipv4_range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) auto_create_subnetworks: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ClusterList {
    #[serde(default)]
    clusters: Vec<GkeCluster>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CreateClusterRequest<'a> {
    cluster: &'a GkeCluster,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CreateNodePoolRequest<'a> {
    node_pool: &'a GkeNodePool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SetNodePoolSizeRequest {
    node_count: i32,
}

/// The GKE and GCE calls a [`GkeManager`](super::GkeManager) makes, for one project and zone.
#[async_trait]
pub(crate) trait ContainerApi: Send + Sync {
    async fn list_clusters(&self) -> Result<Vec<GkeCluster>>;

    async fn get_cluster(&self, name: &str) -> Result<Option<GkeCluster>>;

    async fn create_cluster(&self, cluster: &GkeCluster) -> Result<GkeOperation>;

    async fn delete_cluster(&self, name: &str) -> Result<GkeOperation>;

    async fn get_node_pool(&self, cluster: &str, pool: &str) -> Result<Option<GkeNodePool>>;

    async fn create_node_pool(&self, cluster: &str, pool: &GkeNodePool) -> Result<GkeOperation>;

    async fn set_node_pool_size(&self, cluster: &str, pool: &str, size: i32)
        -> Result<GkeOperation>;

    async fn delete_node_pool(&self, cluster: &str, pool: &str) -> Result<GkeOperation>;

    async fn get_operation(&self, name: &str) -> Result<GkeOperation>;

    async fn get_network(&self, name: &str) -> Result<Option<Network>>;

    async fn insert_network(&self, network: &Network) -> Result<()>;
}

/// The fields of a Google service account key file pharmer reads.
#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ServiceAccount {
    pub(crate) client_email: String,
    pub(crate) private_key: String,
    #[serde(default)]
    pub(crate) token_uri: Option<String>,
}

#[derive(Serialize, Debug)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: i64,
}

/// Talks to Google Cloud with an OAuth2 access token obtained for a service account.
#[derive(Debug)]
pub(crate) struct GkeClient {
    rest: RestClient,
    account: ServiceAccount,
    project: String,
    zone: String,
    token: Mutex<Option<AccessToken>>,
}

impl GkeClient {
    pub(crate) fn new(service_account: &str, project: &str, zone: &str) -> Result<Self> {
        let account: ServiceAccount =
            serde_json::from_str(service_account).context(error::ServiceAccountSnafu)?;
        Ok(Self {
            rest: RestClient::new()?,
            account,
            project: project.to_string(),
            zone: zone.to_string(),
            token: Mutex::new(None),
        })
    }

    fn token_uri(&self) -> &str {
        self.account
            .token_uri
            .as_deref()
            .unwrap_or(DEFAULT_TOKEN_URI)
    }

    /// A signed JWT asserting the service account identity, valid for one hour.
    fn assertion(&self, now: i64) -> Result<String> {
        let claims = Claims {
            iss: &self.account.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: self.token_uri(),
            iat: now,
            exp: now + TOKEN_LIFETIME.as_secs() as i64,
        };
        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes())
            .context(error::TokenSignSnafu)?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .context(error::TokenSignSnafu)
    }

    /// The cached access token, refreshed a minute before it expires.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - 60 > now {
                return Ok(token.token.clone());
            }
        }
        debug!("Requesting access token for '{}'", self.account.client_email);
        let assertion = self.assertion(now)?;
        let url = self.token_uri().to_string();
        let response = self
            .rest
            .http()
            .post(&url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context(error::HttpSnafu {
                method: "POST",
                url: &url,
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return error::ApiSnafu {
                method: "POST",
                url,
                status: status.as_u16(),
                body,
            }
            .fail();
        }
        let token: TokenResponse = response.json().await.context(error::HttpSnafu {
            method: "POST",
            url: &url,
        })?;
        let expires_in = if token.expires_in > 0 {
            token.expires_in
        } else {
            TOKEN_LIFETIME.as_secs() as i64
        };
        *cached = Some(AccessToken {
            token: token.access_token.clone(),
            expires_at: now + expires_in,
        });
        Ok(token.access_token)
    }

    fn zone_url(&self) -> String {
        format!(
            "{}/projects/{}/zones/{}",
            CONTAINER_API, self.project, self.zone
        )
    }

    fn cluster_url(&self, name: &str) -> String {
        format!("{}/clusters/{}", self.zone_url(), name)
    }

    fn node_pool_url(&self, cluster: &str, pool: &str) -> String {
        format!("{}/nodePools/{}", self.cluster_url(cluster), pool)
    }

    fn network_url(&self) -> String {
        format!("{}/projects/{}/global/networks", COMPUTE_API, self.project)
    }
}

#[async_trait]
impl ContainerApi for GkeClient {
    async fn list_clusters(&self) -> Result<Vec<GkeCluster>> {
        let token = self.access_token().await?;
        let url = format!("{}/clusters", self.zone_url());
        let list: Option<ClusterList> = self.rest.get(&url, &token).await?;
        Ok(list.unwrap_or_default().clusters)
    }

    async fn get_cluster(&self, name: &str) -> Result<Option<GkeCluster>> {
        let token = self.access_token().await?;
        self.rest.get(&self.cluster_url(name), &token).await
    }

    async fn create_cluster(&self, cluster: &GkeCluster) -> Result<GkeOperation> {
        let token = self.access_token().await?;
        let url = format!("{}/clusters", self.zone_url());
        self.rest
            .post(&url, &token, &CreateClusterRequest { cluster })
            .await
    }

    async fn delete_cluster(&self, name: &str) -> Result<GkeOperation> {
        let token = self.access_token().await?;
        let url = self.cluster_url(name);
        let body = self.rest.delete(&url, &token).await?;
        serde_json::from_str(&body).context(error::JsonSnafu {
            what: format!("response of DELETE {}", url),
        })
    }

    async fn get_node_pool(&self, cluster: &str, pool: &str) -> Result<Option<GkeNodePool>> {
        let token = self.access_token().await?;
        self.rest
            .get(&self.node_pool_url(cluster, pool), &token)
            .await
    }

    async fn create_node_pool(&self, cluster: &str, pool: &GkeNodePool) -> Result<GkeOperation> {
        let token = self.access_token().await?;
        let url = format!("{}/nodePools", self.cluster_url(cluster));
        self.rest
            .post(&url, &token, &CreateNodePoolRequest { node_pool: pool })
            .await
    }

    async fn set_node_pool_size(
        &self,
        cluster: &str,
        pool: &str,
        size: i32,
    ) -> Result<GkeOperation> {
        let token = self.access_token().await?;
        let url = format!("{}/setSize", self.node_pool_url(cluster, pool));
        self.rest
            .post(&url, &token, &SetNodePoolSizeRequest { node_count: size })
            .await
    }

    async fn delete_node_pool(&self, cluster: &str, pool: &str) -> Result<GkeOperation> {
        let token = self.access_token().await?;
        let url = self.node_pool_url(cluster, pool);
        let body = self.rest.delete(&url, &token).await?;
        serde_json::from_str(&body).context(error::JsonSnafu {
            what: format!("response of DELETE {}", url),
        })
    }

    async fn get_operation(&self, name: &str) -> Result<GkeOperation> {
        let token = self.access_token().await?;
        let url = format!("{}/operations/{}", self.zone_url(), name);
        let operation: Option<GkeOperation> = self.rest.get(&url, &token).await?;
        Ok(operation.unwrap_or(GkeOperation {
            name: name.to_string(),
            status: OPERATION_DONE.to_string(),
            status_message: String::new(),
        }))
    }

    async fn get_network(&self, name: &str) -> Result<Option<Network>> {
        let token = self.access_token().await?;
        let url = format!("{}/{}", self.network_url(), name);
        self.rest.get(&url, &token).await
    }

    async fn insert_network(&self, network: &Network) -> Result<()> {
        let token = self.access_token().await?;
        let _: serde_json::Value = self.rest.post(&self.network_url(), &token, network).await?;
        Ok(())
    }
}
