use crate::constants::{
    CA_CERT_NAME, FRONT_PROXY_CA_CERT_NAME, NETWORK_PROVIDER_CALICO, NETWORK_PROVIDER_FLANNEL,
    POD_CIDR_CALICO, POD_CIDR_DEFAULT, POD_CIDR_FLANNEL, SERVICE_CIDR_DEFAULT,
    SERVICE_DOMAIN_DEFAULT,
};
use crate::meta::{ObjectMeta, TypeMeta};
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use std::collections::BTreeMap;

/// A Kubernetes cluster managed by pharmer.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ClusterSpec,
    #[serde(default)]
    pub status: ClusterStatus,
}

impl_object!(Cluster, "Cluster", status);
crate::impl_display_as_json!(Cluster);

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub config: ClusterConfig,
    #[serde(default)]
    pub cluster_api: ClusterApiSpec,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    #[serde(default)]
    pub master_count: i32,
    #[serde(default)]
    pub cloud: CloudSpec,
    #[serde(default)]
    pub kubernetes_version: String,
    #[serde(default)]
    pub credential_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_cert_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub front_proxy_ca_cert_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub api_server_extra_args: BTreeMap<String, String>,
}

/// Cloud placement of a cluster. The provider sub-spec matching `cloud_provider` is filled in by
/// the provider's cluster manager when the cluster is created.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloudSpec {
    #[serde(default)]
    pub cloud_provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance_image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os_family: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_key_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gke: Option<GkeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eks: Option<EksSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dokube: Option<DokubeSpec>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GkeSpec {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub network_name: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EksSpec {
    #[serde(default)]
    pub role_arn: String,
    #[serde(default)]
    pub node_role_arn: String,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DokubeSpec {
    #[serde(default)]
    pub cluster_id: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterApiSpec {
    #[serde(default)]
    pub cluster_network: ClusterNetwork,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetwork {
    #[serde(default)]
    pub services: NetworkRanges,
    #[serde(default)]
    pub pods: NetworkRanges,
    #[serde(default)]
    pub service_domain: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRanges {
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub phase: ClusterPhase,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default)]
    pub cloud: CloudStatus,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloudStatus {
    /// Addresses of the API server. An entry is either a bare host or a full URL.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eks: Option<EksStatus>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EksStatus {
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub platform_version: String,
}

/// The lifecycle phase of a cluster. A cluster with no phase was never initialized by pharmer.
#[derive(Serialize, Deserialize, Debug, Default, Eq, PartialEq, Clone, Copy)]
pub enum ClusterPhase {
    #[default]
    #[serde(rename = "")]
    Unknown,
    Pending,
    Ready,
    Deleting,
    Deleted,
    Upgrading,
}

derive_fromstr_from_deserialize!(ClusterPhase, |e| -> crate::Error {
    crate::error::OpaqueError::SerdePlain { source: e }.into()
});
derive_display_from_serialize!(ClusterPhase);

impl Cluster {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn provider(&self) -> &str {
        &self.spec.config.cloud.cloud_provider
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn ensure_uid(&mut self) {
        if self.metadata.uid.is_empty() {
            self.metadata.uid = uuid::Uuid::new_v4().to_string();
        }
    }

    /// The URL of the API server, or `None` if the cluster has not been provisioned yet.
    pub fn api_server_url(&self) -> Option<String> {
        self.status.cloud.api_addresses.first().map(|address| {
            if address.starts_with("https://") || address.starts_with("http://") {
                address.clone()
            } else {
                format!("https://{}", address)
            }
        })
    }

    /// Makes `address` the preferred API server address, the one `api_server_url` returns.
    pub fn set_api_address<S: Into<String>>(&mut self, address: S) {
        let address = address.into();
        let addresses = &mut self.status.cloud.api_addresses;
        addresses.retain(|a| a != &address);
        addresses.insert(0, address);
    }

    /// Fill in the cluster networks that have not been chosen explicitly.
    pub fn set_networking_defaults(&mut self, network_provider: &str) {
        let network = &mut self.spec.cluster_api.cluster_network;
        if network.services.cidr_blocks.is_empty() {
            network.services.cidr_blocks = vec![SERVICE_CIDR_DEFAULT.to_string()];
        }
        if network.pods.cidr_blocks.is_empty() {
            let pods = match network_provider {
                NETWORK_PROVIDER_CALICO => POD_CIDR_CALICO,
                NETWORK_PROVIDER_FLANNEL => POD_CIDR_FLANNEL,
                _ => POD_CIDR_DEFAULT,
            };
            network.pods.cidr_blocks = vec![pods.to_string()];
        }
        if network.service_domain.is_empty() {
            network.service_domain = SERVICE_DOMAIN_DEFAULT.to_string();
        }
        self.spec.config.cloud.network_provider = network_provider.to_string();
    }

    pub fn set_cert_names(&mut self) {
        let config = &mut self.spec.config;
        if config.ca_cert_name.is_empty() {
            config.ca_cert_name = CA_CERT_NAME.to_string();
        }
        if config.front_proxy_ca_cert_name.is_empty() {
            config.front_proxy_ca_cert_name = FRONT_PROXY_CA_CERT_NAME.to_string();
        }
    }

    pub fn pod_cidr(&self) -> Option<&str> {
        self.spec
            .cluster_api
            .cluster_network
            .pods
            .cidr_blocks
            .first()
            .map(String::as_str)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn phase_round_trips_as_plain_string() {
        assert_eq!(ClusterPhase::Ready.to_string(), "Ready");
        assert_eq!(ClusterPhase::Unknown.to_string(), "");
        assert_eq!(ClusterPhase::from_str("Deleting").unwrap(), ClusterPhase::Deleting);
        assert!(ClusterPhase::from_str("Exploded").is_err());
    }

    #[test]
    fn missing_phase_deserializes_as_unknown() {
        let cluster: Cluster = serde_json::from_str(r#"{"metadata":{"name":"c1"}}"#).unwrap();
        assert_eq!(cluster.status.phase, ClusterPhase::Unknown);
        assert_eq!(cluster.name(), "c1");
    }

    #[test]
    fn networking_defaults_follow_network_provider() {
        let mut cluster = Cluster::new("c1");
        cluster.set_networking_defaults("calico");
        assert_eq!(cluster.pod_cidr(), Some(POD_CIDR_CALICO));
        assert_eq!(
            cluster.spec.cluster_api.cluster_network.services.cidr_blocks,
            vec![SERVICE_CIDR_DEFAULT.to_string()]
        );

        let mut cluster = Cluster::new("c2");
        cluster.spec.cluster_api.cluster_network.pods.cidr_blocks = vec!["10.0.0.0/8".into()];
        cluster.set_networking_defaults("flannel");
        assert_eq!(cluster.pod_cidr(), Some("10.0.0.0/8"));
        assert_eq!(
            cluster.spec.cluster_api.cluster_network.service_domain,
            "cluster.local"
        );
    }

    #[test]
    fn api_server_url() {
        let mut cluster = Cluster::new("c1");
        assert_eq!(cluster.api_server_url(), None);
        cluster.set_api_address("35.1.2.3");
        assert_eq!(cluster.api_server_url().unwrap(), "https://35.1.2.3");
        cluster.set_api_address("https://abc.eks.amazonaws.com");
        assert_eq!(
            cluster.api_server_url().unwrap(),
            "https://abc.eks.amazonaws.com"
        );
        cluster.set_api_address("35.1.2.3");
        assert_eq!(cluster.status.cloud.api_addresses.len(), 2);
        assert_eq!(cluster.api_server_url().unwrap(), "https://35.1.2.3");
        assert_eq!(
            cluster.status.cloud.api_addresses[1],
            "https://abc.eks.amazonaws.com"
        );
    }
}
