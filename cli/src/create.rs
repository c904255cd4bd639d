use crate::pharmer::Pharmer;
use anyhow::{ensure, Context, Result};
use clap::Parser;
use pharmer_cloud::{create_cluster, create_machine_sets};
use pharmer_model::constants::PROVIDER_EKS;
use pharmer_model::{Cluster, Credential, CredentialFormat, EksSpec};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Record a cluster, node group or credential.
#[derive(Debug, Parser)]
pub(crate) enum Create {
    /// Record a new cluster. Nothing is created in the cloud until `pharmer apply`.
    Cluster(CreateCluster),
    /// Add node groups to a cluster.
    #[clap(name = "nodegroup", alias = "ng")]
    NodeGroup(CreateNodeGroup),
    /// Store a cloud credential.
    Credential(CreateCredential),
}

impl Create {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        match self {
            Create::Cluster(create) => create.run(pharmer).await,
            Create::NodeGroup(create) => create.run(pharmer).await,
            Create::Credential(create) => create.run(pharmer).await,
        }
    }
}

#[derive(Debug, Parser)]
pub(crate) struct CreateCluster {
    /// Name of the cluster.
    name: String,

    /// Cloud provider, one of `gke`, `eks` or `dokube`.
    #[clap(long)]
    provider: String,

    /// Zone (or region) to place the cluster in.
    #[clap(long, default_value = "")]
    zone: String,

    /// Name of the stored credential used to talk to the cloud provider.
    #[clap(long = "credential-uid")]
    credential: String,

    /// Kubernetes version, the provider's default when empty.
    #[clap(long = "kubernetes-version", default_value = "")]
    kubernetes_version: String,

    /// Node groups to add, as `sku=count`. May be repeated.
    #[clap(long, parse(try_from_str = parse_nodes))]
    nodes: Vec<(String, i32)>,

    /// EKS only: ARN of the IAM role of the control plane.
    #[clap(long = "role-arn")]
    role_arn: Option<String>,

    /// EKS only: ARN of the IAM role of the worker nodes.
    #[clap(long = "node-role-arn")]
    node_role_arn: Option<String>,

    /// EKS only: subnets of the cluster VPC.
    #[clap(long = "subnet-id")]
    subnet_ids: Vec<String>,

    /// EKS only: additional security groups of the control plane.
    #[clap(long = "security-group-id")]
    security_group_ids: Vec<String>,
}

impl CreateCluster {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        let mut cluster = Cluster::new(&self.name);
        let config = &mut cluster.spec.config;
        config.credential_name = self.credential;
        config.kubernetes_version = self.kubernetes_version;
        config.cloud.cloud_provider = self.provider;
        config.cloud.zone = self.zone;
        if config.cloud.cloud_provider == PROVIDER_EKS {
            config.cloud.eks = Some(EksSpec {
                role_arn: self.role_arn.unwrap_or_default(),
                node_role_arn: self.node_role_arn.unwrap_or_default(),
                subnet_ids: self.subnet_ids,
                security_group_ids: self.security_group_ids,
            });
        }

        let cluster = create_cluster(pharmer.store.as_ref(), &pharmer.registry, cluster)
            .await
            .context(format!("Unable to create cluster '{}'", self.name))?;
        add_node_groups(&pharmer, &cluster, self.nodes).await?;
        println!("Cluster '{}' created", cluster.name());
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub(crate) struct CreateNodeGroup {
    /// Name of the cluster.
    #[clap(long)]
    cluster: String,

    /// Node groups to add, as `sku=count`. May be repeated.
    #[clap(long, required = true, parse(try_from_str = parse_nodes))]
    nodes: Vec<(String, i32)>,
}

impl CreateNodeGroup {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        let cluster = pharmer.cluster(&self.cluster).await?;
        ensure!(
            !cluster.is_deleting(),
            "Cluster '{}' is being deleted",
            cluster.name()
        );
        add_node_groups(&pharmer, &cluster, self.nodes).await
    }
}

async fn add_node_groups(
    pharmer: &Pharmer,
    cluster: &Cluster,
    nodes: Vec<(String, i32)>,
) -> Result<()> {
    if nodes.is_empty() {
        return Ok(());
    }
    let nodes: BTreeMap<String, i32> = nodes.into_iter().collect();
    let manager = pharmer.manager(cluster)?;
    let store = pharmer.store.as_ref();
    let machine_sets = create_machine_sets(store, manager.as_ref(), cluster, &nodes)
        .await
        .context(format!(
            "Unable to create node groups of cluster '{}'",
            cluster.name()
        ))?;
    for machine_set in machine_sets {
        println!(
            "Node group '{}' created with {} node(s)",
            machine_set.name(),
            machine_set.spec.replicas
        );
    }
    Ok(())
}

#[derive(Debug, Parser)]
pub(crate) struct CreateCredential {
    /// Name of the credential.
    name: String,

    /// Credential provider, one of `GoogleCloud`, `AWS` or `DigitalOcean`.
    #[clap(long)]
    provider: String,

    /// Read the credential from the provider's environment variables.
    #[clap(long = "from-env")]
    from_env: bool,

    /// Read a Google Cloud service account json file.
    #[clap(long = "from-file")]
    from_file: Option<PathBuf>,

    /// Credential data as `key=value`. May be repeated.
    #[clap(long, parse(try_from_str = parse_key_val))]
    data: Vec<(String, String)>,
}

impl CreateCredential {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        let format = CredentialFormat::for_provider(&self.provider).context(format!(
            "Unknown credential provider '{}'",
            self.provider
        ))?;
        let mut credential = Credential::new(&self.name, format.provider);
        if self.from_env {
            credential
                .load_from_env()
                .context("Unable to read the credential from the environment")?;
        }
        if let Some(path) = &self.from_file {
            credential
                .load_from_file(path)
                .context(format!("Unable to read credential file '{}'", path.display()))?;
        }
        credential.spec.data.extend(self.data);
        credential
            .validate()
            .context(format!("Credential '{}' is incomplete", self.name))?;

        pharmer
            .store
            .credentials()
            .create(credential)
            .await
            .context(format!("Unable to store credential '{}'", self.name))?;
        println!("Credential '{}' created", self.name);
        Ok(())
    }
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    Ok((key.to_string(), value.to_string()))
}

fn parse_nodes(s: &str) -> std::result::Result<(String, i32), String> {
    let (sku, count) = parse_key_val(s)?;
    let count = count
        .parse::<i32>()
        .map_err(|e| format!("invalid node count in '{}': {}", s, e))?;
    if sku.is_empty() || count < 0 {
        return Err(format!("expected sku=count, got '{}'", s));
    }
    Ok((sku, count))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nodes_are_sku_and_count() {
        assert_eq!(
            parse_nodes("n1-standard-2=3").unwrap(),
            ("n1-standard-2".to_string(), 3)
        );
        assert!(parse_nodes("n1-standard-2").is_err());
        assert!(parse_nodes("=1").is_err());
        assert!(parse_nodes("t3.medium=-1").is_err());
        assert!(parse_nodes("t3.medium=many").is_err());
    }

    #[test]
    fn data_values_may_contain_equals() {
        assert_eq!(
            parse_key_val("token=abc=").unwrap(),
            ("token".to_string(), "abc=".to_string())
        );
    }
}
