use crate::pharmer::{terminal_width, Pharmer};
use anyhow::{Context, Result};
use clap::{ArgEnum, Parser};
use pharmer_model::{Cluster, Listing, Object};
use serde::Serialize;

/// List clusters, node groups or credentials.
#[derive(Debug, Parser)]
pub(crate) enum Get {
    /// List clusters.
    Cluster(GetClusters),
    /// List the node groups of a cluster.
    #[clap(name = "nodegroup", alias = "ng")]
    NodeGroup(GetNodeGroups),
    /// List credentials. Credential data is never printed.
    Credential(GetCredentials),
}

impl Get {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        match self {
            Get::Cluster(get) => get.run(pharmer).await,
            Get::NodeGroup(get) => get.run(pharmer).await,
            Get::Credential(get) => get.run(pharmer).await,
        }
    }
}

const MASK: &str = "*****";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ArgEnum)]
enum OutputFormat {
    Table,
    Json,
    Yaml,
}

#[derive(Debug, Parser)]
pub(crate) struct GetClusters {
    /// Names of the clusters to show, all clusters when empty.
    names: Vec<String>,

    /// Output format.
    #[clap(long, short = 'o', arg_enum, default_value = "table")]
    output: OutputFormat,
}

impl GetClusters {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        let clusters = pharmer
            .store
            .clusters()
            .list()
            .await
            .context("Unable to list clusters")?;
        let mut clusters = filter(clusters, &self.names);
        clusters.iter_mut().for_each(mask_cluster_secrets);
        print(self.output, &clusters, || Listing::clusters(clusters.clone()))
    }
}

#[derive(Debug, Parser)]
pub(crate) struct GetNodeGroups {
    /// Names of the node groups to show, all node groups when empty.
    names: Vec<String>,

    /// Name of the cluster.
    #[clap(long)]
    cluster: String,

    /// Output format.
    #[clap(long, short = 'o', arg_enum, default_value = "table")]
    output: OutputFormat,
}

impl GetNodeGroups {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        let machine_sets = pharmer
            .store
            .machine_sets(&self.cluster)
            .list()
            .await
            .context(format!(
                "Unable to list node groups of cluster '{}'",
                self.cluster
            ))?;
        let machine_sets = filter(machine_sets, &self.names);
        print(self.output, &machine_sets, || {
            Listing::machine_sets(machine_sets.clone())
        })
    }
}

#[derive(Debug, Parser)]
pub(crate) struct GetCredentials {
    /// Names of the credentials to show, all credentials when empty.
    names: Vec<String>,

    /// Output format.
    #[clap(long, short = 'o', arg_enum, default_value = "table")]
    output: OutputFormat,
}

impl GetCredentials {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        let mut credentials = pharmer
            .store
            .credentials()
            .list()
            .await
            .context("Unable to list credentials")?;
        for credential in &mut credentials {
            for value in credential.spec.data.values_mut() {
                *value = MASK.to_string();
            }
        }
        let credentials = filter(credentials, &self.names);
        print(self.output, &credentials, || {
            Listing::credentials(credentials.clone())
        })
    }
}

fn mask_cluster_secrets(cluster: &mut Cluster) {
    if let Some(gke) = cluster.spec.config.cloud.gke.as_mut() {
        if !gke.password.is_empty() {
            gke.password = MASK.to_string();
        }
    }
}

fn filter<T: Object>(objects: Vec<T>, names: &[String]) -> Vec<T> {
    if names.is_empty() {
        return objects;
    }
    objects
        .into_iter()
        .filter(|obj| names.iter().any(|name| name == obj.name()))
        .collect()
}

fn print<T, F>(output: OutputFormat, objects: &T, listing: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce() -> Listing,
{
    match output {
        OutputFormat::Table => println!("{}", listing().to_string(terminal_width())),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(objects).context("Could not create json output")?
        ),
        OutputFormat::Yaml => print!(
            "{}",
            serde_yaml::to_string(objects).context("Could not create yaml output")?
        ),
    }
    Ok(())
}
