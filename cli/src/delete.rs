use crate::pharmer::Pharmer;
use anyhow::{ensure, Context, Result};
use clap::Parser;
use pharmer_cloud::{delete_cluster, delete_machine_set};

/// Request the deletion of a cluster, node group or credential.
#[derive(Debug, Parser)]
pub(crate) enum Delete {
    /// Mark a cluster for deletion. `pharmer apply` removes it from the cloud.
    Cluster(DeleteCluster),
    /// Mark a node group for deletion. `pharmer apply` removes it from the cloud.
    #[clap(name = "nodegroup", alias = "ng")]
    NodeGroup(DeleteNodeGroup),
    /// Remove a stored credential that no cluster uses.
    Credential(DeleteCredential),
}

impl Delete {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        match self {
            Delete::Cluster(delete) => delete.run(pharmer).await,
            Delete::NodeGroup(delete) => delete.run(pharmer).await,
            Delete::Credential(delete) => delete.run(pharmer).await,
        }
    }
}

#[derive(Debug, Parser)]
pub(crate) struct DeleteCluster {
    /// Names of the clusters.
    #[clap(required = true)]
    names: Vec<String>,
}

impl DeleteCluster {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        for name in &self.names {
            let cluster = delete_cluster(pharmer.store.as_ref(), name)
                .await
                .context(format!("Unable to delete cluster '{}'", name))?;
            println!("Cluster '{}' is {}", name, cluster.status.phase);
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub(crate) struct DeleteNodeGroup {
    /// Names of the node groups.
    #[clap(required = true)]
    names: Vec<String>,

    /// Name of the cluster.
    #[clap(long)]
    cluster: String,
}

impl DeleteNodeGroup {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        for name in &self.names {
            delete_machine_set(pharmer.store.as_ref(), &self.cluster, name)
                .await
                .context(format!("Unable to delete node group '{}'", name))?;
            println!("Node group '{}' marked for deletion", name);
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
pub(crate) struct DeleteCredential {
    /// Names of the credentials.
    #[clap(required = true)]
    names: Vec<String>,
}

impl DeleteCredential {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        let clusters = pharmer
            .store
            .clusters()
            .list()
            .await
            .context("Unable to list clusters")?;
        for name in &self.names {
            let users: Vec<&str> = clusters
                .iter()
                .filter(|cluster| &cluster.spec.config.credential_name == name)
                .map(|cluster| cluster.name())
                .collect();
            ensure!(
                users.is_empty(),
                "Credential '{}' is used by cluster(s) {}",
                name,
                users.join(", ")
            );
            pharmer
                .store
                .credentials()
                .delete(name)
                .await
                .context(format!("Unable to delete credential '{}'", name))?;
            println!("Credential '{}' deleted", name);
        }
        Ok(())
    }
}
