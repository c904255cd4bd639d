use crate::pharmer::Pharmer;
use anyhow::{Context, Result};
use clap::Parser;
use pharmer_cloud::scale_machine_set;

/// Change the desired state of a node group.
#[derive(Debug, Parser)]
pub(crate) enum Edit {
    /// Set the number of nodes of a node group. The change is made in the cloud by the next
    /// `pharmer apply`.
    #[clap(name = "nodegroup", alias = "ng")]
    NodeGroup(EditNodeGroup),
}

impl Edit {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        match self {
            Edit::NodeGroup(edit) => edit.run(pharmer).await,
        }
    }
}

#[derive(Debug, Parser)]
pub(crate) struct EditNodeGroup {
    /// Name of the node group.
    name: String,

    /// Name of the cluster.
    #[clap(long)]
    cluster: String,

    /// Desired number of nodes. Zero removes the node group.
    #[clap(long)]
    nodes: i32,
}

impl EditNodeGroup {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        let machine_set = scale_machine_set(
            pharmer.store.as_ref(),
            &self.cluster,
            &self.name,
            self.nodes,
        )
        .await
        .context(format!("Unable to scale node group '{}'", self.name))?;
        println!(
            "Node group '{}' of cluster '{}' set to {} node(s)",
            machine_set.name(),
            self.cluster,
            machine_set.spec.replicas
        );
        Ok(())
    }
}
