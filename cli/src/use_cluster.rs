use crate::pharmer::Pharmer;
use anyhow::{Context, Result};
use clap::Parser;
use pharmer_cloud::{get_kube_config, use_cluster};
use pharmer_model::config::home_dir;
use pharmer_model::constants::KUBE_CONFIG_PATH;
use std::path::PathBuf;

/// Make a cluster the current kubectl context.
#[derive(Debug, Parser)]
pub(crate) enum Use {
    /// Write the admin kubeconfig of a cluster into the kubectl configuration.
    Cluster(UseCluster),
}

impl Use {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        match self {
            Use::Cluster(use_cluster) => use_cluster.run(pharmer).await,
        }
    }
}

#[derive(Debug, Parser)]
pub(crate) struct UseCluster {
    /// Name of the cluster.
    name: String,

    /// Replace an existing context of the same name instead of just selecting it.
    #[clap(long)]
    overwrite: bool,

    /// Path of the kubectl configuration. Defaults to `~/.kube/config`.
    #[clap(long)]
    kubeconfig: Option<PathBuf>,
}

impl UseCluster {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        let path = match self.kubeconfig {
            Some(path) => path,
            None => home_dir()
                .context("Unable to find the home directory")?
                .join(KUBE_CONFIG_PATH),
        };
        let (scope, manager) = pharmer.connect(&self.name).await?;
        let konfig = get_kube_config(&scope, manager.as_ref())
            .await
            .context(format!("Unable to get the kubeconfig of cluster '{}'", self.name))?;
        let backup = use_cluster(&konfig, &path, self.overwrite)
            .context(format!("Unable to update '{}'", path.display()))?;
        if let Some(backup) = backup {
            println!("Previous kubeconfig saved as '{}'", backup.display());
        }
        println!(
            "Current context is now '{}' in '{}'",
            konfig.context.name,
            path.display()
        );
        Ok(())
    }
}
