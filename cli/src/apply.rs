use crate::pharmer::Pharmer;
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use pharmer_cloud::{apply, Scope};

/// Bring a cluster in the cloud in line with its stored state.
#[derive(Debug, Parser)]
pub(crate) struct Apply {
    /// Name of the cluster.
    name: String,

    /// Print the actions that would be taken without changing anything.
    #[clap(long = "dry-run")]
    dry_run: bool,
}

impl Apply {
    pub(crate) async fn run(self, pharmer: Pharmer) -> Result<()> {
        let cluster = pharmer.cluster(&self.name).await?;
        let mut manager = pharmer.manager(&cluster)?;
        let mut scope = Scope::new(cluster, pharmer.store.clone());
        let actions = apply(&mut scope, manager.as_mut(), self.dry_run)
            .await
            .context(format!("Unable to apply cluster '{}'", self.name))?;
        if actions.is_empty() {
            info!("Nothing to do for cluster '{}'", self.name);
        }
        for action in actions {
            println!("{}", action);
        }
        Ok(())
    }
}
