use anyhow::{Context, Result};
use log::{debug, info};
use pharmer_cloud::provider::{CloudRegistry, ClusterManager};
use pharmer_cloud::Scope;
use pharmer_model::config::{default_config_path, load_config};
use pharmer_model::{Cluster, PharmerConfig};
use pharmer_store::{new_store_provider, DynStore};
use std::path::PathBuf;
use terminal_size::{Height, Width};

/// Everything a command needs: the loaded configuration, the store it names and the known cloud
/// providers.
pub(crate) struct Pharmer {
    pub(crate) config: PharmerConfig,
    pub(crate) store: DynStore,
    pub(crate) registry: CloudRegistry,
}

impl Pharmer {
    pub(crate) async fn open(config_file: Option<PathBuf>) -> Result<Self> {
        let path = match config_file {
            Some(path) => path,
            None => default_config_path().context("Unable to find the home directory")?,
        };
        debug!("Loading config from '{}'", path.display());
        let config = load_config(&path)
            .context(format!("Unable to load config '{}'", path.display()))?;
        let store = new_store_provider(&config)
            .await
            .context("Unable to open the store")?;
        let pharmer = Self {
            config,
            store,
            registry: pharmer_providers::registry(),
        };
        pharmer.import_credentials().await?;
        Ok(pharmer)
    }

    /// Copies the credentials embedded in the config file into the store unless the store
    /// already has a credential of the same name.
    async fn import_credentials(&self) -> Result<()> {
        let credentials = self.store.credentials();
        for credential in &self.config.credentials {
            let name = credential.metadata.name.as_str();
            match credentials.get(name).await {
                Ok(_) => continue,
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(e).context(format!("Unable to look up credential '{}'", name))
                }
            }
            credentials
                .create(credential.clone())
                .await
                .context(format!("Unable to store credential '{}'", name))?;
            info!("Imported credential '{}' from the config file", name);
        }
        Ok(())
    }

    pub(crate) async fn cluster(&self, name: &str) -> Result<Cluster> {
        self.store
            .clusters()
            .get(name)
            .await
            .context(format!("Unable to load cluster '{}'", name))
    }

    pub(crate) fn manager(&self, cluster: &Cluster) -> Result<Box<dyn ClusterManager>> {
        self.registry.manager(cluster.provider()).context(format!(
            "No cluster manager for cluster '{}'",
            cluster.name()
        ))
    }

    /// A scope for `name` together with a manager connected to its cloud provider.
    pub(crate) async fn connect(&self, name: &str) -> Result<(Scope, Box<dyn ClusterManager>)> {
        let cluster = self.cluster(name).await?;
        let mut manager = self.manager(&cluster)?;
        let mut scope = Scope::new(cluster, self.store.clone());
        manager
            .set_cloud_connector(&mut scope)
            .await
            .context(format!("Unable to connect to the cloud of cluster '{}'", name))?;
        Ok((scope, manager))
    }
}

/// The width tables are rendered at.
pub(crate) fn terminal_width() -> usize {
    let (Width(width), _) = terminal_size::terminal_size().unwrap_or((Width(120), Height(0)));
    width as usize
}
