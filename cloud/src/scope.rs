use crate::certificates::{self, CertKeyPair, PharmerCertificates};
use crate::error::{self, Result};
use log::debug;
use pharmer_model::{Cluster, Credential, MachineSet};
use pharmer_store::DynStore;
use snafu::{OptionExt, ResultExt};
use std::fmt::{Debug, Formatter};

/// The cluster being worked on and the store it is kept in. One scope is built per command and
/// handed to the cluster manager, which keeps `cluster` current as the cloud side changes.
#[derive(Clone)]
pub struct Scope {
    pub cluster: Cluster,
    pub store: DynStore,
    pub certs: Option<PharmerCertificates>,
}

impl Debug for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("cluster", &self.cluster.name())
            .field("certs", &self.certs.is_some())
            .finish()
    }
}

impl Scope {
    pub fn new(cluster: Cluster, store: DynStore) -> Self {
        Self {
            cluster,
            store,
            certs: None,
        }
    }

    pub fn cluster_name(&self) -> &str {
        self.cluster.name()
    }

    /// The credential named by the cluster config.
    pub async fn credential(&self) -> Result<Credential> {
        let name = &self.cluster.spec.config.credential_name;
        self.store
            .credentials()
            .get(name)
            .await
            .context(error::StoreSnafu {
                operation: format!("load credential '{}'", name),
            })
    }

    /// The stored node groups of the cluster.
    pub async fn machine_sets(&self) -> Result<Vec<MachineSet>> {
        self.store
            .machine_sets(self.cluster.name())
            .list()
            .await
            .context(error::StoreSnafu {
                operation: "list node groups",
            })
    }

    /// Loads the cluster certificates from the store the first time they are needed.
    pub async fn certs(&mut self) -> Result<&PharmerCertificates> {
        if self.certs.is_none() {
            debug!("Loading certificates of cluster '{}'", self.cluster.name());
            let certs = certificates::get_pharmer_certs(self.store.as_ref(), &self.cluster).await?;
            self.certs = Some(certs);
        }
        self.certs.as_ref().context(error::MissingCertsSnafu {
            name: self.cluster.name(),
        })
    }

    pub async fn ca_cert_pair(&mut self) -> Result<CertKeyPair> {
        Ok(self.certs().await?.ca.clone())
    }

    /// Writes the whole cluster back to the store.
    pub async fn update_cluster(&mut self) -> Result<()> {
        self.cluster = self
            .store
            .clusters()
            .update(self.cluster.clone())
            .await
            .context(error::StoreSnafu {
                operation: format!("update cluster '{}'", self.cluster.name()),
            })?;
        Ok(())
    }

    /// Writes only the cluster status back to the store.
    pub async fn update_cluster_status(&mut self) -> Result<()> {
        self.cluster = self
            .store
            .clusters()
            .update_status(self.cluster.clone())
            .await
            .context(error::StoreSnafu {
                operation: format!("update status of cluster '{}'", self.cluster.name()),
            })?;
        Ok(())
    }

    /// Re-reads the cluster from the store.
    pub async fn reload(&mut self) -> Result<()> {
        self.cluster = self
            .store
            .clusters()
            .get(self.cluster.name())
            .await
            .context(error::StoreSnafu {
                operation: format!("load cluster '{}'", self.cluster.name()),
            })?;
        Ok(())
    }
}
