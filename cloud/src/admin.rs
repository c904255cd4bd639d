//! Talks to the API server of a provisioned cluster with the admin credentials pharmer holds.

use crate::error::{self, Result};
use crate::wait::{poll_immediate, PollError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use log::{debug, info};
use pharmer_model::constants::KUBE_SYSTEM_NAMESPACE;
use pharmer_model::KubeConfig;
use snafu::{OptionExt, ResultExt};
use std::convert::Infallible;
use std::time::Duration;

/// The calls pharmer makes against a cluster once the cloud reports it as provisioned.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Waits until the API server answers requests.
    async fn wait_for_ready(&self, interval: Duration, timeout: Duration) -> Result<()>;

    /// The uid of the `kube-system` namespace. pharmer adopts it as the cluster uid.
    async fn kube_system_uid(&self) -> Result<String>;
}

/// An [`AdminClient`] backed by a `kube::Client`.
#[derive(Clone)]
pub struct KubeAdminClient {
    client: Client,
}

impl KubeAdminClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_kube_config(konfig: &KubeConfig) -> Result<Self> {
        let yaml = konfig
            .to_kubectl_config()
            .to_yaml()
            .context(error::ModelSnafu)?;
        let kubeconfig = Kubeconfig::from_yaml(&yaml).context(error::KubeConfigSnafu)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context(error::KubeConfigSnafu)?;
        let client = Client::try_from(config).context(error::KubeClientSnafu)?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl AdminClient for KubeAdminClient {
    async fn wait_for_ready(&self, interval: Duration, timeout: Duration) -> Result<()> {
        info!("Waiting for the API server to become ready");
        let client = &self.client;
        poll_immediate(interval, timeout, move || async move {
            match client.apiserver_version().await {
                Ok(version) => {
                    info!("API server is ready, version {}", version.git_version);
                    Ok::<_, Infallible>(true)
                }
                Err(e) => {
                    debug!("API server is not ready yet: {}", e);
                    Ok(false)
                }
            }
        })
        .await
        .map_err(|e| match e {
            PollError::Timeout(timeout) => error::TimeoutSnafu {
                what: "the API server",
                timeout,
            }
            .build(),
            PollError::Condition(never) => match never {},
        })
    }

    async fn kube_system_uid(&self) -> Result<String> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let namespace = namespaces
            .get(KUBE_SYSTEM_NAMESPACE)
            .await
            .context(error::KubeNamespaceSnafu {
                namespace: KUBE_SYSTEM_NAMESPACE,
            })?;
        namespace.metadata.uid.context(error::NamespaceUidSnafu {
            namespace: KUBE_SYSTEM_NAMESPACE,
        })
    }
}
