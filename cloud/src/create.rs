use crate::certificates;
use crate::error::{self, Result};
use crate::provider::{CloudRegistry, ClusterManager};
use log::info;
use pharmer_model::constants::NETWORK_PROVIDER_CALICO;
use pharmer_model::{Cluster, ClusterPhase, MachineSet};
use pharmer_store::StoreProvider;
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;

/// Records a new cluster in the store. Nothing is created in the cloud until the cluster is
/// applied.
pub async fn create_cluster(
    store: &dyn StoreProvider,
    registry: &CloudRegistry,
    mut cluster: Cluster,
) -> Result<Cluster> {
    ensure!(!cluster.name().is_empty(), error::MissingNameSnafu);
    let name = cluster.name().to_string();
    ensure!(
        !cluster.provider().is_empty(),
        error::MissingProviderSnafu { name: &name }
    );
    match store.clusters().get(&name).await {
        Ok(_) => return error::AlreadyExistsSnafu { name }.fail(),
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            return Err(e).context(error::StoreSnafu {
                operation: format!("look up cluster '{}'", name),
            })
        }
    }
    let manager = registry.manager(cluster.provider())?;

    cluster.ensure_uid();
    cluster.status.phase = ClusterPhase::Pending;
    cluster.set_cert_names();
    if cluster.spec.config.cloud.ssh_key_name.is_empty() {
        cluster.spec.config.cloud.ssh_key_name = format!("{}-sshkey", name);
    }
    let network_provider = match cluster.spec.config.cloud.network_provider.as_str() {
        "" => NETWORK_PROVIDER_CALICO.to_string(),
        other => other.to_string(),
    };
    cluster.set_networking_defaults(&network_provider);
    manager.set_default_cluster(&mut cluster)?;

    certificates::create_pharmer_certs(store, &cluster).await?;
    let cluster = store
        .clusters()
        .create(cluster)
        .await
        .context(error::StoreSnafu {
            operation: format!("create cluster '{}'", name),
        })?;
    info!(
        "Created cluster '{}' for provider '{}'",
        name,
        cluster.provider()
    );
    Ok(cluster)
}

/// Records one node group per SKU in `nodes`, each with the given number of nodes.
pub async fn create_machine_sets(
    store: &dyn StoreProvider,
    manager: &dyn ClusterManager,
    cluster: &Cluster,
    nodes: &BTreeMap<String, i32>,
) -> Result<Vec<MachineSet>> {
    let machine_sets = store.machine_sets(cluster.name());
    let mut created = Vec::with_capacity(nodes.len());
    for (sku, count) in nodes {
        let node_spec = manager.default_node_spec(cluster, sku)?;
        let machine_set = MachineSet::new(cluster.name(), sku, *count, node_spec);
        let name = machine_set.name().to_string();
        let machine_set = machine_sets
            .create(machine_set)
            .await
            .context(error::StoreSnafu {
                operation: format!("create node group '{}'", name),
            })?;
        info!(
            "Created node group '{}' with {} node(s) in cluster '{}'",
            name,
            count,
            cluster.name()
        );
        created.push(machine_set);
    }
    Ok(created)
}
