use crate::error::{self, Result};
use chrono::Utc;
use log::info;
use pharmer_model::{Cluster, ClusterPhase, MachineSet};
use pharmer_store::StoreProvider;
use snafu::ResultExt;

/// Requests deletion of a cluster. The cloud side is removed by the next apply, which also copes
/// with a cluster that was never created in the cloud.
pub async fn delete_cluster(store: &dyn StoreProvider, name: &str) -> Result<Cluster> {
    let clusters = store.clusters();
    let mut cluster = clusters.get(name).await.context(error::StoreSnafu {
        operation: format!("load cluster '{}'", name),
    })?;
    if cluster.metadata.deletion_timestamp.is_none() {
        cluster.metadata.deletion_timestamp = Some(Utc::now());
    }
    if cluster.status.phase != ClusterPhase::Deleted {
        cluster.status.phase = ClusterPhase::Deleting;
    }
    info!("Cluster '{}' is now {}", name, cluster.status.phase);
    clusters.update(cluster).await.context(error::StoreSnafu {
        operation: format!("update cluster '{}'", name),
    })
}

async fn load_machine_set(
    store: &dyn StoreProvider,
    cluster: &str,
    name: &str,
) -> Result<MachineSet> {
    match store.machine_sets(cluster).get(name).await {
        Ok(machine_set) => Ok(machine_set),
        Err(e) if e.is_not_found() => error::NodeGroupNotFoundSnafu { name, cluster }.fail(),
        Err(e) => Err(e).context(error::StoreSnafu {
            operation: format!("load node group '{}'", name),
        }),
    }
}

/// Sets the desired node count of a node group. Zero marks the node group for deletion.
pub async fn scale_machine_set(
    store: &dyn StoreProvider,
    cluster: &str,
    name: &str,
    replicas: i32,
) -> Result<MachineSet> {
    let mut machine_set = load_machine_set(store, cluster, name).await?;
    machine_set.spec.replicas = replicas.max(0);
    machine_set.metadata.generation += 1;
    info!(
        "Node group '{}' of cluster '{}' now wants {} node(s)",
        name, cluster, machine_set.spec.replicas
    );
    store
        .machine_sets(cluster)
        .update(machine_set)
        .await
        .context(error::StoreSnafu {
            operation: format!("update node group '{}'", name),
        })
}

/// Marks a node group for deletion. Its node pool is removed by the next apply.
pub async fn delete_machine_set(
    store: &dyn StoreProvider,
    cluster: &str,
    name: &str,
) -> Result<MachineSet> {
    let mut machine_set = load_machine_set(store, cluster, name).await?;
    if machine_set.metadata.deletion_timestamp.is_none() {
        machine_set.metadata.deletion_timestamp = Some(Utc::now());
    }
    info!("Node group '{}' of cluster '{}' is marked for deletion", name, cluster);
    store
        .machine_sets(cluster)
        .update(machine_set)
        .await
        .context(error::StoreSnafu {
            operation: format!("update node group '{}'", name),
        })
}
