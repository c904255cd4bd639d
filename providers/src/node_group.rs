/*!

Reconciles the node groups pharmer stores for a cluster with the node pools of a managed
Kubernetes offering. Every provider exposes its node pool API through [`NodePools`] and
[`apply_node_groups`] walks the stored machine sets:

1. A machine set with no node pool gets one, unless it is marked for deletion.
2. A machine set marked for deletion has its node pool removed and is then removed from the store.
3. A node pool whose size differs from the machine set is resized.
4. The machine set status is updated to the desired replica count.

The first failure stops the walk.

!*/

use async_trait::async_trait;
use log::{debug, info};
use pharmer_cloud::provider::{IntoProviderError, ProviderResult, Resources};
use pharmer_cloud::Scope;
use pharmer_model::{Action, ActionType, MachineSet};

/// What a provider knows about an existing node pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodePool {
    /// The current node count, if the provider reports one.
    pub(crate) size: Option<i32>,
}

/// The node pool operations of one cluster. Each mutating call returns once the provider reports
/// the operation as finished.
#[async_trait]
pub(crate) trait NodePools: Send + Sync {
    async fn get(&self, name: &str) -> ProviderResult<Option<NodePool>>;

    async fn create(&self, machine_set: &MachineSet) -> ProviderResult<()>;

    async fn resize(&self, machine_set: &MachineSet) -> ProviderResult<()>;

    async fn delete(&self, name: &str) -> ProviderResult<()>;
}

pub(crate) async fn apply_node_groups(
    scope: &mut Scope,
    pools: &dyn NodePools,
    dry_run: bool,
) -> ProviderResult<Vec<Action>> {
    let machine_sets = scope
        .machine_sets()
        .await
        .context(Resources::Unknown, "Unable to list node groups")?;
    let mut actions = Vec::new();
    for machine_set in machine_sets {
        actions.extend(apply_node_group(scope, pools, machine_set, dry_run).await?);
    }
    if !dry_run {
        scope
            .update_cluster()
            .await
            .context(Resources::Remaining, "Unable to update cluster")?;
    }
    Ok(actions)
}

async fn apply_node_group(
    scope: &Scope,
    pools: &dyn NodePools,
    mut machine_set: MachineSet,
    dry_run: bool,
) -> ProviderResult<Vec<Action>> {
    let name = machine_set.name().to_string();
    let replicas = machine_set.spec.replicas;
    let store = scope.store.machine_sets(scope.cluster_name());
    let mut actions = Vec::new();

    let existing = pools.get(&name).await?;
    match existing {
        None if machine_set.is_marked_for_deletion() => {
            debug!("Node pool '{}' is already gone", name);
            if !dry_run {
                store.delete(&name).await.context(
                    Resources::Clear,
                    format!("Unable to delete node group '{}' from store", name),
                )?;
            }
            return Ok(actions);
        }
        None => {
            actions.push(Action::new(
                ActionType::Add,
                "Node pool",
                format!("Node pool {} will be created with {} node(s)", name, replicas),
            ));
            if !dry_run {
                info!("Creating node pool '{}' with {} node(s)", name, replicas);
                pools.create(&machine_set).await?;
            }
        }
        Some(_) if machine_set.is_marked_for_deletion() => {
            actions.push(Action::new(
                ActionType::Delete,
                "Node pool",
                format!("Node pool {} will be deleted", name),
            ));
            if !dry_run {
                info!("Deleting node pool '{}'", name);
                pools.delete(&name).await?;
                store.delete(&name).await.context(
                    Resources::Clear,
                    format!("Unable to delete node group '{}' from store", name),
                )?;
            }
            return Ok(actions);
        }
        Some(pool) => {
            let current = pool.size.unwrap_or(machine_set.status.replicas);
            if current != replicas {
                actions.push(Action::new(
                    ActionType::Update,
                    "Node pool",
                    format!(
                        "Node pool {} will be resized from {} to {} node(s)",
                        name, current, replicas
                    ),
                ));
                if !dry_run {
                    info!("Resizing node pool '{}' to {} node(s)", name, replicas);
                    pools.resize(&machine_set).await?;
                }
            } else {
                actions.push(Action::new(
                    ActionType::Nop,
                    "Node pool",
                    format!("Node pool {} has {} node(s)", name, current),
                ));
            }
        }
    }

    if !dry_run {
        machine_set.status.replicas = replicas;
        machine_set.status.observed_generation = machine_set.metadata.generation;
        store.update_status(machine_set).await.context(
            Resources::Remaining,
            format!("Unable to update status of node group '{}'", name),
        )?;
    }
    Ok(actions)
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use pharmer_model::{Cluster, NodeSpec};
    use pharmer_store::{fake, DynStore};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MemoryPools {
        pools: Mutex<BTreeMap<String, i32>>,
    }

    impl MemoryPools {
        fn sizes(&self) -> BTreeMap<String, i32> {
            self.pools.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NodePools for MemoryPools {
        async fn get(&self, name: &str) -> ProviderResult<Option<NodePool>> {
            Ok(self
                .pools
                .lock()
                .unwrap()
                .get(name)
                .map(|size| NodePool { size: Some(*size) }))
        }

        async fn create(&self, machine_set: &MachineSet) -> ProviderResult<()> {
            self.pools
                .lock()
                .unwrap()
                .insert(machine_set.name().to_string(), machine_set.spec.replicas);
            Ok(())
        }

        async fn resize(&self, machine_set: &MachineSet) -> ProviderResult<()> {
            self.create(machine_set).await
        }

        async fn delete(&self, name: &str) -> ProviderResult<()> {
            self.pools.lock().unwrap().remove(name);
            Ok(())
        }
    }

    async fn scope_with(machine_sets: &[(&str, i32)]) -> Scope {
        let store: DynStore = Arc::new(fake::new());
        let cluster = store.clusters().create(Cluster::new("c1")).await.unwrap();
        for (sku, replicas) in machine_sets {
            store
                .machine_sets("c1")
                .create(MachineSet::new("c1", sku, *replicas, NodeSpec::default()))
                .await
                .unwrap();
        }
        Scope::new(cluster, store)
    }

    #[tokio::test]
    async fn reconciles_every_case() {
        let mut scope = scope_with(&[("a", 1), ("b", 2), ("c", 3), ("d", 0)]).await;
        let pools = MemoryPools::default();
        pools.pools.lock().unwrap().insert("b-pool".into(), 2);
        pools.pools.lock().unwrap().insert("c-pool".into(), 1);
        pools.pools.lock().unwrap().insert("d-pool".into(), 4);

        let dry = apply_node_groups(&mut scope, &pools, true).await.unwrap();
        let kinds: Vec<ActionType> = dry.iter().map(|a| a.action).collect();
        assert_eq!(
            kinds,
            vec![
                ActionType::Add,
                ActionType::Nop,
                ActionType::Update,
                ActionType::Delete
            ]
        );
        assert_eq!(pools.sizes().get("a-pool"), None);

        apply_node_groups(&mut scope, &pools, false).await.unwrap();
        let sizes = pools.sizes();
        assert_eq!(sizes.get("a-pool"), Some(&1));
        assert_eq!(sizes.get("c-pool"), Some(&3));
        assert_eq!(sizes.get("d-pool"), None);

        let stored = scope.machine_sets().await.unwrap();
        let names: Vec<&str> = stored.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["a-pool", "b-pool", "c-pool"]);
        assert!(stored.iter().all(|m| m.status.replicas == m.spec.replicas));
    }

    #[tokio::test]
    async fn deleted_machine_set_without_pool_is_forgotten() {
        let mut scope = scope_with(&[("a", 2)]).await;
        let store = scope.store.machine_sets("c1");
        let mut machine_set = store.get("a-pool").await.unwrap();
        machine_set.metadata.deletion_timestamp = Some(Utc::now());
        store.update(machine_set).await.unwrap();

        let pools = MemoryPools::default();
        let actions = apply_node_groups(&mut scope, &pools, false).await.unwrap();
        assert!(actions.is_empty());
        assert!(scope.machine_sets().await.unwrap().is_empty());
    }
}
