/*!

Reconciles a stored cluster with its cloud provider. What happens depends on the phase of the
cluster:

| phase | deletion requested | what apply does |
|---|---|---|
| `Pending` | no | create the cluster in the cloud, adopt its identity, then reconcile node groups |
| `Ready`, `Deleting` | no | reconcile node groups |
| any but `Deleted` | yes | remove every node group, then delete the cluster in the cloud |
| `Deleted` | | nothing |
| `Upgrading` or none | | refuse |

!*/

use crate::error::{self, Result};
use crate::provider::ClusterManager;
use crate::scope::Scope;
use chrono::Utc;
use log::{info, warn};
use pharmer_model::constants::{RETRY_INTERVAL, RETRY_TIMEOUT};
use pharmer_model::{Action, ClusterPhase, Operation, OperationCode};
use snafu::ResultExt;

/// Brings the cloud side of `scope.cluster` in line with what is stored. With `dry_run` the
/// actions that would be taken are returned and nothing is changed. A failure is recorded in the
/// cluster's `status.reason`.
pub async fn apply(
    scope: &mut Scope,
    manager: &mut dyn ClusterManager,
    dry_run: bool,
) -> Result<Vec<Action>> {
    if dry_run {
        return run(scope, manager, true).await;
    }

    let operation = scope
        .store
        .operations()
        .create(Operation {
            code: OperationCode::Running,
            ..Operation::new(0, scope.cluster_name())
        })
        .await
        .context(error::StoreSnafu {
            operation: "record apply operation",
        })?;

    let result = run(scope, manager, false).await;
    let code = match &result {
        Ok(_) => OperationCode::Done,
        Err(e) => {
            record_failure(scope, e).await;
            OperationCode::Failed
        }
    };
    if let Err(e) = scope
        .store
        .operations()
        .update(Operation { code, ..operation })
        .await
    {
        warn!("Unable to record the end of the apply operation: {}", e);
    }
    result
}

async fn run(
    scope: &mut Scope,
    manager: &mut dyn ClusterManager,
    dry_run: bool,
) -> Result<Vec<Action>> {
    let name = scope.cluster_name().to_string();
    let phase = scope.cluster.status.phase;
    match phase {
        ClusterPhase::Unknown => return error::UnknownPhaseSnafu { name }.fail(),
        ClusterPhase::Upgrading => return error::UpgradeUnsupportedSnafu { name }.fail(),
        ClusterPhase::Deleted => {
            info!("Cluster '{}' is already deleted", name);
            return Ok(Vec::new());
        }
        ClusterPhase::Pending | ClusterPhase::Ready | ClusterPhase::Deleting => {}
    }
    info!("Applying cluster '{}' in phase {}", name, phase);

    manager.set_cloud_connector(scope).await?;

    let mut actions = Vec::new();
    if scope.cluster.is_deleting() {
        actions.extend(apply_delete(scope, manager, dry_run).await?);
    } else {
        if phase == ClusterPhase::Pending {
            actions.extend(apply_create(scope, manager, dry_run).await?);
        }
        actions.extend(manager.apply_scale(scope, dry_run).await?);
    }
    Ok(actions)
}

async fn apply_create(
    scope: &mut Scope,
    manager: &mut dyn ClusterManager,
    dry_run: bool,
) -> Result<Vec<Action>> {
    let actions = manager.prepare_cloud(scope, dry_run).await?;
    if dry_run {
        return Ok(actions);
    }

    let admin = manager.admin_client(scope).await?;
    admin.wait_for_ready(RETRY_INTERVAL, RETRY_TIMEOUT).await?;
    scope.cluster.metadata.uid = admin.kube_system_uid().await?;
    scope.cluster.status.phase = ClusterPhase::Ready;
    scope.cluster.status.reason.clear();
    scope.update_cluster().await?;
    info!("Cluster '{}' is ready", scope.cluster_name());
    Ok(actions)
}

async fn apply_delete(
    scope: &mut Scope,
    manager: &mut dyn ClusterManager,
    dry_run: bool,
) -> Result<Vec<Action>> {
    let mut actions = Vec::new();

    if !dry_run {
        mark_machine_sets_for_deletion(scope).await?;
    }
    match manager.apply_scale(scope, dry_run).await {
        Ok(scaled) => actions.extend(scaled),
        Err(e) => warn!(
            "Unable to remove node groups of cluster '{}', deleting the cluster anyway: {}",
            scope.cluster_name(),
            e
        ),
    }

    if !dry_run {
        scope.cluster.status.phase = ClusterPhase::Deleting;
        scope.update_cluster().await?;
    }
    actions.extend(manager.apply_delete(scope, dry_run).await?);
    if !dry_run {
        scope.cluster.status.phase = ClusterPhase::Deleted;
        scope.cluster.status.reason.clear();
        scope.update_cluster().await?;
        info!("Cluster '{}' is deleted", scope.cluster_name());
    }
    Ok(actions)
}

async fn mark_machine_sets_for_deletion(scope: &Scope) -> Result<()> {
    let store = scope.store.machine_sets(scope.cluster_name());
    for mut machine_set in scope.machine_sets().await? {
        if machine_set.metadata.deletion_timestamp.is_some() {
            continue;
        }
        machine_set.metadata.deletion_timestamp = Some(Utc::now());
        let name = machine_set.name().to_string();
        store
            .update(machine_set)
            .await
            .context(error::StoreSnafu {
                operation: format!("mark node group '{}' for deletion", name),
            })?;
    }
    Ok(())
}

async fn record_failure(scope: &mut Scope, e: &error::Error) {
    scope.cluster.status.reason = e.to_string();
    if let Err(store_error) = scope.update_cluster_status().await {
        warn!(
            "Unable to record failure reason for cluster '{}': {}",
            scope.cluster_name(),
            store_error
        );
    }
}
