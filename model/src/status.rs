use crate::{Cluster, Credential, MachineSet};
use serde::Serialize;
use tabled::object::Full;
use tabled::{Alignment, MaxWidth, MinWidth, Modify, Style, Table, Tabled};

/// `Listing` collects pharmer objects for display. `Listing::to_string()` renders a table,
/// and `Listing` can also be serialized to json.
#[derive(Debug, Default, Serialize)]
pub struct Listing {
    clusters: Vec<Cluster>,
    machine_sets: Vec<MachineSet>,
    credentials: Vec<Credential>,
}

impl Listing {
    pub fn clusters(clusters: Vec<Cluster>) -> Self {
        Self {
            clusters,
            ..Default::default()
        }
    }

    pub fn machine_sets(machine_sets: Vec<MachineSet>) -> Self {
        Self {
            machine_sets,
            ..Default::default()
        }
    }

    pub fn credentials(credentials: Vec<Credential>) -> Self {
        Self {
            credentials,
            ..Default::default()
        }
    }

    /// Create a table of the listed objects that fits in `width` columns.
    pub fn to_string(&self, width: usize) -> String {
        let table: Table = self.into();
        table
            .with(MaxWidth::truncating(width))
            .with(MinWidth::new(width))
            .to_string()
    }
}

impl From<&Listing> for Table {
    fn from(listing: &Listing) -> Self {
        let table = if !listing.machine_sets.is_empty() {
            Table::new(listing.machine_sets.iter().map(MachineSetRow::from))
        } else if !listing.credentials.is_empty() {
            Table::new(listing.credentials.iter().map(CredentialRow::from))
        } else {
            Table::new(listing.clusters.iter().map(ClusterRow::from))
        };
        table
            .with(Style::blank())
            .with(Modify::new(Full).with(Alignment::left()))
    }
}

#[derive(Tabled, Default, Clone, Serialize)]
struct ClusterRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "PROVIDER")]
    provider: String,
    #[tabled(rename = "ZONE")]
    zone: String,
    #[tabled(rename = "VERSION")]
    version: String,
    #[tabled(rename = "PHASE")]
    phase: String,
    #[tabled(rename = "REASON")]
    reason: String,
}

impl From<&Cluster> for ClusterRow {
    fn from(cluster: &Cluster) -> Self {
        Self {
            name: cluster.metadata.name.clone(),
            provider: cluster.spec.config.cloud.cloud_provider.clone(),
            zone: cluster.spec.config.cloud.zone.clone(),
            version: cluster.spec.config.kubernetes_version.clone(),
            phase: cluster.status.phase.to_string(),
            reason: cluster.status.reason.clone(),
        }
    }
}

#[derive(Tabled, Default, Clone, Serialize)]
struct MachineSetRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "CLUSTER")]
    cluster: String,
    #[tabled(rename = "SKU")]
    sku: String,
    #[tabled(rename = "DESIRED")]
    desired: i32,
    #[tabled(rename = "CURRENT")]
    current: i32,
    #[tabled(rename = "DELETING")]
    deleting: bool,
}

impl From<&MachineSet> for MachineSetRow {
    fn from(ms: &MachineSet) -> Self {
        Self {
            name: ms.metadata.name.clone(),
            cluster: ms
                .metadata
                .labels
                .get(crate::constants::LABEL_CLUSTER)
                .cloned()
                .unwrap_or_default(),
            sku: ms.node_spec().sku.clone(),
            desired: ms.spec.replicas,
            current: ms.status.replicas,
            deleting: ms.metadata.deletion_timestamp.is_some(),
        }
    }
}

#[derive(Tabled, Default, Clone, Serialize)]
struct CredentialRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "PROVIDER")]
    provider: String,
    #[tabled(rename = "KEYS")]
    keys: String,
}

impl From<&Credential> for CredentialRow {
    fn from(credential: &Credential) -> Self {
        Self {
            name: credential.metadata.name.clone(),
            provider: credential.spec.provider.clone(),
            keys: credential
                .spec
                .data
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ClusterPhase, NodeSpec};

    #[test]
    fn cluster_table() {
        let mut cluster = Cluster::new("prod");
        cluster.spec.config.cloud.cloud_provider = "gke".into();
        cluster.status.phase = ClusterPhase::Ready;
        let table = Listing::clusters(vec![cluster]).to_string(100);
        assert!(table.contains("NAME"));
        assert!(table.contains("prod"));
        assert!(table.contains("Ready"));
    }

    #[test]
    fn machine_set_table() {
        let ms = MachineSet::new("prod", "n1-standard-2", 2, NodeSpec::default());
        let table = Listing::machine_sets(vec![ms]).to_string(120);
        assert!(table.contains("n1-standard-2-pool"));
        assert!(table.contains("DESIRED"));
    }
}
