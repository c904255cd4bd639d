use crate::constants::{LABEL_CLUSTER, LABEL_MACHINE_SET, ROLE_NODE_KEY};
use crate::meta::{ObjectMeta, TypeMeta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A group of worker machines sharing one SKU. Managed providers map a machine set onto a node
/// pool (GKE, DigitalOcean) or a node group (EKS).
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSet {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: MachineSetSpec,
    #[serde(default)]
    pub status: MachineSetStatus,
}

impl_object!(MachineSet, "MachineSet", status);
crate::impl_display_as_json!(MachineSet);

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetSpec {
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub min_ready_seconds: i32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub template: MachineTemplateSpec,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineTemplateSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub spec: MachineSpec,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(default)]
    pub provider_spec: NodeSpec,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubelet_version: String,
}

/// Provider independent description of a worker node.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    #[serde(default)]
    pub sku: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub disk_type: String,
    #[serde(default)]
    pub disk_size: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_ip_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kubelet_extra_args: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetStatus {
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub ready_replicas: i32,
    #[serde(default)]
    pub observed_generation: i64,
}

/// A single machine of a cluster.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: MachineSpec,
    #[serde(default)]
    pub status: MachineStatus,
}

impl_object!(Machine, "Machine", status);

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
}

/// The node pool name pharmer uses for a SKU, e.g. `n1-standard-2-pool` for `n1-standard-2` and
/// `t3-medium-pool` for `t3.medium`.
pub fn generate_machine_set_name(sku: &str) -> String {
    format!("{}-pool", sku.to_lowercase().replace(['_', '.'], "-"))
}

impl MachineSet {
    /// A machine set of `replicas` nodes of type `sku` for the named cluster.
    pub fn new(cluster: &str, sku: &str, replicas: i32, node_spec: NodeSpec) -> Self {
        let name = generate_machine_set_name(sku);
        let labels = maplit::btreemap! {
            LABEL_CLUSTER.to_string() => cluster.to_string(),
            LABEL_MACHINE_SET.to_string() => name.clone(),
            ROLE_NODE_KEY.to_string() => "".to_string(),
        };
        Self {
            type_meta: TypeMeta::default(),
            metadata: ObjectMeta {
                labels: maplit::btreemap! {
                    LABEL_CLUSTER.to_string() => cluster.to_string(),
                },
                ..ObjectMeta::named(name)
            },
            spec: MachineSetSpec {
                replicas,
                min_ready_seconds: 0,
                selector: labels.clone(),
                template: MachineTemplateSpec {
                    labels,
                    spec: MachineSpec {
                        provider_spec: NodeSpec {
                            sku: sku.to_string(),
                            ..node_spec
                        },
                        kubelet_version: String::new(),
                    },
                },
            },
            status: MachineSetStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn node_spec(&self) -> &NodeSpec {
        &self.spec.template.spec.provider_spec
    }

    /// A machine set with no desired replicas, or one whose deletion was requested, should have
    /// its node pool removed.
    pub fn is_marked_for_deletion(&self) -> bool {
        self.spec.replicas == 0 || self.metadata.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn machine_set_names() {
        assert_eq!(generate_machine_set_name("n1-standard-2"), "n1-standard-2-pool");
        assert_eq!(generate_machine_set_name("t3.medium"), "t3-medium-pool");
        assert_eq!(generate_machine_set_name("S_2VCPU_4GB"), "s-2vcpu-4gb-pool");
    }

    #[test]
    fn new_machine_set() {
        let ms = MachineSet::new(
            "c1",
            "t3.medium",
            3,
            NodeSpec {
                disk_size: 100,
                ..Default::default()
            },
        );
        assert_eq!(ms.name(), "t3-medium-pool");
        assert_eq!(ms.spec.replicas, 3);
        assert_eq!(ms.node_spec().sku, "t3.medium");
        assert_eq!(ms.node_spec().disk_size, 100);
        assert_eq!(ms.metadata.labels.get(LABEL_CLUSTER).unwrap(), "c1");
        assert!(!ms.is_marked_for_deletion());
    }

    #[test]
    fn deletion_marks() {
        let mut ms = MachineSet::new("c1", "s-1vcpu-2gb", 1, NodeSpec::default());
        ms.spec.replicas = 0;
        assert!(ms.is_marked_for_deletion());
        ms.spec.replicas = 2;
        ms.metadata.deletion_timestamp = Some(chrono::Utc::now());
        assert!(ms.is_marked_for_deletion());
    }
}
