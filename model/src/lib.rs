/*!

This library provides the pharmer API objects (clusters, node groups, credentials), the pharmer
configuration file and the kubeconfig representation shared by the store, the cloud providers and
the CLI.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use action::{Action, ActionType};
pub use cluster::{
    Cluster, ClusterApiSpec, ClusterConfig, ClusterNetwork, ClusterPhase, ClusterSpec,
    ClusterStatus, CloudSpec, CloudStatus, DokubeSpec, EksSpec, EksStatus, GkeSpec, NetworkRanges,
};
pub use config::{FakeSpec, LocalSpec, PharmerConfig, SqliteSpec, StorageBackend};
pub use credential::{Aws, Credential, CredentialFormat, CredentialSpec, DigitalOcean, Gce};
pub use error::{Error, Result};
pub use kubeconfig::{
    AuthInfo, KubeCluster, KubeConfig, KubeContext, KubectlConfig, NamedAuthInfo, NamedEntry,
};
pub use machine::{
    generate_machine_set_name, Machine, MachineSet, MachineSetSpec, MachineSetStatus, MachineSpec,
    MachineStatus, MachineTemplateSpec, NodeSpec,
};
pub use meta::{Object, ObjectMeta, TypeMeta};
pub use operation::{Operation, OperationCode};
pub use status::Listing;

#[macro_use]
mod meta;

mod action;
mod cluster;
pub mod config;
pub mod constants;
pub mod credential;
mod error;
mod kubeconfig;
mod machine;
mod operation;
mod status;

/// Print a value using `serde_json` `to_string_pretty` for types that implement Serialize.
pub fn json_display<T: serde::Serialize>(object: T) -> String {
    serde_json::to_string_pretty(&object).unwrap_or_else(|e| format!("Serialization failed: {}", e))
}

/// Implement `Display` using `serde_json` `to_string_pretty` for types that implement Serialize.
#[macro_export]
macro_rules! impl_display_as_json {
    ($i:ident) => {
        impl std::fmt::Display for $i {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let s = serde_json::to_string_pretty(self)
                    .unwrap_or_else(|e| format!("Serialization failed: {}", e));
                std::fmt::Display::fmt(&s, f)
            }
        }
    };
}
