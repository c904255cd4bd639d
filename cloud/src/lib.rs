/*!

The provider independent part of pharmer. It defines the
[`ClusterManager`](provider::ClusterManager) trait that each cloud provider implements, and the
workflows that drive it: recording clusters and node groups, applying them to the cloud and
deleting them. It also issues the certificates and SSH keys of a cluster.

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

pub use apply::apply;
pub use create::{create_cluster, create_machine_sets};
pub use delete::{delete_cluster, delete_machine_set, scale_machine_set};
pub use error::{Error, Result};
pub use admin::{AdminClient, KubeAdminClient};
pub use kubeconfig::{get_kube_config, use_cluster};
pub use scope::Scope;

mod admin;
mod apply;
pub mod certificates;
mod create;
mod delete;
mod error;
mod kubeconfig;
pub mod provider;
mod scope;
pub mod ssh;
pub mod wait;
