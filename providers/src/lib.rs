/*!

The cloud providers pharmer can drive: Google Kubernetes Engine (`gke`), Amazon EKS (`eks`) and
DigitalOcean Kubernetes (`dokube`). Each implements
[`ClusterManager`](pharmer_cloud::provider::ClusterManager) on top of the provider's API.

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

pub use dokube::DokubeManager;
pub use eks::EksManager;
pub use error::{Error, Result};
pub use gke::GkeManager;

mod dokube;
mod eks;
mod error;
mod gke;
mod node_group;
mod rest;

use pharmer_cloud::provider::CloudRegistry;
use pharmer_model::constants::{PROVIDER_DOKUBE, PROVIDER_EKS, PROVIDER_GKE};

/// A registry with every provider pharmer supports.
pub fn registry() -> CloudRegistry {
    let mut registry = CloudRegistry::new();
    registry.register(PROVIDER_GKE, || Box::new(GkeManager::new()));
    registry.register(PROVIDER_EKS, || Box::new(EksManager::new()));
    registry.register(PROVIDER_DOKUBE, || Box::new(DokubeManager::new()));
    registry
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_provider_is_registered() {
        let registry = registry();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![PROVIDER_DOKUBE, PROVIDER_EKS, PROVIDER_GKE]
        );
        for name in [PROVIDER_DOKUBE, PROVIDER_EKS, PROVIDER_GKE] {
            assert_eq!(registry.manager(name).unwrap().provider_name(), name);
        }
        assert!(registry.manager("azure").is_err());
    }
}
