/*!

`pharmer-store` persists pharmer objects. A [`StoreProvider`] hands out typed stores for
credentials, clusters, node groups, machines, certificates, SSH keys and operations. Three
backends are available:

- `fake`: in memory, for tests.
- `vfs`: JSON files in a local directory.
- `db`: a SQLite database.

Use [`new_store_provider`] to open the backend named by a [`PharmerConfig`].

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

pub use error::{Error, Result};
pub use object::KeyPair;
use async_trait::async_trait;
use log::info;
use pharmer_model::{
    Cluster, Credential, Machine, MachineSet, Object, Operation, PharmerConfig,
};
use std::sync::Arc;

pub mod db;
mod error;
pub mod fake;
mod object;
pub mod vfs;

/// CRUD access to one kind of object. Per-cluster kinds are scoped to the cluster the store was
/// obtained for.
#[async_trait]
pub trait ObjectStore<T: Object>: Send + Sync {
    /// All objects of this kind, sorted by name.
    async fn list(&self) -> Result<Vec<T>>;

    async fn get(&self, name: &str) -> Result<T>;

    /// Stores a new object. Fails if an object with the same name exists.
    async fn create(&self, obj: T) -> Result<T>;

    /// Replaces an existing object.
    async fn update(&self, obj: T) -> Result<T>;

    /// Replaces only the status of an existing object.
    async fn update_status(&self, obj: T) -> Result<T>;

    async fn delete(&self, name: &str) -> Result<()>;
}

/// Storage for PEM encoded certificates and SSH keys of a cluster.
#[async_trait]
pub trait KeyPairStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<KeyPair>;

    async fn create(&self, name: &str, pair: KeyPair) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Operation>;

    /// Stores a new operation, assigning the next free id when `op.id` is zero.
    async fn create(&self, op: Operation) -> Result<Operation>;

    async fn update(&self, op: Operation) -> Result<Operation>;
}

/// Entry point to a pharmer store backend.
pub trait StoreProvider: Send + Sync {
    fn credentials(&self) -> Box<dyn ObjectStore<Credential>>;

    fn clusters(&self) -> Box<dyn ObjectStore<Cluster>>;

    fn machine_sets(&self, cluster: &str) -> Box<dyn ObjectStore<MachineSet>>;

    fn machines(&self, cluster: &str) -> Box<dyn ObjectStore<Machine>>;

    fn certificates(&self, cluster: &str) -> Box<dyn KeyPairStore>;

    fn ssh_keys(&self, cluster: &str) -> Box<dyn KeyPairStore>;

    fn operations(&self) -> Box<dyn OperationStore>;
}

/// A shared handle to a store backend.
pub type DynStore = Arc<dyn StoreProvider>;

/// Opens the backend named by the configuration's `store` section.
pub async fn new_store_provider(config: &PharmerConfig) -> Result<DynStore> {
    let backend = &config.store;
    if let Some(local) = &backend.local {
        info!("Using local store at '{}'", local.path.display());
        return Ok(Arc::new(vfs::new(&local.path)));
    }
    if let Some(sqlite) = &backend.sqlite {
        info!("Using sqlite store at '{}'", sqlite.path.display());
        return Ok(Arc::new(db::open(&sqlite.path).await?));
    }
    if backend.fake.is_some() {
        info!("Using in-memory store");
        return Ok(Arc::new(fake::new()));
    }
    error::NoBackendSnafu.fail()
}
