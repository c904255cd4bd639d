use crate::error::{self, Result};
use crate::{KeyPairStore, ObjectStore, OperationStore, StoreProvider};
use async_trait::async_trait;
use pharmer_model::{Cluster, Credential, Machine, MachineSet, Object, Operation};
use snafu::{ensure, OptionExt, ResultExt};
use std::marker::PhantomData;

/// The kinds of records a backend keeps. Backends use the kind to decide where a record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Credential,
    Cluster,
    MachineSet,
    Machine,
    Certificate,
    SshKey,
    Operation,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Credential => "credential",
            Kind::Cluster => "cluster",
            Kind::MachineSet => "machineset",
            Kind::Machine => "machine",
            Kind::Certificate => "certificate",
            Kind::SshKey => "ssh key",
            Kind::Operation => "operation",
        }
    }
}

/// Identifies one record. `scope` is the owning cluster for per-cluster kinds and empty
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub kind: Kind,
    pub scope: String,
    pub name: String,
}

impl Key {
    pub fn new<S1, S2>(kind: Kind, scope: S1, name: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            kind,
            scope: scope.into(),
            name: name.into(),
        }
    }
}

/// The byte level operations a backend provides. Everything else is implemented once on top of
/// this.
#[async_trait]
pub trait RawStore: Clone + Send + Sync + 'static {
    async fn read(&self, key: &Key) -> Result<Option<Vec<u8>>>;

    async fn write(&self, key: &Key, data: Vec<u8>) -> Result<()>;

    /// Returns false if there was nothing to remove.
    async fn remove(&self, key: &Key) -> Result<bool>;

    /// All records of `kind` in `scope`.
    async fn list(&self, kind: Kind, scope: &str) -> Result<Vec<Vec<u8>>>;
}

/// A PEM certificate and its key, or an SSH public and private key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPair {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

/// A [`StoreProvider`] over any [`RawStore`].
#[derive(Debug, Clone)]
pub struct Store<B> {
    backend: B,
}

impl<B: RawStore> Store<B> {
    pub(crate) fn new(backend: B) -> Self {
        Self { backend }
    }

    fn objects<T: Object>(&self, kind: Kind, scope: &str) -> Box<dyn ObjectStore<T>> {
        Box::new(Objects::<T, B> {
            backend: self.backend.clone(),
            kind,
            scope: scope.to_string(),
            _object: PhantomData,
        })
    }

    fn key_pairs(&self, kind: Kind, scope: &str) -> Box<dyn KeyPairStore> {
        Box::new(KeyPairs {
            backend: self.backend.clone(),
            kind,
            scope: scope.to_string(),
        })
    }
}

impl<B: RawStore> StoreProvider for Store<B> {
    fn credentials(&self) -> Box<dyn ObjectStore<Credential>> {
        self.objects(Kind::Credential, "")
    }

    fn clusters(&self) -> Box<dyn ObjectStore<Cluster>> {
        self.objects(Kind::Cluster, "")
    }

    fn machine_sets(&self, cluster: &str) -> Box<dyn ObjectStore<MachineSet>> {
        self.objects(Kind::MachineSet, cluster)
    }

    fn machines(&self, cluster: &str) -> Box<dyn ObjectStore<Machine>> {
        self.objects(Kind::Machine, cluster)
    }

    fn certificates(&self, cluster: &str) -> Box<dyn KeyPairStore> {
        self.key_pairs(Kind::Certificate, cluster)
    }

    fn ssh_keys(&self, cluster: &str) -> Box<dyn KeyPairStore> {
        self.key_pairs(Kind::SshKey, cluster)
    }

    fn operations(&self) -> Box<dyn OperationStore> {
        Box::new(Operations {
            backend: self.backend.clone(),
        })
    }
}

struct Objects<T, B> {
    backend: B,
    kind: Kind,
    scope: String,
    _object: PhantomData<fn() -> T>,
}

impl<T: Object, B: RawStore> Objects<T, B> {
    fn key(&self, name: &str) -> Result<Key> {
        ensure!(
            !name.is_empty(),
            error::MissingNameSnafu {
                kind: self.kind.as_str()
            }
        );
        Ok(Key::new(self.kind, self.scope.as_str(), name))
    }

    fn decode(&self, name: &str, data: &[u8]) -> Result<T> {
        serde_json::from_slice(data).context(error::DeserializeSnafu {
            kind: self.kind.as_str(),
            name,
        })
    }

    async fn read(&self, key: &Key) -> Result<T> {
        let data = self
            .backend
            .read(key)
            .await?
            .context(error::NotFoundSnafu {
                kind: self.kind.as_str(),
                name: &key.name,
            })?;
        self.decode(&key.name, &data)
    }

    async fn write(&self, key: &Key, mut obj: T) -> Result<T> {
        obj.assign_type_kind();
        let data = serde_json::to_vec_pretty(&obj).context(error::SerializeSnafu {
            kind: self.kind.as_str(),
            name: &key.name,
        })?;
        self.backend.write(key, data).await?;
        Ok(obj)
    }
}

#[async_trait]
impl<T: Object, B: RawStore> ObjectStore<T> for Objects<T, B> {
    async fn list(&self) -> Result<Vec<T>> {
        let mut objects = Vec::new();
        for data in self.backend.list(self.kind, &self.scope).await? {
            objects.push(self.decode("", &data)?);
        }
        objects.sort_by(|a: &T, b: &T| a.name().cmp(b.name()));
        Ok(objects)
    }

    async fn get(&self, name: &str) -> Result<T> {
        let key = self.key(name)?;
        self.read(&key).await
    }

    async fn create(&self, mut obj: T) -> Result<T> {
        let key = self.key(obj.name())?;
        ensure!(
            self.backend.read(&key).await?.is_none(),
            error::AlreadyExistsSnafu {
                kind: self.kind.as_str(),
                name: &key.name,
            }
        );
        let metadata = obj.metadata_mut();
        if metadata.creation_timestamp.is_none() {
            metadata.creation_timestamp = Some(chrono::Utc::now());
        }
        self.write(&key, obj).await
    }

    async fn update(&self, obj: T) -> Result<T> {
        let key = self.key(obj.name())?;
        self.read(&key).await?;
        self.write(&key, obj).await
    }

    async fn update_status(&self, obj: T) -> Result<T> {
        let key = self.key(obj.name())?;
        let mut existing = self.read(&key).await?;
        existing.copy_status_from(&obj);
        self.write(&key, existing).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let key = self.key(name)?;
        ensure!(
            self.backend.remove(&key).await?,
            error::NotFoundSnafu {
                kind: self.kind.as_str(),
                name,
            }
        );
        Ok(())
    }
}

struct KeyPairs<B> {
    backend: B,
    kind: Kind,
    scope: String,
}

impl<B: RawStore> KeyPairs<B> {
    /// Record keys of the public and private half. Certificates are kept as `<name>.crt` and
    /// `<name>.key`, SSH keys as `id_<name>.pub` and `id_<name>`.
    fn keys(&self, name: &str) -> Result<(Key, Key)> {
        ensure!(
            !name.is_empty(),
            error::MissingNameSnafu {
                kind: self.kind.as_str()
            }
        );
        let (public, private) = match self.kind {
            Kind::SshKey => (format!("id_{}.pub", name), format!("id_{}", name)),
            _ => (format!("{}.crt", name), format!("{}.key", name)),
        };
        Ok((
            Key::new(self.kind, self.scope.as_str(), public),
            Key::new(self.kind, self.scope.as_str(), private),
        ))
    }
}

#[async_trait]
impl<B: RawStore> KeyPairStore for KeyPairs<B> {
    async fn get(&self, name: &str) -> Result<KeyPair> {
        let (public_key, private_key) = self.keys(name)?;
        let not_found = error::NotFoundSnafu {
            kind: self.kind.as_str(),
            name,
        };
        let public = self
            .backend
            .read(&public_key)
            .await?
            .context(not_found.clone())?;
        let private = self
            .backend
            .read(&private_key)
            .await?
            .context(not_found)?;
        Ok(KeyPair { public, private })
    }

    async fn create(&self, name: &str, pair: KeyPair) -> Result<()> {
        let (public_key, private_key) = self.keys(name)?;
        ensure!(
            self.backend.read(&public_key).await?.is_none(),
            error::AlreadyExistsSnafu {
                kind: self.kind.as_str(),
                name,
            }
        );
        self.backend.write(&public_key, pair.public).await?;
        self.backend.write(&private_key, pair.private).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let (public_key, private_key) = self.keys(name)?;
        let public = self.backend.remove(&public_key).await?;
        let private = self.backend.remove(&private_key).await?;
        ensure!(
            public || private,
            error::NotFoundSnafu {
                kind: self.kind.as_str(),
                name,
            }
        );
        Ok(())
    }
}

struct Operations<B> {
    backend: B,
}

impl<B: RawStore> Operations<B> {
    fn key(id: i64) -> Key {
        Key::new(Kind::Operation, "", id.to_string())
    }

    async fn write(&self, op: Operation) -> Result<Operation> {
        let name = op.id.to_string();
        let data = serde_json::to_vec_pretty(&op).context(error::SerializeSnafu {
            kind: Kind::Operation.as_str(),
            name: &name,
        })?;
        self.backend.write(&Self::key(op.id), data).await?;
        Ok(op)
    }

    async fn next_id(&self) -> Result<i64> {
        let mut max = 0;
        for data in self.backend.list(Kind::Operation, "").await? {
            let op: Operation =
                serde_json::from_slice(&data).context(error::DeserializeSnafu {
                    kind: Kind::Operation.as_str(),
                    name: "",
                })?;
            max = max.max(op.id);
        }
        Ok(max + 1)
    }
}

#[async_trait]
impl<B: RawStore> OperationStore for Operations<B> {
    async fn get(&self, id: i64) -> Result<Operation> {
        let name = id.to_string();
        let data = self
            .backend
            .read(&Self::key(id))
            .await?
            .context(error::NotFoundSnafu {
                kind: Kind::Operation.as_str(),
                name: &name,
            })?;
        serde_json::from_slice(&data).context(error::DeserializeSnafu {
            kind: Kind::Operation.as_str(),
            name,
        })
    }

    async fn create(&self, mut op: Operation) -> Result<Operation> {
        if op.id == 0 {
            op.id = self.next_id().await?;
        }
        ensure!(
            self.backend.read(&Self::key(op.id)).await?.is_none(),
            error::AlreadyExistsSnafu {
                kind: Kind::Operation.as_str(),
                name: op.id.to_string(),
            }
        );
        self.write(op).await
    }

    async fn update(&self, op: Operation) -> Result<Operation> {
        self.get(op.id).await?;
        self.write(op).await
    }
}
