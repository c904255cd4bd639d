//! A store that keeps every object as a pretty printed JSON file below a root directory:
//!
//! ```text
//! credentials/<name>.json
//! clusters/<name>.json
//! clusters/<cluster>/machineset/<name>.json
//! clusters/<cluster>/machine/<name>.json
//! clusters/<cluster>/pki/<name>.crt, <name>.key
//! clusters/<cluster>/ssh/id_<name>, id_<name>.pub
//! operations/<id>.json
//! ```

use crate::error::{self, Result};
use crate::object::{Key, Kind, RawStore, Store};
use async_trait::async_trait;
use log::trace;
use snafu::ResultExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub type VfsStore = Store<Vfs>;

pub fn new<P: AsRef<Path>>(root: P) -> VfsStore {
    Store::new(Vfs {
        root: root.as_ref().to_path_buf(),
    })
}

#[derive(Debug, Clone)]
pub struct Vfs {
    root: PathBuf,
}

impl Vfs {
    fn dir(&self, kind: Kind, scope: &str) -> PathBuf {
        let clusters = self.root.join("clusters");
        match kind {
            Kind::Credential => self.root.join("credentials"),
            Kind::Cluster => clusters,
            Kind::MachineSet => clusters.join(scope).join("machineset"),
            Kind::Machine => clusters.join(scope).join("machine"),
            Kind::Certificate => clusters.join(scope).join("pki"),
            Kind::SshKey => clusters.join(scope).join("ssh"),
            Kind::Operation => self.root.join("operations"),
        }
    }

    fn path(&self, key: &Key) -> PathBuf {
        let dir = self.dir(key.kind, &key.scope);
        match key.kind {
            Kind::Certificate | Kind::SshKey => dir.join(&key.name),
            _ => dir.join(format!("{}.json", key.name)),
        }
    }
}

#[async_trait]
impl RawStore for Vfs {
    async fn read(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(error::IoSnafu {
                operation: "read",
                path,
            }),
        }
    }

    async fn write(&self, key: &Key, data: Vec<u8>) -> Result<()> {
        let path = self.path(key);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .context(error::IoSnafu {
                    operation: "create directory",
                    path: dir,
                })?;
        }
        trace!("Writing '{}'", path.display());
        tokio::fs::write(&path, data)
            .await
            .context(error::IoSnafu {
                operation: "write",
                path,
            })
    }

    async fn remove(&self, key: &Key) -> Result<bool> {
        let path = self.path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context(error::IoSnafu {
                operation: "remove",
                path,
            }),
        }
    }

    async fn list(&self, kind: Kind, scope: &str) -> Result<Vec<Vec<u8>>> {
        let dir = self.dir(kind, scope);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).context(error::IoSnafu {
                    operation: "list",
                    path: dir,
                })
            }
        };
        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await.context(error::IoSnafu {
            operation: "list",
            path: &dir,
        })? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") || !path.is_file() {
                continue;
            }
            let data = tokio::fs::read(&path).await.context(error::IoSnafu {
                operation: "read",
                path: &path,
            })?;
            records.push(data);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn layout() {
        let vfs = Vfs {
            root: PathBuf::from("/store"),
        };
        assert_eq!(
            vfs.path(&Key::new(Kind::Cluster, "", "c1")),
            PathBuf::from("/store/clusters/c1.json")
        );
        assert_eq!(
            vfs.path(&Key::new(Kind::MachineSet, "c1", "pool")),
            PathBuf::from("/store/clusters/c1/machineset/pool.json")
        );
        assert_eq!(
            vfs.path(&Key::new(Kind::Certificate, "c1", "etcd/ca.crt")),
            PathBuf::from("/store/clusters/c1/pki/etcd/ca.crt")
        );
        assert_eq!(
            vfs.path(&Key::new(Kind::SshKey, "c1", "id_c1-sshkey")),
            PathBuf::from("/store/clusters/c1/ssh/id_c1-sshkey")
        );
    }
}
