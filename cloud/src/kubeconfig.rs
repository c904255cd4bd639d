use crate::error::{self, Result};
use crate::provider::ClusterManager;
use crate::scope::Scope;
use chrono::Utc;
use log::{debug, info};
use pharmer_model::{KubeConfig, KubectlConfig};
use snafu::ResultExt;
use std::path::{Path, PathBuf};

/// The admin kubeconfig of a provisioned cluster.
pub async fn get_kube_config(scope: &Scope, manager: &dyn ClusterManager) -> Result<KubeConfig> {
    Ok(manager.kube_config(scope).await?)
}

/// Makes `konfig` the current context of the kubectl configuration at `path`. An existing file is
/// backed up first. An existing context of the same name is only replaced when `overwrite` is
/// set; otherwise it is just selected.
pub fn use_cluster(konfig: &KubeConfig, path: &Path, overwrite: bool) -> Result<Option<PathBuf>> {
    let (mut config, backup) = if path.exists() {
        let backup = backup_path(path);
        std::fs::copy(path, &backup).context(error::KubeConfigBackupSnafu {
            from: path,
            to: &backup,
        })?;
        debug!("Backed up '{}' to '{}'", path.display(), backup.display());
        (
            KubectlConfig::from_file(path).context(error::ModelSnafu)?,
            Some(backup),
        )
    } else {
        (KubectlConfig::default(), None)
    };

    if config.has_context(&konfig.context.name) && !overwrite {
        config.current_context = konfig.context.name.clone();
    } else {
        config.upsert(konfig);
    }
    config.write(path).context(error::ModelSnafu)?;
    info!(
        "Current context of '{}' is now '{}'",
        path.display(),
        konfig.context.name
    );
    Ok(backup)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".bak.{}", Utc::now().format("%Y%m%dT%H%M%S%.3f")));
    PathBuf::from(name)
}

#[cfg(test)]
mod test {
    use super::*;
    use pharmer_model::AuthInfo;

    fn konfig(token: &str) -> KubeConfig {
        KubeConfig::new(
            "c1",
            "https://10.0.0.1",
            b"ca".to_vec(),
            AuthInfo::Token {
                token: token.to_string(),
            },
        )
    }

    #[test]
    fn writes_new_file_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kube").join("config");
        let backup = use_cluster(&konfig("t1"), &path, false).unwrap();
        assert!(backup.is_none());
        let config = KubectlConfig::from_file(&path).unwrap();
        assert_eq!(config.current_context, "cluster-admin@c1.pharmer");
        assert_eq!(config.users.len(), 1);
    }

    #[test]
    fn existing_context_is_kept_unless_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        use_cluster(&konfig("t1"), &path, false).unwrap();

        let backup = use_cluster(&konfig("t2"), &path, false).unwrap().unwrap();
        assert!(backup.exists());
        let yaml = std::fs::read_to_string(&path).unwrap();
        assert!(yaml.contains("t1"));

        use_cluster(&konfig("t2"), &path, true).unwrap();
        let yaml = std::fs::read_to_string(&path).unwrap();
        assert!(yaml.contains("t2"));
        assert!(!yaml.contains("t1"));
    }
}
