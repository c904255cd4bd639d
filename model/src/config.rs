use crate::constants::{CONFIG_DIR, DEFAULT_CONFIG_NAME, STORE_DIR};
use crate::credential::Credential;
use crate::error::{self, Result};
use crate::meta::TypeMeta;
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};

/// The pharmer configuration file, usually `~/.pharmer/config.d/default`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PharmerConfig {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub store: StorageBackend,
}

/// Where pharmer keeps its objects. Exactly one backend section is expected.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageBackend {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credential_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fake: Option<FakeSpec>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalSpec {
    pub path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SqliteSpec {
    pub path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct FakeSpec {}

impl PharmerConfig {
    /// A configuration that stores objects as files under `home/.pharmer/store.d`.
    pub fn new_default(home: &Path) -> Self {
        Self {
            type_meta: TypeMeta {
                api_version: crate::constants::API_VERSION.to_string(),
                kind: "PharmerConfig".to_string(),
            },
            context: DEFAULT_CONFIG_NAME.to_string(),
            credentials: Vec::new(),
            store: StorageBackend {
                local: Some(LocalSpec {
                    path: home.join(STORE_DIR),
                }),
                ..Default::default()
            },
        }
    }

    pub fn store_type(&self) -> &'static str {
        if self.store.local.is_some() {
            "Local"
        } else if self.store.sqlite.is_some() {
            "Sqlite"
        } else if self.store.fake.is_some() {
            "Fake"
        } else {
            "<Unknown>"
        }
    }

    pub fn credential(&self, name: &str) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.metadata.name == name)
    }
}

pub fn home_dir() -> Result<PathBuf> {
    Ok(dirs::home_dir().context(error::HomeDirSnafu)?)
}

/// `~/.pharmer/config.d/default`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(CONFIG_DIR).join(DEFAULT_CONFIG_NAME))
}

/// Loads the configuration at `path`. A missing file is not an error, the default configuration
/// is returned instead.
pub fn load_config(path: &Path) -> Result<PharmerConfig> {
    if !path.exists() {
        debug!(
            "Config file '{}' does not exist, using defaults",
            path.display()
        );
        return Ok(PharmerConfig::new_default(&home_dir()?));
    }
    let data = std::fs::read(path).context(error::ReadFileSnafu { path })?;
    Ok(serde_yaml::from_slice(&data).context(error::YamlDeserializeSnafu { path })?)
}

/// Writes the configuration as yaml. The file is only readable by its owner since it may contain
/// credentials.
pub fn save_config(config: &PharmerConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).context(error::CreateDirSnafu { path: dir })?;
    }
    let data = serde_yaml::to_string(config).context(error::YamlSerializeSnafu)?;
    std::fs::write(path, data).context(error::WriteFileSnafu { path })?;
    set_owner_only(path)
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .context(error::SetPermissionsSnafu { path })?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::CREDENTIAL_DIGITALOCEAN;

    #[test]
    fn save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.d").join("default");
        let mut config = PharmerConfig::new_default(dir.path());
        let mut cred = Credential::new("do", CREDENTIAL_DIGITALOCEAN);
        cred.spec.data.insert("token".into(), "abc".into());
        config.credentials.push(cred);
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.store_type(), "Local");
        assert_eq!(loaded.credential("do").unwrap().spec.data["token"], "abc");
        assert!(loaded.credential("gce").is_none());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn parse_sqlite_store() {
        let config: PharmerConfig = serde_yaml::from_str(
            r#"
context: default
store:
  sqlite:
    path: /var/lib/pharmer/pharmer.db
"#,
        )
        .unwrap();
        assert_eq!(config.store_type(), "Sqlite");
        assert_eq!(
            config.store.sqlite.unwrap().path,
            PathBuf::from("/var/lib/pharmer/pharmer.db")
        );
    }
}
