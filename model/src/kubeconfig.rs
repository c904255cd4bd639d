use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::path::Path;

/// Admin access to a single cluster. This is what pharmer hands out for `use cluster` and what the
/// cloud layer uses to build its Kubernetes client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubeConfig {
    pub cluster: KubeCluster,
    pub auth_info: NamedAuthInfo,
    pub context: KubeContext,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubeCluster {
    pub name: String,
    pub server: String,
    /// PEM encoded CA bundle.
    pub certificate_authority_data: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamedAuthInfo {
    pub name: String,
    pub auth: AuthInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AuthInfo {
    ClientCertificate { cert_pem: Vec<u8>, key_pem: Vec<u8> },
    Token { token: String },
    /// HTTP basic auth, used by GKE masters that were created with a username and password.
    Basic { username: String, password: String },
    Exec {
        api_version: String,
        command: String,
        args: Vec<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubeContext {
    pub name: String,
    pub cluster: String,
    pub user: String,
}

impl KubeConfig {
    pub fn new<S: Into<String>>(
        cluster_name: &str,
        server: S,
        ca_pem: Vec<u8>,
        auth: AuthInfo,
    ) -> Self {
        let cluster = format!("{}.pharmer", cluster_name);
        let user = format!("cluster-admin@{}.pharmer", cluster_name);
        Self {
            cluster: KubeCluster {
                name: cluster.clone(),
                server: server.into(),
                certificate_authority_data: ca_pem,
            },
            auth_info: NamedAuthInfo {
                name: user.clone(),
                auth,
            },
            context: KubeContext {
                name: Self::context_name(cluster_name),
                cluster,
                user,
            },
        }
    }

    /// The kubectl context name used for a pharmer cluster.
    pub fn context_name(cluster_name: &str) -> String {
        format!("cluster-admin@{}.pharmer", cluster_name)
    }

    /// A standalone kubectl configuration with this cluster as the current context.
    pub fn to_kubectl_config(&self) -> KubectlConfig {
        let mut config = KubectlConfig::default();
        config.upsert(self);
        config
    }

    fn cluster_entry(&self) -> serde_yaml::Value {
        let mut detail = serde_yaml::Mapping::new();
        detail.insert("server".into(), self.cluster.server.clone().into());
        detail.insert(
            "certificate-authority-data".into(),
            base64::encode(&self.cluster.certificate_authority_data).into(),
        );
        serde_yaml::Value::Mapping(detail)
    }

    fn user_entry(&self) -> serde_yaml::Value {
        let mut detail = serde_yaml::Mapping::new();
        match &self.auth_info.auth {
            AuthInfo::ClientCertificate { cert_pem, key_pem } => {
                detail.insert(
                    "client-certificate-data".into(),
                    base64::encode(cert_pem).into(),
                );
                detail.insert("client-key-data".into(), base64::encode(key_pem).into());
            }
            AuthInfo::Token { token } => {
                detail.insert("token".into(), token.clone().into());
            }
            AuthInfo::Basic { username, password } => {
                detail.insert("username".into(), username.clone().into());
                detail.insert("password".into(), password.clone().into());
            }
            AuthInfo::Exec {
                api_version,
                command,
                args,
            } => {
                let mut exec = serde_yaml::Mapping::new();
                exec.insert("apiVersion".into(), api_version.clone().into());
                exec.insert("command".into(), command.clone().into());
                exec.insert(
                    "args".into(),
                    serde_yaml::Value::Sequence(args.iter().map(|a| a.clone().into()).collect()),
                );
                detail.insert("exec".into(), serde_yaml::Value::Mapping(exec));
            }
        }
        serde_yaml::Value::Mapping(detail)
    }

    fn context_entry(&self) -> serde_yaml::Value {
        let mut detail = serde_yaml::Mapping::new();
        detail.insert("cluster".into(), self.context.cluster.clone().into());
        detail.insert("user".into(), self.context.user.clone().into());
        serde_yaml::Value::Mapping(detail)
    }
}

/// The kubectl configuration file format. Entries pharmer does not manage are kept as they are.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct KubectlConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub clusters: Vec<NamedEntry>,
    #[serde(default)]
    pub users: Vec<NamedEntry>,
    #[serde(default)]
    pub contexts: Vec<NamedEntry>,
    #[serde(default)]
    pub current_context: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A named cluster, user or context. `body` holds the entry under its `cluster`, `user` or
/// `context` key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NamedEntry {
    pub name: String,
    #[serde(flatten)]
    pub body: BTreeMap<String, serde_yaml::Value>,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: Vec::new(),
            users: Vec::new(),
            contexts: Vec::new(),
            current_context: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl KubectlConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).context(error::ReadFileSnafu { path })?;
        Ok(serde_yaml::from_slice(&data).context(error::YamlDeserializeSnafu { path })?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self).context(error::YamlSerializeSnafu)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).context(error::CreateDirSnafu { path: dir })?;
        }
        std::fs::write(path, self.to_yaml()?).context(error::WriteFileSnafu { path })?;
        Ok(())
    }

    pub fn has_context(&self, name: &str) -> bool {
        self.contexts.iter().any(|c| c.name == name)
    }

    /// Inserts or replaces the cluster, user and context of `konfig` and makes its context the
    /// current one.
    pub fn upsert(&mut self, konfig: &KubeConfig) {
        upsert_entry(
            &mut self.clusters,
            &konfig.cluster.name,
            "cluster",
            konfig.cluster_entry(),
        );
        upsert_entry(
            &mut self.users,
            &konfig.auth_info.name,
            "user",
            konfig.user_entry(),
        );
        upsert_entry(
            &mut self.contexts,
            &konfig.context.name,
            "context",
            konfig.context_entry(),
        );
        self.current_context = konfig.context.name.clone();
    }
}

fn upsert_entry(entries: &mut Vec<NamedEntry>, name: &str, key: &str, value: serde_yaml::Value) {
    let entry = NamedEntry {
        name: name.to_string(),
        body: maplit::btreemap! { key.to_string() => value },
    };
    match entries.iter_mut().find(|e| e.name == name) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn konfig() -> KubeConfig {
        KubeConfig::new(
            "c1",
            "https://10.0.0.1",
            b"CA".to_vec(),
            AuthInfo::Token {
                token: "t0k3n".to_string(),
            },
        )
    }

    #[test]
    fn names() {
        let konfig = konfig();
        assert_eq!(konfig.context.name, "cluster-admin@c1.pharmer");
        assert_eq!(konfig.cluster.name, "c1.pharmer");
        assert_eq!(konfig.auth_info.name, "cluster-admin@c1.pharmer");
    }

    #[test]
    fn upsert_keeps_other_entries() {
        let existing = r#"
apiVersion: v1
kind: Config
preferences: {}
clusters:
- name: kind
  cluster:
    server: https://127.0.0.1:6443
users:
- name: kind
  user:
    token: abc
contexts:
- name: kind
  context:
    cluster: kind
    user: kind
current-context: kind
"#;
        let mut config: KubectlConfig = serde_yaml::from_str(existing).unwrap();
        config.upsert(&konfig());
        config.upsert(&konfig());
        assert_eq!(config.clusters.len(), 2);
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.contexts.len(), 2);
        assert_eq!(config.current_context, "cluster-admin@c1.pharmer");
        assert!(config.has_context("kind"));
        assert!(config.extra.contains_key("preferences"));

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("certificate-authority-data: Q0E="), "{}", yaml);
        assert!(yaml.contains("current-context: cluster-admin@c1.pharmer"));
    }

    #[test]
    fn basic_auth_user_entry() {
        let konfig = KubeConfig::new(
            "g1",
            "https://35.1.2.3",
            b"CA".to_vec(),
            AuthInfo::Basic {
                username: "admin".to_string(),
                password: "secret".to_string(),
            },
        );
        let yaml = konfig.to_kubectl_config().to_yaml().unwrap();
        assert!(yaml.contains("username: admin"), "{}", yaml);
        assert!(yaml.contains("password: secret"), "{}", yaml);
        assert!(!yaml.contains("client-certificate-data"));
    }
}
