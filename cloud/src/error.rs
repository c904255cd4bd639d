use crate::provider::ProviderError;
use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Cluster `{}` already exists", name))]
    AlreadyExists { name: String },

    #[snafu(display(
        "The CA certificate of cluster `{}` was issued by its cloud provider, pharmer cannot sign \
         with it",
        name
    ))]
    CaKeyMismatch { name: String },

    #[snafu(display("Unable to {}: {}", operation, source))]
    Certificate {
        operation: String,
        source: openssl::error::ErrorStack,
    },

    #[snafu(display("Unable to create Kubernetes client: {}", source))]
    KubeClient { source: kube::Error },

    #[snafu(display("Unable to load kubeconfig: {}", source))]
    KubeConfig {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Unable to read namespace '{}': {}", namespace, source))]
    KubeNamespace {
        namespace: String,
        source: kube::Error,
    },

    #[snafu(display("Unable to copy '{}' to '{}': {}", from.display(), to.display(), source))]
    KubeConfigBackup {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Certificates of cluster `{}` could not be loaded", name))]
    MissingCerts { name: String },

    #[snafu(display("Missing cluster name"))]
    MissingName,

    #[snafu(display("Cluster `{}` does not name a cloud provider", name))]
    MissingProvider { name: String },

    #[snafu(display("{}", source))]
    Model { source: pharmer_model::Error },

    #[snafu(display("Namespace '{}' has no uid", namespace))]
    NamespaceUid { namespace: String },

    #[snafu(display("Node group `{}` does not exist in cluster `{}`", name, cluster))]
    NodeGroupNotFound { name: String, cluster: String },

    #[snafu(display("Unable to parse {}: {}", what, source))]
    Pem {
        what: String,
        source: openssl::error::ErrorStack,
    },

    #[snafu(display("{}", source))]
    Provider { source: ProviderError },

    #[snafu(display("Invalid OpenSSH public key"))]
    SshKeyFormat,

    #[snafu(display("Unable to {}: {}", operation, source))]
    Store {
        operation: String,
        source: pharmer_store::Error,
    },

    #[snafu(display("Timed out after {:?} waiting for {}", timeout, what))]
    Timeout {
        what: String,
        timeout: std::time::Duration,
    },

    #[snafu(display("Cluster `{}` has no known phase", name))]
    UnknownPhase { name: String },

    #[snafu(display("Unknown cloud provider '{}', known providers are: {}", name, known))]
    UnknownProvider { name: String, known: String },

    #[snafu(display("Cluster `{}` is being upgraded, upgrades are not supported", name))]
    UpgradeUnsupported { name: String },
}

impl From<ProviderError> for Error {
    fn from(source: ProviderError) -> Self {
        Error::Provider { source }
    }
}
