use std::time::Duration;

/// Helper macro to avoid retyping the base domain-like name of our system when creating further
/// string constants from it. When given no parameters, this returns the base domain-like name of
/// the system. When given a string literal parameter it adds `/parameter` to the end.
macro_rules! pharmer {
    () => {
        "pharmer.dev"
    };
    ($s:literal) => {
        concat!(pharmer!(), "/", $s)
    };
}

// System identifiers
pub const API_VERSION: &str = pharmer!("v1beta1");
pub const PHARMER: &str = pharmer!();

// Label keys
pub const LABEL_CLUSTER: &str = pharmer!("cluster");
pub const LABEL_MACHINE_SET: &str = pharmer!("machine-set");
pub const ROLE_NODE_KEY: &str = "node-role.kubernetes.io/node";
pub const ROLE_MASTER_KEY: &str = "node-role.kubernetes.io/master";

// Certificate names
pub const CA_CERT_NAME: &str = "ca";
pub const FRONT_PROXY_CA_CERT_NAME: &str = "front-proxy-ca";
pub const SERVICE_ACCOUNT_CERT_NAME: &str = "sa";
pub const ETCD_CA_CERT_NAME: &str = "etcd/ca";
pub const ADMIN_CERT_NAME: &str = "admin";
pub const ADMIN_USER_NAME: &str = "cluster-admin";
pub const ADMIN_ORGANIZATION: &str = "system:masters";

// Network providers
pub const NETWORK_PROVIDER_CALICO: &str = "calico";
pub const NETWORK_PROVIDER_FLANNEL: &str = "flannel";
pub const NETWORK_PROVIDER_NONE: &str = "none";
pub const POD_CIDR_CALICO: &str = "192.168.0.0/16";
pub const POD_CIDR_FLANNEL: &str = "10.244.0.0/16";
pub const POD_CIDR_DEFAULT: &str = "10.100.0.0/16";
pub const SERVICE_CIDR_DEFAULT: &str = "10.96.0.0/12";
pub const SERVICE_DOMAIN_DEFAULT: &str = "cluster.local";

// API server
pub const DEFAULT_API_BIND_PORT: u16 = 6443;
pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";

// Poll loops
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);
pub const RETRY_TIMEOUT: Duration = Duration::from_secs(15 * 60);

// Providers
pub const PROVIDER_GKE: &str = "gke";
pub const PROVIDER_EKS: &str = "eks";
pub const PROVIDER_DOKUBE: &str = "dokube";

// Credential providers, as named in the credential spec
pub const CREDENTIAL_GCE: &str = "GoogleCloud";
pub const CREDENTIAL_AWS: &str = "AWS";
pub const CREDENTIAL_DIGITALOCEAN: &str = "DigitalOcean";

// Paths relative to the home directory
pub const CONFIG_DIR: &str = ".pharmer/config.d";
pub const DEFAULT_CONFIG_NAME: &str = "default";
pub const STORE_DIR: &str = ".pharmer/store.d";
pub const KUBE_CONFIG_PATH: &str = ".kube/config";

#[test]
fn pharmer_constants_macro_test() {
    assert_eq!("pharmer.dev", pharmer!());
    assert_eq!("pharmer.dev/v1beta1", API_VERSION);
    assert_eq!("pharmer.dev/foo", pharmer!("foo"));
}
