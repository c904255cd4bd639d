/*!

Certificates pharmer issues and keeps for a cluster: the cluster CA, the front proxy CA, the etcd
CA, the service account signing key, the admin client certificate and the SSH key of the nodes.
Everything is stored PEM encoded in the cluster's certificate and SSH key stores.

!*/

use crate::error::{self, Result};
use crate::ssh::{self, SshKey};
use log::{debug, info};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509NameBuilder, X509};
use pharmer_model::constants::{
    ADMIN_CERT_NAME, ADMIN_ORGANIZATION, ADMIN_USER_NAME, ETCD_CA_CERT_NAME,
    SERVICE_ACCOUNT_CERT_NAME,
};
use pharmer_model::Cluster;
use pharmer_store::{KeyPair, StoreProvider};
use snafu::{ensure, ResultExt};

const KEY_BITS: u32 = 2048;
const CA_VALIDITY_DAYS: u32 = 3650;
const CLIENT_VALIDITY_DAYS: u32 = 365;

/// A certificate and its private key.
#[derive(Clone)]
pub struct CertKeyPair {
    pub cert: X509,
    pub key: PKey<Private>,
}

impl std::fmt::Debug for CertKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertKeyPair")
            .field("subject", &self.cert.subject_name())
            .finish()
    }
}

impl CertKeyPair {
    /// Whether `key` is the private key of `cert`.
    pub fn key_matches(&self) -> std::result::Result<bool, ErrorStack> {
        Ok(self.cert.public_key()?.public_eq(&self.key))
    }

    pub fn cert_pem(&self) -> Result<Vec<u8>> {
        self.cert.to_pem().context(error::CertificateSnafu {
            operation: "encode certificate",
        })
    }

    pub fn key_pem(&self) -> Result<Vec<u8>> {
        self.key
            .private_key_to_pem_pkcs8()
            .context(error::CertificateSnafu {
                operation: "encode private key",
            })
    }

    pub fn to_key_pair(&self) -> Result<KeyPair> {
        Ok(KeyPair {
            public: self.cert_pem()?,
            private: self.key_pem()?,
        })
    }

    pub fn from_key_pair(pair: &KeyPair) -> Result<Self> {
        Ok(Self {
            cert: X509::from_pem(&pair.public).context(error::PemSnafu {
                what: "certificate",
            })?,
            key: PKey::private_key_from_pem(&pair.private).context(error::PemSnafu {
                what: "private key",
            })?,
        })
    }
}

/// Everything [`create_pharmer_certs`] generates for a cluster.
#[derive(Debug, Clone)]
pub struct PharmerCertificates {
    pub ca: CertKeyPair,
    pub front_proxy_ca: CertKeyPair,
    pub etcd_ca: CertKeyPair,
    /// PEM public and private key used to sign service account tokens.
    pub service_account: KeyPair,
    pub ssh_key: SshKey,
}

fn serial_number() -> std::result::Result<Asn1Integer, ErrorStack> {
    let mut serial = BigNum::new()?;
    serial.rand(159, MsbOption::MAYBE_ZERO, false)?;
    serial.to_asn1_integer()
}

fn name(common_name: &str, organizations: &[&str]) -> std::result::Result<X509Name, ErrorStack> {
    let mut name = X509NameBuilder::new()?;
    for organization in organizations {
        name.append_entry_by_text("O", organization)?;
    }
    name.append_entry_by_text("CN", common_name)?;
    Ok(name.build())
}

fn new_private_key() -> std::result::Result<PKey<Private>, ErrorStack> {
    PKey::from_rsa(Rsa::generate(KEY_BITS)?)
}

fn build_ca(common_name: &str) -> std::result::Result<CertKeyPair, ErrorStack> {
    let key = new_private_key()?;
    let subject = name(common_name, &[])?;

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    builder.set_serial_number(serial_number()?.as_ref())?;
    builder.set_subject_name(&subject)?;
    builder.set_issuer_name(&subject)?;
    builder.set_pubkey(&key)?;
    builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
    builder.set_not_after(Asn1Time::days_from_now(CA_VALIDITY_DAYS)?.as_ref())?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .key_cert_sign()
            .crl_sign()
            .digital_signature()
            .key_encipherment()
            .build()?,
    )?;
    let subject_key_id = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
    builder.append_extension(subject_key_id)?;
    builder.sign(&key, MessageDigest::sha256())?;

    Ok(CertKeyPair {
        cert: builder.build(),
        key,
    })
}

fn build_client(
    ca: &CertKeyPair,
    common_name: &str,
    organizations: &[&str],
) -> std::result::Result<CertKeyPair, ErrorStack> {
    let key = new_private_key()?;

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    builder.set_serial_number(serial_number()?.as_ref())?;
    let subject = name(common_name, organizations)?;
    builder.set_subject_name(&subject)?;
    builder.set_issuer_name(ca.cert.subject_name())?;
    builder.set_pubkey(&key)?;
    builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
    builder.set_not_after(Asn1Time::days_from_now(CLIENT_VALIDITY_DAYS)?.as_ref())?;
    builder.append_extension(BasicConstraints::new().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .digital_signature()
            .key_encipherment()
            .build()?,
    )?;
    builder.append_extension(ExtendedKeyUsage::new().client_auth().build()?)?;
    let authority_key_id = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&builder.x509v3_context(Some(&ca.cert), None))?;
    builder.append_extension(authority_key_id)?;
    builder.sign(&ca.key, MessageDigest::sha256())?;

    Ok(CertKeyPair {
        cert: builder.build(),
        key,
    })
}

/// A self-signed CA valid for ten years.
pub fn create_ca_cert_pair(common_name: &str) -> Result<CertKeyPair> {
    build_ca(common_name).context(error::CertificateSnafu {
        operation: format!("create CA certificate '{}'", common_name),
    })
}

/// A client certificate signed by `ca`, valid for one year.
pub fn create_client_cert(
    ca: &CertKeyPair,
    common_name: &str,
    organizations: &[&str],
) -> Result<CertKeyPair> {
    build_client(ca, common_name, organizations).context(error::CertificateSnafu {
        operation: format!("create client certificate '{}'", common_name),
    })
}

fn create_service_account_key() -> Result<KeyPair> {
    let operation = "create service account key";
    let key = new_private_key().context(error::CertificateSnafu { operation })?;
    Ok(KeyPair {
        public: key
            .public_key_to_pem()
            .context(error::CertificateSnafu { operation })?,
        private: key
            .private_key_to_pem_pkcs8()
            .context(error::CertificateSnafu { operation })?,
    })
}

async fn save_cert(
    store: &dyn StoreProvider,
    cluster: &str,
    name: &str,
    pair: &CertKeyPair,
) -> Result<()> {
    store
        .certificates(cluster)
        .create(name, pair.to_key_pair()?)
        .await
        .context(error::StoreSnafu {
            operation: format!("store certificate '{}'", name),
        })
}

/// Loads a stored certificate.
pub async fn load_cert(
    store: &dyn StoreProvider,
    cluster: &str,
    name: &str,
) -> Result<CertKeyPair> {
    let pair = store
        .certificates(cluster)
        .get(name)
        .await
        .context(error::StoreSnafu {
            operation: format!("load certificate '{}'", name),
        })?;
    CertKeyPair::from_key_pair(&pair)
}

/// Generates and stores the CAs, the service account key and the SSH key of a new cluster.
pub async fn create_pharmer_certs(
    store: &dyn StoreProvider,
    cluster: &Cluster,
) -> Result<PharmerCertificates> {
    let name = cluster.name();
    let config = &cluster.spec.config;
    info!("Generating certificates for cluster '{}'", name);

    let ca = create_ca_cert_pair(&config.ca_cert_name)?;
    save_cert(store, name, &config.ca_cert_name, &ca).await?;

    let front_proxy_ca = create_ca_cert_pair(&config.front_proxy_ca_cert_name)?;
    save_cert(store, name, &config.front_proxy_ca_cert_name, &front_proxy_ca).await?;

    let etcd_ca = create_ca_cert_pair(ETCD_CA_CERT_NAME)?;
    save_cert(store, name, ETCD_CA_CERT_NAME, &etcd_ca).await?;

    let service_account = create_service_account_key()?;
    store
        .certificates(name)
        .create(SERVICE_ACCOUNT_CERT_NAME, service_account.clone())
        .await
        .context(error::StoreSnafu {
            operation: "store service account key",
        })?;

    let ssh_key = ssh::new_ssh_key_pair()?;
    store
        .ssh_keys(name)
        .create(
            &config.cloud.ssh_key_name,
            KeyPair {
                public: ssh_key.public_key.clone(),
                private: ssh_key.private_key.clone(),
            },
        )
        .await
        .context(error::StoreSnafu {
            operation: "store ssh key",
        })?;
    debug!("SSH key fingerprint for cluster '{}': {}", name, ssh_key.fingerprint);

    Ok(PharmerCertificates {
        ca,
        front_proxy_ca,
        etcd_ca,
        service_account,
        ssh_key,
    })
}

/// Loads what [`create_pharmer_certs`] stored.
pub async fn get_pharmer_certs(
    store: &dyn StoreProvider,
    cluster: &Cluster,
) -> Result<PharmerCertificates> {
    let name = cluster.name();
    let config = &cluster.spec.config;
    let service_account = store
        .certificates(name)
        .get(SERVICE_ACCOUNT_CERT_NAME)
        .await
        .context(error::StoreSnafu {
            operation: "load service account key",
        })?;
    let ssh = store
        .ssh_keys(name)
        .get(&config.cloud.ssh_key_name)
        .await
        .context(error::StoreSnafu {
            operation: "load ssh key",
        })?;
    Ok(PharmerCertificates {
        ca: load_cert(store, name, &config.ca_cert_name).await?,
        front_proxy_ca: load_cert(store, name, &config.front_proxy_ca_cert_name).await?,
        etcd_ca: load_cert(store, name, ETCD_CA_CERT_NAME).await?,
        service_account,
        ssh_key: ssh::parse_ssh_key_pair(ssh.public, ssh.private)?,
    })
}

/// The admin client certificate of a cluster. It is issued from the cluster CA and stored the
/// first time it is requested. A CA certificate that was replaced by the cloud provider's no
/// longer matches the pharmer key and cannot issue one.
pub async fn get_admin_cert(store: &dyn StoreProvider, cluster: &Cluster) -> Result<CertKeyPair> {
    let name = cluster.name();
    match store.certificates(name).get(ADMIN_CERT_NAME).await {
        Ok(pair) => return CertKeyPair::from_key_pair(&pair),
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            return Err(e).context(error::StoreSnafu {
                operation: "load admin certificate",
            })
        }
    }
    info!("Issuing admin certificate for cluster '{}'", name);
    let ca = load_cert(store, name, &cluster.spec.config.ca_cert_name).await?;
    ensure!(
        ca.key_matches().context(error::CertificateSnafu {
            operation: "read cluster CA public key",
        })?,
        error::CaKeyMismatchSnafu { name }
    );
    let admin = create_client_cert(&ca, ADMIN_USER_NAME, &[ADMIN_ORGANIZATION])?;
    save_cert(store, name, ADMIN_CERT_NAME, &admin).await?;
    Ok(admin)
}

/// Replaces the stored certificate `name` with PEM material issued by the cloud provider.
pub async fn replace_cert(
    store: &dyn StoreProvider,
    cluster: &str,
    name: &str,
    pair: KeyPair,
) -> Result<()> {
    let certs = store.certificates(cluster);
    match certs.delete(name).await {
        Ok(()) => debug!("Replacing certificate '{}' of cluster '{}'", name, cluster),
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            return Err(e).context(error::StoreSnafu {
                operation: format!("delete certificate '{}'", name),
            })
        }
    }
    certs.create(name, pair).await.context(error::StoreSnafu {
        operation: format!("store certificate '{}'", name),
    })
}

/// Stores the CA certificate a managed cluster was issued by its provider in place of the one
/// pharmer generated. The pharmer CA key is kept.
pub async fn store_cloud_ca(
    store: &dyn StoreProvider,
    cluster: &Cluster,
    ca_pem: Vec<u8>,
) -> Result<()> {
    X509::from_pem(&ca_pem).context(error::PemSnafu {
        what: "cluster CA certificate",
    })?;
    let name = cluster.name();
    let ca_name = &cluster.spec.config.ca_cert_name;
    let existing = store
        .certificates(name)
        .get(ca_name)
        .await
        .context(error::StoreSnafu {
            operation: format!("load certificate '{}'", ca_name),
        })?;
    replace_cert(
        store,
        name,
        ca_name,
        KeyPair {
            public: ca_pem,
            private: existing.private,
        },
    )
    .await
}
