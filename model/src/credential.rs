use crate::constants::{
    CREDENTIAL_AWS, CREDENTIAL_DIGITALOCEAN, CREDENTIAL_GCE, PROVIDER_DOKUBE, PROVIDER_EKS,
    PROVIDER_GKE,
};
use crate::error::{self, Result};
use crate::meta::{ObjectMeta, TypeMeta};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::path::Path;

pub const GCE_PROJECT_ID: &str = "projectID";
pub const GCE_SERVICE_ACCOUNT: &str = "serviceAccount";
pub const AWS_ACCESS_KEY_ID: &str = "accessKeyID";
pub const AWS_SECRET_ACCESS_KEY: &str = "secretAccessKey";
pub const DIGITALOCEAN_TOKEN: &str = "token";

/// Cloud credentials, stored by name and referenced from `ClusterConfig::credential_name`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: CredentialSpec,
}

impl_object!(Credential, "Credential");

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSpec {
    pub provider: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Describes the keys a provider's credential must carry and where to find them in the
/// environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialFormat {
    pub provider: &'static str,
    /// Pairs of (data key, environment variable).
    pub fields: &'static [(&'static str, &'static str)],
}

const FORMATS: [CredentialFormat; 3] = [
    CredentialFormat {
        provider: CREDENTIAL_GCE,
        fields: &[
            (GCE_PROJECT_ID, "GOOGLE_PROJECT_ID"),
            (GCE_SERVICE_ACCOUNT, "GOOGLE_APPLICATION_CREDENTIALS"),
        ],
    },
    CredentialFormat {
        provider: CREDENTIAL_AWS,
        fields: &[
            (AWS_ACCESS_KEY_ID, "AWS_ACCESS_KEY_ID"),
            (AWS_SECRET_ACCESS_KEY, "AWS_SECRET_ACCESS_KEY"),
        ],
    },
    CredentialFormat {
        provider: CREDENTIAL_DIGITALOCEAN,
        fields: &[(DIGITALOCEAN_TOKEN, "DIGITALOCEAN_TOKEN")],
    },
];

impl CredentialFormat {
    pub fn all() -> &'static [CredentialFormat] {
        &FORMATS
    }

    /// Looks up a format by credential provider (`GoogleCloud`) or by cluster provider (`gke`).
    pub fn for_provider(provider: &str) -> Option<&'static CredentialFormat> {
        let provider = match provider {
            PROVIDER_GKE => CREDENTIAL_GCE,
            PROVIDER_EKS => CREDENTIAL_AWS,
            PROVIDER_DOKUBE => CREDENTIAL_DIGITALOCEAN,
            other => other,
        };
        FORMATS
            .iter()
            .find(|format| format.provider.eq_ignore_ascii_case(provider))
    }
}

impl Credential {
    pub fn new<S1, S2>(name: S1, provider: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            type_meta: TypeMeta::default(),
            metadata: ObjectMeta::named(name),
            spec: CredentialSpec {
                provider: provider.into(),
                data: BTreeMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn format(&self) -> Result<&'static CredentialFormat> {
        Ok(CredentialFormat::for_provider(&self.spec.provider).context(
            error::CredentialUnsupportedSnafu {
                provider: &self.spec.provider,
            },
        )?)
    }

    /// Checks that every key of the provider's format is present and non-empty.
    pub fn validate(&self) -> Result<()> {
        for (key, _) in self.format()?.fields {
            self.required(key)?;
        }
        Ok(())
    }

    fn required(&self, key: &str) -> Result<&str> {
        Ok(self
            .spec
            .data
            .get(key)
            .filter(|value| !value.is_empty())
            .context(error::CredentialMissingKeySnafu {
                name: self.name(),
                key,
            })?)
    }

    /// Fills the credential data from the environment. For Google Cloud the service account is
    /// read from the file named by `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn load_from_env(&mut self) -> Result<()> {
        let format = self.format()?;
        if format.provider == CREDENTIAL_GCE {
            let var = "GOOGLE_APPLICATION_CREDENTIALS";
            let path = std::env::var(var).context(error::EnvVarSnafu { name: var })?;
            return self.load_from_file(path);
        }
        for (key, var) in format.fields {
            let value = std::env::var(var).context(error::EnvVarSnafu { name: *var })?;
            self.spec.data.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Loads a Google Cloud service account json file. The project id is taken from the file.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(error::ReadFileSnafu { path })?;
        let account: serde_json::Value =
            serde_json::from_str(&contents).context(error::CredentialServiceAccountSnafu)?;
        if let Some(project_id) = account.get("project_id").and_then(|v| v.as_str()) {
            self.spec
                .data
                .insert(GCE_PROJECT_ID.to_string(), project_id.to_string());
        }
        self.spec
            .data
            .insert(GCE_SERVICE_ACCOUNT.to_string(), contents);
        Ok(())
    }
}

/// A validated Google Cloud credential.
#[derive(Debug, Clone, Copy)]
pub struct Gce<'a> {
    project_id: &'a str,
    service_account: &'a str,
}

impl<'a> Gce<'a> {
    pub fn project_id(&self) -> &'a str {
        self.project_id
    }

    pub fn service_account(&self) -> &'a str {
        self.service_account
    }
}

impl<'a> TryFrom<&'a Credential> for Gce<'a> {
    type Error = crate::Error;

    fn try_from(credential: &'a Credential) -> Result<Self> {
        Ok(Self {
            project_id: credential.required(GCE_PROJECT_ID)?,
            service_account: credential.required(GCE_SERVICE_ACCOUNT)?,
        })
    }
}

/// A validated AWS credential.
#[derive(Debug, Clone, Copy)]
pub struct Aws<'a> {
    access_key_id: &'a str,
    secret_access_key: &'a str,
}

impl<'a> Aws<'a> {
    pub fn access_key_id(&self) -> &'a str {
        self.access_key_id
    }

    pub fn secret_access_key(&self) -> &'a str {
        self.secret_access_key
    }
}

impl<'a> TryFrom<&'a Credential> for Aws<'a> {
    type Error = crate::Error;

    fn try_from(credential: &'a Credential) -> Result<Self> {
        Ok(Self {
            access_key_id: credential.required(AWS_ACCESS_KEY_ID)?,
            secret_access_key: credential.required(AWS_SECRET_ACCESS_KEY)?,
        })
    }
}

/// A validated DigitalOcean credential.
#[derive(Debug, Clone, Copy)]
pub struct DigitalOcean<'a> {
    token: &'a str,
}

impl<'a> DigitalOcean<'a> {
    pub fn token(&self) -> &'a str {
        self.token
    }
}

impl<'a> TryFrom<&'a Credential> for DigitalOcean<'a> {
    type Error = crate::Error;

    fn try_from(credential: &'a Credential) -> Result<Self> {
        Ok(Self {
            token: credential.required(DIGITALOCEAN_TOKEN)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn format_lookup_accepts_cluster_provider_names() {
        assert_eq!(
            CredentialFormat::for_provider("gke").unwrap().provider,
            CREDENTIAL_GCE
        );
        assert_eq!(
            CredentialFormat::for_provider("aws").unwrap().provider,
            CREDENTIAL_AWS
        );
        assert!(CredentialFormat::for_provider("linode").is_none());
    }

    #[test]
    fn validate_reports_missing_key() {
        let mut cred = Credential::new("do", CREDENTIAL_DIGITALOCEAN);
        let err = cred.validate().unwrap_err();
        assert!(err.to_string().contains("token"), "{}", err);
        cred.spec
            .data
            .insert(DIGITALOCEAN_TOKEN.to_string(), "secret".to_string());
        cred.validate().unwrap();
        assert_eq!(DigitalOcean::try_from(&cred).unwrap().token(), "secret");
    }

    #[test]
    fn unsupported_provider() {
        let cred = Credential::new("x", "Vultr");
        assert!(cred.validate().is_err());
    }

    #[test]
    fn service_account_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"type":"service_account","project_id":"my-project","client_email":"a@b"}}"#
        )
        .unwrap();
        let mut cred = Credential::new("gce", CREDENTIAL_GCE);
        cred.load_from_file(file.path()).unwrap();
        let gce = Gce::try_from(&cred).unwrap();
        assert_eq!(gce.project_id(), "my-project");
        assert!(gce.service_account().contains("client_email"));
    }
}
