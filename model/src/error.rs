use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
pub struct Error(OpaqueError);
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum OpaqueError {
    #[snafu(display("Unable to create directory '{}': {}", path.display(), source))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Credential '{}' is missing required key '{}'", name, key))]
    CredentialMissingKey { name: String, key: String },

    #[snafu(display("Unable to parse service account json: {}", source))]
    CredentialServiceAccount { source: serde_json::Error },

    #[snafu(display("Credential provider '{}' is not supported", provider))]
    CredentialUnsupported { provider: String },

    #[snafu(display("Environment variable '{}' is not set", name))]
    EnvVar {
        name: String,
        source: std::env::VarError,
    },

    #[snafu(display("Unable to determine the home directory"))]
    HomeDir,

    #[snafu(display("Unable to read file '{}': {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to set permissions of '{}': {}", path.display(), source))]
    SetPermissions {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Parse error: {}", source))]
    SerdePlain { source: serde_plain::Error },

    #[snafu(display("Unable to deserialize '{}': {}", path.display(), source))]
    YamlDeserialize {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("Unable to serialize yaml: {}", source))]
    YamlSerialize { source: serde_yaml::Error },

    #[snafu(display("Unable to write file '{}': {}", path.display(), source))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
}
