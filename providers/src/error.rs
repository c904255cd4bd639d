use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors of the GKE and DigitalOcean REST clients.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{} {} failed with status {}: {}", method, url, status, body))]
    Api {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[snafu(display("Unable to decode {}: {}", what, source))]
    Base64 {
        what: String,
        source: base64::DecodeError,
    },

    #[snafu(display("Unable to build HTTP client: {}", source))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("{} {} failed: {}", method, url, source))]
    Http {
        method: String,
        url: String,
        source: reqwest::Error,
    },

    #[snafu(display("Unable to decode {}: {}", what, source))]
    Json {
        what: String,
        source: serde_json::Error,
    },

    #[snafu(display("Kubeconfig has no {}", what))]
    KubeconfigMissing { what: String },

    #[snafu(display("Unable to parse kubeconfig: {}", source))]
    KubeconfigParse { source: serde_yaml::Error },

    #[snafu(display("Operation '{}' failed: {}", name, message))]
    OperationFailed { name: String, message: String },

    #[snafu(display("Invalid service account: {}", source))]
    ServiceAccount { source: serde_json::Error },

    #[snafu(display("Unable to sign service account token: {}", source))]
    TokenSign {
        source: jsonwebtoken::errors::Error,
    },
}
