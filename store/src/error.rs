use snafu::Snafu;
use std::path::PathBuf;

/// The result type returned by every store operation.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{} `{}` already exists", kind, name))]
    AlreadyExists { kind: String, name: String },

    #[snafu(display("Unable to connect to database '{}': {}", url, source))]
    DatabaseConnect { url: String, source: sqlx::Error },

    #[snafu(display("Database error during {}: {}", operation, source))]
    Database {
        operation: String,
        source: sqlx::Error,
    },

    #[snafu(display("Unable to deserialize {} `{}`: {}", kind, name, source))]
    Deserialize {
        kind: String,
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to {} '{}': {}", operation, path.display(), source))]
    Io {
        operation: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Missing {} name", kind))]
    MissingName { kind: String },

    #[snafu(display("The store configuration does not name a backend"))]
    NoBackend,

    #[snafu(display("{} `{}` does not exist", kind, name))]
    NotFound { kind: String, name: String },

    #[snafu(display("Unable to serialize {} `{}`: {}", kind, name, source))]
    Serialize {
        kind: String,
        name: String,
        source: serde_json::Error,
    },
}

impl Error {
    /// True when the requested object is not in the store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
