use std::fmt::{Display, Formatter};

/// When a cluster manager operation fails, it must state whether it has left cloud resources
/// behind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Resources {
    /// An error occurred and cloud resources exist that pharmer no longer tracks. They have to be
    /// removed by hand. Try to never return this!
    Orphaned,

    /// An error occurred and cloud resources that belong to the cluster remain. Deleting the
    /// cluster with pharmer will remove them.
    Remaining,

    /// Something bad happened, but nothing was created in the cloud.
    Clear,

    /// It is unknown whether cloud resources were left behind.
    Unknown,
}

/// Implemented by provider state that can tell whether cloud resources exist.
///
/// # Example
///
/// ```
/// use pharmer_cloud::provider::{AsResources, Resources};
/// struct CreatedPools {
///     names: Vec<String>
/// }
/// impl AsResources for CreatedPools {
///     fn as_resources(&self) -> Resources {
///         if self.names.is_empty() {
///             Resources::Clear
///         } else {
///             Resources::Remaining
///         }
///     }
/// }
/// ```
///
pub trait AsResources {
    /// Inspects `&self` and determines if there are resources remaining.
    fn as_resources(&self) -> Resources;
}

impl AsResources for Resources {
    fn as_resources(&self) -> Resources {
        *self
    }
}

impl AsResources for &Resources {
    fn as_resources(&self) -> Resources {
        **self
    }
}

/// The error type returned by [`ClusterManager`](crate::provider::ClusterManager)
/// implementations.
#[derive(Debug)]
pub struct ProviderError {
    /// Whether or not the error has left resources behind.
    resources: Resources,

    /// Any message to be included with the error. This will be included in the formatted display
    /// before `inner`.
    context: Option<String>,

    /// The error that caused this error.
    inner: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

/// The result type returned by cluster manager operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    pub fn new_with_source_and_context<R, S, E>(resources: R, context: S, source: E) -> Self
    where
        R: AsResources,
        S: Into<String>,
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self {
            resources: resources.as_resources(),
            context: Some(context.into()),
            inner: Some(source.into()),
        }
    }

    pub fn new_with_context<R, S>(resources: R, context: S) -> Self
    where
        R: AsResources,
        S: Into<String>,
    {
        Self {
            resources: resources.as_resources(),
            context: Some(context.into()),
            inner: None,
        }
    }

    pub fn resources(&self) -> Resources {
        self.resources
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn inner(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.inner.as_ref().map(|some| some.as_ref())
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.context() {
            Some(context) => write!(f, "{}", context)?,
            None => write!(f, "{}", self.resources)?,
        }
        if let Some(inner) = self.inner() {
            write!(f, ": {}", inner)?;
        }
        if self.resources != Resources::Clear && self.context.is_some() {
            write!(f, " ({})", self.resources)?;
        }
        Ok(())
    }
}

impl Resources {
    pub fn message(&self) -> &'static str {
        match self {
            Resources::Orphaned => "cloud resources were orphaned and must be removed by hand",
            Resources::Remaining => "cloud resources remain, delete the cluster to remove them",
            Resources::Clear => "no cloud resources were left behind",
            Resources::Unknown => "cloud resources may have been left behind",
        }
    }
}

impl Display for Resources {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self.message(), f)
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Converts errors and options to `ProviderError` with a familiar `context` function.
pub trait IntoProviderError<T> {
    /// Convert `self` into a `ProviderError`.
    fn context<R, S>(self, resources: R, message: S) -> ProviderResult<T>
    where
        S: Into<String>,
        R: AsResources;
}

impl<T, E> IntoProviderError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<R, S>(self, resources: R, message: S) -> ProviderResult<T>
    where
        S: Into<String>,
        R: AsResources,
    {
        self.map_err(|e| ProviderError::new_with_source_and_context(resources, message, e))
    }
}

// `None` is converted into an error.
impl<T> IntoProviderError<T> for std::option::Option<T> {
    fn context<R, S>(self, r: R, m: S) -> Result<T, ProviderError>
    where
        S: Into<String>,
        R: AsResources,
    {
        self.ok_or_else(|| ProviderError::new_with_context(r, m))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_includes_context_and_resources() {
        let err: ProviderResult<()> = Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "quota exceeded",
        ))
        .context(Resources::Remaining, "Unable to create node pool 'p1'");
        let err = err.unwrap_err();
        assert_eq!(err.resources(), Resources::Remaining);
        let message = err.to_string();
        assert!(message.starts_with("Unable to create node pool 'p1': quota exceeded"));
        assert!(message.contains(Resources::Remaining.message()));
    }

    #[test]
    fn none_becomes_error() {
        let missing: Option<u8> = None;
        let err = missing.context(Resources::Clear, "Missing endpoint").unwrap_err();
        assert_eq!(err.to_string(), "Missing endpoint");
        assert!(err.inner().is_none());
    }
}
