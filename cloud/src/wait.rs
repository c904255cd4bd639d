use log::trace;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::time::Duration;

/// The error returned by [`poll_immediate`].
#[derive(Debug)]
pub enum PollError<E> {
    /// The condition did not hold before the timeout elapsed.
    Timeout(Duration),
    /// The condition returned an error.
    Condition(E),
}

impl<E: Display> Display for PollError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PollError::Timeout(timeout) => write!(f, "timed out after {:?}", timeout),
            PollError::Condition(e) => Display::fmt(e, f),
        }
    }
}

impl<E> std::error::Error for PollError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::Timeout(_) => None,
            PollError::Condition(e) => Some(e),
        }
    }
}

/// Runs `condition` right away and then every `interval` until it returns `Ok(true)`. Stops with
/// an error when `condition` fails or `timeout` has elapsed. Conditions that want to ride out
/// transient API errors should log them and return `Ok(false)`.
pub async fn poll_immediate<F, Fut, E>(
    interval: Duration,
    timeout: Duration,
    mut condition: F,
) -> Result<(), PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let poll = async {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match condition().await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => return Err(PollError::Condition(e)),
            }
            trace!("Attempt {}: condition not met, retrying in {:?}", attempt, interval);
            tokio::time::sleep(interval).await;
        }
    };
    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| PollError::Timeout(timeout))?
}
