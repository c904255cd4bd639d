use async_trait::async_trait;
use pharmer_cloud::{AdminClient, Result};
use std::time::Duration;

/// Answers as a freshly provisioned cluster would.
pub(crate) struct MockAdminClient {
    pub(crate) kube_system_uid: String,
}

#[async_trait]
impl AdminClient for MockAdminClient {
    async fn wait_for_ready(&self, _interval: Duration, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn kube_system_uid(&self) -> Result<String> {
        Ok(self.kube_system_uid.clone())
    }
}
