use anyhow::{anyhow, ensure, Result};
use clap::Parser;
use log::info;
use smoke_clusters::{Cluster, ProviderRegistry};
use std::time::Duration;

const CLEANUP_TIMEOUT: Duration = Duration::from_secs(1200);

/// Clean up the resources provisioned for an environment.
#[derive(Debug, Parser)]
pub(crate) struct Cleanup {
    /// Name of the existing environment.
    #[clap(long = "env")]
    env: String,
    /// The platform that the environment was deployed on.
    #[clap(long = "env-platform", default_value = "kind")]
    env_platform: String,
}

impl Cleanup {
    pub(crate) async fn run(self, registry: &ProviderRegistry) -> Result<()> {
        ensure!(
            registry.contains(&self.env_platform),
            "unsupported platform: '{}'. supported values are: {}",
            self.env_platform,
            registry.supported_names().join(", ")
        );

        let cluster = registry.attach(&self.env_platform, &self.env).await?;
        info!("cleaning up cluster of environment {}", self.env);
        tokio::time::timeout(CLEANUP_TIMEOUT, cluster.cleanup())
            .await
            .map_err(|_| anyhow!("timed out cleaning up environment {}", self.env))??;
        Ok(())
    }
}
