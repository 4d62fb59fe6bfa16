//! The EKS provider: provisions a managed cluster with its full dependency
//! graph (IAM roles, network fabric, security groups, launch template, node
//! group), authenticates against it, and tears everything down again.

mod auth;
mod builder;
mod cluster;
mod iam;
mod network;
mod nodegroup;
mod security_groups;
mod teardown;
mod wait;

pub use builder::EksClusterBuilder;
pub use cluster::EksCluster;

use crate::cluster::{Cluster, ClusterBuilder};
use crate::env::require_env;
use crate::error::Result;
use crate::registry::ClusterProvider;
use async_trait::async_trait;

const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const ENV_REGION: &str = "AWS_REGION";

/// Reject early when the ambient AWS credentials are not configured.
pub(crate) fn guard_on_env() -> Result<()> {
    require_env(ENV_ACCESS_KEY_ID)?;
    require_env(ENV_SECRET_ACCESS_KEY)?;
    require_env(ENV_REGION)?;
    Ok(())
}

pub struct EksProvider;

#[async_trait]
impl ClusterProvider for EksProvider {
    fn builder(&self, env_name: &str) -> Result<Option<Box<dyn ClusterBuilder>>> {
        guard_on_env()?;
        Ok(Some(Box::new(
            EksClusterBuilder::new().with_name(env_name),
        )))
    }

    async fn attach(&self, env_name: &str) -> Result<Box<dyn Cluster>> {
        Ok(Box::new(EksCluster::new_from_existing(env_name).await?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // Env-var tests tweak process state, so keep them serialized in one test.
    #[test]
    fn guard_reports_the_first_missing_variable() {
        std::env::set_var(ENV_ACCESS_KEY_ID, "AKIDEXAMPLE");
        std::env::set_var(ENV_SECRET_ACCESS_KEY, "secret");
        std::env::remove_var(ENV_REGION);
        let err = guard_on_env().unwrap_err();
        assert_eq!(err.to_string(), "AWS_REGION is not set");

        std::env::set_var(ENV_REGION, "us-west-2");
        guard_on_env().unwrap();

        std::env::remove_var(ENV_ACCESS_KEY_ID);
        let err = guard_on_env().unwrap_err();
        assert_eq!(err.to_string(), "AWS_ACCESS_KEY_ID is not set");

        std::env::remove_var(ENV_SECRET_ACCESS_KEY);
        std::env::remove_var(ENV_REGION);
    }
}
