use anyhow::{anyhow, ensure, Context, Result};
use clap::Parser;
use log::info;
use smoke_clusters::{Cluster, ClusterBuilder, K8sVersion, ProviderRegistry};
use std::process::Command;
use std::time::Duration;
use uuid::Uuid;

const ENVIRONMENT_CREATE_TIMEOUT: Duration = Duration::from_secs(600);

/// Deploy the cluster that the smoke tests will be running on.
#[derive(Debug, Parser)]
pub(crate) struct Deploy {
    /// The name of the environment. Generated when not given.
    #[clap(long = "name")]
    name: Option<String>,
    /// The platform to deploy the environment on.
    #[clap(long = "env-platform", default_value = "kind")]
    env_platform: String,
    /// The version of Kubernetes to deploy.
    #[clap(long = "kubernetes-version", default_value = "1.31.1")]
    kubernetes_version: String,
    /// The file path used to write the generated kubeconfig; '-' writes it to
    /// stdout.
    #[clap(long = "kubeconfig-output")]
    kubeconfig_output: String,
}

impl Deploy {
    pub(crate) async fn run(self, registry: &ProviderRegistry) -> Result<()> {
        let version = K8sVersion::parse(&self.kubernetes_version)?;
        ensure!(
            registry.contains(&self.env_platform),
            "unsupported platform: '{}'. supported values are: {}",
            self.env_platform,
            registry.supported_names().join(", ")
        );

        let env_name = self.name.clone().unwrap_or_else(generated_name);
        info!("building new environment {}", env_name);
        let cluster = tokio::time::timeout(
            ENVIRONMENT_CREATE_TIMEOUT,
            build_cluster(registry, &self.env_platform, &env_name, version),
        )
        .await
        .map_err(|_| anyhow!("timed out building environment {}", env_name))??;
        info!("environment {} was created successfully!", cluster.name());

        smoke_clusters::write_kubeconfig(
            &env_name,
            cluster.rest_config(),
            &self.kubeconfig_output,
            std::io::stdout(),
        )?;
        Ok(())
    }
}

async fn build_cluster(
    registry: &ProviderRegistry,
    platform: &str,
    env_name: &str,
    version: K8sVersion,
) -> Result<Box<dyn Cluster>> {
    match registry.builder(platform, env_name)? {
        Some(builder) => Ok(builder.build().await?),
        None => {
            // No override from the provider: run the default local builder.
            create_default_kind_cluster(env_name, version)?;
            Ok(registry.attach(platform, env_name).await?)
        }
    }
}

fn create_default_kind_cluster(env_name: &str, version: K8sVersion) -> Result<()> {
    let image = format!("kindest/node:v{}", version.full_version_without_v());
    info!("creating kind cluster {} from image {}", env_name, image);
    let status = Command::new("kind")
        .args(["create", "cluster", "--name", env_name, "--image", &image])
        .status()
        .context("failed to run 'kind create cluster'")?;
    ensure!(
        status.success(),
        "'kind create cluster' failed with status {}",
        status
    );
    Ok(())
}

fn generated_name() -> String {
    let seed = Uuid::new_v4().simple().to_string();
    format!("smoke-{}", &seed[seed.len() - 10..])
}

#[cfg(test)]
mod test {
    use super::generated_name;

    #[test]
    fn generated_names_are_prefixed_and_short() {
        let name = generated_name();
        assert!(name.starts_with("smoke-"));
        assert_eq!(name.len(), "smoke-".len() + 10);
    }
}
