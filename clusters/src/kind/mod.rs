//! The kind provider: thin glue over the `kind` CLI for local clusters.
//!
//! There is no provisioning lifecycle here; building local clusters is the
//! embedded default builder's job, which is why [`KindProvider::builder`]
//! returns no override.

use crate::cluster::{self, Addon, AddonSet, Cluster, ClusterBuilder, ClusterType};
use crate::diagnostics;
use crate::error::{self, Result};
use crate::kubeconfig::{self, RestConfig};
use crate::registry::ClusterProvider;
use crate::version::K8sVersion;
use async_trait::async_trait;
use kube::config::Kubeconfig;
use log::info;
use snafu::{ensure, ResultExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;

pub struct KindProvider;

#[async_trait]
impl ClusterProvider for KindProvider {
    fn builder(&self, _env_name: &str) -> Result<Option<Box<dyn ClusterBuilder>>> {
        // kind is built in by the caller's default builder.
        Ok(None)
    }

    async fn attach(&self, env_name: &str) -> Result<Box<dyn Cluster>> {
        Ok(Box::new(KindCluster::new_from_existing(env_name).await?))
    }
}

/// A handle to a local kind cluster.
pub struct KindCluster {
    name: String,
    rest_config: RestConfig,
    client: kube::Client,
    addons: AddonSet,
}

impl KindCluster {
    /// Attach to an existing kind cluster using the kubeconfig the kind CLI
    /// reports for it.
    pub async fn new_from_existing(name: &str) -> Result<Self> {
        let raw = kind_output(&["get", "kubeconfig", "--name", name]).await?;
        let kubeconfig: Kubeconfig =
            serde_yaml::from_str(&raw).context(error::ParseKubeconfigSnafu)?;
        let rest_config = kubeconfig::rest_config_from_kubeconfig(&kubeconfig)?;
        let client = kubeconfig::client_for_rest_config(name, &rest_config).await?;
        Ok(Self {
            name: name.to_string(),
            rest_config,
            client,
            addons: AddonSet::default(),
        })
    }
}

async fn kind_output(args: &[&str]) -> Result<String> {
    let what = format!("kind {}", args.join(" "));
    let output = Command::new("kind")
        .args(args)
        .output()
        .await
        .context(error::ProcessSnafu { what: &what })?;
    ensure!(
        output.status.success(),
        error::ProcessStatusSnafu {
            what,
            status: output.status,
        }
    );
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[async_trait]
impl Cluster for KindCluster {
    fn name(&self) -> &str {
        &self.name
    }

    fn cluster_type(&self) -> ClusterType {
        ClusterType::Kind
    }

    async fn version(&self) -> Result<K8sVersion> {
        cluster::server_version(&self.client).await
    }

    fn rest_config(&self) -> &RestConfig {
        &self.rest_config
    }

    fn client(&self) -> kube::Client {
        self.client.clone()
    }

    async fn cleanup(&self) -> Result<()> {
        info!("Deleting kind cluster '{}'", self.name);
        kind_output(&["delete", "cluster", "--name", &self.name]).await?;
        Ok(())
    }

    async fn dump_diagnostics(&self, meta: &str) -> Result<PathBuf> {
        diagnostics::dump_diagnostics(&self.client, meta).await
    }

    async fn deploy_addon(&self, addon: Arc<dyn Addon>) -> Result<()> {
        self.addons.insert_new(&self.name, addon.clone())?;
        addon.deploy(self).await
    }

    async fn delete_addon(&self, name: &str) -> Result<()> {
        if let Some(addon) = self.addons.take(name) {
            if let Err(e) = addon.delete(self).await {
                self.addons.restore(addon);
                return Err(e);
            }
        }
        Ok(())
    }

    fn get_addon(&self, name: &str) -> Result<Arc<dyn Addon>> {
        self.addons.get(name)
    }

    fn list_addons(&self) -> Vec<Arc<dyn Addon>> {
        self.addons.list()
    }
}
