use crate::cluster::{self, Addon, AddonSet, Cluster, ClusterType};
use crate::diagnostics;
use crate::eks::{auth, guard_on_env, teardown};
use crate::error::Result;
use crate::kubeconfig::RestConfig;
use crate::version::K8sVersion;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// A handle to an EKS-backed cluster.
pub struct EksCluster {
    name: String,
    rest_config: RestConfig,
    client: kube::Client,
    addons: AddonSet,
}

impl EksCluster {
    /// Attach to an existing cluster by name, reconstructing an authenticated
    /// handle without mutating anything.
    pub async fn new_from_existing(name: &str) -> Result<Self> {
        guard_on_env()?;
        let config = aws_config::from_env().load().await;
        let (rest_config, client) = auth::client_for_cluster(&config, name).await?;
        Ok(Self {
            name: name.to_string(),
            rest_config,
            client,
            addons: AddonSet::default(),
        })
    }
}

#[async_trait]
impl Cluster for EksCluster {
    fn name(&self) -> &str {
        &self.name
    }

    fn cluster_type(&self) -> ClusterType {
        ClusterType::Eks
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
        guard_on_env()?;
        let config = aws_config::from_env().load().await;
        teardown::cleanup(&config, &self.name).await
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
                // The addon is still deployed; keep it registered.
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
