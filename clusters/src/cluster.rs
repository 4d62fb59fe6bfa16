use crate::error::{self, Result};
use crate::kubeconfig::RestConfig;
use crate::version::K8sVersion;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// The platform a cluster handle is backed by.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    Eks,
    Kind,
}

serde_plain::derive_display_from_serialize!(ClusterType);
serde_plain::derive_fromstr_from_deserialize!(ClusterType);

/// A component that can be deployed into a cluster after it is up, such as a
/// mesh control plane or a load-balancer shim. The harness only manages addon
/// registration on the handle; what an addon does is its own business.
#[async_trait]
pub trait Addon: std::fmt::Debug + Send + Sync {
    fn name(&self) -> String;
    async fn deploy(&self, cluster: &dyn Cluster) -> Result<()>;
    async fn delete(&self, cluster: &dyn Cluster) -> Result<()>;
}

/// A running Kubernetes cluster the smoke tests can be pointed at.
#[async_trait]
pub trait Cluster: Send + Sync {
    fn name(&self) -> &str;

    fn cluster_type(&self) -> ClusterType;

    /// The version reported by the API server.
    async fn version(&self) -> Result<K8sVersion>;

    fn rest_config(&self) -> &RestConfig;

    fn client(&self) -> kube::Client;

    /// Remove every resource that was provisioned for this cluster.
    async fn cleanup(&self) -> Result<()>;

    /// Collect diagnostics (per-pod logs and a meta marker) into a fresh
    /// directory and return its path.
    async fn dump_diagnostics(&self, meta: &str) -> Result<PathBuf>;

    async fn deploy_addon(&self, addon: Arc<dyn Addon>) -> Result<()>;

    /// Remove an addon from the cluster. A no-op when the addon was never
    /// deployed.
    async fn delete_addon(&self, name: &str) -> Result<()>;

    fn get_addon(&self, name: &str) -> Result<Arc<dyn Addon>>;

    fn list_addons(&self) -> Vec<Arc<dyn Addon>>;
}

/// Builds a new cluster from scratch.
#[async_trait]
pub trait ClusterBuilder: std::fmt::Debug + Send + Sync {
    async fn build(&self) -> Result<Box<dyn Cluster>>;
}

/// The in-memory addon set attached to a cluster handle.
///
/// The lock protects this map only; it is not a distributed lock over the
/// cloud resources backing the cluster, and it is never held across an await.
#[derive(Default)]
pub struct AddonSet {
    addons: RwLock<HashMap<String, Arc<dyn Addon>>>,
}

impl AddonSet {
    /// Register an addon, failing if one with the same name is already
    /// present.
    pub fn insert_new(&self, cluster_name: &str, addon: Arc<dyn Addon>) -> Result<()> {
        let mut addons = write_lock(&self.addons);
        let name = addon.name();
        if addons.contains_key(&name) {
            return error::AddonAlreadyDeployedSnafu {
                addon: name,
                cluster: cluster_name,
            }
            .fail();
        }
        addons.insert(name, addon);
        Ok(())
    }

    /// Remove and return an addon, if present.
    pub fn take(&self, name: &str) -> Option<Arc<dyn Addon>> {
        write_lock(&self.addons).remove(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Addon>> {
        read_lock(&self.addons)
            .get(name)
            .cloned()
            .ok_or_else(|| error::AddonNotFoundSnafu { addon: name }.build())
    }

    pub fn list(&self) -> Vec<Arc<dyn Addon>> {
        read_lock(&self.addons).values().cloned().collect()
    }

    /// Re-insert an addon, e.g. when its deletion failed and it should stay
    /// registered.
    pub fn restore(&self, addon: Arc<dyn Addon>) {
        write_lock(&self.addons).insert(addon.name(), addon);
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Ask the API server for its version.
pub(crate) async fn server_version(client: &kube::Client) -> Result<K8sVersion> {
    let info = client.apiserver_version().await.context(error::KubeApiSnafu {
        what: "reading the server version",
    })?;
    K8sVersion::parse(&info.git_version)
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug)]
    struct NoopAddon {
        name: &'static str,
    }

    #[async_trait]
    impl Addon for NoopAddon {
        fn name(&self) -> String {
            self.name.to_string()
        }

        async fn deploy(&self, _cluster: &dyn Cluster) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _cluster: &dyn Cluster) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn duplicate_addons_are_rejected() {
        let set = AddonSet::default();
        set.insert_new("c", Arc::new(NoopAddon { name: "mesh" }))
            .unwrap();
        let err = set
            .insert_new("c", Arc::new(NoopAddon { name: "mesh" }))
            .unwrap_err();
        assert!(err.to_string().contains("already loaded"));
    }

    #[test]
    fn take_is_a_noop_when_absent() {
        let set = AddonSet::default();
        assert!(set.take("mesh").is_none());
    }

    #[test]
    fn get_reports_missing_addons() {
        let set = AddonSet::default();
        let err = set.get("mesh").unwrap_err();
        assert_eq!(err.to_string(), "Addon 'mesh' not found");
    }

    #[test]
    fn list_returns_all_addons() {
        let set = AddonSet::default();
        set.insert_new("c", Arc::new(NoopAddon { name: "mesh" }))
            .unwrap();
        set.insert_new("c", Arc::new(NoopAddon { name: "metallb" }))
            .unwrap();
        assert_eq!(set.list().len(), 2);
    }
}
