/*!

`smoke-clusters` provisions the Kubernetes clusters the smoke tests run
against and tears them down afterward.

Each supported platform is a [`registry::ClusterProvider`] offering two
operations: building a new cluster from scratch, and attaching to an existing
one. Providers are looked up by name through a [`registry::ProviderRegistry`]
that the embedding program populates once at startup.

The EKS provider carries the real lifecycle: it composes IAM roles, a VPC
with two public subnets, cross-authorized security groups, a managed cluster,
a launch template and a node group, in dependency order; waits for the
asynchronous state transitions to settle; mints short-lived bearer tokens for
the cluster API; and dismantles the whole graph in reverse, tolerating the
partial-failure states an earlier run may have left behind.

!*/

mod cluster;
mod diagnostics;
mod env;
mod error;
mod kubeconfig;
mod registry;
mod version;

pub mod eks;
pub mod kind;

pub use cluster::{Addon, AddonSet, Cluster, ClusterBuilder, ClusterType};
pub use diagnostics::dump_diagnostics;
pub use env::require_env;
pub use error::{Error, Result};
pub use kubeconfig::{
    client_for_rest_config, kubeconfig_for, rest_config_from_kubeconfig, write_kubeconfig,
    RestConfig,
};
pub use registry::{default_registry, ClusterProvider, ProviderRegistry};
pub use version::K8sVersion;
