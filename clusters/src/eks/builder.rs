use crate::cluster::{Cluster, ClusterBuilder};
use crate::eks::cluster::EksCluster;
use crate::eks::wait::{self, PollOutcome};
use crate::eks::{auth, iam, network, nodegroup, security_groups};
use crate::error::{self, Result};
use crate::version::K8sVersion;
use async_trait::async_trait;
use aws_sdk_eks::model::{ClusterStatus, KubernetesNetworkConfigRequest, VpcConfigRequest};
use log::{debug, info};
use snafu::{OptionExt, ResultExt};
use std::env;
use uuid::Uuid;

const DEFAULT_NODE_MACHINE_TYPE: &str = "c5.4xlarge";
const DEFAULT_KUBERNETES_VERSION: K8sVersion = K8sVersion::new(1, 31, Some(1));
/// The service CIDR handed to every cluster; the in-cluster DNS address is
/// derived from it.
pub(crate) const KUBERNETES_SERVICE_CIDR: &str = "172.20.0.0/16";
/// Optional: the name of an EC2 key pair enabling SSH onto the nodes.
pub(crate) const ENV_NODE_SSH_KEY: &str = "EKS_NODE_SSH_KEY";

/// Builds an EKS-backed cluster from scratch.
#[derive(Debug)]
pub struct EksClusterBuilder {
    name: String,
    cluster_version: K8sVersion,
    node_machine_type: String,
}

impl EksClusterBuilder {
    pub fn new() -> Self {
        Self {
            name: format!("t-{}", Uuid::new_v4()),
            cluster_version: DEFAULT_KUBERNETES_VERSION,
            node_machine_type: DEFAULT_NODE_MACHINE_TYPE.to_string(),
        }
    }

    /// Use a custom name for the cluster. The name links every provisioned
    /// resource and is all that teardown needs.
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_cluster_version(mut self, version: K8sVersion) -> Self {
        self.cluster_version = version;
        self
    }

    pub fn with_node_machine_type<S: Into<String>>(mut self, machine_type: S) -> Self {
        self.node_machine_type = machine_type.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn provision(&self) -> Result<EksCluster> {
        let config = aws_config::from_env().load().await;
        let region = config
            .region()
            .context(error::MissingRegionSnafu)?
            .to_string();
        let ec2_client = aws_sdk_ec2::Client::new(&config);
        let eks_client = aws_sdk_eks::Client::new(&config);
        let iam_client = aws_sdk_iam::Client::new(&config);
        let ssm_client = aws_sdk_ssm::Client::new(&config);

        let version = self.cluster_version.major_minor_without_v();
        info!(
            "Building EKS cluster '{}' (kubernetes {}) in region '{}'",
            self.name, version, region
        );

        let roles = iam::create_roles(&iam_client, &self.name).await?;
        let zones = network::get_availability_zones(&ec2_client, &region).await?;
        let fabric = network::create_vpc(&ec2_client, &zones).await?;
        let control_plane_sg_id = security_groups::create_control_plane_security_group(
            &ec2_client,
            &fabric.vpc_id,
            &self.name,
        )
        .await?;

        create_cluster(
            &eks_client,
            &self.name,
            &roles.cluster_role_arn,
            &version,
            &control_plane_sg_id,
            &fabric.subnet_ids,
        )
        .await?;
        let active = wait_for_cluster_active(&eks_client, &self.name).await?;
        info!("Cluster '{}' is active", self.name);

        // The active cluster reports its synthesized control-plane groups;
        // all of them need to accept node traffic.
        let control_plane_group_ids: Vec<String> = active
            .resources_vpc_config()
            .and_then(|vpc_config| vpc_config.security_group_ids())
            .map(|ids| ids.to_vec())
            .unwrap_or_default();
        let node_sg_id = security_groups::create_node_security_group(
            &ec2_client,
            &fabric.vpc_id,
            &self.name,
            &control_plane_group_ids,
        )
        .await?;

        let (_, client) = auth::client_for_cluster(&config, &self.name).await?;
        nodegroup::authorize_node_role(&client, &roles.node_role_arn).await?;

        let ami_id =
            nodegroup::resolve_ami(&ssm_client, &version, &self.node_machine_type).await?;
        debug!("Resolved node AMI '{}'", ami_id);

        let endpoint = active.endpoint().context(error::MissingSnafu {
            what: "the endpoint",
            from: "the active cluster description",
        })?;
        let certificate = active
            .certificate_authority()
            .and_then(|authority| authority.data())
            .context(error::MissingSnafu {
                what: "the certificate authority data",
                from: "the active cluster description",
            })?;
        let service_cidr = active
            .kubernetes_network_config()
            .and_then(|network_config| network_config.service_ipv4_cidr())
            .unwrap_or(KUBERNETES_SERVICE_CIDR);
        let dns_cluster_ip = nodegroup::cluster_dns_ip(service_cidr)?;
        let userdata =
            nodegroup::bootstrap_userdata(&self.name, endpoint, certificate, &dns_cluster_ip);

        let ssh_key_name = env::var(ENV_NODE_SSH_KEY).ok().filter(|key| !key.is_empty());
        let launch_template_id = nodegroup::create_launch_template(
            &ec2_client,
            &self.name,
            &ami_id,
            &self.node_machine_type,
            &node_sg_id,
            &userdata,
            ssh_key_name.as_deref(),
        )
        .await?;

        nodegroup::create_node_group(
            &eks_client,
            &self.name,
            &roles.node_role_arn,
            &fabric.subnet_ids,
            &launch_template_id,
        )
        .await?;

        // Rebuild the handle so it carries a fresh token.
        EksCluster::new_from_existing(&self.name).await
    }
}

impl Default for EksClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterBuilder for EksClusterBuilder {
    async fn build(&self) -> Result<Box<dyn Cluster>> {
        Ok(Box::new(self.provision().await?))
    }
}

async fn create_cluster(
    eks_client: &aws_sdk_eks::Client,
    cluster_name: &str,
    cluster_role_arn: &str,
    version: &str,
    control_plane_sg_id: &str,
    subnet_ids: &[String],
) -> Result<()> {
    info!("Submitting creation of EKS cluster '{}'", cluster_name);
    eks_client
        .create_cluster()
        .name(cluster_name)
        .role_arn(cluster_role_arn)
        .version(version)
        .resources_vpc_config(
            VpcConfigRequest::builder()
                .endpoint_private_access(true)
                .endpoint_public_access(true)
                .set_subnet_ids(Some(subnet_ids.to_vec()))
                .security_group_ids(control_plane_sg_id)
                .build(),
        )
        .kubernetes_network_config(
            KubernetesNetworkConfigRequest::builder()
                .service_ipv4_cidr(KUBERNETES_SERVICE_CIDR)
                .build(),
        )
        .send()
        .await
        .context(error::CreateClusterSnafu { cluster_name })?;
    Ok(())
}

async fn wait_for_cluster_active(
    eks_client: &aws_sdk_eks::Client,
    cluster_name: &str,
) -> Result<aws_sdk_eks::model::Cluster> {
    wait::wait_until(
        &format!("cluster '{}'", cluster_name),
        wait::READY_POLL_PERIOD,
        Some(wait::READY_DEADLINE),
        || async move {
            let cluster = eks_client
                .describe_cluster()
                .name(cluster_name)
                .send()
                .await
                .context(error::DescribeClusterSnafu { cluster_name })?
                .cluster
                .context(error::MissingSnafu {
                    what: "the cluster field",
                    from: "the describe-cluster response",
                })?;
            if matches!(cluster.status(), Some(ClusterStatus::Active)) {
                Ok(PollOutcome::Ready(cluster))
            } else {
                debug!(
                    "Cluster '{}' is currently {:?}",
                    cluster_name,
                    cluster.status()
                );
                Ok(PollOutcome::Pending)
            }
        },
    )
    .await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_the_harness_conventions() {
        let builder = EksClusterBuilder::new();
        assert!(builder.name().starts_with("t-"));
        assert_eq!(builder.cluster_version, K8sVersion::new(1, 31, Some(1)));
        assert_eq!(builder.node_machine_type, "c5.4xlarge");
    }

    #[test]
    fn builder_options_override_defaults() {
        let builder = EksClusterBuilder::new()
            .with_name("smoke-abc1234567")
            .with_cluster_version(K8sVersion::new(1, 30, None))
            .with_node_machine_type("m5.large");
        assert_eq!(builder.name(), "smoke-abc1234567");
        assert_eq!(
            builder.cluster_version.major_minor_without_v(),
            "1.30"
        );
        assert_eq!(builder.node_machine_type, "m5.large");
    }

    #[test]
    fn submitted_version_strips_the_patch() {
        let version = K8sVersion::parse("v1.31.1").unwrap();
        assert_eq!(version.major_minor_without_v(), "1.31");
    }
}
