use crate::eks::wait::{self, PollOutcome};
use crate::error::{self, Result};
use aws_sdk_ec2::model::{
    LaunchTemplateBlockDeviceMappingRequest, LaunchTemplateEbsBlockDeviceRequest,
    LaunchTemplateTagSpecificationRequest, RequestLaunchTemplateData, ResourceType, Tag,
};
use aws_sdk_eks::model::{LaunchTemplateSpecification, NodegroupScalingConfig, NodegroupStatus};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};
use log::{debug, info};
use maplit::btreemap;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};

/// Every cluster gets exactly one node group, with this name.
pub(crate) const DEFAULT_NODE_GROUP_NAME: &str = "default-node-group";
const NODE_GROUP_SIZE: i32 = 1;
const NODE_ROOT_DEVICE: &str = "/dev/xvda";
const NODE_ROOT_VOLUME_GIB: i32 = 40;

const AWS_AUTH_CONFIG_MAP: &str = "aws-auth";
const AWS_AUTH_NAMESPACE: &str = "kube-system";
const MAP_ROLES_KEY: &str = "mapRoles";
const NODE_GROUP_USERNAME: &str = "system:node:{{EC2PrivateDNSName}}";
const NODE_GROUP_GROUPS: [&str; 2] = ["system:bootstrappers", "system:nodes"];

pub(crate) fn launch_template_name(cluster_name: &str) -> String {
    format!("{}-node-template", cluster_name)
}

pub(crate) fn cluster_ownership_tag(cluster_name: &str) -> String {
    format!("kubernetes.io/cluster/{}", cluster_name)
}

/// Resolve the recommended node AMI for a cluster version and instance type
/// from the public SSM parameter tree.
pub(crate) async fn resolve_ami(
    ssm_client: &aws_sdk_ssm::Client,
    k8s_minor_version: &str,
    instance_type: &str,
) -> Result<String> {
    let parameter = recommended_ami_parameter(k8s_minor_version, instance_type);
    debug!("Resolving node AMI from '{}'", parameter);
    ssm_client
        .get_parameter()
        .name(&parameter)
        .send()
        .await
        .context(error::ResolveAmiSnafu {
            parameter: &parameter,
        })?
        .parameter()
        .and_then(|p| p.value())
        .map(|value| value.to_string())
        .context(error::MissingSnafu {
            what: "the parameter value",
            from: "the get-parameter response",
        })
}

fn recommended_ami_parameter(k8s_minor_version: &str, instance_type: &str) -> String {
    format!(
        "/aws/service/eks/optimized-ami/{}/{}/recommended/image_id",
        k8s_minor_version,
        ami_family_path(instance_type)
    )
}

/// Map an instance type onto the image-family path of the optimized-AMI
/// parameter tree: GPU instances and Graviton instances get their own image
/// builds.
fn ami_family_path(instance_type: &str) -> &'static str {
    let family = instance_type.split('.').next().unwrap_or(instance_type);
    if ["p2", "p3", "p4d", "p5", "g3", "g4dn", "g5", "inf1", "inf2"].contains(&family) {
        return "amazon-linux-2-gpu";
    }
    // Graviton families carry a 'g' right after the generation digit, e.g.
    // m6g, m6gd, c7g, c6gn, t4g, r6g; a1 is the first-generation outlier.
    let graviton = family == "a1"
        || family
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit())
            .map(|(i, _)| {
                family[i..]
                    .trim_start_matches(|c: char| c.is_ascii_digit())
                    .starts_with('g')
            })
            .unwrap_or(false);
    if graviton {
        "amazon-linux-2-arm64"
    } else {
        "amazon-linux-2"
    }
}

/// Derive the in-cluster DNS address from the service CIDR by replacing the
/// last octet with `10`.
pub(crate) fn cluster_dns_ip(service_ipv4_cidr: &str) -> Result<String> {
    let base = service_ipv4_cidr
        .split('/')
        .next()
        .unwrap_or(service_ipv4_cidr);
    let mut octets: Vec<&str> = base.split('.').collect();
    if octets.len() != 4 {
        return error::MissingSnafu {
            what: "a four-octet address",
            from: format!("the service CIDR '{}'", service_ipv4_cidr),
        }
        .fail();
    }
    octets[3] = "10";
    Ok(octets.join("."))
}

/// Generate the userdata script that bootstraps an AL2 node into the cluster.
pub(crate) fn bootstrap_userdata(
    cluster_name: &str,
    api_server_endpoint: &str,
    certificate_authority: &str,
    dns_cluster_ip: &str,
) -> String {
    let script = format!(
        "#!/bin/bash\n\
         set -o errexit\n\
         set -o nounset\n\
         set -o pipefail\n\
         /etc/eks/bootstrap.sh {} \\\n\
         \x20 --apiserver-endpoint '{}' \\\n\
         \x20 --b64-cluster-ca '{}' \\\n\
         \x20 --dns-cluster-ip '{}'\n",
        cluster_name, api_server_endpoint, certificate_authority, dns_cluster_ip
    );
    base64::encode(script)
}

/// Create the launch template the node group's instances are started from.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn create_launch_template(
    ec2_client: &aws_sdk_ec2::Client,
    cluster_name: &str,
    ami_id: &str,
    instance_type: &str,
    node_security_group_id: &str,
    userdata: &str,
    ssh_key_name: Option<&str>,
) -> Result<String> {
    let template_name = launch_template_name(cluster_name);

    let mut data_builder = RequestLaunchTemplateData::builder()
        .image_id(ami_id)
        .instance_type(instance_type.into())
        .security_group_ids(node_security_group_id)
        .block_device_mappings(
            LaunchTemplateBlockDeviceMappingRequest::builder()
                .device_name(NODE_ROOT_DEVICE)
                .ebs(
                    LaunchTemplateEbsBlockDeviceRequest::builder()
                        .volume_size(NODE_ROOT_VOLUME_GIB)
                        .build(),
                )
                .build(),
        )
        .user_data(userdata)
        .tag_specifications(
            LaunchTemplateTagSpecificationRequest::builder()
                .resource_type(ResourceType::Instance)
                .tags(
                    Tag::builder()
                        .key(cluster_ownership_tag(cluster_name))
                        .value("owned")
                        .build(),
                )
                .build(),
        );
    if let Some(key_name) = ssh_key_name {
        data_builder = data_builder.key_name(key_name);
    }

    let launch_template_id = ec2_client
        .create_launch_template()
        .launch_template_name(&template_name)
        .launch_template_data(data_builder.build())
        .send()
        .await
        .context(error::CreateLaunchTemplateSnafu {
            template_name: &template_name,
        })?
        .launch_template()
        .and_then(|template| template.launch_template_id())
        .map(|id| id.to_string())
        .context(error::MissingSnafu {
            what: "the launch template id",
            from: "the create-launch-template response",
        })?;
    info!(
        "Created launch template '{}' ({})",
        template_name, launch_template_id
    );
    Ok(launch_template_id)
}

/// Add the node role to the cluster's auth ConfigMap so that instances
/// assuming it can join. Must happen before the node group is created.
pub(crate) async fn authorize_node_role(
    client: &kube::Client,
    node_role_arn: &str,
) -> Result<()> {
    info!("Adding '{}' to the aws-auth ConfigMap", node_role_arn);
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), AWS_AUTH_NAMESPACE);
    match api
        .get_opt(AWS_AUTH_CONFIG_MAP)
        .await
        .context(error::KubeApiSnafu {
            what: "reading the aws-auth ConfigMap",
        })? {
        Some(mut config_map) => {
            let data = config_map.data.get_or_insert_with(Default::default);
            let merged = merged_map_roles(
                data.get(MAP_ROLES_KEY).map(String::as_str),
                node_role_arn,
            )?;
            data.insert(MAP_ROLES_KEY.to_string(), merged);
            api.replace(AWS_AUTH_CONFIG_MAP, &PostParams::default(), &config_map)
                .await
                .context(error::KubeApiSnafu {
                    what: "updating the aws-auth ConfigMap",
                })?;
        }
        None => {
            let config_map = ConfigMap {
                metadata: ObjectMeta {
                    name: Some(AWS_AUTH_CONFIG_MAP.to_string()),
                    namespace: Some(AWS_AUTH_NAMESPACE.to_string()),
                    ..ObjectMeta::default()
                },
                data: Some(btreemap! {
                    MAP_ROLES_KEY.to_string() => merged_map_roles(None, node_role_arn)?,
                }),
                ..ConfigMap::default()
            };
            api.create(&PostParams::default(), &config_map)
                .await
                .context(error::KubeApiSnafu {
                    what: "creating the aws-auth ConfigMap",
                })?;
        }
    }
    Ok(())
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
struct RoleMapping {
    rolearn: String,
    username: String,
    groups: Vec<String>,
}

fn node_group_mapping(node_role_arn: &str) -> RoleMapping {
    RoleMapping {
        rolearn: node_role_arn.to_string(),
        username: NODE_GROUP_USERNAME.to_string(),
        groups: NODE_GROUP_GROUPS.iter().map(|g| g.to_string()).collect(),
    }
}

/// Merge the node-group identity into an existing `mapRoles` document,
/// deduplicating by role ARN.
fn merged_map_roles(existing: Option<&str>, node_role_arn: &str) -> Result<String> {
    let mut mappings: Vec<RoleMapping> = match existing {
        Some(raw) => serde_yaml::from_str(raw).context(error::MapRolesSerializationSnafu)?,
        None => Vec::new(),
    };
    if !mappings.iter().any(|m| m.rolearn == node_role_arn) {
        mappings.push(node_group_mapping(node_role_arn));
    }
    serde_yaml::to_string(&mappings).context(error::MapRolesSerializationSnafu)
}

/// Create the single node group from the launch template and wait for it to
/// become active.
pub(crate) async fn create_node_group(
    eks_client: &aws_sdk_eks::Client,
    cluster_name: &str,
    node_role_arn: &str,
    subnet_ids: &[String],
    launch_template_id: &str,
) -> Result<()> {
    info!(
        "Creating node group '{}' for cluster '{}'",
        DEFAULT_NODE_GROUP_NAME, cluster_name
    );
    eks_client
        .create_nodegroup()
        .cluster_name(cluster_name)
        .nodegroup_name(DEFAULT_NODE_GROUP_NAME)
        .node_role(node_role_arn)
        .set_subnets(Some(subnet_ids.to_vec()))
        .scaling_config(
            NodegroupScalingConfig::builder()
                .min_size(NODE_GROUP_SIZE)
                .max_size(NODE_GROUP_SIZE)
                .desired_size(NODE_GROUP_SIZE)
                .build(),
        )
        .launch_template(
            LaunchTemplateSpecification::builder()
                .id(launch_template_id)
                .build(),
        )
        .send()
        .await
        .context(error::CreateNodegroupSnafu {
            cluster_name,
            nodegroup_name: DEFAULT_NODE_GROUP_NAME,
        })?;

    wait_for_node_group_active(eks_client, cluster_name).await
}

async fn wait_for_node_group_active(
    eks_client: &aws_sdk_eks::Client,
    cluster_name: &str,
) -> Result<()> {
    wait::wait_until(
        &format!("node group '{}'", DEFAULT_NODE_GROUP_NAME),
        wait::READY_POLL_PERIOD,
        Some(wait::READY_DEADLINE),
        || async move {
            let status = eks_client
                .describe_nodegroup()
                .cluster_name(cluster_name)
                .nodegroup_name(DEFAULT_NODE_GROUP_NAME)
                .send()
                .await
                .context(error::DescribeNodegroupSnafu {
                    cluster_name,
                    nodegroup_name: DEFAULT_NODE_GROUP_NAME,
                })?
                .nodegroup
                .and_then(|nodegroup| nodegroup.status);
            if matches!(status, Some(NodegroupStatus::Active)) {
                Ok(PollOutcome::Ready(()))
            } else {
                debug!(
                    "Node group '{}' is currently {:?}",
                    DEFAULT_NODE_GROUP_NAME, status
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
    fn launch_template_name_derives_from_the_cluster_name() {
        assert_eq!(
            launch_template_name("smoke-abc1234567"),
            "smoke-abc1234567-node-template"
        );
        assert_eq!(
            cluster_ownership_tag("smoke-abc1234567"),
            "kubernetes.io/cluster/smoke-abc1234567"
        );
    }

    #[test]
    fn ami_family_follows_the_instance_type() {
        assert_eq!(ami_family_path("c5.4xlarge"), "amazon-linux-2");
        assert_eq!(ami_family_path("m5.large"), "amazon-linux-2");
        assert_eq!(ami_family_path("m6g.large"), "amazon-linux-2-arm64");
        assert_eq!(ami_family_path("c6gn.medium"), "amazon-linux-2-arm64");
        assert_eq!(ami_family_path("t4g.small"), "amazon-linux-2-arm64");
        assert_eq!(ami_family_path("a1.large"), "amazon-linux-2-arm64");
        assert_eq!(ami_family_path("p3.2xlarge"), "amazon-linux-2-gpu");
        assert_eq!(ami_family_path("g4dn.xlarge"), "amazon-linux-2-gpu");
    }

    #[test]
    fn ami_parameter_path_carries_the_minor_version() {
        assert_eq!(
            recommended_ami_parameter("1.31", "c5.4xlarge"),
            "/aws/service/eks/optimized-ami/1.31/amazon-linux-2/recommended/image_id"
        );
    }

    #[test]
    fn dns_ip_replaces_the_last_octet() {
        assert_eq!(cluster_dns_ip("172.20.0.0/16").unwrap(), "172.20.0.10");
        assert_eq!(cluster_dns_ip("10.100.0.0/16").unwrap(), "10.100.0.10");
        assert!(cluster_dns_ip("fd30:1c53::/108").is_err());
    }

    #[test]
    fn userdata_invokes_the_bootstrap_script() {
        let encoded = bootstrap_userdata(
            "smoke-abc",
            "https://example.eks.amazonaws.com",
            "Y2VydA==",
            "172.20.0.10",
        );
        let script = String::from_utf8(base64::decode(encoded).unwrap()).unwrap();
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("/etc/eks/bootstrap.sh smoke-abc"));
        assert!(script.contains("--apiserver-endpoint 'https://example.eks.amazonaws.com'"));
        assert!(script.contains("--dns-cluster-ip '172.20.0.10'"));
    }

    #[test]
    fn map_roles_merge_deduplicates_by_arn() {
        let arn = "arn:aws:iam::111122223333:role/smoke-abc-NodeInstanceRole";
        let first = merged_map_roles(None, arn).unwrap();
        let mappings: Vec<RoleMapping> = serde_yaml::from_str(&first).unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].username, NODE_GROUP_USERNAME);
        assert_eq!(
            mappings[0].groups,
            vec!["system:bootstrappers", "system:nodes"]
        );

        let second = merged_map_roles(Some(&first), arn).unwrap();
        let mappings: Vec<RoleMapping> = serde_yaml::from_str(&second).unwrap();
        assert_eq!(mappings.len(), 1);
    }

    #[test]
    fn map_roles_merge_preserves_existing_identities() {
        let existing = "- rolearn: arn:aws:iam::111122223333:role/other\n  username: other\n  groups:\n  - system:masters\n";
        let merged = merged_map_roles(
            Some(existing),
            "arn:aws:iam::111122223333:role/smoke-abc-NodeInstanceRole",
        )
        .unwrap();
        let mappings: Vec<RoleMapping> = serde_yaml::from_str(&merged).unwrap();
        assert_eq!(mappings.len(), 2);
    }
}
