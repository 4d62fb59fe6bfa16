use crate::error::{self, Result};
use aws_sdk_ec2::model::{IpPermission, UserIdGroupPair};
use log::{debug, info};
use snafu::{OptionExt, ResultExt};

/// All protocols, in security-group rule terms.
const ALL_PROTOCOLS: &str = "-1";

pub(crate) fn control_plane_group_name(cluster_name: &str) -> String {
    format!("{}-cp", cluster_name)
}

pub(crate) fn node_group_name(cluster_name: &str) -> String {
    format!("{}-shared-by-all-nodes", cluster_name)
}

/// Create the security group attached to the managed cluster's control-plane
/// endpoint.
pub(crate) async fn create_control_plane_security_group(
    ec2_client: &aws_sdk_ec2::Client,
    vpc_id: &str,
    cluster_name: &str,
) -> Result<String> {
    let group_name = control_plane_group_name(cluster_name);
    let group_id = create_security_group(
        ec2_client,
        vpc_id,
        &group_name,
        &format!("Control plane security group for cluster {}", cluster_name),
    )
    .await?;
    info!("Created control plane security group '{}'", group_id);
    Ok(group_id)
}

/// Create the shared node security group and cross-authorize it against every
/// control-plane security group the active cluster reports.
///
/// The managed cluster synthesizes its own control-plane groups, so both
/// directions have to be authorized for node traffic to be accepted.
pub(crate) async fn create_node_security_group(
    ec2_client: &aws_sdk_ec2::Client,
    vpc_id: &str,
    cluster_name: &str,
    control_plane_group_ids: &[String],
) -> Result<String> {
    let group_name = node_group_name(cluster_name);
    let node_group_id = create_security_group(
        ec2_client,
        vpc_id,
        &group_name,
        &format!("Shared node security group for cluster {}", cluster_name),
    )
    .await?;
    info!("Created node security group '{}'", node_group_id);

    for control_plane_group_id in control_plane_group_ids {
        debug!(
            "Cross-authorizing '{}' and '{}'",
            node_group_id, control_plane_group_id
        );
        authorize_ingress_from(ec2_client, &node_group_id, control_plane_group_id).await?;
        authorize_ingress_from(ec2_client, control_plane_group_id, &node_group_id).await?;
    }

    Ok(node_group_id)
}

async fn create_security_group(
    ec2_client: &aws_sdk_ec2::Client,
    vpc_id: &str,
    group_name: &str,
    description: &str,
) -> Result<String> {
    ec2_client
        .create_security_group()
        .group_name(group_name)
        .description(description)
        .vpc_id(vpc_id)
        .send()
        .await
        .context(error::CreateSecurityGroupSnafu { group_name, vpc_id })?
        .group_id()
        .map(|id| id.to_string())
        .context(error::MissingSnafu {
            what: "the security group id",
            from: "the create-security-group response",
        })
}

/// Authorize all protocols into `group_id` from `peer_group_id`.
async fn authorize_ingress_from(
    ec2_client: &aws_sdk_ec2::Client,
    group_id: &str,
    peer_group_id: &str,
) -> Result<()> {
    ec2_client
        .authorize_security_group_ingress()
        .group_id(group_id)
        .ip_permissions(all_protocols_from(peer_group_id))
        .send()
        .await
        .context(error::AuthorizeSecurityGroupIngressSnafu {
            group_id,
            peer_group_id,
        })?;
    Ok(())
}

fn all_protocols_from(peer_group_id: &str) -> IpPermission {
    IpPermission::builder()
        .ip_protocol(ALL_PROTOCOLS)
        .user_id_group_pairs(UserIdGroupPair::builder().group_id(peer_group_id).build())
        .build()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn group_names_derive_from_the_cluster_name() {
        assert_eq!(control_plane_group_name("smoke-abc"), "smoke-abc-cp");
        assert_eq!(
            node_group_name("smoke-abc"),
            "smoke-abc-shared-by-all-nodes"
        );
    }

    #[test]
    fn rules_cover_all_protocols_from_the_peer() {
        let permission = all_protocols_from("sg-0123456789abcdef0");
        assert_eq!(permission.ip_protocol(), Some("-1"));
        let pairs = permission.user_id_group_pairs().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].group_id(), Some("sg-0123456789abcdef0"));
    }
}
