use crate::eks::iam;
use crate::eks::nodegroup::DEFAULT_NODE_GROUP_NAME;
use crate::eks::wait::{self, PollOutcome};
use crate::error::{self, Result};
use aws_sdk_ec2::error::DeleteLaunchTemplateError;
use aws_sdk_ec2::model::Filter;
use aws_sdk_ec2::types::SdkError;
use aws_sdk_eks::error::{
    DescribeClusterError, DescribeClusterErrorKind, DescribeNodegroupError,
    DescribeNodegroupErrorKind,
};
use aws_types::SdkConfig;
use log::{debug, info};
use snafu::{OptionExt, ResultExt};

/// What a node group leaves behind for later teardown steps: the role its
/// instances assumed and the launch template they were started from.
#[derive(Debug, Default)]
struct NodeGroupRemnants {
    node_role_arn: Option<String>,
    launch_template_id: Option<String>,
}

/// Tear down everything that was provisioned for `cluster_name`, in reverse
/// dependency order. Tolerates resources already removed by an earlier,
/// partially failed teardown; the first unexpected error aborts.
pub(crate) async fn cleanup(config: &SdkConfig, cluster_name: &str) -> Result<()> {
    let eks_client = aws_sdk_eks::Client::new(config);
    let ec2_client = aws_sdk_ec2::Client::new(config);
    let iam_client = aws_sdk_iam::Client::new(config);

    info!("Cleaning up cluster '{}'", cluster_name);
    let cluster = match eks_client
        .describe_cluster()
        .name(cluster_name)
        .send()
        .await
    {
        Ok(output) => output.cluster.context(error::MissingSnafu {
            what: "the cluster field",
            from: "the describe-cluster response",
        })?,
        Err(e) if cluster_not_found(&e) => {
            info!(
                "Cluster '{}' no longer exists; nothing to clean up",
                cluster_name
            );
            return Ok(());
        }
        Err(e) => return Err(e).context(error::DescribeClusterSnafu { cluster_name }),
    };

    let vpc_id = cluster
        .resources_vpc_config()
        .and_then(|vpc_config| vpc_config.vpc_id())
        .map(|id| id.to_string())
        .context(error::MissingSnafu {
            what: "the VPC id",
            from: "the cluster description",
        })?;
    let cluster_role_arn = cluster.role_arn().map(|arn| arn.to_string());

    let remnants = delete_node_group(&eks_client, cluster_name).await?;

    if let Some(launch_template_id) = &remnants.launch_template_id {
        delete_launch_template(&ec2_client, launch_template_id).await?;
    }

    if let Some(node_role_arn) = &remnants.node_role_arn {
        iam::delete_role(&iam_client, iam::role_name_from_arn(node_role_arn)?).await?;
    }
    if let Some(cluster_role_arn) = &cluster_role_arn {
        iam::delete_role(&iam_client, iam::role_name_from_arn(cluster_role_arn)?).await?;
    }

    delete_cluster(&eks_client, cluster_name).await?;
    scrub_vpc(&ec2_client, &vpc_id).await?;

    info!("Cluster '{}' has been cleaned up", cluster_name);
    Ok(())
}

/// Delete the cluster's node group and wait for it to disappear. A node group
/// that never existed (or was already deleted) is skipped.
async fn delete_node_group(
    eks_client: &aws_sdk_eks::Client,
    cluster_name: &str,
) -> Result<NodeGroupRemnants> {
    let nodegroup = match eks_client
        .describe_nodegroup()
        .cluster_name(cluster_name)
        .nodegroup_name(DEFAULT_NODE_GROUP_NAME)
        .send()
        .await
    {
        Ok(output) => output.nodegroup,
        Err(e) if nodegroup_not_found(&e) => {
            debug!(
                "Node group '{}' no longer exists; skipping",
                DEFAULT_NODE_GROUP_NAME
            );
            return Ok(NodeGroupRemnants::default());
        }
        Err(e) => {
            return Err(e).context(error::DescribeNodegroupSnafu {
                cluster_name,
                nodegroup_name: DEFAULT_NODE_GROUP_NAME,
            })
        }
    };
    let remnants = NodeGroupRemnants {
        node_role_arn: nodegroup
            .as_ref()
            .and_then(|ng| ng.node_role())
            .map(|arn| arn.to_string()),
        launch_template_id: nodegroup
            .as_ref()
            .and_then(|ng| ng.launch_template())
            .and_then(|template| template.id())
            .map(|id| id.to_string()),
    };

    info!("Deleting node group '{}'", DEFAULT_NODE_GROUP_NAME);
    eks_client
        .delete_nodegroup()
        .cluster_name(cluster_name)
        .nodegroup_name(DEFAULT_NODE_GROUP_NAME)
        .send()
        .await
        .context(error::DeleteNodegroupSnafu {
            cluster_name,
            nodegroup_name: DEFAULT_NODE_GROUP_NAME,
        })?;

    wait::wait_until(
        &format!("node group '{}' to be deleted", DEFAULT_NODE_GROUP_NAME),
        wait::DELETE_POLL_PERIOD,
        None,
        || async move {
            match eks_client
                .describe_nodegroup()
                .cluster_name(cluster_name)
                .nodegroup_name(DEFAULT_NODE_GROUP_NAME)
                .send()
                .await
            {
                Ok(_) => Ok(PollOutcome::Pending),
                Err(e) if nodegroup_not_found(&e) => Ok(PollOutcome::Ready(())),
                Err(e) => Err(e).context(error::DescribeNodegroupSnafu {
                    cluster_name,
                    nodegroup_name: DEFAULT_NODE_GROUP_NAME,
                }),
            }
        },
    )
    .await?;

    Ok(remnants)
}

async fn delete_launch_template(
    ec2_client: &aws_sdk_ec2::Client,
    launch_template_id: &str,
) -> Result<()> {
    info!("Deleting launch template '{}'", launch_template_id);
    if let Err(e) = ec2_client
        .delete_launch_template()
        .launch_template_id(launch_template_id)
        .send()
        .await
    {
        if !launch_template_not_found(&e) {
            return Err(e).context(error::DeleteLaunchTemplateSnafu { launch_template_id });
        }
        debug!(
            "Launch template '{}' has already been deleted",
            launch_template_id
        );
    }
    Ok(())
}

/// Delete the cluster and wait until describing it reports not-found.
async fn delete_cluster(eks_client: &aws_sdk_eks::Client, cluster_name: &str) -> Result<()> {
    info!("Deleting cluster '{}'", cluster_name);
    eks_client
        .delete_cluster()
        .name(cluster_name)
        .send()
        .await
        .context(error::DeleteClusterSnafu { cluster_name })?;

    wait::wait_until(
        &format!("cluster '{}' to be deleted", cluster_name),
        wait::DELETE_POLL_PERIOD,
        None,
        || async move {
            match eks_client
                .describe_cluster()
                .name(cluster_name)
                .send()
                .await
            {
                Ok(_) => Ok(PollOutcome::Pending),
                Err(e) if cluster_not_found(&e) => Ok(PollOutcome::Ready(())),
                Err(e) => Err(e).context(error::DescribeClusterSnafu { cluster_name }),
            }
        },
    )
    .await
}

/// Remove everything inside the VPC and then the VPC itself. The VPC's main
/// route table and default security group go away with the VPC; everything
/// else must be deleted explicitly, rules before the groups that carry them.
async fn scrub_vpc(ec2_client: &aws_sdk_ec2::Client, vpc_id: &str) -> Result<()> {
    info!("Scrubbing VPC '{}'", vpc_id);

    let route_tables = ec2_client
        .describe_route_tables()
        .filters(vpc_filter("vpc-id", vpc_id))
        .send()
        .await
        .context(error::DescribeRouteTablesSnafu { vpc_id })?;
    for table in route_tables.route_tables().unwrap_or_default() {
        let associations = table.associations().unwrap_or_default();
        if associations
            .iter()
            .any(|association| association.main().unwrap_or_default())
        {
            continue;
        }
        let route_table_id = table.route_table_id().context(error::MissingSnafu {
            what: "the route table id",
            from: "the describe-route-tables response",
        })?;
        for association_id in associations
            .iter()
            .filter_map(|association| association.route_table_association_id())
        {
            ec2_client
                .disassociate_route_table()
                .association_id(association_id)
                .send()
                .await
                .context(error::DisassociateRouteTableSnafu { association_id })?;
        }
        debug!("Deleting route table '{}'", route_table_id);
        ec2_client
            .delete_route_table()
            .route_table_id(route_table_id)
            .send()
            .await
            .context(error::DeleteRouteTableSnafu { route_table_id })?;
    }

    let subnets = ec2_client
        .describe_subnets()
        .filters(vpc_filter("vpc-id", vpc_id))
        .send()
        .await
        .context(error::DescribeSubnetsSnafu { vpc_id })?;
    for subnet_id in subnets
        .subnets()
        .unwrap_or_default()
        .iter()
        .filter_map(|subnet| subnet.subnet_id())
    {
        debug!("Deleting subnet '{}'", subnet_id);
        ec2_client
            .delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .context(error::DeleteSubnetSnafu { subnet_id })?;
    }

    let gateways = ec2_client
        .describe_internet_gateways()
        .filters(vpc_filter("attachment.vpc-id", vpc_id))
        .send()
        .await
        .context(error::DescribeInternetGatewaysSnafu { vpc_id })?;
    for internet_gateway_id in gateways
        .internet_gateways()
        .unwrap_or_default()
        .iter()
        .filter_map(|gateway| gateway.internet_gateway_id())
    {
        debug!("Detaching internet gateway '{}'", internet_gateway_id);
        ec2_client
            .detach_internet_gateway()
            .internet_gateway_id(internet_gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .context(error::DetachInternetGatewaySnafu {
                internet_gateway_id,
                vpc_id,
            })?;
        ec2_client
            .delete_internet_gateway()
            .internet_gateway_id(internet_gateway_id)
            .send()
            .await
            .context(error::DeleteInternetGatewaySnafu {
                internet_gateway_id,
            })?;
    }

    let groups = ec2_client
        .describe_security_groups()
        .filters(vpc_filter("vpc-id", vpc_id))
        .send()
        .await
        .context(error::DescribeSecurityGroupsSnafu { vpc_id })?;
    let groups: Vec<_> = groups
        .security_groups()
        .unwrap_or_default()
        .iter()
        .filter(|group| group.group_name() != Some("default"))
        .collect();

    // First pass: revoke every rule so that groups referencing each other can
    // be deleted at all.
    for group in &groups {
        let group_id = group.group_id().context(error::MissingSnafu {
            what: "the security group id",
            from: "the describe-security-groups response",
        })?;
        for permission in group.ip_permissions().unwrap_or_default() {
            ec2_client
                .revoke_security_group_ingress()
                .group_id(group_id)
                .ip_permissions(permission.clone())
                .send()
                .await
                .context(error::RevokeSecurityGroupIngressSnafu { group_id })?;
        }
        for permission in group.ip_permissions_egress().unwrap_or_default() {
            ec2_client
                .revoke_security_group_egress()
                .group_id(group_id)
                .ip_permissions(permission.clone())
                .send()
                .await
                .context(error::RevokeSecurityGroupEgressSnafu { group_id })?;
        }
    }
    for group in &groups {
        if let Some(group_id) = group.group_id() {
            debug!("Deleting security group '{}'", group_id);
            ec2_client
                .delete_security_group()
                .group_id(group_id)
                .send()
                .await
                .context(error::DeleteSecurityGroupSnafu { group_id })?;
        }
    }

    ec2_client
        .delete_vpc()
        .vpc_id(vpc_id)
        .send()
        .await
        .context(error::DeleteVpcSnafu { vpc_id })?;
    Ok(())
}

fn vpc_filter(name: &str, vpc_id: &str) -> Filter {
    Filter::builder().name(name).values(vpc_id).build()
}

fn cluster_not_found(err: &SdkError<DescribeClusterError>) -> bool {
    if let SdkError::ServiceError(service_error) = err {
        return matches!(
            &service_error.err().kind,
            DescribeClusterErrorKind::ResourceNotFoundException(_)
        );
    }
    false
}

fn nodegroup_not_found(err: &SdkError<DescribeNodegroupError>) -> bool {
    if let SdkError::ServiceError(service_error) = err {
        return matches!(
            &service_error.err().kind,
            DescribeNodegroupErrorKind::ResourceNotFoundException(_)
        );
    }
    false
}

fn launch_template_not_found(err: &SdkError<DeleteLaunchTemplateError>) -> bool {
    if let SdkError::ServiceError(service_error) = err {
        return service_error.err().code() == Some("InvalidLaunchTemplateId.NotFound");
    }
    false
}

#[cfg(test)]
mod test {
    use super::*;
    use aws_sdk_eks::error::{ResourceNotFoundException, ServerException};
    use aws_smithy_http::body::SdkBody;
    use aws_smithy_http::operation::Response;

    fn raw_response(status: u16) -> Response {
        Response::new(
            http::Response::builder()
                .status(status)
                .body(SdkBody::from("{}"))
                .unwrap(),
        )
    }

    #[test]
    fn cluster_not_found_matches_the_modeled_exception() {
        let err = SdkError::service_error(
            DescribeClusterError::new(
                DescribeClusterErrorKind::ResourceNotFoundException(
                    ResourceNotFoundException::builder()
                        .message("No cluster found for name: smoke-abc.")
                        .build(),
                ),
                aws_smithy_types::Error::builder()
                    .code("ResourceNotFoundException")
                    .build(),
            ),
            raw_response(404),
        );
        assert!(cluster_not_found(&err));
    }

    #[test]
    fn cluster_not_found_rejects_other_service_errors() {
        let err = SdkError::service_error(
            DescribeClusterError::new(
                DescribeClusterErrorKind::ServerException(ServerException::builder().build()),
                aws_smithy_types::Error::builder().code("ServerException").build(),
            ),
            raw_response(500),
        );
        assert!(!cluster_not_found(&err));
    }

    #[test]
    fn nodegroup_not_found_matches_the_modeled_exception() {
        let err = SdkError::service_error(
            DescribeNodegroupError::new(
                DescribeNodegroupErrorKind::ResourceNotFoundException(
                    ResourceNotFoundException::builder().build(),
                ),
                aws_smithy_types::Error::builder()
                    .code("ResourceNotFoundException")
                    .build(),
            ),
            raw_response(404),
        );
        assert!(nodegroup_not_found(&err));
    }

    #[test]
    fn launch_template_not_found_matches_the_error_code() {
        let err = SdkError::service_error(
            DeleteLaunchTemplateError::generic(
                aws_smithy_types::Error::builder()
                    .code("InvalidLaunchTemplateId.NotFound")
                    .build(),
            ),
            raw_response(400),
        );
        assert!(launch_template_not_found(&err));
    }
}
