use crate::error::{self, Result};
use aws_sdk_ec2::types::SdkError;
use aws_sdk_iam::error::{
    DeleteRoleErrorKind, DeleteRolePolicyErrorKind, DetachRolePolicyErrorKind,
    ListAttachedRolePoliciesErrorKind, ListRolePoliciesErrorKind,
};
use log::{debug, info};
use snafu::{OptionExt, ResultExt};

const CLUSTER_ROLE_SUFFIX: &str = "EksClusterRole";
const NODE_ROLE_SUFFIX: &str = "NodeInstanceRole";

const CLUSTER_MANAGED_POLICIES: &[&str] = &[
    "arn:aws:iam::aws:policy/AmazonEKSClusterPolicy",
    "arn:aws:iam::aws:policy/AmazonEKSVPCResourceController",
];

const NODE_MANAGED_POLICIES: &[&str] = &[
    "arn:aws:iam::aws:policy/AmazonEKSWorkerNodePolicy",
    "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryReadOnly",
    "arn:aws:iam::aws:policy/AmazonEKS_CNI_Policy",
    "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore",
];

/// The ARNs of the two roles backing a cluster.
#[derive(Clone, Debug)]
pub(crate) struct ClusterRoles {
    pub(crate) cluster_role_arn: String,
    pub(crate) node_role_arn: String,
}

pub(crate) fn cluster_role_name(cluster_name: &str) -> String {
    format!("{}-{}", cluster_name, CLUSTER_ROLE_SUFFIX)
}

pub(crate) fn node_role_name(cluster_name: &str) -> String {
    format!("{}-{}", cluster_name, NODE_ROLE_SUFFIX)
}

/// Create the cluster role and the node-instance role, each with its trust
/// relationship, managed policies and named inline policies.
pub(crate) async fn create_roles(
    iam_client: &aws_sdk_iam::Client,
    cluster_name: &str,
) -> Result<ClusterRoles> {
    let cluster_role_arn = create_role(
        iam_client,
        &cluster_role_name(cluster_name),
        "Allows access to other AWS service resources that are required to operate clusters managed by EKS.",
        CLUSTER_MANAGED_POLICIES,
        &[
            ("CloudWatchMetricsPolicy", INLINE_POLICY_CLOUDWATCH_METRICS),
            ("ELBPermissionsPolicy", INLINE_POLICY_ELB_PERMISSIONS),
        ],
        TRUSTED_ENTITIES_EKS,
    )
    .await?;

    let node_role_arn = create_role(
        iam_client,
        &node_role_name(cluster_name),
        "Allows EC2 instances to call AWS services on your behalf.",
        NODE_MANAGED_POLICIES,
        &[],
        TRUSTED_ENTITIES_EC2,
    )
    .await?;

    Ok(ClusterRoles {
        cluster_role_arn,
        node_role_arn,
    })
}

async fn create_role(
    iam_client: &aws_sdk_iam::Client,
    role_name: &str,
    description: &str,
    managed_policy_arns: &[&str],
    inline_policies: &[(&str, &str)],
    trust_policy: &str,
) -> Result<String> {
    info!("Creating IAM role '{}'", role_name);
    let role_output = iam_client
        .create_role()
        .role_name(role_name)
        .description(description)
        .assume_role_policy_document(trust_policy)
        .send()
        .await
        .context(error::CreateRoleSnafu { role_name })?;

    for (policy_name, policy_document) in inline_policies {
        debug!("Putting inline policy '{}' on '{}'", policy_name, role_name);
        iam_client
            .put_role_policy()
            .role_name(role_name)
            .policy_name(*policy_name)
            .policy_document(*policy_document)
            .send()
            .await
            .context(error::PutRolePolicySnafu {
                role_name,
                policy_name: *policy_name,
            })?;
    }

    for policy_arn in managed_policy_arns {
        debug!("Attaching policy '{}' to '{}'", policy_arn, role_name);
        iam_client
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(*policy_arn)
            .send()
            .await
            .context(error::AttachRolePolicySnafu {
                role_name,
                policy_arn: *policy_arn,
            })?;
    }

    role_output
        .role()
        .and_then(|role| role.arn())
        .map(|arn| arn.to_string())
        .context(error::MissingSnafu {
            what: "the role ARN",
            from: "the create-role response",
        })
}

/// Delete a role, detaching its managed policies and removing its inline
/// policies first. Every step tolerates the role (or policy) already being
/// gone so that a re-run of a failed teardown completes.
pub(crate) async fn delete_role(iam_client: &aws_sdk_iam::Client, role_name: &str) -> Result<()> {
    info!("Deleting IAM role '{}'", role_name);

    match iam_client
        .list_attached_role_policies()
        .role_name(role_name)
        .send()
        .await
    {
        Ok(attached) => {
            for policy_arn in attached
                .attached_policies()
                .unwrap_or_default()
                .iter()
                .filter_map(|policy| policy.policy_arn())
            {
                let detach = iam_client
                    .detach_role_policy()
                    .role_name(role_name)
                    .policy_arn(policy_arn)
                    .send()
                    .await;
                if let Err(e) = detach {
                    if !detach_role_policy_not_found(&e) {
                        return Err(e).context(error::DetachRolePolicySnafu {
                            role_name,
                            policy_arn,
                        });
                    }
                }
            }
        }
        Err(e) => {
            if list_attached_role_policies_not_found(&e) {
                debug!("Role '{}' has already been deleted", role_name);
                return Ok(());
            }
            return Err(e).context(error::ListAttachedRolePoliciesSnafu { role_name });
        }
    }

    match iam_client
        .list_role_policies()
        .role_name(role_name)
        .send()
        .await
    {
        Ok(inline) => {
            for policy_name in inline.policy_names().unwrap_or_default() {
                let delete = iam_client
                    .delete_role_policy()
                    .role_name(role_name)
                    .policy_name(policy_name)
                    .send()
                    .await;
                if let Err(e) = delete {
                    if !delete_role_policy_not_found(&e) {
                        return Err(e).context(error::DeleteRolePolicySnafu {
                            role_name,
                            policy_name,
                        });
                    }
                }
            }
        }
        Err(e) => {
            if !list_role_policies_not_found(&e) {
                return Err(e).context(error::ListRolePoliciesSnafu { role_name });
            }
        }
    }

    if let Err(e) = iam_client.delete_role().role_name(role_name).send().await {
        if !delete_role_not_found(&e) {
            return Err(e).context(error::DeleteRoleSnafu { role_name });
        }
        debug!("Role '{}' has already been deleted", role_name);
    }

    Ok(())
}

/// Extract the role name from a role ARN such as
/// `arn:aws:iam::111122223333:role/smoke-abc-EksClusterRole`.
pub(crate) fn role_name_from_arn(arn: &str) -> Result<&str> {
    arn.split_once(":role/")
        .map(|(_, name)| name)
        .filter(|name| !name.is_empty())
        .context(error::MalformedRoleArnSnafu { arn })
}

fn delete_role_not_found(err: &SdkError<aws_sdk_iam::error::DeleteRoleError>) -> bool {
    if let SdkError::ServiceError(context) = err {
        return matches!(
            &context.err().kind,
            DeleteRoleErrorKind::NoSuchEntityException(_)
        );
    }
    false
}

fn detach_role_policy_not_found(
    err: &SdkError<aws_sdk_iam::error::DetachRolePolicyError>,
) -> bool {
    if let SdkError::ServiceError(context) = err {
        return matches!(
            &context.err().kind,
            DetachRolePolicyErrorKind::NoSuchEntityException(_)
        );
    }
    false
}

fn list_attached_role_policies_not_found(
    err: &SdkError<aws_sdk_iam::error::ListAttachedRolePoliciesError>,
) -> bool {
    if let SdkError::ServiceError(context) = err {
        return matches!(
            &context.err().kind,
            ListAttachedRolePoliciesErrorKind::NoSuchEntityException(_)
        );
    }
    false
}

fn list_role_policies_not_found(
    err: &SdkError<aws_sdk_iam::error::ListRolePoliciesError>,
) -> bool {
    if let SdkError::ServiceError(context) = err {
        return matches!(
            &context.err().kind,
            ListRolePoliciesErrorKind::NoSuchEntityException(_)
        );
    }
    false
}

fn delete_role_policy_not_found(
    err: &SdkError<aws_sdk_iam::error::DeleteRolePolicyError>,
) -> bool {
    if let SdkError::ServiceError(context) = err {
        return matches!(
            &context.err().kind,
            DeleteRolePolicyErrorKind::NoSuchEntityException(_)
        );
    }
    false
}

const TRUSTED_ENTITIES_EKS: &str = r#"{
    "Version": "2012-10-17",
    "Statement": [
        {
            "Effect": "Allow",
            "Principal": {
                "Service": "eks.amazonaws.com"
            },
            "Action": "sts:AssumeRole"
        }
    ]
}"#;

const TRUSTED_ENTITIES_EC2: &str = r#"{
    "Version": "2012-10-17",
    "Statement": [
        {
            "Effect": "Allow",
            "Principal": {
                "Service": "ec2.amazonaws.com"
            },
            "Action": "sts:AssumeRole"
        }
    ]
}"#;

const INLINE_POLICY_CLOUDWATCH_METRICS: &str = r#"{
    "Version": "2012-10-17",
    "Statement": [
        {
            "Action": [
                "cloudwatch:PutMetricData"
            ],
            "Resource": "*",
            "Effect": "Allow"
        }
    ]
}"#;

const INLINE_POLICY_ELB_PERMISSIONS: &str = r#"{
    "Version": "2012-10-17",
    "Statement": [
        {
            "Action": [
                "ec2:DescribeAccountAttributes",
                "ec2:DescribeAddresses",
                "ec2:DescribeInternetGateways"
            ],
            "Resource": "*",
            "Effect": "Allow"
        }
    ]
}"#;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn role_names_derive_from_the_cluster_name() {
        assert_eq!(
            cluster_role_name("smoke-abc1234567"),
            "smoke-abc1234567-EksClusterRole"
        );
        assert_eq!(
            node_role_name("smoke-abc1234567"),
            "smoke-abc1234567-NodeInstanceRole"
        );
    }

    #[test]
    fn role_name_is_extracted_from_arn() {
        let arn = "arn:aws:iam::111122223333:role/smoke-abc-NodeInstanceRole";
        assert_eq!(
            role_name_from_arn(arn).unwrap(),
            "smoke-abc-NodeInstanceRole"
        );
    }

    #[test]
    fn malformed_arns_are_rejected() {
        assert!(role_name_from_arn("arn:aws:iam::111122223333:role/").is_err());
        assert!(role_name_from_arn("smoke-abc-NodeInstanceRole").is_err());
    }

    #[test]
    fn trust_policies_are_valid_json() {
        for document in [
            TRUSTED_ENTITIES_EKS,
            TRUSTED_ENTITIES_EC2,
            INLINE_POLICY_CLOUDWATCH_METRICS,
            INLINE_POLICY_ELB_PERMISSIONS,
        ] {
            serde_yaml::from_str::<serde_yaml::Value>(document).unwrap();
        }
    }
}
