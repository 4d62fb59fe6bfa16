use aws_sdk_ec2::error::{
    AssociateRouteTableError, AttachInternetGatewayError, AuthorizeSecurityGroupIngressError,
    CreateInternetGatewayError, CreateLaunchTemplateError, CreateRouteError,
    CreateRouteTableError, CreateSecurityGroupError, CreateSubnetError, CreateVpcError,
    DeleteInternetGatewayError, DeleteLaunchTemplateError, DeleteRouteTableError,
    DeleteSecurityGroupError, DeleteSubnetError, DeleteVpcError, DescribeAvailabilityZonesError,
    DescribeInternetGatewaysError, DescribeRouteTablesError, DescribeSecurityGroupsError,
    DescribeSubnetsError, DetachInternetGatewayError, DisassociateRouteTableError,
    ModifySubnetAttributeError, ModifyVpcAttributeError, RevokeSecurityGroupEgressError,
    RevokeSecurityGroupIngressError,
};
use aws_sdk_ec2::types::SdkError;
use aws_sdk_eks::error::{
    CreateClusterError, CreateNodegroupError, DeleteClusterError, DeleteNodegroupError,
    DescribeClusterError, DescribeNodegroupError,
};
use aws_sdk_iam::error::{
    AttachRolePolicyError, CreateRoleError, DeleteRoleError, DeleteRolePolicyError,
    DetachRolePolicyError, ListAttachedRolePoliciesError, ListRolePoliciesError,
    PutRolePolicyError,
};
use aws_sdk_ssm::error::GetParameterError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[allow(clippy::large_enum_variant)]
pub enum Error {
    #[snafu(display(
        "Failed to deploy addon '{}': it is already loaded into cluster '{}'",
        addon,
        cluster
    ))]
    AddonAlreadyDeployed { addon: String, cluster: String },

    #[snafu(display("Addon '{}' not found", addon))]
    AddonNotFound { addon: String },

    #[snafu(display(
        "Failed to associate route table '{}' with subnet '{}': {}",
        route_table_id,
        subnet_id,
        source
    ))]
    AssociateRouteTable {
        route_table_id: String,
        subnet_id: String,
        source: SdkError<AssociateRouteTableError>,
    },

    #[snafu(display(
        "Failed to attach internet gateway '{}' to VPC '{}': {}",
        internet_gateway_id,
        vpc_id,
        source
    ))]
    AttachInternetGateway {
        internet_gateway_id: String,
        vpc_id: String,
        source: SdkError<AttachInternetGatewayError>,
    },

    #[snafu(display(
        "Failed to attach policy '{}' to role '{}': {}",
        policy_arn,
        role_name,
        source
    ))]
    AttachRolePolicy {
        role_name: String,
        policy_arn: String,
        source: SdkError<AttachRolePolicyError>,
    },

    #[snafu(display(
        "Failed to authorize ingress on security group '{}' from peer '{}': {}",
        group_id,
        peer_group_id,
        source
    ))]
    AuthorizeSecurityGroupIngress {
        group_id: String,
        peer_group_id: String,
        source: SdkError<AuthorizeSecurityGroupIngressError>,
    },

    #[snafu(display("Failed to decode base64 blob: {}", source))]
    Base64Decode { source: base64::DecodeError },

    #[snafu(display("Failed to create EKS cluster '{}': {}", cluster_name, source))]
    CreateCluster {
        cluster_name: String,
        source: SdkError<CreateClusterError>,
    },

    #[snafu(display("Failed to create internet gateway: {}", source))]
    CreateInternetGateway {
        source: SdkError<CreateInternetGatewayError>,
    },

    #[snafu(display("Failed to create launch template '{}': {}", template_name, source))]
    CreateLaunchTemplate {
        template_name: String,
        source: SdkError<CreateLaunchTemplateError>,
    },

    #[snafu(display(
        "Failed to create node group '{}' for cluster '{}': {}",
        nodegroup_name,
        cluster_name,
        source
    ))]
    CreateNodegroup {
        cluster_name: String,
        nodegroup_name: String,
        source: SdkError<CreateNodegroupError>,
    },

    #[snafu(display("Unable to create role '{}': {}", role_name, source))]
    CreateRole {
        role_name: String,
        source: SdkError<CreateRoleError>,
    },

    #[snafu(display(
        "Failed to create default route in route table '{}': {}",
        route_table_id,
        source
    ))]
    CreateRoute {
        route_table_id: String,
        source: SdkError<CreateRouteError>,
    },

    #[snafu(display("Failed to create route table in VPC '{}': {}", vpc_id, source))]
    CreateRouteTable {
        vpc_id: String,
        source: SdkError<CreateRouteTableError>,
    },

    #[snafu(display(
        "Failed to create security group '{}' in VPC '{}': {}",
        group_name,
        vpc_id,
        source
    ))]
    CreateSecurityGroup {
        group_name: String,
        vpc_id: String,
        source: SdkError<CreateSecurityGroupError>,
    },

    #[snafu(display(
        "Failed to create subnet '{}' in VPC '{}': {}",
        cidr_block,
        vpc_id,
        source
    ))]
    CreateSubnet {
        vpc_id: String,
        cidr_block: String,
        source: SdkError<CreateSubnetError>,
    },

    #[snafu(display("Failed to create VPC: {}", source))]
    CreateVpc { source: SdkError<CreateVpcError> },

    #[snafu(display(
        "Failed to decode certificate authority data of cluster '{}': {}",
        cluster_name,
        source
    ))]
    DecodeCertificate {
        cluster_name: String,
        source: base64::DecodeError,
    },

    #[snafu(display("Failed to delete EKS cluster '{}': {}", cluster_name, source))]
    DeleteCluster {
        cluster_name: String,
        source: SdkError<DeleteClusterError>,
    },

    #[snafu(display(
        "Failed to delete internet gateway '{}': {}",
        internet_gateway_id,
        source
    ))]
    DeleteInternetGateway {
        internet_gateway_id: String,
        source: SdkError<DeleteInternetGatewayError>,
    },

    #[snafu(display(
        "Failed to delete launch template '{}': {}",
        launch_template_id,
        source
    ))]
    DeleteLaunchTemplate {
        launch_template_id: String,
        source: SdkError<DeleteLaunchTemplateError>,
    },

    #[snafu(display(
        "Failed to delete node group '{}' of cluster '{}': {}",
        nodegroup_name,
        cluster_name,
        source
    ))]
    DeleteNodegroup {
        cluster_name: String,
        nodegroup_name: String,
        source: SdkError<DeleteNodegroupError>,
    },

    #[snafu(display("Failed to delete role '{}': {}", role_name, source))]
    DeleteRole {
        role_name: String,
        source: SdkError<DeleteRoleError>,
    },

    #[snafu(display(
        "Failed to delete inline policy '{}' of role '{}': {}",
        policy_name,
        role_name,
        source
    ))]
    DeleteRolePolicy {
        role_name: String,
        policy_name: String,
        source: SdkError<DeleteRolePolicyError>,
    },

    #[snafu(display("Failed to delete route table '{}': {}", route_table_id, source))]
    DeleteRouteTable {
        route_table_id: String,
        source: SdkError<DeleteRouteTableError>,
    },

    #[snafu(display("Failed to delete security group '{}': {}", group_id, source))]
    DeleteSecurityGroup {
        group_id: String,
        source: SdkError<DeleteSecurityGroupError>,
    },

    #[snafu(display("Failed to delete subnet '{}': {}", subnet_id, source))]
    DeleteSubnet {
        subnet_id: String,
        source: SdkError<DeleteSubnetError>,
    },

    #[snafu(display("Failed to delete VPC '{}': {}", vpc_id, source))]
    DeleteVpc {
        vpc_id: String,
        source: SdkError<DeleteVpcError>,
    },

    #[snafu(display("Failed to describe availability zones: {}", source))]
    DescribeAvailabilityZones {
        source: SdkError<DescribeAvailabilityZonesError>,
    },

    #[snafu(display("Failed to describe EKS cluster '{}': {}", cluster_name, source))]
    DescribeCluster {
        cluster_name: String,
        source: SdkError<DescribeClusterError>,
    },

    #[snafu(display("Failed to describe internet gateways of VPC '{}': {}", vpc_id, source))]
    DescribeInternetGateways {
        vpc_id: String,
        source: SdkError<DescribeInternetGatewaysError>,
    },

    #[snafu(display(
        "Failed to describe node group '{}' of cluster '{}': {}",
        nodegroup_name,
        cluster_name,
        source
    ))]
    DescribeNodegroup {
        cluster_name: String,
        nodegroup_name: String,
        source: SdkError<DescribeNodegroupError>,
    },

    #[snafu(display("Failed to describe route tables of VPC '{}': {}", vpc_id, source))]
    DescribeRouteTables {
        vpc_id: String,
        source: SdkError<DescribeRouteTablesError>,
    },

    #[snafu(display("Failed to describe security groups of VPC '{}': {}", vpc_id, source))]
    DescribeSecurityGroups {
        vpc_id: String,
        source: SdkError<DescribeSecurityGroupsError>,
    },

    #[snafu(display("Failed to describe subnets of VPC '{}': {}", vpc_id, source))]
    DescribeSubnets {
        vpc_id: String,
        source: SdkError<DescribeSubnetsError>,
    },

    #[snafu(display(
        "Failed to detach internet gateway '{}' from VPC '{}': {}",
        internet_gateway_id,
        vpc_id,
        source
    ))]
    DetachInternetGateway {
        internet_gateway_id: String,
        vpc_id: String,
        source: SdkError<DetachInternetGatewayError>,
    },

    #[snafu(display(
        "Failed to detach policy '{}' from role '{}': {}",
        policy_arn,
        role_name,
        source
    ))]
    DetachRolePolicy {
        role_name: String,
        policy_arn: String,
        source: SdkError<DetachRolePolicyError>,
    },

    #[snafu(display(
        "Failed to disassociate route table association '{}': {}",
        association_id,
        source
    ))]
    DisassociateRouteTable {
        association_id: String,
        source: SdkError<DisassociateRouteTableError>,
    },

    #[snafu(display("{} is not set", var))]
    EnvNotSet { var: String },

    #[snafu(display(
        "Insufficient availability zones in region '{}': need 2, found {}",
        region,
        available
    ))]
    InsufficientAvailabilityZones { region: String, available: usize },

    #[snafu(display("Failed to build HTTP request: {}", source))]
    HttpRequest { source: http::Error },

    #[snafu(display("Kubernetes API call failed while {}: {}", what, source))]
    KubeApi { what: String, source: kube::Error },

    #[snafu(display("Unable to create Kubernetes client: {}", source))]
    KubeClient { source: kube::Error },

    #[snafu(display("Unable to load kubeconfig: {}", source))]
    KubeconfigLoad {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Failed to list attached policies of role '{}': {}", role_name, source))]
    ListAttachedRolePolicies {
        role_name: String,
        source: SdkError<ListAttachedRolePoliciesError>,
    },

    #[snafu(display("Failed to list inline policies of role '{}': {}", role_name, source))]
    ListRolePolicies {
        role_name: String,
        source: SdkError<ListRolePoliciesError>,
    },

    #[snafu(display("Unable to extract a role name from ARN '{}'", arn))]
    MalformedRoleArn { arn: String },

    #[snafu(display("Failed to serialize the aws-auth role mappings: {}", source))]
    MapRolesSerialization { source: serde_yaml::Error },

    #[snafu(display("{} was missing from {}", what, from))]
    Missing { what: String, from: String },

    #[snafu(display("No AWS region was resolved from the environment"))]
    MissingRegion,

    #[snafu(display(
        "Failed to modify attributes of subnet '{}': {}",
        subnet_id,
        source
    ))]
    ModifySubnetAttribute {
        subnet_id: String,
        source: SdkError<ModifySubnetAttributeError>,
    },

    #[snafu(display("Failed to modify attributes of VPC '{}': {}", vpc_id, source))]
    ModifyVpcAttribute {
        vpc_id: String,
        source: SdkError<ModifyVpcAttributeError>,
    },

    #[snafu(display("Failed to parse kubeconfig document: {}", source))]
    ParseKubeconfig { source: serde_yaml::Error },

    #[snafu(display("Unable to parse '{}' as a kubernetes version: {}", version, reason))]
    ParseVersion { version: String, reason: String },

    #[snafu(display("Failed to create '{}' process: {}", what, source))]
    Process {
        what: String,
        source: std::io::Error,
    },

    #[snafu(display("'{}' failed with status {}", what, status))]
    ProcessStatus {
        what: String,
        status: std::process::ExitStatus,
    },

    #[snafu(display("Failed to resolve AWS credentials: {}", source))]
    ProvideCredentials {
        source: aws_credential_types::provider::error::CredentialsError,
    },

    #[snafu(display(
        "Failed to put inline policy '{}' on role '{}': {}",
        policy_name,
        role_name,
        source
    ))]
    PutRolePolicy {
        role_name: String,
        policy_name: String,
        source: SdkError<PutRolePolicyError>,
    },

    #[snafu(display(
        "Unable to resolve a node AMI from SSM parameter '{}': {}",
        parameter,
        source
    ))]
    ResolveAmi {
        parameter: String,
        source: SdkError<GetParameterError>,
    },

    #[snafu(display(
        "Failed to revoke egress rule on security group '{}': {}",
        group_id,
        source
    ))]
    RevokeSecurityGroupEgress {
        group_id: String,
        source: SdkError<RevokeSecurityGroupEgressError>,
    },

    #[snafu(display(
        "Failed to revoke ingress rule on security group '{}': {}",
        group_id,
        source
    ))]
    RevokeSecurityGroupIngress {
        group_id: String,
        source: SdkError<RevokeSecurityGroupIngressError>,
    },

    #[snafu(display("Failed to serialize kubeconfig: {}", source))]
    SerializeKubeconfig { source: serde_yaml::Error },

    #[snafu(display("Failed to sign the token request for cluster '{}': {}", cluster_name, source))]
    SignToken {
        cluster_name: String,
        source: aws_sigv4::http_request::SigningError,
    },

    #[snafu(display("Invalid signing parameters: {}", source))]
    SigningParams {
        source: aws_sigv4::signing_params::BuildError,
    },

    #[snafu(display("Failed to create temporary directory: {}", source))]
    TempDir { source: std::io::Error },

    #[snafu(display("environment platform not supported: {}", platform))]
    UnsupportedPlatform {
        platform: String,
        known: Vec<String>,
    },

    #[snafu(display(
        "Timed out waiting for {} to reach its expected state",
        what
    ))]
    WaitTimeout { what: String },

    #[snafu(display("Failed to write file at '{}': {}", path, source))]
    WriteFile {
        path: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
