use crate::error::{self, Result};
use aws_sdk_ec2::model::{AttributeBooleanValue, AvailabilityZone, AvailabilityZoneState};
use log::{debug, info};
use snafu::{ensure, OptionExt, ResultExt};

/// The CIDR block of the cluster VPC. The two subnets are carved out of it.
pub(crate) const VPC_CIDR: &str = "10.163.0.0/16";
pub(crate) const SUBNET_CIDRS: [&str; 2] = ["10.163.1.0/24", "10.163.2.0/24"];
const DEFAULT_ROUTE_CIDR: &str = "0.0.0.0/0";

/// The network resources a cluster is built on. These are not persisted
/// anywhere outside the cloud; teardown rediscovers them by filter.
#[derive(Clone, Debug)]
pub(crate) struct NetworkFabric {
    pub(crate) vpc_id: String,
    pub(crate) subnet_ids: Vec<String>,
}

/// Enumerate the region's availability zones and pick the first two that are
/// available. Fewer than two is a fatal provisioning error.
pub(crate) async fn get_availability_zones(
    ec2_client: &aws_sdk_ec2::Client,
    region: &str,
) -> Result<Vec<String>> {
    let described = ec2_client
        .describe_availability_zones()
        .send()
        .await
        .context(error::DescribeAvailabilityZonesSnafu)?;
    pick_zones(described.availability_zones().unwrap_or_default(), region)
}

fn pick_zones(zones: &[AvailabilityZone], region: &str) -> Result<Vec<String>> {
    let available: Vec<String> = zones
        .iter()
        .filter(|zone| matches!(zone.state(), Some(AvailabilityZoneState::Available)))
        .filter_map(|zone| zone.zone_name())
        .take(2)
        .map(|name| name.to_string())
        .collect();
    ensure!(
        available.len() >= 2,
        error::InsufficientAvailabilityZonesSnafu {
            region,
            available: available.len(),
        }
    );
    Ok(available)
}

/// Create the VPC, its internet gateway, a route table with a default route,
/// and one public subnet in each of the two given availability zones.
pub(crate) async fn create_vpc(
    ec2_client: &aws_sdk_ec2::Client,
    availability_zones: &[String],
) -> Result<NetworkFabric> {
    let vpc_id = ec2_client
        .create_vpc()
        .cidr_block(VPC_CIDR)
        .send()
        .await
        .context(error::CreateVpcSnafu)?
        .vpc()
        .and_then(|vpc| vpc.vpc_id())
        .map(|id| id.to_string())
        .context(error::MissingSnafu {
            what: "the VPC id",
            from: "the create-vpc response",
        })?;
    info!("Created VPC '{}'", vpc_id);

    // DNS support and DNS hostnames cannot be enabled in one call.
    ec2_client
        .modify_vpc_attribute()
        .vpc_id(&vpc_id)
        .enable_dns_support(AttributeBooleanValue::builder().value(true).build())
        .send()
        .await
        .context(error::ModifyVpcAttributeSnafu { vpc_id: &vpc_id })?;
    ec2_client
        .modify_vpc_attribute()
        .vpc_id(&vpc_id)
        .enable_dns_hostnames(AttributeBooleanValue::builder().value(true).build())
        .send()
        .await
        .context(error::ModifyVpcAttributeSnafu { vpc_id: &vpc_id })?;

    let internet_gateway_id = ec2_client
        .create_internet_gateway()
        .send()
        .await
        .context(error::CreateInternetGatewaySnafu)?
        .internet_gateway()
        .and_then(|igw| igw.internet_gateway_id())
        .map(|id| id.to_string())
        .context(error::MissingSnafu {
            what: "the internet gateway id",
            from: "the create-internet-gateway response",
        })?;
    debug!("Created internet gateway '{}'", internet_gateway_id);

    ec2_client
        .attach_internet_gateway()
        .internet_gateway_id(&internet_gateway_id)
        .vpc_id(&vpc_id)
        .send()
        .await
        .context(error::AttachInternetGatewaySnafu {
            internet_gateway_id: &internet_gateway_id,
            vpc_id: &vpc_id,
        })?;

    let route_table_id = ec2_client
        .create_route_table()
        .vpc_id(&vpc_id)
        .send()
        .await
        .context(error::CreateRouteTableSnafu { vpc_id: &vpc_id })?
        .route_table()
        .and_then(|table| table.route_table_id())
        .map(|id| id.to_string())
        .context(error::MissingSnafu {
            what: "the route table id",
            from: "the create-route-table response",
        })?;
    debug!("Created route table '{}'", route_table_id);

    ec2_client
        .create_route()
        .route_table_id(&route_table_id)
        .destination_cidr_block(DEFAULT_ROUTE_CIDR)
        .gateway_id(&internet_gateway_id)
        .send()
        .await
        .context(error::CreateRouteSnafu {
            route_table_id: &route_table_id,
        })?;

    let mut subnet_ids = Vec::with_capacity(SUBNET_CIDRS.len());
    for (cidr_block, availability_zone) in SUBNET_CIDRS.iter().zip(availability_zones) {
        let subnet_id = create_public_subnet(
            ec2_client,
            &vpc_id,
            &route_table_id,
            cidr_block,
            availability_zone,
        )
        .await?;
        info!(
            "Created subnet '{}' ({}) in zone '{}'",
            subnet_id, cidr_block, availability_zone
        );
        subnet_ids.push(subnet_id);
    }

    Ok(NetworkFabric { vpc_id, subnet_ids })
}

async fn create_public_subnet(
    ec2_client: &aws_sdk_ec2::Client,
    vpc_id: &str,
    route_table_id: &str,
    cidr_block: &str,
    availability_zone: &str,
) -> Result<String> {
    let subnet_id = ec2_client
        .create_subnet()
        .vpc_id(vpc_id)
        .cidr_block(cidr_block)
        .availability_zone(availability_zone)
        .send()
        .await
        .context(error::CreateSubnetSnafu { vpc_id, cidr_block })?
        .subnet()
        .and_then(|subnet| subnet.subnet_id())
        .map(|id| id.to_string())
        .context(error::MissingSnafu {
            what: "the subnet id",
            from: "the create-subnet response",
        })?;

    ec2_client
        .modify_subnet_attribute()
        .subnet_id(&subnet_id)
        .map_public_ip_on_launch(AttributeBooleanValue::builder().value(true).build())
        .send()
        .await
        .context(error::ModifySubnetAttributeSnafu {
            subnet_id: &subnet_id,
        })?;

    ec2_client
        .associate_route_table()
        .route_table_id(route_table_id)
        .subnet_id(&subnet_id)
        .send()
        .await
        .context(error::AssociateRouteTableSnafu {
            route_table_id,
            subnet_id: &subnet_id,
        })?;

    Ok(subnet_id)
}

#[cfg(test)]
mod test {
    use super::*;

    fn zone(name: &str, state: AvailabilityZoneState) -> AvailabilityZone {
        AvailabilityZone::builder()
            .zone_name(name)
            .state(state)
            .build()
    }

    #[test]
    fn first_two_available_zones_are_picked_in_order() {
        let zones = vec![
            zone("us-west-2a", AvailabilityZoneState::Available),
            zone("us-west-2b", AvailabilityZoneState::Impaired),
            zone("us-west-2c", AvailabilityZoneState::Available),
            zone("us-west-2d", AvailabilityZoneState::Available),
        ];
        let picked = pick_zones(&zones, "us-west-2").unwrap();
        assert_eq!(picked, vec!["us-west-2a", "us-west-2c"]);
    }

    #[test]
    fn one_available_zone_is_fatal() {
        let zones = vec![
            zone("us-west-2a", AvailabilityZoneState::Available),
            zone("us-west-2b", AvailabilityZoneState::Unavailable),
        ];
        let err = pick_zones(&zones, "us-west-2").unwrap_err();
        assert!(err.to_string().contains("Insufficient availability zones"));
        assert!(err.to_string().contains("us-west-2"));
    }

    #[test]
    fn subnets_lie_within_the_vpc_block() {
        // 10.163.x.0/24 is inside 10.163.0.0/16.
        for cidr in SUBNET_CIDRS {
            assert!(cidr.starts_with("10.163."));
        }
    }
}
