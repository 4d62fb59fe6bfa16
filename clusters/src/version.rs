use crate::error::{self, Error};
use snafu::ensure;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A Kubernetes version such as `1.31`, `v1.31` or `1.31.1`.
///
/// The managed-cluster API only accepts `major.minor`, so the patch value is
/// carried separately and stripped where necessary.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct K8sVersion {
    major: u8,
    minor: u8,
    patch: Option<u8>,
}

impl K8sVersion {
    pub const fn new(major: u8, minor: u8, patch: Option<u8>) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The `major.minor` form without a `v` prefix, e.g. `1.31`. This is the
    /// form submitted when creating a cluster.
    pub fn major_minor_without_v(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// The full form without a `v` prefix, e.g. `1.31.1`, or `1.31` when no
    /// patch value is present.
    pub fn full_version_without_v(&self) -> String {
        match self.patch {
            Some(patch) => format!("{}.{}.{}", self.major, self.minor, patch),
            None => self.major_minor_without_v(),
        }
    }

    pub fn parse<S: AsRef<str>>(s: S) -> Result<Self, Error> {
        let original = s.as_ref();
        let no_v = original.strip_prefix('v').unwrap_or(original);
        let mut iter = no_v.split('.');
        let major = parse_component(iter.next(), original, "major")?;
        let minor = parse_component(iter.next(), original, "minor")?;
        // Trailing build metadata such as `1.24.7-eks-fb459a0` is tolerated;
        // anything that does not parse cleanly is treated as "no patch".
        let patch = iter.next().and_then(|p| p.parse::<u8>().ok());
        ensure!(
            iter.next().is_none(),
            error::ParseVersionSnafu {
                version: original,
                reason: "too many version components",
            }
        );
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

fn parse_component(component: Option<&str>, original: &str, name: &str) -> Result<u8, Error> {
    component
        .ok_or_else(|| {
            error::ParseVersionSnafu {
                version: original,
                reason: format!("the {} version number is missing", name),
            }
            .build()
        })?
        .parse::<u8>()
        .map_err(|e| {
            error::ParseVersionSnafu {
                version: original,
                reason: format!("the {} version number is invalid: {}", name, e),
            }
            .build()
        })
}

impl Display for K8sVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.full_version_without_v(), f)
    }
}

impl FromStr for K8sVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        K8sVersion::parse(s)
    }
}

serde_plain::derive_serialize_from_display!(K8sVersion);
serde_plain::derive_deserialize_from_fromstr!(K8sVersion, "a kubernetes version such as 1.31 or v1.31.1");

#[cfg(test)]
mod test {
    use super::K8sVersion;

    #[test]
    fn v_prefix_is_stripped() {
        let with_v = K8sVersion::parse("v1.31.1").unwrap();
        let without_v = K8sVersion::parse("1.31.1").unwrap();
        assert_eq!(with_v, without_v);
        assert_eq!(with_v.major_minor_without_v(), "1.31");
    }

    #[test]
    fn patch_is_optional() {
        let version = K8sVersion::parse("1.31").unwrap();
        assert_eq!(version, K8sVersion::new(1, 31, None));
        assert_eq!(version.full_version_without_v(), "1.31");
    }

    #[test]
    fn server_reported_version_parses() {
        // The apiserver reports versions like `v1.24.7-eks-fb459a0`.
        let version = K8sVersion::parse("v1.24.7-eks-fb459a0").unwrap();
        assert_eq!(version.major_minor_without_v(), "1.24");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(K8sVersion::parse("banana").is_err());
        assert!(K8sVersion::parse("1").is_err());
        assert!(K8sVersion::parse("").is_err());
    }
}
