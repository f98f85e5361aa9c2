//! The linear version chain `V2 → V3 → V4 → V5` (§4.1 stage 1/2).

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApiVersion {
    V2,
    V3,
    V4,
    V5,
}

impl ApiVersion {
    pub const CURRENT: ApiVersion = ApiVersion::V5;

    pub fn as_str(self) -> &'static str {
        match self {
            ApiVersion::V2 => "k3cluster.io/v1alpha2",
            ApiVersion::V3 => "k3cluster.io/v1alpha3",
            ApiVersion::V4 => "k3cluster.io/v1alpha4",
            ApiVersion::V5 => "k3cluster.io/v1alpha5",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "k3cluster.io/v1alpha2" => Ok(ApiVersion::V2),
            "k3cluster.io/v1alpha3" => Ok(ApiVersion::V3),
            "k3cluster.io/v1alpha4" => Ok(ApiVersion::V4),
            "k3cluster.io/v1alpha5" => Ok(ApiVersion::V5),
            other => Err(ConfigError::UnknownApiVersion(other.to_string())),
        }
    }

    pub fn next(self) -> Option<ApiVersion> {
        match self {
            ApiVersion::V2 => Some(ApiVersion::V3),
            ApiVersion::V3 => Some(ApiVersion::V4),
            ApiVersion::V4 => Some(ApiVersion::V5),
            ApiVersion::V5 => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_version() {
        for v in [ApiVersion::V2, ApiVersion::V3, ApiVersion::V4, ApiVersion::V5] {
            assert_eq!(ApiVersion::parse(v.as_str()).unwrap(), v);
        }
    }

    #[test]
    fn rejects_unknown_version() {
        assert!(matches!(
            ApiVersion::parse("k3cluster.io/v1alpha99"),
            Err(ConfigError::UnknownApiVersion(_))
        ));
    }

    #[test]
    fn chain_reaches_current() {
        let mut v = ApiVersion::V2;
        let mut hops = 0;
        while let Some(next) = v.next() {
            v = next;
            hops += 1;
        }
        assert_eq!(v, ApiVersion::CURRENT);
        assert_eq!(hops, 3);
    }
}
