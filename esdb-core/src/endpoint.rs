use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.trim()
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidEndpoint(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(Error::InvalidEndpoint(s.to_string()));
        }
        let port = port.parse::<u16>().map_err(|_| Error::InvalidEndpoint(s.to_string()))?;
        Ok(Endpoint::new(host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(value: Endpoint) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use crate::endpoint::Endpoint;

    #[test]
    fn parse_endpoint() -> anyhow::Result<()> {
        let endpoint: Endpoint = "node1.cluster:2113".parse()?;
        assert_eq!(endpoint, Endpoint::new("node1.cluster", 2113));
        assert_eq!(endpoint.to_string(), "node1.cluster:2113");
        let v6: Endpoint = "[::1]:2113".parse()?;
        assert_eq!(v6.host, "::1");
        Ok(())
    }

    #[test]
    fn reject_invalid_endpoint() {
        assert!("node1".parse::<Endpoint>().is_err());
        assert!(":2113".parse::<Endpoint>().is_err());
        assert!("node1:http".parse::<Endpoint>().is_err());
        assert!("node1:70000".parse::<Endpoint>().is_err());
    }
}
