//! Address of an Orca head node, written as `orca://host:port`.

use ::core::{fmt::Display, str::FromStr};
use ::std::net::SocketAddr;

use ::anyhow::anyhow;
use ::serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{OrcaError, Result};

pub const SCHEME: &str = "orca";
/// Port the head node listens on for clients and workers unless configured otherwise.
pub const DEFAULT_HEAD_PORT: u16 = 10001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadAddress {
    host: String,
    port: u16,
}

impl HeadAddress {
    pub fn new(host: String, port: u16) -> Result<Self> {
        if host.is_empty() {
            Err(OrcaError::not_allowed(anyhow!("Host cannot be empty.")))
        } else {
            Ok(Self { host, port })
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve the host name. Every returned address is a candidate to connect to.
    pub async fn to_socket_addrs(&self) -> Result<Vec<SocketAddr>> {
        let addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(OrcaError::fail_to_connect)?
            .collect::<Vec<_>>();
        if addrs.is_empty() {
            Err(OrcaError::fail_to_connect(anyhow!(
                "{} does not resolve to any address.",
                self
            )))
        } else {
            Ok(addrs)
        }
    }
}

impl FromStr for HeadAddress {
    type Err = OrcaError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = match s.split_once("://") {
            Some((scheme, rest)) if scheme == SCHEME => rest,
            Some((scheme, _)) => {
                return Err(OrcaError::not_allowed(anyhow!(
                    "Unsupported scheme {:?}, expected {:?}.",
                    scheme,
                    SCHEME
                )))
            }
            None => s,
        };
        let rest = rest.trim_end_matches('/');
        // IPv6 literals are written in brackets: `[::1]:10001`
        let (host, port) = match rest.strip_prefix('[') {
            Some(bracketed) => {
                let (host, after) = bracketed.split_once(']').ok_or_else(|| {
                    OrcaError::not_allowed(anyhow!("Unclosed bracket in address {:?}.", s))
                })?;
                (host, after.strip_prefix(':'))
            }
            None => match rest.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            },
        };
        let port = match port {
            None => DEFAULT_HEAD_PORT,
            Some(port) => port.parse().map_err(|_| {
                OrcaError::not_allowed(anyhow!("Invalid port {:?} in address {:?}.", port, s))
            })?,
        };
        Self::new(host.to_owned(), port)
    }
}

impl Display for HeadAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", SCHEME, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", SCHEME, self.host, self.port)
        }
    }
}

impl From<SocketAddr> for HeadAddress {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl Serialize for HeadAddress {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HeadAddress {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(::serde::de::Error::custom)
    }
}
