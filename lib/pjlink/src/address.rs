use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::session::Connector;
use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 4352;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Address {
        Address {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();

        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                let port = port
                    .parse()
                    .map_err(|_| Error::InvalidAddress(s.to_string()))?;
                (host, port)
            }
            _ => (s, DEFAULT_PORT),
        };

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(Error::InvalidAddress(s.to_string()));
        }

        Ok(Address::new(host, port))
    }
}

#[async_trait]
impl Connector for Address {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
