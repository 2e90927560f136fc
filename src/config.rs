use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use reqwest::Url;

use crate::error::{Error, Result};

/// Port the media server exposes its WHEP endpoint on.
pub const WHEP_PORT: u16 = 8889;
pub const WHEP_PATH: &str = "/stream/whep";

pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_PUBLIC_ROOT: &str = "public";
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Where the viewer was loaded from. Only the host part is used: the media
/// server is expected on the same machine as the static host.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub origin: Url,
}

impl ViewerConfig {
    pub fn new(origin: &str) -> Result<Self> {
        let origin = Url::parse(origin)
            .map_err(|e| Error::Config(format!("invalid origin {origin:?}: {e}")))?;
        Ok(Self { origin })
    }

    pub fn whep_endpoint(&self) -> Result<Url> {
        let host = self
            .origin
            .host_str()
            .ok_or_else(|| Error::Config(format!("origin {} has no host", self.origin)))?;

        Url::parse(&format!("http://{host}:{WHEP_PORT}{WHEP_PATH}"))
            .map_err(|e| Error::Config(format!("cannot build WHEP endpoint for {host}: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub root: PathBuf,
}

impl HostConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_HTTP_PORT,
            root: PathBuf::from(DEFAULT_PUBLIC_ROOT),
        }
    }
}
