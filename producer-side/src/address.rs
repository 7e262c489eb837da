use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{Result, ServerError};

/// Where the server listens unless configured otherwise.
pub const DEFAULT_PRODUCER_SIDE_ADDRESS: &str = "unix:/tmp/orbit-producer-side-socket";

const UNIX_SCHEME: &str = "unix:";

/// A `unix:<absolute path>` socket address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    socket_path: PathBuf,
}

impl ServerAddress {
    pub fn parse(address: &str) -> Result<Self> {
        let Some(path) = address.strip_prefix(UNIX_SCHEME) else {
            return Err(ServerError::InvalidAddress(format!(
                "{address}: only unix: addresses are supported"
            )));
        };
        let socket_path = PathBuf::from(path);
        if !socket_path.is_absolute() {
            return Err(ServerError::InvalidAddress(format!(
                "{address}: socket path must be absolute"
            )));
        }
        Ok(ServerAddress { socket_path })
    }

    pub fn from_socket_path(socket_path: impl Into<PathBuf>) -> Result<Self> {
        let socket_path = socket_path.into();
        if !socket_path.is_absolute() {
            return Err(ServerError::InvalidAddress(format!(
                "{}: socket path must be absolute",
                socket_path.display()
            )));
        }
        Ok(ServerAddress { socket_path })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        ServerAddress {
            socket_path: PathBuf::from(&DEFAULT_PRODUCER_SIDE_ADDRESS[UNIX_SCHEME.len()..]),
        }
    }
}

impl FromStr for ServerAddress {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        ServerAddress::parse(s)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{UNIX_SCHEME}{}", self.socket_path.display())
    }
}
