//! Host environment resolved once at startup and passed explicitly to every
//! component that needs the local hostname or home directory.

use std::path::PathBuf;

use crate::error::CoreError;
use crate::paths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnv {
    pub hostname: String,
    pub home: PathBuf,
}

impl HostEnv {
    pub fn new(hostname: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            hostname: hostname.into(),
            home: home.into(),
        }
    }

    /// Resolve hostname and home directory from the running system.
    ///
    /// Either one missing is a configuration error for this host.
    pub fn detect() -> Result<Self, CoreError> {
        let home = local_home()?;
        let hostname = hostname::get()
            .map_err(|e| CoreError::HostnameUnavailable(e.to_string()))?
            .into_string()
            .map_err(|raw| {
                CoreError::HostnameUnavailable(format!("not valid UTF-8: {raw:?}"))
            })?;
        if hostname.is_empty() {
            return Err(CoreError::HostnameUnavailable("empty hostname".to_string()));
        }
        Ok(Self { hostname, home })
    }

    /// Environment for another host's entry, with this machine's home
    /// directory.
    pub fn for_host(hostname: impl Into<String>) -> Result<Self, CoreError> {
        Ok(Self::new(hostname, local_home()?))
    }

    /// `<home>/.sync`
    pub fn metadata_root(&self) -> PathBuf {
        paths::metadata_root(&self.home)
    }
}

fn local_home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}
