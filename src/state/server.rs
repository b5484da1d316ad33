use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Location descriptor of a measurement server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// One candidate from the discovery `results` array
///
/// Every field is optional so that a directory entry with an unexpected
/// shape still deserializes; the engine decides whether it can connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCandidate {
    /// Fully qualified machine name (e.g. `mlab1-nbo01.mlab-oti.measurement-lab.org`)
    #[serde(default)]
    pub machine: Option<String>,
    /// Opaque site identifier (e.g. `nbo01`)
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub location: Option<ServerLocation>,
    /// Service URLs keyed by scheme and path (`wss:///ndt/v7/download` etc.)
    #[serde(default)]
    pub urls: BTreeMap<String, String>,
}

/// Key of the secure download URL in the discovery `urls` map
pub const DOWNLOAD_URL_KEY: &str = "wss:///ndt/v7/download";

impl ServerCandidate {
    /// Candidate standing in for a manually overridden hostname
    pub fn from_hostname(host: &str) -> Self {
        Self {
            machine: Some(host.to_string()),
            ..Default::default()
        }
    }

    pub fn city(&self) -> Option<&str> {
        self.location
            .as_ref()
            .and_then(|l| l.city.as_deref())
            .filter(|c| !c.is_empty())
    }

    pub fn site(&self) -> Option<&str> {
        self.site.as_deref().filter(|s| !s.is_empty())
    }

    /// Secure download URL, if discovery handed one out
    pub fn download_url(&self) -> Option<&str> {
        self.urls.get(DOWNLOAD_URL_KEY).map(String::as_str)
    }

    /// Server label shown while a session runs: `Server: <city> (<site>)`
    pub fn label(&self) -> String {
        let city = self.city().unwrap_or("\u{2014}");
        match self.site() {
            Some(site) => format!("Server: {} ({})", city, site),
            None => format!("Server: {}", city),
        }
    }
}
