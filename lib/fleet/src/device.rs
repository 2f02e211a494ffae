use std::fmt;

use pjlink::{Address, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

/// Key of a projector inside a fleet: its host, with the port appended when
/// it is not the default one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> DeviceId {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares ignoring case, and treats `host:4352` the same as `host`.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim();

        if self.0.eq_ignore_ascii_case(name) {
            return true;
        }

        name.parse::<Address>().map_or(false, |address| {
            self.0
                .eq_ignore_ascii_case(DeviceId::from(&address).as_str())
        })
    }
}

impl From<&Address> for DeviceId {
    fn from(address: &Address) -> Self {
        if address.port == DEFAULT_PORT {
            DeviceId::new(address.host.as_str())
        } else {
            DeviceId::new(address.to_string())
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
