use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

use log::debug;
use pjlink::Address;
use serde::Deserialize;

use crate::{Binding, ButtonLayout, DeviceId, Directory, Error, Fleet, Result};

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ProjectorConfig {
    /// `host` or `host:port`.
    pub host: String,
    pub port: Option<u16>,
    pub nickname: Option<String>,
}

impl ProjectorConfig {
    pub fn address(&self) -> Result<Address> {
        let mut address: Address = self.host.parse()?;

        if let Some(port) = self.port {
            address.port = port;
        }

        Ok(address)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub projectors: Vec<ProjectorConfig>,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub layout: ButtonLayout,
    #[serde(default)]
    pub buttons: BTreeMap<u8, Binding>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Config {
    pub fn from_json(json: &str) -> Result<Config> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        debug!("loading config from {}", path.display());

        Config::from_json(&fs::read_to_string(path)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn addresses(&self) -> Result<Vec<Address>> {
        self.projectors.iter().map(ProjectorConfig::address).collect()
    }

    /// Nicknames come first so they are what gets displayed. Aliases may
    /// point at a device id, a host or a nickname.
    pub fn directory(&self) -> Result<Directory> {
        let mut directory = Directory::new();
        let mut ids = Vec::with_capacity(self.projectors.len());

        for projector in &self.projectors {
            let id = DeviceId::from(&projector.address()?);

            if let Some(nickname) = &projector.nickname {
                directory.add_alias(nickname, id.clone());
            }

            ids.push((id, projector));
        }

        let mut pending: Vec<_> = self.aliases.iter().collect();
        pending.sort();

        // An alias may name another alias, so keep going while a pass makes
        // progress.
        while !pending.is_empty() {
            let before = pending.len();

            pending.retain(|(alias, target)| match target_id(&directory, &ids, target) {
                Some(id) => {
                    directory.add_alias(alias, id);
                    false
                }
                None => true,
            });

            if pending.len() == before {
                let (_, target) = pending[0];
                return Err(Error::UnknownDevice(target.clone()));
            }
        }

        for (name, members) in &self.groups {
            directory.add_group(name, members.clone());
        }

        Ok(directory)
    }

    pub fn fleet(&self, timeout: Duration) -> Result<Fleet> {
        if timeout.is_zero() {
            return Err(Error::InvalidTimeout(timeout));
        }

        Fleet::new(self.addresses()?, self.directory()?, timeout)
    }

    /// The layout's presets with the configured buttons on top.
    pub fn bindings(&self) -> BTreeMap<u8, Binding> {
        let mut bindings = self.layout.bindings();
        bindings.extend(self.buttons.clone());
        bindings
    }
}

fn target_id(
    directory: &Directory,
    ids: &[(DeviceId, &ProjectorConfig)],
    target: &str,
) -> Option<DeviceId> {
    if let Some(id) = directory.alias(target) {
        return Some(id.clone());
    }

    ids.iter()
        .find(|(id, projector)| {
            id.matches(target) || projector.host.eq_ignore_ascii_case(target)
        })
        .map(|(id, _)| id.clone())
}
