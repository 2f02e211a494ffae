use indexmap::IndexMap;

use crate::DeviceId;

/// Read-only naming layer over a fleet: aliases point at one device, groups
/// list aliases or device ids. Lookups ignore case.
#[derive(Clone, Debug, Default)]
pub struct Directory {
    aliases: IndexMap<String, (String, DeviceId)>,
    groups: IndexMap<String, Vec<String>>,
}

impl Directory {
    pub fn new() -> Directory {
        Directory::default()
    }

    /// Earlier aliases win when two spell the same name.
    pub fn add_alias(&mut self, alias: &str, id: DeviceId) {
        let alias = alias.trim();
        self.aliases
            .entry(key(alias))
            .or_insert_with(|| (alias.to_string(), id));
    }

    pub fn add_group(&mut self, name: &str, members: Vec<String>) {
        self.groups.insert(key(name), members);
    }

    pub fn alias(&self, name: &str) -> Option<&DeviceId> {
        self.aliases.get(&key(name)).map(|(_, id)| id)
    }

    pub fn group(&self, name: &str) -> Option<&[String]> {
        self.groups.get(&key(name)).map(Vec::as_slice)
    }

    /// First alias registered for `id`, for display.
    pub fn nickname(&self, id: &DeviceId) -> Option<&str> {
        self.aliases
            .values()
            .find(|(_, target)| target == id)
            .map(|(alias, _)| alias.as_str())
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &DeviceId)> {
        self.aliases
            .values()
            .map(|(alias, id)| (alias.as_str(), id))
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups
            .iter()
            .map(|(name, members)| (name.as_str(), members.as_slice()))
    }
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}
