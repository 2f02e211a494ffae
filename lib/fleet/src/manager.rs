use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use indexmap::IndexMap;
use log::{debug, info};
use pjlink::{Address, Connector, Operation, Projector, StatusSnapshot};

use crate::{DeviceId, Directory, Error, Result};

/// Target name that means the whole fleet unless a group claims it.
const ALL: &str = "all";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    All,
    Only(Vec<DeviceId>),
}

impl Selection {
    pub fn only(ids: impl IntoIterator<Item = DeviceId>) -> Selection {
        let mut unique: Vec<DeviceId> = Vec::new();
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        Selection::Only(unique)
    }

    pub fn merge(self, other: Selection) -> Selection {
        match (self, other) {
            (Selection::Only(mut ids), Selection::Only(more)) => {
                ids.extend(more);
                Selection::only(ids)
            }
            _ => Selection::All,
        }
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(ids) => ids.contains(id),
        }
    }
}

/// Result of one set command on one device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutcome {
    pub device: DeviceId,
    pub succeeded: bool,
    pub raw_response: Option<String>,
}

/// What a dispatcher needs from a fleet.
#[async_trait]
pub trait Control: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Selection>;

    async fn status(&self, selection: &Selection) -> Result<IndexMap<DeviceId, StatusSnapshot>>;

    async fn set(
        &self,
        selection: &Selection,
        operation: Operation,
        on: bool,
    ) -> Result<IndexMap<DeviceId, bool>>;
}

/// Merges the selections of every name. No names select the whole fleet.
pub fn select<T: Control + ?Sized>(control: &T, names: &[String]) -> Result<Selection> {
    let mut selection: Option<Selection> = None;

    for name in names {
        let resolved = control.resolve(name)?;
        selection = Some(match selection {
            Some(selection) => selection.merge(resolved),
            None => resolved,
        });
    }

    Ok(selection.unwrap_or(Selection::All))
}

/// Every configured projector, keyed and iterated in configuration order.
///
/// Fan-outs run all selected devices concurrently; each device still sees
/// its commands one at a time through its own session. A failing device only
/// ever degrades its own entry of the result.
pub struct Fleet<C: Connector = Address> {
    projectors: IndexMap<DeviceId, Projector<C>>,
    directory: Directory,
}

impl Fleet<Address> {
    pub fn new(
        addresses: impl IntoIterator<Item = Address>,
        directory: Directory,
        timeout: Duration,
    ) -> Result<Self> {
        let projectors = addresses
            .into_iter()
            .map(|address| (DeviceId::from(&address), Projector::new(address, timeout)));

        Fleet::from_projectors(projectors, directory)
    }
}

impl<C: Connector> Fleet<C> {
    pub fn from_projectors(
        projectors: impl IntoIterator<Item = (DeviceId, Projector<C>)>,
        directory: Directory,
    ) -> Result<Self> {
        let mut map = IndexMap::new();

        for (id, projector) in projectors {
            if map.contains_key(&id) {
                return Err(Error::DuplicateDevice(id));
            }
            map.insert(id, projector);
        }

        let fleet = Fleet {
            projectors: map,
            directory,
        };

        for (_, id) in fleet.directory.aliases() {
            if !fleet.projectors.contains_key(id) {
                return Err(Error::UnknownDevice(id.to_string()));
            }
        }

        for (_, members) in fleet.directory.groups() {
            for member in members {
                fleet.device(member)?;
            }
        }

        Ok(fleet)
    }

    pub fn len(&self) -> usize {
        self.projectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projectors.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.projectors.keys()
    }

    pub fn projector(&self, id: &DeviceId) -> Option<&Projector<C>> {
        self.projectors.get(id)
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// A group first, then `all`, then an alias, then a literal device id.
    pub fn resolve(&self, name: &str) -> Result<Selection> {
        if let Some(members) = self.directory.group(name) {
            let ids = members
                .iter()
                .map(|member| self.device(member))
                .collect::<Result<Vec<_>>>()?;

            return Ok(Selection::only(ids));
        }

        if name.trim().eq_ignore_ascii_case(ALL) {
            return Ok(Selection::All);
        }

        self.device(name).map(|id| Selection::only([id]))
    }

    pub async fn status_all(&self) -> IndexMap<DeviceId, StatusSnapshot> {
        self.poll(self.projectors.iter().collect()).await
    }

    pub async fn status(
        &self,
        selection: &Selection,
    ) -> Result<IndexMap<DeviceId, StatusSnapshot>> {
        let selected = self.selected(selection)?;
        Ok(self.poll(selected).await)
    }

    pub async fn set_all(&self, operation: Operation, on: bool) -> IndexMap<DeviceId, bool> {
        let outcomes = self
            .apply(self.projectors.iter().collect(), operation, on)
            .await;

        successes(outcomes)
    }

    pub async fn set(
        &self,
        selection: &Selection,
        operation: Operation,
        on: bool,
    ) -> Result<IndexMap<DeviceId, bool>> {
        let outcomes = self.execute(selection, operation, on).await?;
        Ok(successes(outcomes))
    }

    pub async fn execute(
        &self,
        selection: &Selection,
        operation: Operation,
        on: bool,
    ) -> Result<Vec<CommandOutcome>> {
        let selected = self.selected(selection)?;
        Ok(self.apply(selected, operation, on).await)
    }

    /// Disconnects every session, connected or not.
    pub async fn close(&self) {
        join_all(self.projectors.values().map(Projector::close)).await;
        info!("closed {} projector sessions", self.projectors.len());
    }

    fn device(&self, name: &str) -> Result<DeviceId> {
        if let Some(id) = self.directory.alias(name) {
            return Ok(id.clone());
        }

        self.projectors
            .keys()
            .find(|id| id.matches(name))
            .cloned()
            .ok_or_else(|| Error::UnknownTarget(name.trim().to_string()))
    }

    fn selected(&self, selection: &Selection) -> Result<Vec<(&DeviceId, &Projector<C>)>> {
        if let Selection::Only(ids) = selection {
            if let Some(id) = ids.iter().find(|id| !self.projectors.contains_key(*id)) {
                return Err(Error::UnknownDevice(id.to_string()));
            }
        }

        Ok(self
            .projectors
            .iter()
            .filter(|(id, _)| selection.contains(id))
            .collect())
    }

    async fn poll(
        &self,
        selected: Vec<(&DeviceId, &Projector<C>)>,
    ) -> IndexMap<DeviceId, StatusSnapshot> {
        let snapshots = join_all(selected.into_iter().map(|(id, projector)| async move {
            let snapshot = projector.status().await;
            debug!("{id}: {snapshot:?}");
            (id.clone(), snapshot)
        }))
        .await;

        let online = snapshots.iter().filter(|(_, snapshot)| snapshot.online).count();
        info!("status: {online} of {} online", snapshots.len());

        snapshots.into_iter().collect()
    }

    async fn apply(
        &self,
        selected: Vec<(&DeviceId, &Projector<C>)>,
        operation: Operation,
        on: bool,
    ) -> Vec<CommandOutcome> {
        let outcomes = join_all(selected.into_iter().map(|(id, projector)| async move {
            let ack = projector.apply(operation, on).await;

            CommandOutcome {
                device: id.clone(),
                succeeded: ack.is_ok(),
                raw_response: ack.reply,
            }
        }))
        .await;

        let succeeded = outcomes.iter().filter(|outcome| outcome.succeeded).count();
        info!(
            "{operation} {}: {succeeded} of {} succeeded",
            if on { "on" } else { "off" },
            outcomes.len()
        );

        outcomes
    }
}

#[async_trait]
impl<C: Connector> Control for Fleet<C> {
    fn resolve(&self, name: &str) -> Result<Selection> {
        Fleet::resolve(self, name)
    }

    async fn status(&self, selection: &Selection) -> Result<IndexMap<DeviceId, StatusSnapshot>> {
        Fleet::status(self, selection).await
    }

    async fn set(
        &self,
        selection: &Selection,
        operation: Operation,
        on: bool,
    ) -> Result<IndexMap<DeviceId, bool>> {
        Fleet::set(self, selection, operation, on).await
    }
}

fn successes(outcomes: Vec<CommandOutcome>) -> IndexMap<DeviceId, bool> {
    outcomes
        .into_iter()
        .map(|outcome| (outcome.device, outcome.succeeded))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use pjlink::stub::{closed_address, MockProjector};
    use pjlink::{ConnectionState, MuteState, PowerState};

    const TIMEOUT: Duration = Duration::from_millis(300);

    fn id(mock: &MockProjector) -> DeviceId {
        DeviceId::from(&mock.address())
    }

    fn fleet(addresses: Vec<Address>, directory: Directory) -> Fleet {
        Fleet::new(addresses, directory, TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn test_status_all_with_unreachable_device() {
        let a = MockProjector::start().await.unwrap();
        let c = MockProjector::start().await.unwrap();
        a.update(|state| state.power = PowerState::On).await;
        c.update(|state| state.mute = MuteState::Muted).await;

        let k = closed_address().await.unwrap();
        let k_id = DeviceId::from(&k);

        let fleet = fleet(vec![a.address(), k, c.address()], Directory::new());
        let status = fleet.status_all().await;

        assert_eq!(status.len(), 3);
        assert_eq!(
            status.keys().cloned().collect::<Vec<_>>(),
            vec![id(&a), k_id.clone(), id(&c)]
        );

        assert_eq!(status[&k_id], StatusSnapshot::offline());

        assert!(status[&id(&a)].online);
        assert_eq!(status[&id(&a)].power, PowerState::On);
        assert!(status[&id(&c)].online);
        assert_eq!(status[&id(&c)].mute, MuteState::Muted);
    }

    #[tokio::test]
    async fn test_set_all_reports_each_device() {
        let a = MockProjector::start().await.unwrap();
        let b = MockProjector::start().await.unwrap();
        b.respond("%1AVMT 31", "%1AVMT=ERR1").await;

        let fleet = fleet(vec![a.address(), b.address()], Directory::new());
        let results = fleet.set_all(Operation::Mute, true).await;

        assert_eq!(
            results,
            IndexMap::from([(id(&a), true), (id(&b), false)])
        );
        assert_eq!(a.state().await.mute, MuteState::Muted);
    }

    #[tokio::test]
    async fn test_execute_keeps_raw_responses() {
        let a = MockProjector::start().await.unwrap();
        let b = MockProjector::start().await.unwrap();
        b.ignore("%1POWR 1").await;

        let fleet = fleet(vec![a.address(), b.address()], Directory::new());
        let outcomes = fleet
            .execute(&Selection::All, Operation::Power, true)
            .await
            .unwrap();

        assert_eq!(
            outcomes,
            vec![
                CommandOutcome {
                    device: id(&a),
                    succeeded: true,
                    raw_response: Some("%1POWR=OK".to_string()),
                },
                CommandOutcome {
                    device: id(&b),
                    succeeded: false,
                    raw_response: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_set_only_touches_selection() {
        let a = MockProjector::start().await.unwrap();
        let b = MockProjector::start().await.unwrap();

        let fleet = fleet(vec![a.address(), b.address()], Directory::new());
        let results = fleet
            .set(&Selection::only([id(&b)]), Operation::Power, true)
            .await
            .unwrap();

        assert_eq!(results, IndexMap::from([(id(&b), true)]));
        assert_eq!(a.connections(), 0);
        assert_eq!(b.state().await.power, PowerState::On);
    }

    #[tokio::test]
    async fn test_unknown_device_fails_before_io() {
        let a = MockProjector::start().await.unwrap();

        let fleet = fleet(vec![a.address()], Directory::new());
        let selection = Selection::only([id(&a), DeviceId::new("10.0.0.99")]);

        assert!(matches!(
            fleet.status(&selection).await,
            Err(Error::UnknownDevice(name)) if name == "10.0.0.99"
        ));
        assert_eq!(a.connections(), 0);
    }

    #[tokio::test]
    async fn test_resolve() {
        let a = MockProjector::start().await.unwrap();
        let b = MockProjector::start().await.unwrap();
        let c = MockProjector::start().await.unwrap();

        let mut directory = Directory::new();
        directory.add_alias("left", id(&a));
        directory.add_alias("right", id(&b));
        directory.add_alias("rear", id(&c));
        directory.add_group("front", vec!["Left".to_string(), "right".to_string()]);

        let fleet = fleet(vec![a.address(), b.address(), c.address()], directory);

        assert_eq!(
            fleet.resolve("FRONT").unwrap(),
            Selection::Only(vec![id(&a), id(&b)])
        );
        assert_eq!(fleet.resolve("rear").unwrap(), Selection::Only(vec![id(&c)]));
        assert_eq!(
            fleet.resolve(id(&b).as_str()).unwrap(),
            Selection::Only(vec![id(&b)])
        );
        assert_eq!(fleet.resolve("All").unwrap(), Selection::All);
        assert!(matches!(
            fleet.resolve("ceiling"),
            Err(Error::UnknownTarget(name)) if name == "ceiling"
        ));

        assert_eq!(a.connections() + b.connections() + c.connections(), 0);
    }

    #[tokio::test]
    async fn test_group_named_all_wins() {
        let a = MockProjector::start().await.unwrap();
        let b = MockProjector::start().await.unwrap();

        let mut directory = Directory::new();
        directory.add_group("all", vec![id(&a).to_string()]);

        let fleet = fleet(vec![a.address(), b.address()], directory);

        assert_eq!(fleet.resolve("all").unwrap(), Selection::Only(vec![id(&a)]));
    }

    #[tokio::test]
    async fn test_select_merges_names() {
        let a = MockProjector::start().await.unwrap();
        let b = MockProjector::start().await.unwrap();

        let mut directory = Directory::new();
        directory.add_alias("left", id(&a));
        directory.add_alias("right", id(&b));

        let fleet = fleet(vec![a.address(), b.address()], directory);
        let names = |names: &[&str]| names.iter().map(|name| name.to_string()).collect::<Vec<_>>();

        assert_eq!(select(&fleet, &[]).unwrap(), Selection::All);
        assert_eq!(
            select(&fleet, &names(&["right", "left", "right"])).unwrap(),
            Selection::Only(vec![id(&b), id(&a)])
        );
        assert_eq!(
            select(&fleet, &names(&["left", "all"])).unwrap(),
            Selection::All
        );
        assert!(select(&fleet, &names(&["left", "nope"])).is_err());
    }

    #[tokio::test]
    async fn test_close_without_connecting() {
        let k = closed_address().await.unwrap();
        let a = MockProjector::start().await.unwrap();

        let fleet = fleet(vec![k, a.address()], Directory::new());
        fleet.close().await;
        fleet.close().await;

        assert_eq!(a.connections(), 0);
    }

    #[tokio::test]
    async fn test_close_after_fan_out() {
        let k = closed_address().await.unwrap();
        let a = MockProjector::start().await.unwrap();

        let fleet = fleet(vec![k, a.address()], Directory::new());
        fleet.status_all().await;
        fleet.close().await;

        for id in fleet.ids() {
            let projector = fleet.projector(id).unwrap();
            assert_eq!(
                projector.session().state().await,
                ConnectionState::Disconnected
            );
        }
    }

    #[test]
    fn test_duplicate_device() {
        let addresses = vec![
            Address::new("10.10.10.2", 4352),
            Address::new("10.10.10.2", 4352),
        ];

        assert!(matches!(
            Fleet::new(addresses, Directory::new(), TIMEOUT),
            Err(Error::DuplicateDevice(id)) if id.as_str() == "10.10.10.2"
        ));
    }

    #[test]
    fn test_resolve_literal_with_default_port() {
        let addresses = [
            Address::new("10.10.10.2", 4352),
            Address::new("10.10.10.3", 4353),
        ];
        let fleet = Fleet::new(addresses, Directory::new(), TIMEOUT).unwrap();

        assert_eq!(
            fleet.resolve("10.10.10.2:4352").unwrap(),
            Selection::Only(vec![DeviceId::new("10.10.10.2")])
        );
        assert_eq!(
            fleet.resolve("10.10.10.3:4353").unwrap(),
            Selection::Only(vec![DeviceId::new("10.10.10.3:4353")])
        );
        assert!(matches!(
            fleet.resolve("10.10.10.3"),
            Err(Error::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_directory_must_point_at_fleet() {
        let mut directory = Directory::new();
        directory.add_alias("left", DeviceId::new("10.10.10.9"));

        assert!(matches!(
            Fleet::new([Address::new("10.10.10.2", 4352)], directory, TIMEOUT),
            Err(Error::UnknownDevice(_))
        ));

        let mut directory = Directory::new();
        directory.add_group("front", vec!["left".to_string()]);

        assert!(matches!(
            Fleet::new([Address::new("10.10.10.2", 4352)], directory, TIMEOUT),
            Err(Error::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_selection_merge() {
        let a = DeviceId::new("a");
        let b = DeviceId::new("b");

        assert_eq!(
            Selection::only([a.clone()]).merge(Selection::only([b.clone(), a.clone()])),
            Selection::Only(vec![a.clone(), b.clone()])
        );
        assert_eq!(
            Selection::only([a.clone()]).merge(Selection::All),
            Selection::All
        );
        assert!(Selection::All.contains(&b));
        assert!(!Selection::only([a]).contains(&b));
    }
}
