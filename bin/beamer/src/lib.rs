use std::fmt::Write;
use std::time::Duration;

use clap::ValueEnum;
use fleet::{Action, Control, DeviceId, Directory, Report, Selection};
use indexmap::IndexMap;
use pjlink::{Operation, StatusSnapshot};
use tokio::time::{interval, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
    Toggle,
}

impl Switch {
    pub fn action(self, operation: Operation) -> Action {
        match self {
            Switch::On => Action::with_switch(operation, true),
            Switch::Off => Action::with_switch(operation, false),
            Switch::Toggle => Action::toggle(operation),
        }
    }
}

/// `nickname (id)` when the device has a nickname, the bare id otherwise.
pub fn device_label(directory: &Directory, id: &DeviceId) -> String {
    match directory.nickname(id) {
        Some(nickname) => format!("{nickname} ({id})"),
        None => id.to_string(),
    }
}

pub fn render_status(
    directory: &Directory,
    status: &IndexMap<DeviceId, StatusSnapshot>,
) -> String {
    let mut out = String::new();

    for (id, snapshot) in status {
        let label = device_label(directory, id);

        if !snapshot.online {
            let _ = writeln!(out, "{label}: offline");
            continue;
        }

        let _ = write!(
            out,
            "{label}: power {}, mute {}, freeze {}",
            snapshot.power, snapshot.mute, snapshot.freeze
        );

        if let Some(hours) = snapshot.lamp_hours {
            let _ = write!(out, ", lamp {hours}h");
        }
        if let Some(input) = &snapshot.input {
            let _ = write!(out, ", input {input}");
        }
        if let Some(error) = &snapshot.error {
            let _ = write!(out, ", error {error}");
        }
        if snapshot.has_fault() {
            out.push_str(" (fault)");
        }

        out.push('\n');
    }

    out
}

pub fn render_report(directory: &Directory, report: &Report) -> String {
    let mut out = format!("{report}\n");

    for (id, succeeded) in &report.results {
        let result = if *succeeded { "ok" } else { "failed" };
        let _ = writeln!(out, "  {}: {result}", device_label(directory, id));
    }

    out
}

/// Polls `selection` every `period` and hands each round to `show`. Runs
/// `rounds` times, or until the future is dropped when `rounds` is `None`.
pub async fn watch_status<T: Control + ?Sized>(
    control: &T,
    selection: &Selection,
    period: Duration,
    rounds: Option<usize>,
    mut show: impl FnMut(&IndexMap<DeviceId, StatusSnapshot>),
) -> fleet::Result<()> {
    let mut ticker = interval(period.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut round = 0;
    while rounds.map_or(true, |rounds| round < rounds) {
        ticker.tick().await;

        let status = control.status(selection).await?;
        show(&status);

        round += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use fleet::Fleet;
    use pjlink::stub::MockProjector;
    use pjlink::{FreezeState, MuteState, PowerState};

    fn directory() -> Directory {
        let mut directory = Directory::new();
        directory.add_alias("left", DeviceId::new("10.10.10.2"));
        directory
    }

    #[test]
    fn test_switch_action() {
        assert_eq!(Switch::On.action(Operation::Power), Action::PowerOn);
        assert_eq!(Switch::Off.action(Operation::Freeze), Action::Unfreeze);
        assert_eq!(Switch::Toggle.action(Operation::Mute), Action::ToggleMute);
    }

    #[test]
    fn test_render_status() {
        let status = IndexMap::from([
            (
                DeviceId::new("10.10.10.2"),
                StatusSnapshot {
                    power: PowerState::On,
                    mute: MuteState::Unmuted,
                    freeze: FreezeState::Unsupported,
                    lamp_hours: Some(1234),
                    input: Some("31".to_string()),
                    error: Some("000200".to_string()),
                    online: true,
                },
            ),
            (DeviceId::new("10.10.10.3"), StatusSnapshot::offline()),
        ]);

        assert_eq!(
            render_status(&directory(), &status),
            "left (10.10.10.2): power ON, mute UNMUTED, freeze UNSUPPORTED, lamp 1234h, \
             input 31, error 000200 (fault)\n\
             10.10.10.3: offline\n"
        );
    }

    #[test]
    fn test_render_report() {
        let report = Report {
            action: Action::Mute,
            on: true,
            results: IndexMap::from([
                (DeviceId::new("10.10.10.2"), true),
                (DeviceId::new("10.10.10.3"), false),
            ]),
        };

        assert_eq!(
            render_report(&directory(), &report),
            "mute: 1 of 2 succeeded\n  left (10.10.10.2): ok\n  10.10.10.3: failed\n"
        );
    }

    #[tokio::test]
    async fn test_watch_polls_every_round() {
        let mock = MockProjector::start().await.unwrap();
        let fleet = Fleet::new(
            [mock.address()],
            Directory::new(),
            Duration::from_millis(300),
        )
        .unwrap();

        let mut rounds = Vec::new();
        watch_status(
            &fleet,
            &Selection::All,
            Duration::from_millis(20),
            Some(3),
            |status| rounds.push(status.clone()),
        )
        .await
        .unwrap();

        assert_eq!(rounds.len(), 3);
        assert!(rounds.iter().all(|status| status.values().all(|s| s.online)));
        assert_eq!(mock.received("%1POWR ?").await, 3);
        assert_eq!(mock.connections(), 1);

        fleet.close().await;
    }

    #[tokio::test]
    async fn test_watch_stops_on_unknown_device() {
        let mock = MockProjector::start().await.unwrap();
        let fleet = Fleet::new([mock.address()], Directory::new(), Duration::from_millis(300))
            .unwrap();

        let selection = Selection::only([DeviceId::new("10.0.0.99")]);
        let mut shown = 0;
        let result = watch_status(&fleet, &selection, Duration::from_millis(20), None, |_| {
            shown += 1
        })
        .await;

        assert!(matches!(result, Err(fleet::Error::UnknownDevice(_))));
        assert_eq!(shown, 0);
        assert_eq!(mock.connections(), 0);
    }
}
