use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use label::Label;
use log::{debug, info, warn};
use pjlink::Operation;
use serde::{Deserialize, Serialize};

use crate::{select, Control, DeviceId, Error, Result, Selection};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Label)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    PowerOn,
    PowerOff,
    TogglePower,
    Mute,
    Unmute,
    ToggleMute,
    Freeze,
    Unfreeze,
    ToggleFreeze,
}

impl Action {
    pub fn operation(self) -> Operation {
        match self {
            Action::PowerOn | Action::PowerOff | Action::TogglePower => Operation::Power,
            Action::Mute | Action::Unmute | Action::ToggleMute => Operation::Mute,
            Action::Freeze | Action::Unfreeze | Action::ToggleFreeze => Operation::Freeze,
        }
    }

    /// Fixed switch of the action, `None` for toggles.
    pub fn switch(self) -> Option<bool> {
        match self {
            Action::PowerOn | Action::Mute | Action::Freeze => Some(true),
            Action::PowerOff | Action::Unmute | Action::Unfreeze => Some(false),
            Action::TogglePower | Action::ToggleMute | Action::ToggleFreeze => None,
        }
    }

    pub fn toggle(operation: Operation) -> Action {
        match operation {
            Operation::Power => Action::TogglePower,
            Operation::Mute => Action::ToggleMute,
            Operation::Freeze => Action::ToggleFreeze,
        }
    }

    pub fn with_switch(operation: Operation, on: bool) -> Action {
        match (operation, on) {
            (Operation::Power, true) => Action::PowerOn,
            (Operation::Power, false) => Action::PowerOff,
            (Operation::Mute, true) => Action::Mute,
            (Operation::Mute, false) => Action::Unmute,
            (Operation::Freeze, true) => Action::Freeze,
            (Operation::Freeze, false) => Action::Unfreeze,
        }
    }
}

/// What a button does. An empty target means every device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub action: Action,
    #[serde(default)]
    pub target: Vec<String>,
}

impl Binding {
    pub fn new(action: Action, target: &[&str]) -> Binding {
        Binding {
            action,
            target: target.iter().map(|name| name.to_string()).collect(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Label)]
#[serde(rename_all = "snake_case")]
pub enum ButtonLayout {
    /// Four-button USB keypad driving the whole room.
    #[default]
    Keypad,
    /// Six-key macropad with the front pair on separate keys.
    Macropad,
}

impl ButtonLayout {
    pub fn bindings(self) -> BTreeMap<u8, Binding> {
        let bindings = match self {
            ButtonLayout::Keypad => vec![
                (1, Binding::new(Action::PowerOff, &[])),
                (2, Binding::new(Action::PowerOn, &[])),
                (3, Binding::new(Action::ToggleMute, &[])),
                (4, Binding::new(Action::ToggleFreeze, &[])),
            ],
            ButtonLayout::Macropad => vec![
                (1, Binding::new(Action::PowerOn, &[])),
                (2, Binding::new(Action::PowerOff, &[])),
                (3, Binding::new(Action::Mute, &["front"])),
                (4, Binding::new(Action::Unmute, &["front"])),
                (5, Binding::new(Action::Freeze, &["front"])),
                (6, Binding::new(Action::Unfreeze, &["front"])),
            ],
        };

        bindings.into_iter().collect()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Partial,
    Failed,
}

/// Per-device results of one dispatched action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub action: Action,
    pub on: bool,
    pub results: IndexMap<DeviceId, bool>,
}

impl Report {
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|ok| **ok).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn outcome(&self) -> Outcome {
        match self.succeeded() {
            0 => Outcome::Failed,
            n if n == self.total() => Outcome::Complete,
            _ => Outcome::Partial,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} of {} succeeded",
            self.action,
            self.succeeded(),
            self.total()
        )
    }
}

/// Turns button presses and named actions into fleet calls.
pub struct Dispatcher<T> {
    control: T,
    bindings: BTreeMap<u8, Binding>,
}

impl<T: Control> Dispatcher<T> {
    pub fn new(control: T, layout: ButtonLayout) -> Self {
        Self::with_bindings(control, layout.bindings())
    }

    pub fn with_bindings(control: T, bindings: BTreeMap<u8, Binding>) -> Self {
        Self { control, bindings }
    }

    pub fn control(&self) -> &T {
        &self.control
    }

    pub fn bindings(&self) -> &BTreeMap<u8, Binding> {
        &self.bindings
    }

    pub fn bind(&mut self, button: u8, binding: Binding) {
        self.bindings.insert(button, binding);
    }

    pub async fn on_button(&self, button: u8) -> Result<Report> {
        let binding = self
            .bindings
            .get(&button)
            .ok_or(Error::UnmappedButton(button))?;

        debug!("button {button}: {}", binding.action);

        self.perform(binding.action, &binding.target).await
    }

    /// Resolves `targets` before touching the network, then runs `action`.
    pub async fn perform(&self, action: Action, targets: &[String]) -> Result<Report> {
        let selection = select(&self.control, targets)?;
        let operation = action.operation();

        let on = match action.switch() {
            Some(on) => on,
            None => self.toggled(&selection, operation).await?,
        };

        let results = self.control.set(&selection, operation, on).await?;

        let report = Report {
            action,
            on,
            results,
        };

        match report.outcome() {
            Outcome::Complete => info!("{report}"),
            Outcome::Partial | Outcome::Failed => warn!("{report}"),
        }

        Ok(report)
    }

    /// Deactivates only when every online device with a definite state is
    /// active.
    async fn toggled(&self, selection: &Selection, operation: Operation) -> Result<bool> {
        let status = self.control.status(selection).await?;

        let known: Vec<bool> = status
            .values()
            .filter(|snapshot| snapshot.online)
            .filter_map(|snapshot| operation.current(snapshot))
            .collect();

        let all_active = !known.is_empty() && known.iter().all(|active| *active);
        debug!("toggle {operation}: {} known, all active {all_active}", known.len());

        Ok(!all_active)
    }
}
