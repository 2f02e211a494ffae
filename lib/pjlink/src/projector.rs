use std::time::Duration;

use label::Label;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::codec::{self, Command, Rejection, Verb};
use crate::session::{ConnectionState, Connector, Session};
use crate::status::{FreezeState, MuteState, PowerState, StatusSnapshot};
use crate::Address;

/// Families of set commands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Label)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Power,
    Mute,
    Freeze,
}

impl Operation {
    pub fn verb(self) -> Verb {
        match self {
            Operation::Power => Verb::Powr,
            Operation::Mute => Verb::Avmt,
            Operation::Freeze => Verb::Frez,
        }
    }

    pub fn code(self, on: bool) -> &'static str {
        match (self, on) {
            (Operation::Power, true) => "1",
            (Operation::Power, false) => "0",
            (Operation::Mute, true) => "31",
            (Operation::Mute, false) => "30",
            (Operation::Freeze, true) => "1",
            (Operation::Freeze, false) => "0",
        }
    }

    pub fn command(self, on: bool) -> Command {
        Command::set(self.verb(), self.code(on))
    }

    /// Whether `snapshot` shows this operation switched on, `None` when the
    /// device did not say.
    pub fn current(self, snapshot: &StatusSnapshot) -> Option<bool> {
        match self {
            Operation::Power => snapshot.power.is_on(),
            Operation::Mute => snapshot.mute.is_muted(),
            Operation::Freeze => snapshot.freeze.is_frozen(),
        }
    }
}

/// Reply to a set command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ack {
    pub verb: Verb,
    pub reply: Option<String>,
}

impl Ack {
    /// Only the exact `%<class><VERB>=OK` token counts.
    pub fn is_ok(&self) -> bool {
        self.reply.as_deref() == Some(codec::acknowledgement(self.verb).as_str())
    }

    pub fn rejection(&self) -> Option<Rejection> {
        if self.is_ok() {
            return None;
        }

        let reply = self.reply.as_deref()?;
        let rejection = match codec::value(self.verb, reply) {
            Some(value) => Rejection::from_value(value),
            None => Rejection::Other(reply.to_string()),
        };

        Some(rejection)
    }
}

/// Typed operations over one projector's session.
pub struct Projector<C: Connector = Address> {
    session: Session<C>,
}

impl Projector<Address> {
    pub fn new(address: Address, timeout: Duration) -> Self {
        Self::with_session(Session::new(address, timeout))
    }
}

impl<C: Connector> Projector<C> {
    pub fn with_session(session: Session<C>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub async fn power(&self) -> PowerState {
        self.query(Verb::Powr)
            .await
            .map_or(PowerState::Unknown, |code| PowerState::from_code(&code))
    }

    pub async fn set_power(&self, on: bool) -> Ack {
        self.apply(Operation::Power, on).await
    }

    pub async fn mute(&self) -> MuteState {
        self.query(Verb::Avmt)
            .await
            .map_or(MuteState::Unknown, |code| MuteState::from_code(&code))
    }

    pub async fn set_mute(&self, mute: bool) -> Ack {
        self.apply(Operation::Mute, mute).await
    }

    pub async fn freeze(&self) -> FreezeState {
        self.query(Verb::Frez)
            .await
            .map_or(FreezeState::Unknown, |code| FreezeState::from_code(&code))
    }

    pub async fn set_freeze(&self, freeze: bool) -> Ack {
        self.apply(Operation::Freeze, freeze).await
    }

    /// Hours are the second whitespace separated field of the reply.
    pub async fn lamp_hours(&self) -> Option<u32> {
        let reply = self.session.send(&Command::query(Verb::Lamp)).await?;
        codec::value(Verb::Lamp, &reply)?;

        reply.split_whitespace().nth(1)?.parse().ok()
    }

    pub async fn input(&self) -> Option<String> {
        self.query(Verb::Inpt).await.filter(|value| !is_error(value))
    }

    pub async fn error_status(&self) -> Option<String> {
        self.query(Verb::Erst).await.filter(|value| !is_error(value))
    }

    pub async fn apply(&self, operation: Operation, on: bool) -> Ack {
        let command = operation.command(on);

        let ack = Ack {
            verb: operation.verb(),
            reply: self.session.send(&command).await,
        };

        match ack.rejection() {
            None if ack.is_ok() => info!("{}: {command} accepted", self.session.connector()),
            None => warn!("{}: {command} got no reply", self.session.connector()),
            Some(rejection) => warn!(
                "{}: {command} rejected: {rejection}",
                self.session.connector()
            ),
        }

        ack
    }

    /// Queries power, mute, freeze, lamp, input and error one after another
    /// over the same session.
    pub async fn status(&self) -> StatusSnapshot {
        let power = self.power().await;

        if !power.is_known() && self.session.state().await == ConnectionState::Faulted {
            debug!(
                "{}: unreachable, skipping remaining queries",
                self.session.connector()
            );
            return StatusSnapshot::offline();
        }

        let mute = self.mute().await;
        let freeze = self.freeze().await;
        let lamp_hours = self.lamp_hours().await;
        let input = self.input().await;
        let error = self.error_status().await;

        StatusSnapshot {
            power,
            mute,
            freeze,
            lamp_hours,
            input,
            error,
            online: power.is_known(),
        }
    }

    pub async fn close(&self) {
        self.session.disconnect().await
    }

    async fn query(&self, verb: Verb) -> Option<String> {
        let reply = self.session.send(&Command::query(verb)).await?;

        match codec::value(verb, &reply) {
            Some(value) => Some(value.to_string()),
            None => {
                debug!(
                    "{}: unexpected reply to {verb}: {reply}",
                    self.session.connector()
                );
                None
            }
        }
    }
}

fn is_error(value: &str) -> bool {
    value.starts_with("ERR")
}
