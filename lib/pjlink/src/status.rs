use label::Label;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Label)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    Off,
    On,
    Cooling,
    Warming,
    Unknown,
}

impl PowerState {
    pub fn from_code(code: &str) -> PowerState {
        match code {
            "0" => PowerState::Off,
            "1" => PowerState::On,
            "2" => PowerState::Cooling,
            "3" => PowerState::Warming,
            _ => PowerState::Unknown,
        }
    }

    pub fn is_known(self) -> bool {
        self != PowerState::Unknown
    }

    /// `Some(true)` while the lamp is lit or lighting up.
    pub fn is_on(self) -> Option<bool> {
        match self {
            PowerState::On | PowerState::Warming => Some(true),
            PowerState::Off | PowerState::Cooling => Some(false),
            PowerState::Unknown => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Label)]
#[serde(rename_all = "UPPERCASE")]
pub enum MuteState {
    Muted,
    Unmuted,
    Unknown,
}

impl MuteState {
    pub fn from_code(code: &str) -> MuteState {
        match code {
            "30" => MuteState::Unmuted,
            "31" => MuteState::Muted,
            _ => MuteState::Unknown,
        }
    }

    pub fn is_muted(self) -> Option<bool> {
        match self {
            MuteState::Muted => Some(true),
            MuteState::Unmuted => Some(false),
            MuteState::Unknown => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Label)]
#[serde(rename_all = "UPPERCASE")]
pub enum FreezeState {
    Frozen,
    Normal,
    Unsupported,
    Unknown,
}

impl FreezeState {
    pub fn from_code(code: &str) -> FreezeState {
        match code {
            "0" => FreezeState::Normal,
            "1" => FreezeState::Frozen,
            "ERR1" => FreezeState::Unsupported,
            _ => FreezeState::Unknown,
        }
    }

    pub fn is_frozen(self) -> Option<bool> {
        match self {
            FreezeState::Frozen => Some(true),
            FreezeState::Normal => Some(false),
            FreezeState::Unsupported | FreezeState::Unknown => None,
        }
    }
}

/// Result of one full poll of a projector. Never cached: every poll asks the
/// device again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub power: PowerState,
    pub mute: MuteState,
    pub freeze: FreezeState,
    pub lamp_hours: Option<u32>,
    pub input: Option<String>,
    pub error: Option<String>,
    pub online: bool,
}

impl StatusSnapshot {
    pub fn offline() -> StatusSnapshot {
        StatusSnapshot {
            power: PowerState::Unknown,
            mute: MuteState::Unknown,
            freeze: FreezeState::Unknown,
            lamp_hours: None,
            input: None,
            error: None,
            online: false,
        }
    }

    /// Any non-zero digit in the error report means fan, lamp, temperature,
    /// cover, filter or other trouble.
    pub fn has_fault(&self) -> bool {
        self.error
            .as_deref()
            .map_or(false, |digits| digits.chars().any(|c| c != '0'))
    }
}
