//! Line format of the projector control protocol.
//!
//! A request is `%<class><VERB> <parameter>\r`, a reply is
//! `%<class><VERB>=<value>\r`. There are no request ids: replies are matched
//! to requests purely by ordering on the stream.

use std::fmt;

use label::Label;
use serde::{Deserialize, Serialize};

pub const PREFIX: char = '%';
pub const TERMINATOR: char = '\r';
pub const QUERY: &str = "?";

const OK: &str = "OK";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Label)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Powr,
    Avmt,
    Frez,
    Lamp,
    Inpt,
    Erst,
}

impl Verb {
    /// Command family digit sent right after the prefix.
    pub fn class(self) -> u8 {
        match self {
            Verb::Frez => 2,
            Verb::Powr | Verb::Avmt | Verb::Lamp | Verb::Inpt | Verb::Erst => 1,
        }
    }

    fn header(self) -> String {
        format!("{PREFIX}{}{}", self.class(), self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    pub parameter: String,
}

impl Command {
    pub fn query(verb: Verb) -> Command {
        Command {
            verb,
            parameter: QUERY.to_string(),
        }
    }

    pub fn set(verb: Verb, code: impl Into<String>) -> Command {
        Command {
            verb,
            parameter: code.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(self.verb, &self.parameter)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb.header(), self.parameter)
    }
}

pub fn encode(verb: Verb, parameter: &str) -> Vec<u8> {
    format!("{} {parameter}{TERMINATOR}", verb.header()).into_bytes()
}

/// Turns a raw reply into a token. Anything that is not plain ASCII decodes
/// to an empty token.
pub fn decode(bytes: &[u8]) -> String {
    if !bytes.is_ascii() {
        return String::new();
    }

    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c.is_ascii_control() || c.is_ascii_whitespace())
        .to_string()
}

/// The only reply that counts as success for a set command of `verb`.
pub fn acknowledgement(verb: Verb) -> String {
    format!("{}={OK}", verb.header())
}

/// Value part of a reply to `verb`, `None` when the token answers something
/// else.
pub fn value(verb: Verb, token: &str) -> Option<&str> {
    token.strip_prefix(&verb.header())?.strip_prefix('=')
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    UndefinedCommand,
    OutOfParameter,
    UnavailableTime,
    ProjectorFailure,
    Other(String),
}

impl Rejection {
    pub fn from_value(value: &str) -> Rejection {
        match value {
            "ERR1" => Rejection::UndefinedCommand,
            "ERR2" => Rejection::OutOfParameter,
            "ERR3" => Rejection::UnavailableTime,
            "ERR4" => Rejection::ProjectorFailure,
            other => Rejection::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedCommand => write!(f, "undefined command"),
            Self::OutOfParameter => write!(f, "out of parameter"),
            Self::UnavailableTime => write!(f, "unavailable time"),
            Self::ProjectorFailure => write!(f, "projector failure"),
            Self::Other(token) => write!(f, "unexpected reply {token:?}"),
        }
    }
}
