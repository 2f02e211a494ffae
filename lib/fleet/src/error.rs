use std::fmt;
use std::time::Duration;

use crate::DeviceId;

#[derive(Debug)]
pub enum Error {
    UnknownTarget(String),
    UnknownDevice(String),
    DuplicateDevice(DeviceId),
    UnmappedButton(u8),
    InvalidTimeout(Duration),
    Address(pjlink::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl From<pjlink::Error> for Error {
    fn from(err: pjlink::Error) -> Self {
        Self::Address(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTarget(name) => write!(f, "unknown target: {name}"),
            Self::UnknownDevice(name) => write!(f, "unknown device: {name}"),
            Self::DuplicateDevice(id) => write!(f, "device {id} is configured twice"),
            Self::UnmappedButton(button) => write!(f, "button {button} is not mapped"),
            Self::InvalidTimeout(timeout) => write!(f, "invalid timeout: {timeout:?}"),
            Self::Address(err) => write!(f, "address error: {err}"),
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for Error {}
