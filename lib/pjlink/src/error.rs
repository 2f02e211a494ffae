use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Timeout(tokio::time::error::Elapsed),
    ConnectionClosed,
    UnterminatedReply(usize),
    NotConnected,
    InvalidAddress(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::Timeout(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Timeout(err) => write!(f, "timeout error: {err}"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::UnterminatedReply(len) => {
                write!(f, "reply of {len} bytes ended without terminator")
            }
            Self::NotConnected => write!(f, "not connected"),
            Self::InvalidAddress(addr) => write!(f, "invalid address: {addr}"),
        }
    }
}

impl std::error::Error for Error {}
