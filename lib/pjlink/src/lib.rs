mod address;
pub mod codec;
mod error;
mod projector;
mod session;
mod status;

#[cfg(any(test, feature = "stub"))]
pub mod stub;

pub use address::{Address, DEFAULT_PORT};
pub use codec::{Command, Rejection, Verb};
pub use error::Error;
pub use projector::{Ack, Operation, Projector};
pub use session::{ConnectionState, Connector, Session, DEFAULT_TIMEOUT};
pub use status::{FreezeState, MuteState, PowerState, StatusSnapshot};

pub type Result<T> = std::result::Result<T, Error>;
