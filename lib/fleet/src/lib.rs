mod config;
mod device;
mod directory;
mod dispatcher;
mod error;
mod manager;

pub use config::{Config, ProjectorConfig, DEFAULT_TIMEOUT_SECS};
pub use device::DeviceId;
pub use directory::Directory;
pub use dispatcher::{Action, Binding, ButtonLayout, Dispatcher, Outcome, Report};
pub use error::Error;
pub use manager::{select, CommandOutcome, Control, Fleet, Selection};

pub type Result<T> = std::result::Result<T, Error>;
