pub mod config;
pub mod error;
pub mod message;

pub use config::{Config, IdleBasis, PollConfig};
pub use error::{Error, Result};
pub use message::{Attachment, Notification, QueueMessage, SlackEnvelope};
