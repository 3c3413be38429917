pub mod queue;
pub mod slack;

pub use queue::{HttpQueueSource, QueueDelivery, QueueSource};
pub use slack::{Notifier, SlackWebhook};
