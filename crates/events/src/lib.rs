//! Job notifications: the message announced on every job state change and
//! the channel contract used to deliver it.

pub mod channel;
pub mod in_memory;
pub mod message;

pub use channel::{Delivery, NotificationChannel, NotificationError};
pub use in_memory::InMemoryNotificationChannel;
pub use message::JobQueueMessage;
