pub mod dispatcher;
pub mod message;
pub mod retry_queue;
pub mod sink;

pub use dispatcher::{DispatchStats, DispatcherConfig, NotificationDispatcher};
pub use retry_queue::{RetryQueue, RetryQueueConfig, RetryStats};
pub use sink::{DiscordWebhook, WebhookSink};
