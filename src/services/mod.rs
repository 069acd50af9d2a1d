//! Business logic: publishing, admin notifications and unread counters.

pub mod notification;
pub mod publisher;
pub mod unread;

pub use notification::NotificationService;
pub use publisher::Publisher;
pub use unread::UnreadCounter;
