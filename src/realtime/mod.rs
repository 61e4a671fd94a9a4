/// Real-time notifications
///
/// Live observers (WebSocket clients) subscribe to one workflow and receive a
/// push message for every step completion and terminal outcome.

pub mod hub;

pub use hub::{NotificationHub, NotificationType, ObserverId, PushMessage, Subscription};
