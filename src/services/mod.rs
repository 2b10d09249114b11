pub mod conversation_service;
pub mod message_service;
pub mod notifications;
pub mod profiles;

pub use conversation_service::ConversationService;
pub use message_service::MessageService;
pub use notifications::{HttpNotificationSink, NotificationEvent, NotificationSink};
pub use profiles::{HttpProfileDirectory, ProfileDirectory, UserProfile};
