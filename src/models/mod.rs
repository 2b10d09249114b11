pub mod conversation;
pub mod message;

pub use conversation::{Conversation, ConversationKind, LastMessage, Participant, ParticipantRole};
pub use message::{Message, MessageKind, Reaction, ReadReceipt, DELETED_MESSAGE_PLACEHOLDER};
